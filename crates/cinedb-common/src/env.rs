//! Typed environment lookups
//!
//! Unset variables fall back to the supplied default. A variable that is set
//! but cannot be parsed is an error rather than a silent default, so a typo in
//! `.env` does not quietly load the production dataset.

use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Load `.env` from the working directory (or a parent) if present.
pub fn load_dotenv() {
    if let Ok(path) = dotenvy::dotenv() {
        tracing::debug!(path = %path.display(), "Loaded environment file");
    }
}

/// Raw value of `key`, treating empty strings as unset.
pub fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// String value of `key` or `default`.
pub fn string_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_string())
}

/// Parse `key` as `T`, or return `default` when unset.
pub fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| CommonError::invalid_env(key, &raw, e.to_string())),
        None => Ok(default),
    }
}

/// Boolean flag: `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn flag_or(key: &str, default: bool) -> Result<bool> {
    match var(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(CommonError::invalid_env(key, &raw, "expected a boolean")),
        },
        None => Ok(default),
    }
}

/// Comma-separated list; items are trimmed and empty items dropped.
pub fn list_or(key: &str, default: &[&str]) -> Vec<String> {
    match var(key) {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_parse_or_default_when_unset() {
        std::env::remove_var("CINEDB_TEST_NUMBER");
        assert_eq!(parse_or("CINEDB_TEST_NUMBER", 42usize).unwrap(), 42);
    }

    #[test]
    #[serial]
    fn test_parse_or_rejects_garbage() {
        std::env::set_var("CINEDB_TEST_NUMBER", "forty");
        let err = parse_or("CINEDB_TEST_NUMBER", 42usize).unwrap_err();
        assert!(matches!(err, CommonError::InvalidEnv { .. }));
        std::env::remove_var("CINEDB_TEST_NUMBER");
    }

    #[test]
    #[serial]
    fn test_flag_or() {
        std::env::set_var("CINEDB_TEST_FLAG", "Yes");
        assert!(flag_or("CINEDB_TEST_FLAG", false).unwrap());
        std::env::set_var("CINEDB_TEST_FLAG", "off");
        assert!(!flag_or("CINEDB_TEST_FLAG", true).unwrap());
        std::env::set_var("CINEDB_TEST_FLAG", "maybe");
        assert!(flag_or("CINEDB_TEST_FLAG", true).is_err());
        std::env::remove_var("CINEDB_TEST_FLAG");
    }

    #[test]
    #[serial]
    fn test_list_or() {
        std::env::set_var("CINEDB_TEST_LIST", " actor, ,actress ");
        assert_eq!(list_or("CINEDB_TEST_LIST", &[]), vec!["actor", "actress"]);
        std::env::remove_var("CINEDB_TEST_LIST");
        assert_eq!(list_or("CINEDB_TEST_LIST", &["movie"]), vec!["movie"]);
    }
}
