//! Field normalization for the tabular sources
//!
//! The datasets write `\N` for missing values and occasionally put free text
//! into numeric columns (`runtimeMinutes` is the usual offender). Every
//! nullable column goes through one of the `deserialize_with` helpers below:
//! the sentinel and empty cells become `None`, and so does any literal that
//! does not parse as the column's type.

use serde::{Deserialize, Deserializer};

/// Null sentinel used by the source files
pub const NULL_SENTINEL: &str = r"\N";

/// Trimmed value, or `None` for empty cells and the null sentinel
pub fn normalize(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == NULL_SENTINEL {
        None
    } else {
        Some(trimmed)
    }
}

/// Integer coercion. Accepts integral floats ("1994.0"), which show up when
/// a column was round-tripped through a spreadsheet.
pub fn parse_int<T: TryFrom<i64>>(raw: &str) -> Option<T> {
    let value = normalize(raw)?;
    let wide = match value.parse::<i64>() {
        Ok(v) => v,
        Err(_) => {
            let float = value.parse::<f64>().ok()?;
            if !float.is_finite() || float.fract() != 0.0 {
                return None;
            }
            float as i64
        },
    };
    T::try_from(wide).ok()
}

pub fn parse_float(raw: &str) -> Option<f64> {
    normalize(raw)?.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `0`/`1` flags (also `true`/`false`)
pub fn parse_flag(raw: &str) -> Option<bool> {
    match normalize(raw)?.to_ascii_lowercase().as_str() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

pub fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(normalize(&raw).map(str::to_string))
}

pub fn int<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_int(&raw))
}

pub fn float<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_float(&raw))
}

pub fn flag<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_flag(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_sentinel_and_blank() {
        assert_eq!(normalize(r"\N"), None);
        assert_eq!(normalize("   "), None);
        assert_eq!(normalize(" Drama "), Some("Drama"));
    }

    #[test]
    fn test_parse_int_coercion() {
        assert_eq!(parse_int::<i32>("121"), Some(121));
        assert_eq!(parse_int::<i32>("1994.0"), Some(1994));
        assert_eq!(parse_int::<i32>("1994.5"), None);
        assert_eq!(parse_int::<i32>("Reality-TV"), None);
        assert_eq!(parse_int::<i32>(r"\N"), None);
        assert_eq!(parse_int::<i32>("99999999999"), None);
        assert_eq!(parse_int::<i64>("99999999999"), Some(99_999_999_999));
    }

    #[test]
    fn test_parse_float_and_flag() {
        assert_eq!(parse_float("7.6"), Some(7.6));
        assert_eq!(parse_float("NaN"), None);
        assert_eq!(parse_float(r"\N"), None);
        assert_eq!(parse_flag("0"), Some(false));
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag("2"), None);
    }
}
