//! Progress indicators for downloads and stage chunks
//!
//! indicatif hides the bars automatically when stderr is not a terminal, so
//! batch runs under a scheduler only get the tracing output.

use indicatif::{ProgressBar, ProgressStyle};

const DOWNLOAD_TEMPLATE: &str =
    "{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})";
const CHUNK_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {prefix:>10} {msg}";

/// Byte progress for a remote download; falls back to a spinner when the
/// server does not send a content length.
pub fn download_bar(total_bytes: Option<u64>, message: &str) -> ProgressBar {
    let pb = match total_bytes {
        Some(total) => {
            let pb = ProgressBar::new(total);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(DOWNLOAD_TEMPLATE)
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        },
        None => ProgressBar::new_spinner(),
    };
    pb.set_message(message.to_string());
    pb
}

/// Spinner that reports chunk and row counts for a stage
pub fn chunk_spinner(stage: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template(CHUNK_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(stage.to_string());
    pb
}

/// Human-readable byte count
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(250 * 1024 * 1024), "250.00 MB");
    }

    #[test]
    fn test_download_bar_length() {
        assert_eq!(download_bar(Some(2048), "title.basics").length(), Some(2048));
        assert_eq!(download_bar(None, "title.basics").length(), None);
    }
}
