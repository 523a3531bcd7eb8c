//! Remote archive download
//!
//! Archives are streamed to disk rather than held in memory; the principals
//! file alone decompresses to several gigabytes. The decoder then reads the
//! local copy in chunks.

use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{IngestError, IngestResult};
use crate::progress::{download_bar, format_bytes};

/// Download `url` to `dest`, returning the local path.
///
/// With `reuse` set an existing `dest` is returned untouched. The body is
/// written to `<dest>.part` and renamed once complete, so an interrupted
/// download is never mistaken for a finished one.
pub async fn download(
    client: &reqwest::Client,
    url: &str,
    dest: &Path,
    reuse: bool,
) -> IngestResult<PathBuf> {
    if reuse && dest.exists() {
        info!(url = %url, path = %dest.display(), "Reusing downloaded archive");
        return Ok(dest.to_path_buf());
    }

    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| IngestError::source_unavailable(parent.display().to_string(), e))?;
    }

    info!(url = %url, "Downloading source archive");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| IngestError::source_unavailable(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(IngestError::source_unavailable(url, format!("HTTP {}", status)));
    }

    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| url.to_string());
    let pb = download_bar(response.content_length(), &format!("Downloading {}", name));

    let mut partial = dest.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    let mut file = tokio::fs::File::create(&partial)
        .await
        .map_err(|e| IngestError::source_unavailable(partial.display().to_string(), e))?;

    let mut downloaded = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| IngestError::source_unavailable(url, e))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| IngestError::source_unavailable(partial.display().to_string(), e))?;
        downloaded += chunk.len() as u64;
        pb.set_position(downloaded);
    }
    file.flush()
        .await
        .map_err(|e| IngestError::source_unavailable(partial.display().to_string(), e))?;
    drop(file);

    tokio::fs::rename(&partial, dest)
        .await
        .map_err(|e| IngestError::source_unavailable(dest.display().to_string(), e))?;

    pb.finish_and_clear();
    debug!(path = %dest.display(), "Archive written");
    info!(url = %url, size = %format_bytes(downloaded), "Download complete");

    Ok(dest.to_path_buf())
}
