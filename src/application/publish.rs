//! Uploading a finished HLS tree to the blob store.

use crate::domain::hls::MASTER_PLAYLIST;
use crate::error::BoxError;
use crate::ports::storage::BlobStorePort;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const HLS_PLAYLIST_TYPE: &str = "application/vnd.apple.mpegurl";
pub const MPEG_TS_TYPE: &str = "video/MP2T";
pub const OCTET_STREAM_TYPE: &str = "application/octet-stream";

pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("m3u8") => HLS_PLAYLIST_TYPE,
        Some("ts") => MPEG_TS_TYPE,
        _ => OCTET_STREAM_TYPE,
    }
}

/// Output location for a source key: the upload prefix is swapped for the output prefix.
///
/// `uploads/clip.mp4` becomes `hls/clip.mp4`. Keys outside the upload area
/// are placed under the output prefix unchanged.
pub fn destination_prefix(key: &str, upload_prefix: &str, output_prefix: &str) -> String {
    let relative = key.strip_prefix(upload_prefix).unwrap_or(key);
    let relative = relative.trim_start_matches('/');
    let output_prefix = output_prefix.trim_end_matches('/');
    let joined = if output_prefix.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", output_prefix, relative)
    };
    joined.trim_end_matches('/').to_string()
}

/// Every regular file below `root`, sorted, as (absolute path, `/`-separated relative key).
async fn collect_files(root: &Path) -> std::io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if file_type.is_file() {
                let relative = path
                    .strip_prefix(root)
                    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((path, relative));
            }
        }
    }

    files.sort_by(|a, b| a.1.cmp(&b.1));
    Ok(files)
}

/// Uploads the tree under `root` to `<prefix>/<relative path>`.
///
/// The master playlist at the root goes last so it never points at renditions
/// that are not uploaded yet. Stops at the first failed upload.
pub async fn publish_tree<S>(storage: &S, root: &Path, prefix: &str) -> Result<usize, BoxError>
where
    S: BlobStorePort + ?Sized,
{
    let (masters, files): (Vec<_>, Vec<_>) = collect_files(root)
        .await?
        .into_iter()
        .partition(|(_, relative)| relative == MASTER_PLAYLIST);

    let mut uploaded = 0;
    for (path, relative) in files.iter().chain(masters.iter()) {
        let key = format!("{}/{}", prefix, relative);
        let content_type = content_type_for(path);
        debug!(key = %key, content_type, "uploading");
        storage.put(path, &key, content_type).await?;
        uploaded += 1;
    }

    info!(prefix, files = uploaded, "published HLS output");
    Ok(uploaded)
}
