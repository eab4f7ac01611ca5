//! HTTP media downloader.
//!
//! Fetches each queued media file in byte-range chunks and writes it below
//! the media directory as `<media_id>/<file_name>.<ext>`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use shopmig_core::context::MigrationContext;
use shopmig_core::data_selection::SHOPWARE55_PROFILE;
use shopmig_core::entities;
use shopmig_core::error::MigrationError;
use shopmig_core::media::{MediaFileProcessor, MediaProcessWorkload};
use shopmig_db::models::media_file::MediaFileRow;
use shopmig_db::repositories::MediaFileRepo;
use shopmig_db::DbPool;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The HTTP request itself failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Media source returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Cannot write media file: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// HttpMediaDownloader
// ---------------------------------------------------------------------------

/// Media file processor for `shopware55` sources reachable over HTTP.
pub struct HttpMediaDownloader {
    client: reqwest::Client,
    pool: DbPool,
    media_dir: PathBuf,
}

impl HttpMediaDownloader {
    pub fn new(pool: DbPool, media_dir: PathBuf, timeout: Duration) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            pool,
            media_dir,
        })
    }

    /// Download `uri` into `target` in chunks of `chunk_bytes`. Returns the
    /// number of bytes written.
    ///
    /// A server ignoring the range header answers `200` with the whole body,
    /// which ends the download after one request.
    pub async fn download(
        &self,
        uri: &str,
        target: &Path,
        chunk_bytes: u64,
    ) -> Result<u64, DownloadError> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(target).await?;
        let mut offset = 0u64;

        loop {
            let response = self
                .client
                .get(uri)
                .header(RANGE, range_header(offset, chunk_bytes))
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
                break;
            }
            if !status.is_success() {
                return Err(DownloadError::HttpStatus(status.as_u16()));
            }

            let partial = status == StatusCode::PARTIAL_CONTENT;
            let body = response.bytes().await?;
            file.write_all(&body).await?;
            offset += body.len() as u64;

            if !partial || body.is_empty() || (body.len() as u64) < chunk_bytes {
                break;
            }
        }

        file.flush().await?;
        Ok(offset)
    }

    async fn process_item(&self, row: &MediaFileRow, chunk_bytes: u64) -> Result<u64, DownloadError> {
        let target = target_path(&self.media_dir, row.media_id, &row.file_name, &row.uri);
        match self.download(&row.uri, &target, chunk_bytes).await {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&target).await {
                    tracing::debug!(path = %target.display(), error = %remove_err, "No partial file to remove");
                }
                Err(e)
            }
        }
    }
}

#[async_trait]
impl MediaFileProcessor for HttpMediaDownloader {
    fn supports(&self, profile: &str, _gateway: &str, entity: &str) -> bool {
        profile == SHOPWARE55_PROFILE && entity == entities::MEDIA
    }

    async fn process(
        &self,
        ctx: &MigrationContext,
        workload: Vec<MediaProcessWorkload>,
        file_chunk_bytes: u64,
    ) -> Result<Vec<MediaProcessWorkload>, MigrationError> {
        let ids: Vec<Uuid> = workload.iter().map(|w| w.media_file_id).collect();
        let rows: HashMap<Uuid, MediaFileRow> = MediaFileRepo::find_by_ids(&self.pool, &ids)
            .await
            .map_err(|e| MigrationError::Store(e.to_string()))?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        let mut processed = Vec::with_capacity(workload.len());
        for mut item in workload {
            let Some(row) = rows.get(&item.media_file_id) else {
                tracing::warn!(
                    run_id = %ctx.run_id,
                    media_file_id = %item.media_file_id,
                    "Media file row missing",
                );
                item.mark_failed();
                processed.push(item);
                continue;
            };

            match self.process_item(row, file_chunk_bytes).await {
                Ok(bytes) => {
                    tracing::debug!(
                        run_id = %ctx.run_id,
                        media_id = %row.media_id,
                        bytes,
                        "Media file downloaded",
                    );
                    item.mark_done();
                }
                Err(e) => {
                    tracing::warn!(
                        run_id = %ctx.run_id,
                        media_id = %row.media_id,
                        uri = %row.uri,
                        error = %e,
                        "Media download failed",
                    );
                    item.mark_failed();
                }
            }
            processed.push(item);
        }

        Ok(processed)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `bytes=<first>-<last>` for one chunk starting at `offset`.
pub fn range_header(offset: u64, chunk_bytes: u64) -> String {
    let last = offset.saturating_add(chunk_bytes.max(1)) - 1;
    format!("bytes={offset}-{last}")
}

/// Extension of the last path segment of `uri`, ignoring query and fragment.
pub fn file_extension(uri: &str) -> Option<&str> {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let segment = path.rsplit('/').next().unwrap_or(path);
    match segment.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

pub fn target_path(media_dir: &Path, media_id: Uuid, file_name: &str, uri: &str) -> PathBuf {
    let name: String = file_name
        .chars()
        .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
        .collect();
    let name = match file_extension(uri) {
        Some(ext) if !name.ends_with(&format!(".{ext}")) => format!("{name}.{ext}"),
        _ => name,
    };
    media_dir.join(media_id.to_string()).join(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    // -- ranges --------------------------------------------------------------

    #[test]
    fn range_covers_one_chunk() {
        assert_eq!(range_header(0, 1024), "bytes=0-1023");
        assert_eq!(range_header(1024, 1024), "bytes=1024-2047");
        assert_eq!(range_header(5, 0), "bytes=5-5");
    }

    // -- paths ---------------------------------------------------------------

    #[test]
    fn extension_ignores_query() {
        assert_eq!(file_extension("http://shop.example/media/image/a.png?v=2"), Some("png"));
        assert_eq!(file_extension("http://shop.example/media/image/a"), None);
        assert_eq!(file_extension("http://shop.example/media/.hidden"), None);
    }

    #[test]
    fn target_path_is_keyed_by_media_id() {
        let media_id = Uuid::new_v4();
        let path = target_path(
            Path::new("/var/media"),
            media_id,
            "summer/shirt",
            "http://shop.example/media/image/shirt.jpg",
        );
        assert_eq!(
            path,
            PathBuf::from(format!("/var/media/{media_id}/summer_shirt.jpg"))
        );

        let path = target_path(Path::new("m"), media_id, "shirt.jpg", "http://x/shirt.jpg");
        assert_eq!(path, Path::new("m").join(media_id.to_string()).join("shirt.jpg"));
    }
}
