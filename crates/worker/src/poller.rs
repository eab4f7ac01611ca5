//! Media queue poller.
//!
//! Polls for unprocessed media files every `poll_interval`, groups them per
//! run into process-media messages and hands the messages to the
//! [`ProcessMediaHandler`] with bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use shopmig_core::entities;
use shopmig_core::error::ErrorKind;
use shopmig_core::logging::LoggingService;
use shopmig_core::media::{MediaProcessState, ProcessMediaHandler, ProcessMediaMessage};
use shopmig_core::types::RunId;
use shopmig_db::repositories::MediaFileRepo;
use shopmig_db::store::PgLogSink;
use shopmig_db::DbPool;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkerConfig;

pub struct MediaPoller {
    pool: DbPool,
    handler: Arc<ProcessMediaHandler>,
    poll_interval: Duration,
    chunk_size: usize,
    file_chunk_bytes: u64,
    concurrency: usize,
}

impl MediaPoller {
    pub fn new(pool: DbPool, handler: Arc<ProcessMediaHandler>, config: &WorkerConfig) -> Self {
        Self {
            pool,
            handler,
            poll_interval: config.poll_interval,
            chunk_size: config.chunk_size,
            file_chunk_bytes: config.file_chunk_bytes,
            concurrency: config.concurrency,
        }
    }

    /// Run the poll loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            chunk_size = self.chunk_size,
            concurrency = self.concurrency,
            "Media poller started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Media poller shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(0) => {}
                        Ok(files) => tracing::info!(files, "Media poll cycle finished"),
                        Err(e) => tracing::error!(error = %e, "Media poll cycle failed"),
                    }
                }
            }
        }
    }

    /// One poll cycle. Returns the number of files picked up.
    pub async fn poll_once(&self) -> Result<usize, sqlx::Error> {
        let limit = (self.chunk_size * self.concurrency) as i64;
        let rows = MediaFileRepo::list_unprocessed(&self.pool, limit).await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let messages = chunk_messages(
            rows.iter().map(|row| (row.run_id, row.id)),
            self.chunk_size,
            self.file_chunk_bytes,
        );

        stream::iter(messages)
            .for_each_concurrent(self.concurrency, |message| async move {
                if let Err(e) = self.handle_message(&message).await {
                    tracing::error!(
                        run_id = %message.run_id,
                        files = message.media_file_ids.len(),
                        error = %e,
                        "Failed to record media results",
                    );
                }
            })
            .await;

        Ok(rows.len())
    }

    /// Run the handler and record the outcome. Files not downloaded are
    /// given up so they are not polled again.
    async fn handle_message(&self, message: &ProcessMediaMessage) -> Result<(), sqlx::Error> {
        let mut logger = LoggingService::new(Arc::new(PgLogSink::new(self.pool.clone())));

        let workload = match self.handler.handle(message, &mut logger).await {
            Ok(workload) => workload,
            Err(e) if e.kind() == ErrorKind::DependencyNotFound => {
                tracing::warn!(run_id = %message.run_id, error = %e, "Dropping media of unknown run");
                MediaFileRepo::mark_failed(&self.pool, &message.media_file_ids).await?;
                return Ok(());
            }
            Err(e) => {
                tracing::error!(run_id = %message.run_id, error = %e, "Media processing failed, will retry");
                return Ok(());
            }
        };

        let (done, failed): (Vec<_>, Vec<_>) = workload
            .iter()
            .partition(|item| item.state == MediaProcessState::Done);
        let done: Vec<Uuid> = done.iter().map(|item| item.media_file_id).collect();
        let failed: Vec<Uuid> = failed.iter().map(|item| item.media_file_id).collect();

        if !done.is_empty() {
            MediaFileRepo::mark_processed(&self.pool, &done).await?;
        }
        if !failed.is_empty() {
            MediaFileRepo::mark_failed(&self.pool, &failed).await?;
        }

        tracing::debug!(
            run_id = %message.run_id,
            done = done.len(),
            failed = failed.len(),
            "Media message processed",
        );
        Ok(())
    }
}

/// Group `(run, media file)` pairs by run, keeping first-seen order, and
/// split each group into messages of at most `chunk_size` files.
pub fn chunk_messages(
    files: impl IntoIterator<Item = (RunId, Uuid)>,
    chunk_size: usize,
    file_chunk_bytes: u64,
) -> Vec<ProcessMediaMessage> {
    let mut groups: Vec<(RunId, Vec<Uuid>)> = Vec::new();
    for (run_id, file_id) in files {
        match groups.iter_mut().find(|(id, _)| *id == run_id) {
            Some((_, ids)) => ids.push(file_id),
            None => groups.push((run_id, vec![file_id])),
        }
    }

    groups
        .into_iter()
        .flat_map(|(run_id, ids)| {
            ids.chunks(chunk_size.max(1))
                .map(|chunk| ProcessMediaMessage {
                    run_id,
                    entity: entities::MEDIA.to_string(),
                    media_file_ids: chunk.to_vec(),
                    file_chunk_byte_size: file_chunk_bytes,
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_per_run_and_chunked() {
        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        let files: Vec<(RunId, Uuid)> = vec![
            (run_a, Uuid::new_v4()),
            (run_b, Uuid::new_v4()),
            (run_a, Uuid::new_v4()),
            (run_a, Uuid::new_v4()),
        ];

        let messages = chunk_messages(files.clone(), 2, 512);

        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].run_id, run_a);
        assert_eq!(messages[0].media_file_ids, vec![files[0].1, files[2].1]);
        assert_eq!(messages[1].media_file_ids, vec![files[3].1]);
        assert_eq!(messages[2].run_id, run_b);
        assert!(messages.iter().all(|m| m.entity == "media" && m.file_chunk_byte_size == 512));
    }

    #[test]
    fn nothing_to_chunk() {
        assert!(chunk_messages(Vec::new(), 10, 1024).is_empty());
    }
}
