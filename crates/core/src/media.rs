//! Media post-processing: save requests produced during conversion, the
//! per-file workload state machine, and the retrying process handler.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::context::MigrationContext;
use crate::data_selection::DataSet;
use crate::error::MigrationError;
use crate::logging::{LogType, LoggingService};
use crate::run::RunStore;
use crate::types::RunId;

/// Retry passes after the initial processing pass.
pub const MEDIA_ERROR_THRESHOLD: usize = 3;

/// Default byte size of one download chunk.
pub const DEFAULT_FILE_CHUNK_BYTES: u64 = 1024 * 1024;

// ---------------------------------------------------------------------------
// Save requests
// ---------------------------------------------------------------------------

/// A media file discovered during conversion, to be downloaded later.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaFileRequest {
    pub run_id: RunId,
    pub uri: String,
    pub file_name: String,
    pub file_size: u64,
    pub media_id: Uuid,
}

#[async_trait]
pub trait MediaFileSink: Send + Sync {
    async fn save(&self, files: &[MediaFileRequest]) -> Result<(), MigrationError>;
}

/// Buffers save requests until the owning batch has been persisted.
pub struct MediaFileService {
    sink: Arc<dyn MediaFileSink>,
    buffer: Vec<MediaFileRequest>,
}

impl MediaFileService {
    pub fn new(sink: Arc<dyn MediaFileSink>) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
        }
    }

    pub fn save_media_file(&mut self, request: MediaFileRequest) {
        self.buffer.push(request);
    }

    pub fn pending(&self) -> &[MediaFileRequest] {
        &self.buffer
    }

    pub fn pending_mark(&self) -> usize {
        self.buffer.len()
    }

    /// Drop every request buffered after `mark`.
    pub fn discard_since(&mut self, mark: usize) {
        self.buffer.truncate(mark);
    }

    pub async fn flush(&mut self) -> Result<usize, MigrationError> {
        if self.buffer.is_empty() {
            return Ok(0);
        }

        self.sink.save(&self.buffer).await?;
        let written = self.buffer.len();
        self.buffer.clear();
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// Workload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaProcessState {
    Pending,
    InProgress,
    Done,
    Error,
}

impl MediaProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for MediaProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaProcessWorkload {
    pub media_file_id: Uuid,
    pub run_id: RunId,
    pub state: MediaProcessState,
    pub error_count: u32,
}

impl MediaProcessWorkload {
    pub fn pending(media_file_id: Uuid, run_id: RunId) -> Self {
        Self {
            media_file_id,
            run_id,
            state: MediaProcessState::Pending,
            error_count: 0,
        }
    }

    /// Handed to a processor.
    pub fn start(&mut self) {
        self.state = MediaProcessState::InProgress;
    }

    pub fn mark_done(&mut self) {
        self.state = MediaProcessState::Done;
    }

    pub fn mark_failed(&mut self) {
        self.state = MediaProcessState::Error;
        self.error_count += 1;
    }
}

/// Downloads or copies media files for one profile/gateway pair.
#[async_trait]
pub trait MediaFileProcessor: Send + Sync {
    fn supports(&self, profile: &str, gateway: &str, entity: &str) -> bool;

    /// Process every item and return it with its new state. Per-file
    /// failures are reported through [`MediaProcessWorkload::mark_failed`].
    async fn process(
        &self,
        ctx: &MigrationContext,
        workload: Vec<MediaProcessWorkload>,
        file_chunk_bytes: u64,
    ) -> Result<Vec<MediaProcessWorkload>, MigrationError>;
}

#[derive(Default)]
pub struct MediaFileProcessorRegistry {
    processors: Vec<Arc<dyn MediaFileProcessor>>,
}

impl MediaFileProcessorRegistry {
    pub fn new(processors: Vec<Arc<dyn MediaFileProcessor>>) -> Self {
        Self { processors }
    }

    pub fn get_processor(
        &self,
        ctx: &MigrationContext,
    ) -> Result<Arc<dyn MediaFileProcessor>, MigrationError> {
        self.processors
            .iter()
            .find(|p| {
                p.supports(
                    &ctx.connection.profile_name,
                    &ctx.connection.gateway_name,
                    ctx.entity(),
                )
            })
            .cloned()
            .ok_or_else(|| MigrationError::ProcessorNotFound {
                profile: ctx.connection.profile_name.clone(),
                gateway: ctx.connection.gateway_name.clone(),
                entity: ctx.entity().to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// One unit of media work: a chunk of media file ids of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessMediaMessage {
    pub run_id: RunId,
    pub entity: String,
    pub media_file_ids: Vec<Uuid>,
    pub file_chunk_byte_size: u64,
}

pub struct ProcessMediaHandler {
    runs: Arc<dyn RunStore>,
    registry: Arc<MediaFileProcessorRegistry>,
}

impl ProcessMediaHandler {
    pub fn new(runs: Arc<dyn RunStore>, registry: Arc<MediaFileProcessorRegistry>) -> Self {
        Self { runs, registry }
    }

    /// Process one message: an initial pass over every file, then at most
    /// [`MEDIA_ERROR_THRESHOLD`] passes over the files still in error.
    ///
    /// Returns the merged final workload. A missing processor is logged and
    /// yields the workload still pending.
    pub async fn handle(
        &self,
        message: &ProcessMediaMessage,
        logger: &mut LoggingService,
    ) -> Result<Vec<MediaProcessWorkload>, MigrationError> {
        let ctx = self.context_for(message).await?;

        let mut workload: Vec<MediaProcessWorkload> = message
            .media_file_ids
            .iter()
            .map(|id| MediaProcessWorkload::pending(*id, message.run_id))
            .collect();

        let processor = match self.registry.get_processor(&ctx) {
            Ok(p) => p,
            Err(e) => {
                logger.add_error(
                    message.run_id,
                    LogType::ProcessorNotFound,
                    "Processor not found",
                    e.to_string(),
                    json!({
                        "profile": ctx.connection.profile_name,
                        "gateway": ctx.connection.gateway_name,
                        "entity": ctx.entity(),
                    }),
                );
                logger.flush().await;
                return Ok(workload);
            }
        };

        workload.iter_mut().for_each(MediaProcessWorkload::start);
        let chunk = message.file_chunk_byte_size;
        let processed = processor.process(&ctx, workload, chunk).await?;
        let mut merged = Merged::new(processed);

        for attempt in 1..=MEDIA_ERROR_THRESHOLD {
            let failed = merged.failed();
            if failed.is_empty() {
                break;
            }
            tracing::debug!(
                run_id = %message.run_id,
                attempt,
                files = failed.len(),
                "Retrying failed media files",
            );
            merged.apply(processor.process(&ctx, failed, chunk).await?);
        }

        let result = merged.into_vec();
        for item in result.iter().filter(|i| i.state == MediaProcessState::Error) {
            logger.add_error(
                message.run_id,
                LogType::CannotDownloadMedia,
                "Cannot process media file",
                format!(
                    "Media file {} failed {} times and was given up",
                    item.media_file_id, item.error_count
                ),
                json!({ "mediaFileId": item.media_file_id, "errorCount": item.error_count }),
            );
        }
        logger.flush().await;

        Ok(result)
    }

    async fn context_for(
        &self,
        message: &ProcessMediaMessage,
    ) -> Result<MigrationContext, MigrationError> {
        let run = self
            .runs
            .find_run(message.run_id)
            .await?
            .ok_or(MigrationError::EntityNotExists {
                entity: "migration_run",
                id: message.run_id,
            })?;

        let connection = match run.connection_id {
            Some(id) => self.runs.find_connection(id).await?,
            None => None,
        }
        .ok_or(MigrationError::EntityNotExists {
            entity: "migration_connection",
            id: message.run_id,
        })?;

        let data_set = crate::data_selection::data_set_by_entity(&message.entity)
            .unwrap_or(DataSet::new(crate::entities::MEDIA, ""));

        Ok(MigrationContext::new(connection, run.id, data_set, run.target))
    }
}

/// Workload keyed by media file id, keeping the first-seen order.
struct Merged {
    order: Vec<Uuid>,
    items: HashMap<Uuid, MediaProcessWorkload>,
}

impl Merged {
    fn new(workload: Vec<MediaProcessWorkload>) -> Self {
        let mut merged = Self {
            order: Vec::with_capacity(workload.len()),
            items: HashMap::with_capacity(workload.len()),
        };
        merged.apply(workload);
        merged
    }

    fn apply(&mut self, workload: Vec<MediaProcessWorkload>) {
        for item in workload {
            if !self.items.contains_key(&item.media_file_id) {
                self.order.push(item.media_file_id);
            }
            self.items.insert(item.media_file_id, item);
        }
    }

    fn failed(&self) -> Vec<MediaProcessWorkload> {
        self.order
            .iter()
            .filter_map(|id| self.items.get(id))
            .filter(|i| i.state == MediaProcessState::Error)
            .cloned()
            .collect()
    }

    fn into_vec(mut self) -> Vec<MediaProcessWorkload> {
        self.order
            .iter()
            .filter_map(|id| self.items.remove(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use assert_matches::assert_matches;

    use super::*;
    use crate::context::{MigrationConnection, TargetScope};
    use crate::logging::InMemoryLogSink;
    use crate::run::{InMemoryRunStore, MigrationRun};

    struct FlakyProcessor {
        broken: HashSet<Uuid>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaFileProcessor for FlakyProcessor {
        fn supports(&self, profile: &str, gateway: &str, entity: &str) -> bool {
            profile == "shopware55" && gateway == "api" && entity == "media"
        }

        async fn process(
            &self,
            _ctx: &MigrationContext,
            mut workload: Vec<MediaProcessWorkload>,
            _file_chunk_bytes: u64,
        ) -> Result<Vec<MediaProcessWorkload>, MigrationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(workload.iter().all(|i| i.state != MediaProcessState::Pending));
            for item in &mut workload {
                if self.broken.contains(&item.media_file_id) {
                    item.mark_failed();
                } else {
                    item.mark_done();
                }
            }
            Ok(workload)
        }
    }

    async fn run_store(gateway: &str) -> (Arc<InMemoryRunStore>, RunId) {
        let runs = Arc::new(InMemoryRunStore::default());
        let connection = MigrationConnection {
            id: Uuid::new_v4(),
            name: "legacy".into(),
            profile_name: "shopware55".into(),
            gateway_name: gateway.into(),
        };
        let run = MigrationRun::new(
            Some(connection.id),
            TargetScope::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()),
        );
        let run_id = run.id;
        runs.add_connection(connection).await;
        runs.add_run(run).await;
        (runs, run_id)
    }

    fn message(run_id: RunId, ids: Vec<Uuid>) -> ProcessMediaMessage {
        ProcessMediaMessage {
            run_id,
            entity: "media".into(),
            media_file_ids: ids,
            file_chunk_byte_size: DEFAULT_FILE_CHUNK_BYTES,
        }
    }

    // -- retry ---------------------------------------------------------------

    #[tokio::test]
    async fn failing_item_is_retried_three_times() {
        let (runs, run_id) = run_store("api").await;
        let ids = vec![Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
        let processor = Arc::new(FlakyProcessor {
            broken: HashSet::from([ids[1]]),
            calls: AtomicUsize::new(0),
        });
        let registry = Arc::new(MediaFileProcessorRegistry::new(vec![processor.clone()]));
        let handler = ProcessMediaHandler::new(runs, registry);
        let sink = Arc::new(InMemoryLogSink::default());
        let mut logger = LoggingService::new(sink.clone());

        let result = handler
            .handle(&message(run_id, ids.clone()), &mut logger)
            .await
            .unwrap();

        assert_eq!(processor.calls.load(Ordering::SeqCst), 4);
        assert_eq!(result.len(), 3);
        let done = result.iter().filter(|i| i.state == MediaProcessState::Done).count();
        assert_eq!(done, 2);
        assert_eq!(result[1].state, MediaProcessState::Error);
        assert_eq!(result[1].error_count, 4);

        let logs = sink.entries().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, "CANNOT_DOWNLOAD_MEDIA");
    }

    #[tokio::test]
    async fn no_retry_when_everything_succeeds() {
        let (runs, run_id) = run_store("api").await;
        let processor = Arc::new(FlakyProcessor {
            broken: HashSet::new(),
            calls: AtomicUsize::new(0),
        });
        let registry = Arc::new(MediaFileProcessorRegistry::new(vec![processor.clone()]));
        let handler = ProcessMediaHandler::new(runs, registry);
        let mut logger = LoggingService::new(Arc::new(InMemoryLogSink::default()));

        let result = handler
            .handle(&message(run_id, vec![Uuid::new_v4()]), &mut logger)
            .await
            .unwrap();

        assert_eq!(processor.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result[0].state, MediaProcessState::Done);
    }

    // -- failures ------------------------------------------------------------

    #[tokio::test]
    async fn missing_processor_is_logged() {
        let (runs, run_id) = run_store("local").await;
        let processor = Arc::new(FlakyProcessor {
            broken: HashSet::new(),
            calls: AtomicUsize::new(0),
        });
        let registry = Arc::new(MediaFileProcessorRegistry::new(vec![processor.clone()]));
        let handler = ProcessMediaHandler::new(runs, registry);
        let sink = Arc::new(InMemoryLogSink::default());
        let mut logger = LoggingService::new(sink.clone());

        let result = handler
            .handle(&message(run_id, vec![Uuid::new_v4()]), &mut logger)
            .await
            .unwrap();

        assert_eq!(processor.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result[0].state, MediaProcessState::Pending);
        assert_eq!(sink.entries().await[0].log_type, "PROCESSOR_NOT_FOUND");
    }

    #[tokio::test]
    async fn unknown_run_is_an_error() {
        let runs = Arc::new(InMemoryRunStore::default());
        let handler =
            ProcessMediaHandler::new(runs, Arc::new(MediaFileProcessorRegistry::default()));
        let mut logger = LoggingService::new(Arc::new(InMemoryLogSink::default()));

        let err = handler
            .handle(&message(Uuid::new_v4(), vec![]), &mut logger)
            .await
            .unwrap_err();
        assert_matches!(err, MigrationError::EntityNotExists { entity: "migration_run", .. });
    }

    // -- buffer --------------------------------------------------------------

    #[derive(Default)]
    struct CollectingSink(tokio::sync::RwLock<Vec<MediaFileRequest>>);

    #[async_trait]
    impl MediaFileSink for CollectingSink {
        async fn save(&self, files: &[MediaFileRequest]) -> Result<(), MigrationError> {
            self.0.write().await.extend_from_slice(files);
            Ok(())
        }
    }

    #[tokio::test]
    async fn discarded_requests_are_not_flushed() {
        let sink = Arc::new(CollectingSink::default());
        let mut service = MediaFileService::new(sink.clone());
        let request = |name: &str| MediaFileRequest {
            run_id: Uuid::new_v4(),
            uri: format!("https://shop.example/media/{name}"),
            file_name: name.to_string(),
            file_size: 10,
            media_id: Uuid::new_v4(),
        };

        service.save_media_file(request("a.png"));
        let mark = service.pending_mark();
        service.save_media_file(request("b.png"));
        service.discard_since(mark);

        assert_eq!(service.flush().await.unwrap(), 1);
        assert_eq!(sink.0.read().await[0].file_name, "a.png");
    }
}
