//! Per-run migration log.
//!
//! Entries are buffered by [`LoggingService`] and handed to a [`LogSink`] on
//! [`flush`](LoggingService::flush). Logging never fails the caller; sink
//! errors are reported through `tracing` and the buffer is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MigrationError;
use crate::types::{RunId, Timestamp};

// ---------------------------------------------------------------------------
// Log types
// ---------------------------------------------------------------------------

/// Well-known log entry types written by converters and handlers.
///
/// Errors caught by the data fetcher use [`MigrationError::code`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    EmptyLocale,
    EmptyNecessaryDataFields,
    AssociationRequiredMissing,
    UnknownOrderState,
    UnknownTransactionState,
    UnknownPaymentMethod,
    UnknownCustomerSalutation,
    EmptyLineItemIdentifier,
    ProcessorNotFound,
    CannotDownloadMedia,
}

impl LogType {
    pub const ALL: &'static [LogType] = &[
        Self::EmptyLocale,
        Self::EmptyNecessaryDataFields,
        Self::AssociationRequiredMissing,
        Self::UnknownOrderState,
        Self::UnknownTransactionState,
        Self::UnknownPaymentMethod,
        Self::UnknownCustomerSalutation,
        Self::EmptyLineItemIdentifier,
        Self::ProcessorNotFound,
        Self::CannotDownloadMedia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyLocale => "SHOPWARE_55_EMPTY_LOCALE",
            Self::EmptyNecessaryDataFields => "SHOPWARE_55_EMPTY_NECESSARY_DATA_FIELDS",
            Self::AssociationRequiredMissing => "SHOPWARE_55_ASSOCIATION_REQUIRED_MISSING",
            Self::UnknownOrderState => "SHOPWARE_55_UNKNOWN_ORDER_STATE",
            Self::UnknownTransactionState => "SHOPWARE_55_UNKNOWN_TRANSACTION_STATE",
            Self::UnknownPaymentMethod => "SHOPWARE_55_UNKNOWN_PAYMENT_METHOD",
            Self::UnknownCustomerSalutation => "SHOPWARE_55_UNKNOWN_CUSTOMER_SALUTATION",
            Self::EmptyLineItemIdentifier => "SHOPWARE_55_EMPTY_LINE_ITEM_IDENTIFIER",
            Self::ProcessorNotFound => "PROCESSOR_NOT_FOUND",
            Self::CannotDownloadMedia => "CANNOT_DOWNLOAD_MEDIA",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<LogType> for String {
    fn from(t: LogType) -> Self {
        t.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entries and sink
// ---------------------------------------------------------------------------

/// One buffered log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub run_id: RunId,
    pub level: LogLevel,
    /// A [`LogType`] code or an error code.
    pub log_type: String,
    pub title: String,
    pub description: String,
    /// Free-form details, usually including the old identifier.
    pub details: Value,
    pub count: u32,
    pub created_at: Timestamp,
}

/// Durable destination of log entries.
#[async_trait]
pub trait LogSink: Send + Sync {
    async fn write(&self, entries: &[LogEntry]) -> Result<(), MigrationError>;
}

// ---------------------------------------------------------------------------
// LoggingService
// ---------------------------------------------------------------------------

pub struct LoggingService {
    sink: Arc<dyn LogSink>,
    buffer: Vec<LogEntry>,
}

impl LoggingService {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink,
            buffer: Vec::new(),
        }
    }

    pub fn add_info(
        &mut self,
        run_id: RunId,
        log_type: impl Into<String>,
        title: &str,
        description: impl Into<String>,
        details: Value,
    ) {
        self.push(run_id, LogLevel::Info, log_type.into(), title, description.into(), details, 1);
    }

    /// Buffer a warning. `count` is the number of affected fields or items.
    pub fn add_warning(
        &mut self,
        run_id: RunId,
        log_type: impl Into<String>,
        title: &str,
        description: impl Into<String>,
        details: Value,
        count: u32,
    ) {
        self.push(
            run_id,
            LogLevel::Warning,
            log_type.into(),
            title,
            description.into(),
            details,
            count,
        );
    }

    pub fn add_error(
        &mut self,
        run_id: RunId,
        log_type: impl Into<String>,
        title: &str,
        description: impl Into<String>,
        details: Value,
    ) {
        self.push(run_id, LogLevel::Error, log_type.into(), title, description.into(), details, 1);
    }

    /// Entries not yet flushed.
    pub fn entries(&self) -> &[LogEntry] {
        &self.buffer
    }

    /// Hand the buffer to the sink. Never fails.
    pub async fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }

        let entries = std::mem::take(&mut self.buffer);
        if let Err(e) = self.sink.write(&entries).await {
            tracing::error!(error = %e, dropped = entries.len(), "Failed to write migration log");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        run_id: RunId,
        level: LogLevel,
        log_type: String,
        title: &str,
        description: String,
        details: Value,
        count: u32,
    ) {
        match level {
            LogLevel::Info => tracing::debug!(%run_id, log_type = %log_type, "{description}"),
            LogLevel::Warning => tracing::info!(%run_id, log_type = %log_type, "{description}"),
            LogLevel::Error => tracing::warn!(%run_id, log_type = %log_type, "{description}"),
        }

        self.buffer.push(LogEntry {
            run_id,
            level,
            log_type,
            title: title.to_string(),
            description,
            details,
            count,
            created_at: Utc::now(),
        });
    }
}

// ---------------------------------------------------------------------------
// In-memory sink
// ---------------------------------------------------------------------------

/// Collects written entries in memory.
#[derive(Default)]
pub struct InMemoryLogSink {
    entries: tokio::sync::RwLock<Vec<LogEntry>>,
}

impl InMemoryLogSink {
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl LogSink for InMemoryLogSink {
    async fn write(&self, entries: &[LogEntry]) -> Result<(), MigrationError> {
        self.entries.write().await.extend_from_slice(entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    struct FailingSink;

    #[async_trait]
    impl LogSink for FailingSink {
        async fn write(&self, _entries: &[LogEntry]) -> Result<(), MigrationError> {
            Err(MigrationError::Store("log table missing".into()))
        }
    }

    // -- log types -----------------------------------------------------------

    #[test]
    fn log_type_codes_round_trip() {
        for t in LogType::ALL {
            assert_eq!(LogType::from_str(t.as_str()), Some(*t));
        }
        assert_eq!(LogType::from_str("nope"), None);
    }

    #[test]
    fn log_level_parse() {
        assert_eq!(LogLevel::from_str("warning"), Some(LogLevel::Warning));
        assert_eq!(LogLevel::from_str("fatal"), None);
    }

    // -- buffering -----------------------------------------------------------

    #[tokio::test]
    async fn flush_hands_entries_to_sink() {
        let sink = Arc::new(InMemoryLogSink::default());
        let mut logger = LoggingService::new(sink.clone());
        let run = Uuid::new_v4();

        logger.add_warning(
            run,
            LogType::EmptyLocale,
            "Empty locale",
            "Category could not be converted",
            json!({"id": "5"}),
            1,
        );
        logger.add_error(run, "SOME_CODE", "", "boom", json!({"entity": "order"}));
        assert!(sink.entries().await.is_empty());

        logger.flush().await;

        let written = sink.entries().await;
        assert_eq!(written.len(), 2);
        assert_eq!(written[0].log_type, "SHOPWARE_55_EMPTY_LOCALE");
        assert_eq!(written[1].level, LogLevel::Error);
        assert!(logger.entries().is_empty());
    }

    #[tokio::test]
    async fn sink_failure_is_swallowed() {
        let mut logger = LoggingService::new(Arc::new(FailingSink));
        logger.add_info(Uuid::new_v4(), LogType::UnknownPaymentMethod, "t", "d", json!({}));
        logger.flush().await;
        assert!(logger.entries().is_empty());
    }
}
