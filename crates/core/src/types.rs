use uuid::Uuid;

/// Identifies one configured source system (a migration connection).
pub type ConnectionId = Uuid;

/// Identifies one end-to-end migration run.
pub type RunId = Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// A raw legacy record as delivered by the gateway.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// A converted record shaped like the target schema.
pub type TargetRecord = serde_json::Map<String, serde_json::Value>;
