//! Source-side reader contract and a local, in-process gateway.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::types::RawRecord;

/// Gateway name of [`LocalGateway`].
pub const LOCAL_GATEWAY: &str = "local";

/// What the source system reports about itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentInformation {
    pub source_system_name: String,
    pub source_system_version: String,
    pub source_system_domain: String,
    /// Record count per entity name.
    #[serde(default)]
    pub totals: BTreeMap<String, u64>,
}

impl EnvironmentInformation {
    pub fn total(&self, entity: &str) -> u64 {
        self.totals.get(entity).copied().unwrap_or(0)
    }
}

#[async_trait]
pub trait Gateway: Send + Sync {
    /// One page of raw records for the context's data set, bounded by its
    /// offset/limit window.
    async fn read(&self, ctx: &MigrationContext) -> Result<Vec<RawRecord>, MigrationError>;

    async fn read_environment_information(
        &self,
        ctx: &MigrationContext,
    ) -> Result<EnvironmentInformation, MigrationError>;
}

/// Gateway over records already loaded into memory, e.g. from an export file.
#[derive(Debug, Clone, Default)]
pub struct LocalGateway {
    environment: EnvironmentInformation,
    records: HashMap<String, Vec<RawRecord>>,
}

#[derive(Deserialize)]
struct LocalExport {
    environment: EnvironmentInformation,
    #[serde(default)]
    data: HashMap<String, Vec<RawRecord>>,
}

impl LocalGateway {
    pub fn new(environment: EnvironmentInformation) -> Self {
        Self {
            environment,
            records: HashMap::new(),
        }
    }

    /// Parse an export of the form
    /// `{"environment": {...}, "data": {"<entity>": [records]}}`.
    pub fn from_json(value: Value) -> Result<Self, MigrationError> {
        let export: LocalExport =
            serde_json::from_value(value).map_err(|e| MigrationError::Gateway(e.to_string()))?;
        let mut gateway = Self::new(export.environment);
        for (entity, records) in export.data {
            gateway = gateway.with_records(&entity, records);
        }
        Ok(gateway)
    }

    /// Replace the records of one entity. Totals follow the record count.
    pub fn with_records(mut self, entity: &str, records: Vec<RawRecord>) -> Self {
        self.environment
            .totals
            .insert(entity.to_string(), records.len() as u64);
        self.records.insert(entity.to_string(), records);
        self
    }
}

#[async_trait]
impl Gateway for LocalGateway {
    async fn read(&self, ctx: &MigrationContext) -> Result<Vec<RawRecord>, MigrationError> {
        let Some(records) = self.records.get(ctx.entity()) else {
            return Ok(Vec::new());
        };
        let page = records
            .iter()
            .skip(ctx.offset as usize)
            .take(ctx.limit as usize)
            .cloned()
            .collect();
        Ok(page)
    }

    async fn read_environment_information(
        &self,
        _ctx: &MigrationContext,
    ) -> Result<EnvironmentInformation, MigrationError> {
        Ok(self.environment.clone())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::context::{MigrationConnection, TargetScope};
    use crate::data_selection;

    fn ctx() -> MigrationContext {
        MigrationContext::new(
            MigrationConnection {
                id: Uuid::new_v4(),
                name: "legacy".into(),
                profile_name: "shopware55".into(),
                gateway_name: LOCAL_GATEWAY.into(),
            },
            Uuid::new_v4(),
            data_selection::CATEGORY,
            TargetScope::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()),
        )
    }

    fn export() -> Value {
        json!({
            "environment": {
                "sourceSystemName": "Shopware",
                "sourceSystemVersion": "5.5.7",
                "sourceSystemDomain": "shop.example",
            },
            "data": {
                "category": [{"id": "1"}, {"id": "2"}, {"id": "3"}],
            },
        })
    }

    #[tokio::test]
    async fn reads_in_windows() {
        let gateway = LocalGateway::from_json(export()).unwrap();
        let ctx = ctx();

        let first = gateway.read(&ctx.with_window(0, 2)).await.unwrap();
        let second = gateway.read(&ctx.with_window(2, 2)).await.unwrap();
        let third = gateway.read(&ctx.with_window(4, 2)).await.unwrap();

        assert_eq!(first.len(), 2);
        assert_eq!(second[0]["id"], json!("3"));
        assert!(third.is_empty());
    }

    #[tokio::test]
    async fn environment_counts_records() {
        let gateway = LocalGateway::from_json(export()).unwrap();
        let info = gateway.read_environment_information(&ctx()).await.unwrap();

        assert_eq!(info.source_system_version, "5.5.7");
        assert_eq!(info.total("category"), 3);
        assert_eq!(info.total("order"), 0);
    }

    #[test]
    fn malformed_export_is_gateway_error() {
        let err = LocalGateway::from_json(json!({"data": []})).unwrap_err();
        assert_matches!(err, MigrationError::Gateway(_));
    }
}
