//! One fetch-convert-persist cycle for a single page of one data set.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::context::MigrationContext;
use crate::convert::{Converter, ConverterRegistry};
use crate::error::MigrationError;
use crate::gateway::Gateway;
use crate::services::RunServices;
use crate::types::{RawRecord, RunId, TargetRecord};

/// A converted envelope as handed to the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedRecord {
    pub run_id: RunId,
    pub entity: String,
    pub old_id: Option<String>,
    pub converted: Option<TargetRecord>,
    pub unmapped: Option<RawRecord>,
}

/// Persists converted envelopes keyed by entity name.
#[async_trait]
pub trait ConvertedDataWriter: Send + Sync {
    async fn write(&self, records: &[ConvertedRecord]) -> Result<(), MigrationError>;
}

#[derive(Default)]
pub struct InMemoryDataWriter {
    records: RwLock<Vec<ConvertedRecord>>,
}

impl InMemoryDataWriter {
    pub async fn records(&self) -> Vec<ConvertedRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl ConvertedDataWriter for InMemoryDataWriter {
    async fn write(&self, records: &[ConvertedRecord]) -> Result<(), MigrationError> {
        self.records.write().await.extend_from_slice(records);
        Ok(())
    }
}

/// Outcome of one page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records returned by the gateway.
    pub read: usize,
    /// Records with a non-null converted result.
    pub converted: usize,
}

pub struct MigrationDataFetcher {
    registry: Arc<ConverterRegistry>,
    gateway: Arc<dyn Gateway>,
    writer: Arc<dyn ConvertedDataWriter>,
}

impl MigrationDataFetcher {
    pub fn new(
        registry: Arc<ConverterRegistry>,
        gateway: Arc<dyn Gateway>,
        writer: Arc<dyn ConvertedDataWriter>,
    ) -> Self {
        Self {
            registry,
            gateway,
            writer,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.gateway
    }

    /// Convert one page and return how many records were converted.
    pub async fn fetch_data(
        &self,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<usize, MigrationError> {
        self.fetch_batch(ctx, services).await.map(|r| r.converted)
    }

    /// Convert one page.
    ///
    /// Per-record failures are logged and skipped, and the mappings and media
    /// requests the record buffered are dropped. Only a missing converter
    /// and store failures are returned as `Err`.
    pub async fn fetch_batch(
        &self,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<BatchReport, MigrationError> {
        let entity = ctx.entity();
        let converter = match self.registry.get_converter(ctx.profile_name(), entity) {
            Ok(converter) => converter,
            Err(e) => {
                services.logger.add_error(
                    ctx.run_id,
                    e.code(),
                    "Converter not found",
                    e.to_string(),
                    json!({ "entity": entity }),
                );
                services.logger.flush().await;
                return Err(e);
            }
        };

        let records = match self.gateway.read(ctx).await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(run_id = %ctx.run_id, entity, error = %e, "Gateway read failed");
                services.logger.add_error(
                    ctx.run_id,
                    e.code(),
                    "Could not read from gateway",
                    e.to_string(),
                    json!({ "entity": entity, "offset": ctx.offset }),
                );
                services.logger.flush().await;
                return Ok(BatchReport::default());
            }
        };
        if records.is_empty() {
            return Ok(BatchReport::default());
        }

        let mut report = BatchReport {
            read: records.len(),
            converted: 0,
        };
        let mut envelopes = Vec::with_capacity(records.len());

        for record in records {
            let old_id = record.get("id").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            let mapping_mark = services.mapping.pending_mark();
            let media_mark = services.media_files.pending_mark();

            match converter.convert(record, ctx, services).await {
                Ok(result) => {
                    if result.is_converted() {
                        report.converted += 1;
                    } else {
                        services.mapping.discard_pending_since(mapping_mark);
                        services.media_files.discard_since(media_mark);
                    }
                    envelopes.push(ConvertedRecord {
                        run_id: ctx.run_id,
                        entity: entity.to_string(),
                        old_id,
                        converted: result.converted,
                        unmapped: result.unmapped,
                    });
                }
                Err(e) => {
                    let dropped = services.mapping.discard_pending_since(mapping_mark);
                    services.media_files.discard_since(media_mark);

                    if e.propagates_to_run() {
                        services.logger.flush().await;
                        return Err(e);
                    }

                    tracing::warn!(
                        run_id = %ctx.run_id,
                        entity,
                        old_id = old_id.as_deref().unwrap_or(""),
                        dropped_mappings = dropped,
                        error = %e,
                        "Record conversion failed",
                    );
                    services.logger.add_error(
                        ctx.run_id,
                        e.code(),
                        "Could not convert entity",
                        e.to_string(),
                        json!({ "entity": entity, "id": old_id }),
                    );
                }
            }
        }

        if let Err(e) = self.persist(&envelopes, converter.as_ref(), services).await {
            services.logger.flush().await;
            return Err(e);
        }
        services.logger.flush().await;

        tracing::debug!(
            run_id = %ctx.run_id,
            entity,
            offset = ctx.offset,
            read = report.read,
            converted = report.converted,
            "Batch converted",
        );
        Ok(report)
    }

    /// Converted data, then mappings, then media requests. A media request
    /// must never reach the sink before its entity is written.
    async fn persist(
        &self,
        envelopes: &[ConvertedRecord],
        converter: &dyn Converter,
        services: &mut RunServices,
    ) -> Result<(), MigrationError> {
        if !envelopes.is_empty() {
            self.writer.write(envelopes).await?;
        }
        converter.write_mapping(services).await?;
        services.media_files.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::convert::test_support::{fixture, record, Fixture};
    use crate::convert::ConvertStruct;
    use crate::data_selection::{self, DataSet};
    use crate::gateway::{EnvironmentInformation, LocalGateway};
    use crate::mapping::{MappingStore, NewMapping};
    use crate::media::MediaFileRequest;

    fn fetcher(gateway: LocalGateway) -> (MigrationDataFetcher, Arc<InMemoryDataWriter>) {
        let writer = Arc::new(InMemoryDataWriter::default());
        let fetcher = MigrationDataFetcher::new(
            Arc::new(ConverterRegistry::shopware55()),
            Arc::new(gateway),
            writer.clone(),
        );
        (fetcher, writer)
    }

    fn categories(records: Vec<RawRecord>) -> LocalGateway {
        LocalGateway::new(EnvironmentInformation::default()).with_records("category", records)
    }

    async fn stored(fx: &Fixture, entity: &str) -> usize {
        fx.store
            .find_by_entity(fx.ctx.connection_id(), entity)
            .await
            .unwrap()
            .len()
    }

    // -- batches -------------------------------------------------------------

    #[tokio::test]
    async fn one_bad_record_does_not_fail_the_batch() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let records = (1..=10)
            .map(|i| {
                if i == 5 {
                    record(json!({"id": "5", "description": "No locale"}))
                } else {
                    record(json!({"id": i.to_string(), "description": "C", "_locale": "de-DE"}))
                }
            })
            .collect();
        let (fetcher, writer) = fetcher(categories(records));

        let count = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(count, 9);
        assert_eq!(writer.records().await.len(), 10);
        assert_eq!(stored(&fx, "category").await, 9);
        let logs = fx.logs.entries().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].details["id"], json!("5"));
    }

    #[tokio::test]
    async fn structural_error_rolls_back_and_is_logged_with_its_code() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let (fetcher, _) = fetcher(categories(vec![
            record(json!({"id": "1", "_locale": "de-DE"})),
            record(json!({"id": "2", "parent": "404", "_locale": "de-DE"})),
            record(json!({"id": "3", "parent": "1", "_locale": "de-DE"})),
        ]));

        let count = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(count, 2);
        let logs = fx.logs.entries().await;
        assert_eq!(logs[0].log_type, "SWAG_MIGRATION__PARENT_ENTITY_NOT_FOUND");
        assert_eq!(logs[0].details, json!({"entity": "category", "id": "2"}));
        assert!(fx
            .services
            .mapping
            .resolve_uuid(fx.ctx.connection_id(), "category", "2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn mappings_flush_once_per_batch() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let (fetcher, _) = fetcher(categories(vec![
            record(json!({"id": "1", "_locale": "de-DE"})),
            record(json!({"id": "2", "_locale": "de-DE"})),
        ]));

        fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(fx.services.mapping.pending_len(), 0);
        assert_eq!(stored(&fx, "category").await, 2);
    }

    #[tokio::test]
    async fn not_converted_record_is_written_as_unmapped() {
        let mut fx = fixture(data_selection::ORDER).await;
        let gateway = LocalGateway::new(EnvironmentInformation::default()).with_records(
            "order",
            vec![record(json!({"id": "1", "ordernumber": "20001"}))],
        );
        let (fetcher, writer) = fetcher(gateway);

        let count = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(count, 0);
        let written = writer.records().await;
        assert!(written[0].converted.is_none());
        assert_eq!(written[0].unmapped.as_ref().unwrap()["ordernumber"], json!("20001"));
    }

    #[tokio::test]
    async fn empty_page_short_circuits() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let (fetcher, writer) = fetcher(categories(Vec::new()));

        let report = fetcher.fetch_batch(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(report, BatchReport::default());
        assert!(writer.records().await.is_empty());
    }

    // -- propagation ---------------------------------------------------------

    #[tokio::test]
    async fn missing_converter_propagates() {
        let mut fx = fixture(DataSet::new("newsletter_recipient", "SwagMigrationNewsletter")).await;
        let (fetcher, _) = fetcher(categories(Vec::new()));

        let err = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap_err();

        assert_matches!(err, MigrationError::ConverterNotFound { .. });
        let logs = fx.logs.entries().await;
        assert_eq!(logs[0].log_type, "SWAG_MIGRATION__CONVERTER_NOT_FOUND");
    }

    /// Allocates a uuid and queues a media file, then either fails or
    /// returns nothing converted.
    struct AllocatingConverter;

    #[async_trait]
    impl Converter for AllocatingConverter {
        fn supported_profile(&self) -> &'static str {
            "shopware55"
        }

        fn supported_entity(&self) -> &'static str {
            "category"
        }

        async fn convert(
            &self,
            data: RawRecord,
            ctx: &MigrationContext,
            services: &mut RunServices,
        ) -> Result<ConvertStruct, MigrationError> {
            let media_id = services
                .mapping
                .create_uuid(ctx.connection_id(), "category", "x")
                .await?;
            services.media_files.save_media_file(MediaFileRequest {
                run_id: ctx.run_id,
                uri: "http://shop.example/media/image/x.png".into(),
                file_name: "x".into(),
                file_size: 1,
                media_id,
            });
            if data.contains_key("fail") {
                return Err(MigrationError::Store("connection reset".into()));
            }
            Ok(ConvertStruct::not_converted(data))
        }
    }

    #[tokio::test]
    async fn store_failure_propagates_and_writes_nothing() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let writer = Arc::new(InMemoryDataWriter::default());
        let fetcher = MigrationDataFetcher::new(
            Arc::new(ConverterRegistry::new(vec![Arc::new(AllocatingConverter)])),
            Arc::new(categories(vec![record(json!({"id": "1", "fail": true}))])),
            writer.clone(),
        );

        let err = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap_err();

        assert_matches!(err, MigrationError::Store(_));
        assert!(writer.records().await.is_empty());
        assert_eq!(fx.services.mapping.pending_len(), 0);
        assert!(fx.store.rows().await.is_empty());
    }

    #[tokio::test]
    async fn not_converted_record_drops_its_allocations() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let writer = Arc::new(InMemoryDataWriter::default());
        let fetcher = MigrationDataFetcher::new(
            Arc::new(ConverterRegistry::new(vec![Arc::new(AllocatingConverter)])),
            Arc::new(categories(vec![record(json!({"id": "1"}))])),
            writer.clone(),
        );

        let count = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(count, 0);
        assert_eq!(writer.records().await.len(), 1);
        assert_eq!(fx.services.mapping.pending_len(), 0);
        assert!(fx.services.media_files.pending().is_empty());
        assert!(fx.store.rows().await.is_empty());
    }

    // -- orders --------------------------------------------------------------

    async fn premap_order_dependencies(fx: &Fixture) {
        let conn = fx.ctx.connection_id();
        fx.store
            .insert(&[
                NewMapping::identity(conn, "customer", "max@example.com", Uuid::new_v4()),
                NewMapping::identity(conn, "salutation", "mr", Uuid::new_v4()),
                NewMapping::identity(conn, "order_state", "0", Uuid::new_v4()),
                NewMapping::identity(conn, "transaction_state", "17", Uuid::new_v4()),
                NewMapping::identity(conn, "payment_method", "5", Uuid::new_v4()),
                NewMapping::identity(conn, "product", "SW10001", Uuid::new_v4()),
            ])
            .await
            .unwrap();
    }

    fn order_record(id: &str, detail_id: &str, address_id: &str) -> RawRecord {
        record(json!({
            "id": id,
            "ordernumber": format!("2000{id}"),
            "_locale": "de-DE",
            "status": "0",
            "cleared": "17",
            "currency": "EUR",
            "currencyFactor": "1",
            "ordertime": "2012-08-30 10:15:54",
            "invoice_amount": "119",
            "invoice_amount_net": "100",
            "invoice_shipping": "0",
            "customer": {"email": "max@example.com", "salutation": "mr", "firstname": "Max"},
            "payment": {"id": "5", "name": "prepayment"},
            "paymentcurrency": {"id": "1", "currency": "EUR", "name": "Euro", "factor": "1"},
            "billingaddress": {
                "id": address_id, "firstname": "Max", "lastname": "Mustermann", "zipcode": "48624",
                "city": "Schöppingen", "street": "Mustermannstraße 92", "salutation": "mr",
                "country": {"id": "2", "countryiso": "DE", "iso3": "DEU", "countryname": "Deutschland"},
            },
            "shippingMethod": {"id": "9", "name": "Standard"},
            "details": [
                {"id": detail_id, "articleID": "2", "modus": "0", "articleordernumber": "SW10001", "name": "Shirt", "quantity": "1", "price": "119", "tax_rate": "19"},
            ],
        }))
    }

    #[tokio::test]
    async fn rejected_order_leaves_no_mappings_behind() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap_order_dependencies(&fx).await;
        let mut rejected = order_record("16", "52", "11");
        rejected["billingaddress"]["zipcode"] = json!("");
        let gateway = LocalGateway::new(EnvironmentInformation::default())
            .with_records("order", vec![order_record("15", "42", "10"), rejected]);
        let (fetcher, writer) = fetcher(gateway);
        let conn = fx.ctx.connection_id();

        let count = fetcher.fetch_data(&fx.ctx, &mut fx.services).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(writer.records().await.len(), 2);
        assert!(fx.services.mapping.resolve_uuid(conn, "order", "15").await.unwrap().is_some());
        assert!(fx.services.mapping.resolve_uuid(conn, "order", "16").await.unwrap().is_none());
        assert!(fx.services.mapping.resolve_uuid(conn, "order_line_item", "52").await.unwrap().is_none());
        assert!(fx.services.mapping.resolve_uuid(conn, "order_address", "11").await.unwrap().is_none());
        assert_eq!(stored(&fx, "order").await, 1);
        assert_eq!(stored(&fx, "order_line_item").await, 1);
        assert_eq!(stored(&fx, "order_delivery").await, 1);
    }
}
