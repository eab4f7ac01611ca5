//! Legacy attribute definitions become custom fields in one custom field set
//! per target entity.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{field_str, remove_keys, uuid_value, ConvertStruct, Converter};
use crate::context::MigrationContext;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

/// Column metadata of the legacy attribute table.
const BLOCKLIST: &[&str] = &["column_type", "default", "null", "unsigned", "length", "_locale"];

/// Converts attribute definitions of one data set, e.g. `customer_custom_field`
/// into custom fields related to `customer`.
pub struct AttributeConverter {
    data_set_entity: &'static str,
    attribute_entity: &'static str,
}

impl AttributeConverter {
    pub const fn new(data_set_entity: &'static str, attribute_entity: &'static str) -> Self {
        Self {
            data_set_entity,
            attribute_entity,
        }
    }

    pub const fn category() -> Self {
        Self::new(entities::CATEGORY_CUSTOM_FIELD, entities::CATEGORY)
    }

    pub const fn customer() -> Self {
        Self::new(entities::CUSTOMER_CUSTOM_FIELD, entities::CUSTOMER)
    }

    pub const fn customer_group() -> Self {
        Self::new(entities::CUSTOMER_GROUP_CUSTOM_FIELD, entities::CUSTOMER_GROUP)
    }

    pub const fn order() -> Self {
        Self::new(entities::ORDER_CUSTOM_FIELD, entities::ORDER)
    }

    pub const fn product() -> Self {
        Self::new(entities::PRODUCT_CUSTOM_FIELD, entities::PRODUCT)
    }
}

#[async_trait]
impl Converter for AttributeConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        self.data_set_entity
    }

    async fn convert(
        &self,
        mut data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError> {
        let connection_id = ctx.connection_id();
        let entity = self.attribute_entity;
        let connection_name = ctx.connection.name.as_str();

        let locale = match field_str(&data, "_locale") {
            Some(locale) => locale,
            None => {
                services
                    .mapping
                    .default_language(ctx.target.language_id)
                    .await?
                    .locale_code
            }
        };
        let name = field_str(&data, "name").unwrap_or_default();

        let set_id = services
            .mapping
            .create_uuid(connection_id, entities::CUSTOM_FIELD_SET, entity)
            .await?;
        let relation_id = services
            .mapping
            .create_uuid(
                connection_id,
                entities::CUSTOM_FIELD_SET_RELATION,
                &format!("customFieldSetRelation-{entity}"),
            )
            .await?;
        let field_id = services
            .mapping
            .create_uuid(connection_id, self.data_set_entity, &name)
            .await?;

        let mut converted = TargetRecord::new();
        converted.insert("id".into(), uuid_value(set_id));
        converted.insert("name".into(), json!(format!("migration_{connection_name}_{entity}")));
        converted.insert(
            "config".into(),
            json!({ "label": { locale.as_str(): format!("Migration {connection_name} {entity}") } }),
        );
        converted.insert(
            "relations".into(),
            json!([{ "id": relation_id.to_string(), "entityName": entity }]),
        );

        let label = data
            .get("configuration")
            .and_then(|c| c.get("label"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| name.clone());
        let options = data
            .get("configuration")
            .and_then(|c| c.get("array_store"))
            .cloned();
        let legacy_type = field_str(&data, "type").unwrap_or_default();
        let (field_type, mut config) = field_config(&legacy_type, options);
        config.insert("label".into(), json!({ locale.as_str(): label }));

        converted.insert(
            "customFields".into(),
            json!([{
                "id": field_id.to_string(),
                "name": format!("{entity}_migration_{connection_name}_{name}"),
                "type": field_type,
                "config": config,
            }]),
        );

        remove_keys(&mut data, &["name", "type", "configuration"]);
        remove_keys(&mut data, BLOCKLIST);

        Ok(ConvertStruct::new(converted, data))
    }
}

/// Target field type and config for a legacy attribute type. Unknown types
/// are treated as text.
fn field_config(legacy_type: &str, options: Option<Value>) -> (&'static str, TargetRecord) {
    let (field_type, config) = match legacy_type.to_lowercase().as_str() {
        "int" | "integer" => (
            "int",
            json!({ "type": "number", "numberType": "int", "customFieldType": "number" }),
        ),
        "float" => (
            "float",
            json!({ "type": "number", "numberType": "float", "customFieldType": "number" }),
        ),
        "bool" | "boolean" => (
            "bool",
            json!({ "type": "checkbox", "customFieldType": "checkbox" }),
        ),
        "date" | "datetime" => (
            "datetime",
            json!({ "type": "date", "dateType": "datetime", "customFieldType": "date" }),
        ),
        "html" => (
            "html",
            json!({ "componentName": "sw-text-editor", "customFieldType": "textEditor" }),
        ),
        "combobox" => {
            let options = options.unwrap_or_else(|| json!([]));
            (
                "select",
                json!({
                    "componentName": "sw-single-select",
                    "customFieldType": "select",
                    "options": options,
                }),
            )
        }
        _ => ("text", json!({ "type": "text", "customFieldType": "text" })),
    };

    match config {
        Value::Object(map) => (field_type, map),
        _ => (field_type, TargetRecord::new()),
    }
}
