use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    add_translation, convert_value, custom_fields, field_str, is_default_locale, remove_keys,
    take_object, uuid_value, ConvertStruct, Converter, FieldType,
};
use crate::context::MigrationContext;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::logging::LogType;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

const BLOCKLIST: &[&str] = &[
    "groupkey",
    "mode",
    "discount",
    "minimumorder",
    "minimumordersurcharge",
    "taxinput",
];

pub struct CustomerGroupConverter;

#[async_trait]
impl Converter for CustomerGroupConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        entities::CUSTOMER_GROUP
    }

    async fn convert(
        &self,
        mut data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError> {
        let connection_id = ctx.connection_id();
        let Some(old_id) = field_str(&data, "id") else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyNecessaryDataFields,
                "Empty necessary data fields",
                "CustomerGroup-Entity could not be converted cause of empty necessary field(s): id.",
                json!({ "entity": entities::CUSTOMER_GROUP, "fields": ["id"] }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        let Some(locale) = field_str(&data, "_locale") else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyLocale,
                "Empty locale",
                "CustomerGroup-Entity could not be converted cause of empty locale.",
                json!({ "id": old_id }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };
        data.remove("_locale");
        remove_keys(&mut data, BLOCKLIST);

        let mut converted = TargetRecord::new();
        let id = services
            .mapping
            .create_uuid(connection_id, entities::CUSTOMER_GROUP, &old_id)
            .await?;
        converted.insert("id".into(), uuid_value(id));
        data.remove("id");

        if !is_default_locale(ctx, services, &locale).await? {
            if let Some(language_id) = services.mapping.language_uuid(connection_id, &locale).await? {
                let mut translation = TargetRecord::new();
                translation.insert("customerGroupId".into(), uuid_value(id));
                convert_value(&mut translation, "name", &mut data.clone(), "description", FieldType::String);
                let translation_id = services
                    .mapping
                    .create_uuid(
                        connection_id,
                        entities::CUSTOMER_GROUP_TRANSLATION,
                        &format!("{old_id}:{locale}"),
                    )
                    .await?;
                translation.insert("id".into(), uuid_value(translation_id));
                translation.insert("languageId".into(), uuid_value(language_id));
                add_translation(&mut converted, language_id, translation);
            }
        }

        convert_value(&mut converted, "displayGross", &mut data, "tax", FieldType::Bool);
        convert_value(&mut converted, "name", &mut data, "description", FieldType::String);

        if let Some(attributes) = take_object(&mut data, "attributes") {
            let fields = custom_fields(
                entities::CUSTOMER_GROUP,
                &attributes,
                &["id", "customerGroupID"],
            );
            converted.insert("customFields".into(), Value::Object(fields));
        }

        Ok(ConvertStruct::new(converted, data))
    }
}
