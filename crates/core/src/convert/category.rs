use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    add_translation, convert_value, custom_fields, field_str, is_default_locale, remove_keys,
    take_object, uuid_value, ConvertStruct, Converter, FieldType,
};
use crate::context::MigrationContext;
use crate::convert::media::convert_media_asset;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::logging::LogType;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

/// Legacy fields with no target equivalent.
const BLOCKLIST: &[&str] = &[
    "path",
    "left",
    "right",
    "added",
    "changed",
    "stream_id",
    "metakeywords",
    "metadescription",
    "cmsheadline",
    "meta_title",
    "categorypath",
    "shops",
    "template",
    "external_target",
    "mediaID",
];

pub struct CategoryConverter;

#[async_trait]
impl Converter for CategoryConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        entities::CATEGORY
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
                "Category-Entity could not be converted cause of empty necessary field(s): id.",
                json!({ "entity": entities::CATEGORY, "fields": ["id"] }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        let Some(locale) = field_str(&data, "_locale") else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyLocale,
                "Empty locale",
                "Category-Entity could not be converted cause of empty locale.",
                json!({ "id": old_id }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        remove_keys(&mut data, BLOCKLIST);

        let mut converted = TargetRecord::new();
        if let Some(parent) = field_str(&data, "parent") {
            let parent_uuid = services
                .mapping
                .resolve_uuid(connection_id, entities::CATEGORY, &parent)
                .await?
                .ok_or_else(|| MigrationError::ParentEntityForChildNotFound {
                    entity: entities::CATEGORY,
                    old_id: old_id.clone(),
                })?;
            converted.insert("parentId".into(), uuid_value(parent_uuid));
        }
        data.remove("parent");

        let id = services
            .mapping
            .create_uuid(connection_id, entities::CATEGORY, &old_id)
            .await?;
        converted.insert("id".into(), uuid_value(id));
        data.remove("id");

        convert_value(&mut converted, "description", &mut data, "cmstext", FieldType::String);
        convert_value(&mut converted, "position", &mut data, "position", FieldType::Int);
        convert_value(&mut converted, "level", &mut data, "level", FieldType::Int);
        convert_value(&mut converted, "active", &mut data, "active", FieldType::Bool);
        convert_value(&mut converted, "isBlog", &mut data, "blog", FieldType::Bool);
        convert_value(&mut converted, "external", &mut data, "external", FieldType::String);
        convert_value(&mut converted, "hideFilter", &mut data, "hidefilter", FieldType::Bool);
        convert_value(&mut converted, "hideTop", &mut data, "hidetop", FieldType::Bool);
        convert_value(&mut converted, "productBoxLayout", &mut data, "product_box_layout", FieldType::String);
        convert_value(&mut converted, "hideSortings", &mut data, "hide_sortings", FieldType::Bool);
        convert_value(&mut converted, "sortingIds", &mut data, "sorting_ids", FieldType::String);
        convert_value(&mut converted, "facetIds", &mut data, "facet_ids", FieldType::String);

        if let Some(asset) = take_object(&mut data, "asset") {
            let media = convert_media_asset(asset, &locale, ctx, services).await?;
            converted.insert("media".into(), Value::Object(media));
        }

        if let Some(attributes) = take_object(&mut data, "attributes") {
            let fields = custom_fields(entities::CATEGORY, &attributes, &["id", "categoryID"]);
            converted.insert("customFields".into(), Value::Object(fields));
        }

        converted.insert("translations".into(), Value::Object(Default::default()));
        let description = data.get("description").cloned();
        convert_value(&mut converted, "name", &mut data, "description", FieldType::String);
        data.remove("_locale");

        if !is_default_locale(ctx, services, &locale).await? {
            self.add_locale_translation(&mut converted, id, &old_id, &locale, description, ctx, services)
                .await?;
        }

        Ok(ConvertStruct::new(converted, data))
    }
}

impl CategoryConverter {
    #[allow(clippy::too_many_arguments)]
    async fn add_locale_translation(
        &self,
        converted: &mut TargetRecord,
        category_id: uuid::Uuid,
        old_id: &str,
        locale: &str,
        description: Option<Value>,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<(), MigrationError> {
        let connection_id = ctx.connection_id();
        let mut translation = TargetRecord::new();
        translation.insert("categoryId".into(), uuid_value(category_id));
        if let Some(description) = description {
            let mut source = RawRecord::new();
            source.insert("description".into(), description);
            convert_value(&mut translation, "name", &mut source, "description", FieldType::String);
        }

        let language_id = match services.mapping.language_uuid(connection_id, locale).await {
            Ok(Some(language_id)) => language_id,
            Ok(None) => return Ok(()),
            Err(e) => {
                services.mapping.delete_mapping(category_id, connection_id).await?;
                return Err(e);
            }
        };

        let translation_id = services
            .mapping
            .create_uuid(
                connection_id,
                entities::CATEGORY_TRANSLATION,
                &format!("{old_id}:{locale}"),
            )
            .await?;
        translation.insert("id".into(), uuid_value(translation_id));
        translation.insert("languageId".into(), uuid_value(language_id));

        if let Some(fields) = converted.get("customFields") {
            translation.insert("customFields".into(), fields.clone());
        }

        add_translation(converted, language_id, translation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::convert::test_support::{fixture, record};
    use crate::data_selection;
    use crate::mapping::{MappingStore, NewMapping};

    // -- conversion ----------------------------------------------------------

    #[tokio::test]
    async fn converts_child_of_mapped_parent() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let parent = uuid::Uuid::new_v4();
        fx.store
            .insert(&[NewMapping::identity(fx.ctx.connection_id(), "category", "3", parent)])
            .await
            .unwrap();

        let result = CategoryConverter
            .convert(
                record(json!({"id": "7", "parent": "3", "description": "Shoes", "_locale": "de-DE"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        let converted = result.converted.unwrap();
        assert_eq!(converted["parentId"], json!(parent.to_string()));
        assert_ne!(converted["id"], json!(parent.to_string()));
        assert_eq!(converted["name"], json!("Shoes"));
        assert!(result.unmapped.is_none());
    }

    #[tokio::test]
    async fn blocklisted_fields_are_not_unmapped() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let result = CategoryConverter
            .convert(
                record(json!({
                    "id": "1", "_locale": "de-DE", "description": "Root",
                    "path": "|1|", "left": 1, "right": 2, "stream_id": null, "custom": "x",
                })),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        let unmapped = result.unmapped.unwrap();
        assert_eq!(unmapped.len(), 1);
        assert_eq!(unmapped["custom"], json!("x"));
    }

    #[tokio::test]
    async fn attributes_become_custom_fields() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let result = CategoryConverter
            .convert(
                record(json!({
                    "id": "1", "_locale": "de-DE",
                    "attributes": {"id": "1", "categoryID": "1", "attribute1": "foo"},
                })),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        let converted = result.converted.unwrap();
        assert_eq!(converted["customFields"], json!({"category_attribute1": "foo"}));
    }

    #[tokio::test]
    async fn foreign_locale_creates_translation() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let english = fx.reference.add_language("English", "en-GB").await;

        let result = CategoryConverter
            .convert(
                record(json!({"id": "8", "description": "Shoes", "_locale": "en-GB"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        let converted = result.converted.unwrap();
        let translation = &converted["translations"][english.id.to_string()];
        assert_eq!(translation["name"], json!("Shoes"));
        assert_eq!(translation["languageId"], json!(english.id.to_string()));
        assert_eq!(translation["categoryId"], converted["id"]);
    }

    #[tokio::test]
    async fn asset_produces_media_and_save_request() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let result = CategoryConverter
            .convert(
                record(json!({
                    "id": "9", "_locale": "de-DE",
                    "asset": {"id": "44", "name": "banner", "uri": "https://shop/media/banner.png", "file_size": "2048", "albumID": "-1"},
                })),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        let converted = result.converted.unwrap();
        let pending = fx.services.media_files.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].file_size, 2048);
        assert_eq!(converted["media"]["id"], json!(pending[0].media_id.to_string()));
    }

    // -- failures ------------------------------------------------------------

    #[tokio::test]
    async fn missing_locale_is_a_warning() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let result = CategoryConverter
            .convert(record(json!({"id": "5"})), &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(result.unmapped.unwrap()["id"], json!("5"));
        let entry = &fx.services.logger.entries()[0];
        assert_eq!(entry.log_type, "SHOPWARE_55_EMPTY_LOCALE");
        assert_eq!(entry.details["id"], json!("5"));
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn missing_id_is_rejected_without_mapping() {
        let mut fx = fixture(data_selection::CATEGORY).await;

        for _ in 0..2 {
            let result = CategoryConverter
                .convert(
                    record(json!({"description": "Orphan", "_locale": "de-DE"})),
                    &fx.ctx,
                    &mut fx.services,
                )
                .await
                .unwrap();
            assert!(result.converted.is_none());
        }

        let entries = fx.services.logger.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].log_type, "SHOPWARE_55_EMPTY_NECESSARY_DATA_FIELDS");
        assert_eq!(entries[0].details["fields"], json!(["id"]));
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn locale_without_language_buffers_no_translation_mapping() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let conn = fx.ctx.connection_id();
        fx.reference.add_locale("fr-FR").await;

        let result = CategoryConverter
            .convert(
                record(json!({"id": "14", "description": "Chapeaux", "_locale": "fr-FR"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        let converted = result.converted.unwrap();
        assert_eq!(converted["translations"], json!({}));
        let pending = fx.services.mapping.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity, "category");
        assert!(fx
            .services
            .mapping
            .resolve_uuid(conn, "category_translation", "14:fr-FR")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_parent_is_structural_error() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let err = CategoryConverter
            .convert(
                record(json!({"id": "7", "parent": "404", "_locale": "de-DE"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap_err();

        assert_matches!(err, MigrationError::ParentEntityForChildNotFound { ref old_id, .. } if old_id == "7");
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn unknown_locale_rolls_back_category_mapping() {
        let mut fx = fixture(data_selection::CATEGORY).await;
        let conn = fx.ctx.connection_id();

        let err = CategoryConverter
            .convert(
                record(json!({"id": "12", "description": "Hats", "_locale": "xx-XX"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap_err();

        assert_matches!(err, MigrationError::LocaleNotFound(_));
        assert!(fx
            .services
            .mapping
            .resolve_uuid(conn, "category", "12")
            .await
            .unwrap()
            .is_none());
    }
}
