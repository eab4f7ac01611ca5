use async_trait::async_trait;
use serde_json::json;

use super::{
    add_translation, convert_value, field_i64, field_str, is_default_locale, remove_keys,
    uuid_value, ConvertStruct, Converter, FieldType,
};
use crate::context::MigrationContext;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::logging::LogType;
use crate::media::MediaFileRequest;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

const BLOCKLIST: &[&str] = &["userID", "created", "type", "extension", "width", "height"];

/// Converts assets of the media data set.
pub struct MediaConverter;

#[async_trait]
impl Converter for MediaConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        entities::MEDIA
    }

    async fn convert(
        &self,
        mut data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError> {
        if field_str(&data, "id").is_none() {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyNecessaryDataFields,
                "Empty necessary data fields",
                "Media-Entity could not be converted cause of empty necessary field(s): id.",
                json!({ "entity": entities::MEDIA, "fields": ["id"] }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        }

        let Some(locale) = field_str(&data, "_locale") else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyLocale,
                "Empty locale",
                "Media-Entity could not be converted cause of empty locale.",
                json!({ "id": field_str(&data, "id") }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };
        data.remove("_locale");
        remove_keys(&mut data, BLOCKLIST);

        let converted = media_record(&mut data, &locale, ctx, services).await?;
        Ok(ConvertStruct::new(converted, data))
    }
}

/// Convert an asset embedded in another record. The asset is consumed whole.
pub(crate) async fn convert_media_asset(
    mut asset: RawRecord,
    locale: &str,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<TargetRecord, MigrationError> {
    media_record(&mut asset, locale, ctx, services).await
}

/// Build the media record, buffer its save request and consume the fields
/// it used from `data`.
async fn media_record(
    data: &mut RawRecord,
    locale: &str,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<TargetRecord, MigrationError> {
    let connection_id = ctx.connection_id();
    let old_id = field_str(data, "id").unwrap_or_default();

    let id = services
        .mapping
        .create_uuid(connection_id, entities::MEDIA, &old_id)
        .await?;
    data.remove("id");

    let name = field_str(data, "name").unwrap_or_else(|| id.to_string());
    let mut media = TargetRecord::new();
    media.insert("id".into(), uuid_value(id));

    if !is_default_locale(ctx, services, locale).await? {
        let language_id = services.mapping.language_uuid(connection_id, locale).await?;
        if let Some(language_id) = language_id {
            let mut translation = TargetRecord::new();
            translation.insert("name".into(), json!(name));
            if let Some(description) = field_str(data, "description") {
                translation.insert("description".into(), json!(description));
            }
            let translation_id = services
                .mapping
                .create_uuid(
                    connection_id,
                    entities::MEDIA_TRANSLATION,
                    &format!("{old_id}:{locale}"),
                )
                .await?;
            translation.insert("id".into(), uuid_value(translation_id));
            translation.insert("languageId".into(), uuid_value(language_id));
            add_translation(&mut media, language_id, translation);
        }
    }

    if let Some(album) = field_str(data, "albumID") {
        if let Some(folder) = services
            .mapping
            .resolve_uuid(connection_id, entities::MEDIA_FOLDER, &album)
            .await?
        {
            media.insert("mediaFolderId".into(), uuid_value(folder));
        }
    }
    data.remove("albumID");

    let uri = field_str(data, "uri").or_else(|| field_str(data, "path"));
    let file_size = field_i64(data, "file_size").unwrap_or(0).max(0) as u64;
    if let Some(uri) = uri {
        services.media_files.save_media_file(MediaFileRequest {
            run_id: ctx.run_id,
            uri,
            file_name: name.clone(),
            file_size,
            media_id: id,
        });
    }
    remove_keys(data, &["uri", "path", "file_size"]);

    media.insert("name".into(), json!(name));
    data.remove("name");
    convert_value(&mut media, "description", data, "description", FieldType::String);

    Ok(media)
}
