use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    add_translation, convert_value, custom_fields, field_f64, field_i64, field_str,
    is_default_locale, object, remove_keys, take_object, uuid_value, ConvertStruct, Converter,
    FieldType,
};
use crate::context::MigrationContext;
use crate::convert::media::convert_media_asset;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::logging::LogType;
use crate::price::round;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

/// Article detail kinds in the legacy shop.
const KIND_MAIN: i64 = 1;
const KIND_VARIANT: i64 = 2;

/// Prices of this customer group are the product's list price.
const DEFAULT_PRICE_GROUP: &str = "EK";

const BLOCKLIST: &[&str] = &[
    "articleID",
    "articledetailsID",
    "kind",
    "additionaltext",
    "sales",
    "stockmin",
    "position",
    "shippingtime",
    "unitID",
    "configurator_set_id",
    "main_detail_id",
    "pricegroupID",
    "pricegroupActive",
    "filtergroupID",
    "notification",
    "template",
    "mode",
    "changetime",
    "datum",
    "crossbundlelook",
    "available_from",
    "available_to",
    "supplierID",
    "taxID",
];

const DETAIL_BLOCKLIST: &[&str] = &[
    "id",
    "supplierID",
    "taxID",
    "datum",
    "changetime",
    "pseudosales",
    "topseller",
    "pricegroupID",
    "pricegroupActive",
    "filtergroupID",
    "laststock",
    "crossbundlelook",
    "notification",
    "template",
    "mode",
    "main_detail_id",
    "available_from",
    "available_to",
    "configurator_set_id",
    "active",
];

pub struct ProductConverter;

#[async_trait]
impl Converter for ProductConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        entities::PRODUCT
    }

    async fn convert(
        &self,
        mut data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError> {
        let connection_id = ctx.connection_id();
        let (Some(order_number), Some(article_id)) =
            (field_str(&data, "ordernumber"), field_str(&data, "articleID"))
        else {
            let missing: Vec<&str> = ["ordernumber", "articleID"]
                .into_iter()
                .filter(|field| field_str(&data, field).is_none())
                .collect();
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyNecessaryDataFields,
                "Empty necessary data fields",
                format!(
                    "Product-Entity could not be converted cause of empty necessary field(s): {}.",
                    missing.join(", ")
                ),
                json!({ "id": data.get("id"), "entity": entities::PRODUCT, "fields": missing }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        let Some(locale) = field_str(&data, "_locale") else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyLocale,
                "Empty locale",
                "Product-Entity could not be converted cause of empty locale.",
                json!({ "id": data.get("id"), "ordernumber": order_number }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };
        data.remove("_locale");

        let kind = field_i64(&data, "kind").unwrap_or(KIND_MAIN);

        let mut converted = TargetRecord::new();
        if kind == KIND_VARIANT {
            let parent = services
                .mapping
                .resolve_uuid(connection_id, entities::PRODUCT_MAIN, &article_id)
                .await?
                .ok_or_else(|| MigrationError::ParentEntityForChildNotFound {
                    entity: entities::PRODUCT,
                    old_id: order_number.clone(),
                })?;
            converted.insert("parentId".into(), uuid_value(parent));
        }

        let id = services
            .mapping
            .create_uuid(connection_id, entities::PRODUCT, &order_number)
            .await?;
        converted.insert("id".into(), uuid_value(id));
        if kind == KIND_MAIN {
            services
                .mapping
                .create_uuid_with(connection_id, entities::PRODUCT_MAIN, &article_id, None, Some(id))
                .await?;
        }
        data.remove("id");

        convert_value(&mut converted, "productNumber", &mut data, "ordernumber", FieldType::String);
        convert_value(&mut converted, "active", &mut data, "active", FieldType::Bool);
        convert_value(&mut converted, "stock", &mut data, "instock", FieldType::Int);
        convert_value(&mut converted, "isCloseout", &mut data, "laststock", FieldType::Bool);
        convert_value(&mut converted, "weight", &mut data, "weight", FieldType::Float);
        convert_value(&mut converted, "width", &mut data, "width", FieldType::Float);
        convert_value(&mut converted, "height", &mut data, "height", FieldType::Float);
        convert_value(&mut converted, "length", &mut data, "length", FieldType::Float);
        convert_value(&mut converted, "ean", &mut data, "ean", FieldType::String);
        convert_value(&mut converted, "purchaseUnit", &mut data, "purchaseunit", FieldType::Float);
        convert_value(&mut converted, "referenceUnit", &mut data, "referenceunit", FieldType::Float);
        convert_value(&mut converted, "packUnit", &mut data.clone(), "packunit", FieldType::String);
        convert_value(&mut converted, "shippingFree", &mut data, "shippingfree", FieldType::Bool);
        convert_value(&mut converted, "minPurchase", &mut data, "minpurchase", FieldType::Int);
        convert_value(&mut converted, "purchaseSteps", &mut data, "purchasesteps", FieldType::Int);
        convert_value(&mut converted, "maxPurchase", &mut data, "maxpurchase", FieldType::Int);
        convert_value(&mut converted, "manufacturerNumber", &mut data, "suppliernumber", FieldType::String);
        convert_value(&mut converted, "releaseDate", &mut data, "releasedate", FieldType::DateTime);

        let mut tax_rate = None;
        if let Some(tax) = take_object(&mut data, "tax") {
            tax_rate = field_f64(&tax, "tax");
            let tax = convert_tax(tax, ctx, services).await?;
            converted.insert("tax".into(), Value::Object(tax));
        }

        if let Some(manufacturer) = take_object(&mut data, "manufacturer") {
            let manufacturer = convert_manufacturer(manufacturer, &locale, ctx, services).await?;
            converted.insert("manufacturer".into(), Value::Object(manufacturer));
        }

        if let Some(Value::Array(prices)) = data.remove("prices") {
            if let Some(price) = list_price(&prices, tax_rate, ctx) {
                converted.insert("price".into(), json!([price]));
            }
        }

        if let Some(Value::Array(categories)) = data.remove("categories") {
            let mut assigned = Vec::new();
            for category in categories.iter().filter_map(Value::as_object) {
                let Some(old_id) = field_str(category, "id") else {
                    continue;
                };
                if let Some(uuid) = services
                    .mapping
                    .resolve_uuid(connection_id, entities::CATEGORY, &old_id)
                    .await?
                {
                    assigned.push(json!({ "id": uuid.to_string() }));
                }
            }
            if !assigned.is_empty() {
                converted.insert("categories".into(), Value::Array(assigned));
            }
        }

        if let Some(Value::Array(assets)) = data.remove("assets") {
            let media = convert_assets(assets, id, &locale, ctx, services).await?;
            if let Some(cover) = media.iter().find(|m| m.cover).map(|m| m.id) {
                converted.insert("coverId".into(), uuid_value(cover));
            }
            if !media.is_empty() {
                converted.insert(
                    "media".into(),
                    Value::Array(media.into_iter().map(|m| Value::Object(m.record)).collect()),
                );
            }
        }

        if let Some(mut detail) = take_object(&mut data, "detail") {
            if !is_default_locale(ctx, services, &locale).await? {
                add_locale_translation(&mut converted, id, &order_number, &locale, &detail, &data, ctx, services)
                    .await?;
            }
            convert_value(&mut converted, "name", &mut detail, "name", FieldType::String);
            convert_value(&mut converted, "description", &mut detail, "description_long", FieldType::String);
            convert_value(&mut converted, "metaTitle", &mut detail, "metaTitle", FieldType::String);
            convert_value(&mut converted, "keywords", &mut detail, "keywords", FieldType::String);
            convert_value(&mut converted, "markAsTopseller", &mut detail, "topseller", FieldType::Bool);
            remove_keys(&mut detail, DETAIL_BLOCKLIST);
            remove_keys(&mut detail, &["description"]);
            if !detail.is_empty() {
                data.insert("detail".into(), Value::Object(detail));
            }
        }
        data.remove("packunit");

        if let Some(attributes) = take_object(&mut data, "attributes") {
            let fields = custom_fields(
                entities::PRODUCT,
                &attributes,
                &["id", "articleID", "articledetailsID"],
            );
            converted.insert("customFields".into(), Value::Object(fields));
        }

        remove_keys(&mut data, BLOCKLIST);

        Ok(ConvertStruct::new(converted, data))
    }
}

// ---------------------------------------------------------------------------
// Associations
// ---------------------------------------------------------------------------

/// Existing tax with the same rate, or an inline tax record.
async fn convert_tax(
    mut data: RawRecord,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<TargetRecord, MigrationError> {
    let connection_id = ctx.connection_id();
    let old_id = field_str(&data, "id").unwrap_or_default();
    let rate = field_f64(&data, "tax").unwrap_or(0.0);

    let id = match services.mapping.tax_uuid(connection_id, rate).await? {
        Some(id) => id,
        None => {
            services
                .mapping
                .create_uuid(connection_id, entities::TAX, &old_id)
                .await?
        }
    };

    let mut tax = TargetRecord::new();
    tax.insert("id".into(), uuid_value(id));
    convert_value(&mut tax, "taxRate", &mut data, "tax", FieldType::Float);
    convert_value(&mut tax, "name", &mut data, "description", FieldType::String);
    Ok(tax)
}

async fn convert_manufacturer(
    mut data: RawRecord,
    locale: &str,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<TargetRecord, MigrationError> {
    let connection_id = ctx.connection_id();
    let old_id = field_str(&data, "id").unwrap_or_default();
    let id = services
        .mapping
        .create_uuid(connection_id, entities::PRODUCT_MANUFACTURER, &old_id)
        .await?;

    let mut manufacturer = TargetRecord::new();
    manufacturer.insert("id".into(), uuid_value(id));

    if !is_default_locale(ctx, services, locale).await? {
        if let Some(language_id) = services.mapping.language_uuid(connection_id, locale).await? {
            let mut translation = TargetRecord::new();
            translation.insert("productManufacturerId".into(), uuid_value(id));
            convert_value(&mut translation, "name", &mut data.clone(), "name", FieldType::String);
            convert_value(&mut translation, "description", &mut data.clone(), "description", FieldType::String);
            let translation_id = services
                .mapping
                .create_uuid(
                    connection_id,
                    entities::PRODUCT_MANUFACTURER_TRANSLATION,
                    &format!("{old_id}:{locale}"),
                )
                .await?;
            translation.insert("id".into(), uuid_value(translation_id));
            translation.insert("languageId".into(), uuid_value(language_id));
            add_translation(&mut manufacturer, language_id, translation);
        }
    }

    convert_value(&mut manufacturer, "link", &mut data, "link", FieldType::String);
    convert_value(&mut manufacturer, "name", &mut data, "name", FieldType::String);
    convert_value(&mut manufacturer, "description", &mut data, "description", FieldType::String);

    if let Some(asset) = take_object(&mut data, "media") {
        let media = convert_media_asset(asset, locale, ctx, services).await?;
        manufacturer.insert("media".into(), Value::Object(media));
    }

    Ok(manufacturer)
}

/// Gross/net list price from the default customer group's base scale.
/// Legacy prices are stored net.
fn list_price(prices: &[Value], tax_rate: Option<f64>, ctx: &MigrationContext) -> Option<Value> {
    let rows: Vec<&RawRecord> = prices.iter().filter_map(Value::as_object).collect();
    let base = rows
        .iter()
        .find(|p| {
            field_str(p, "customergroup").as_deref() == Some(DEFAULT_PRICE_GROUP)
                && field_i64(p, "from").unwrap_or(1) == 1
        })
        .or_else(|| rows.first())?;

    let net = field_f64(base, "price")?;
    let rate = tax_rate.unwrap_or(0.0);
    let gross = round(net * (1.0 + rate / 100.0), ctx.target.currency_precision);
    Some(json!({
        "currencyId": ctx.target.currency_id.to_string(),
        "net": net,
        "gross": gross,
        "linked": true,
    }))
}

struct ProductMedia {
    id: Uuid,
    cover: bool,
    record: TargetRecord,
}

async fn convert_assets(
    assets: Vec<Value>,
    product_id: Uuid,
    locale: &str,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<Vec<ProductMedia>, MigrationError> {
    let connection_id = ctx.connection_id();
    let mut converted = Vec::with_capacity(assets.len());

    for mut asset in assets.into_iter().filter_map(|a| match a {
        Value::Object(o) => Some(o),
        _ => None,
    }) {
        let Some(media) = take_object(&mut asset, "media") else {
            continue;
        };
        let old_id = field_str(&asset, "id").unwrap_or_default();
        let id = services
            .mapping
            .create_uuid(connection_id, entities::PRODUCT_MEDIA, &old_id)
            .await?;

        let mut record = TargetRecord::new();
        record.insert("id".into(), uuid_value(id));
        record.insert("productId".into(), uuid_value(product_id));
        convert_value(&mut record, "position", &mut asset, "position", FieldType::Int);
        let media = convert_media_asset(media, locale, ctx, services).await?;
        record.insert("media".into(), Value::Object(media));

        converted.push(ProductMedia {
            id,
            cover: field_i64(&asset, "main").unwrap_or(0) == 1,
            record,
        });
    }

    Ok(converted)
}

#[allow(clippy::too_many_arguments)]
async fn add_locale_translation(
    converted: &mut TargetRecord,
    product_id: Uuid,
    order_number: &str,
    locale: &str,
    detail: &RawRecord,
    data: &RawRecord,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<(), MigrationError> {
    let connection_id = ctx.connection_id();
    let Some(language_id) = services.mapping.language_uuid(connection_id, locale).await? else {
        return Ok(());
    };

    let mut translation = TargetRecord::new();
    translation.insert("productId".into(), uuid_value(product_id));
    let mut detail = detail.clone();
    convert_value(&mut translation, "name", &mut detail, "name", FieldType::String);
    convert_value(&mut translation, "description", &mut detail, "description_long", FieldType::String);
    convert_value(&mut translation, "metaTitle", &mut detail, "metaTitle", FieldType::String);
    convert_value(&mut translation, "keywords", &mut detail, "keywords", FieldType::String);
    convert_value(&mut translation, "packUnit", &mut data.clone(), "packunit", FieldType::String);

    let translation_id = services
        .mapping
        .create_uuid(
            connection_id,
            entities::PRODUCT_TRANSLATION,
            &format!("{order_number}:{locale}"),
        )
        .await?;
    translation.insert("id".into(), uuid_value(translation_id));
    translation.insert("languageId".into(), uuid_value(language_id));
    add_translation(converted, language_id, translation);
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;
    use crate::convert::test_support::{fixture, record};
    use crate::data_selection;
    use crate::mapping::{MappingStore, NewMapping};

    fn main_product() -> RawRecord {
        record(json!({
            "id": "3",
            "articleID": "2",
            "ordernumber": "SW10002.3",
            "kind": "1",
            "active": "1",
            "instock": "25",
            "laststock": "0",
            "weight": "0.5",
            "packunit": "Flasche",
            "_locale": "de-DE",
            "tax": {"id": "1", "tax": "19.00", "description": "19%"},
            "manufacturer": {"id": "2", "name": "Feinbrennerei Sasse", "link": "http://www.sassekorn.de"},
            "prices": [
                {"customergroup": "H", "from": "1", "price": "10"},
                {"customergroup": "EK", "from": "1", "price": "12.6050420168"},
            ],
            "categories": [{"id": "14"}, {"id": "404"}],
            "assets": [
                {"id": "5", "main": "1", "position": "1", "media": {"id": "20", "name": "bottle", "uri": "https://shop/media/bottle.png", "file_size": "100"}},
            ],
            "detail": {"id": "2", "name": "Münsterländer Lagerkorn", "description_long": "<p>Korn</p>", "taxID": "1"},
            "attributes": {"id": "3", "articleID": "2", "articledetailsID": "3", "attr1": "x"},
        }))
    }

    // -- conversion ----------------------------------------------------------

    #[tokio::test]
    async fn converts_main_product() {
        let mut fx = fixture(data_selection::PRODUCT).await;
        let tax = fx.reference.add_tax(19.0).await;
        let category = Uuid::new_v4();
        fx.store
            .insert(&[NewMapping::identity(fx.ctx.connection_id(), "category", "14", category)])
            .await
            .unwrap();

        let result = ProductConverter
            .convert(main_product(), &fx.ctx, &mut fx.services)
            .await
            .unwrap();
        let converted = result.converted.unwrap();

        assert_eq!(converted["productNumber"], json!("SW10002.3"));
        assert_eq!(converted["stock"], json!(25));
        assert_eq!(converted["packUnit"], json!("Flasche"));
        assert_eq!(converted["name"], json!("Münsterländer Lagerkorn"));
        assert_eq!(converted["tax"]["id"], json!(tax.to_string()));
        assert_eq!(converted["manufacturer"]["name"], json!("Feinbrennerei Sasse"));
        assert_eq!(converted["price"][0]["gross"], json!(15.0));
        assert_eq!(converted["categories"], json!([{"id": category.to_string()}]));
        assert_eq!(converted["coverId"], converted["media"][0]["id"]);
        assert_eq!(converted["customFields"], json!({"product_attr1": "x"}));
        assert_eq!(fx.services.media_files.pending().len(), 1);
        assert!(result.unmapped.is_none());
    }

    #[tokio::test]
    async fn variant_points_at_main_product() {
        let mut fx = fixture(data_selection::PRODUCT).await;

        let main = ProductConverter
            .convert(main_product(), &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();

        let variant = ProductConverter
            .convert(
                record(json!({"id": "4", "articleID": "2", "ordernumber": "SW10002.4", "kind": "2", "_locale": "de-DE"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap()
            .converted
            .unwrap();

        assert_eq!(variant["parentId"], main["id"]);
        assert_ne!(variant["id"], main["id"]);
    }

    #[tokio::test]
    async fn foreign_locale_adds_translation() {
        let mut fx = fixture(data_selection::PRODUCT).await;
        let english = fx.reference.add_language("English", "en-GB").await;
        let mut data = main_product();
        data.insert("_locale".into(), json!("en-GB"));

        let converted = ProductConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();

        let translation = &converted["translations"][english.id.to_string()];
        assert_eq!(translation["name"], json!("Münsterländer Lagerkorn"));
        assert_eq!(translation["packUnit"], json!("Flasche"));
    }

    // -- failures ------------------------------------------------------------

    #[tokio::test]
    async fn variant_without_main_product_is_structural_error() {
        let mut fx = fixture(data_selection::PRODUCT).await;
        let err = ProductConverter
            .convert(
                record(json!({"id": "9", "articleID": "77", "ordernumber": "SW77.1", "kind": "2", "_locale": "de-DE"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap_err();

        assert_matches!(err, MigrationError::ParentEntityForChildNotFound { ref old_id, .. } if old_id == "SW77.1");
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn missing_order_number_is_rejected_without_mapping() {
        let mut fx = fixture(data_selection::PRODUCT).await;
        let result = ProductConverter
            .convert(
                record(json!({"id": "9", "articleID": "77", "_locale": "de-DE"})),
                &fx.ctx,
                &mut fx.services,
            )
            .await
            .unwrap();

        assert!(result.converted.is_none());
        let entry = &fx.services.logger.entries()[0];
        assert_eq!(entry.log_type, "SHOPWARE_55_EMPTY_NECESSARY_DATA_FIELDS");
        assert_eq!(entry.details["fields"], json!(["ordernumber"]));
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }
}
