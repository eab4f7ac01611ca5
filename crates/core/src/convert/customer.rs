use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    convert_value, custom_fields, empty_required_fields, field_str, object, remove_keys,
    take_object, uuid_value, ConvertStruct, Converter, FieldType,
};
use crate::context::MigrationContext;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::logging::LogType;
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

const REQUIRED_FIELDS: &[&str] = &["id", "email", "firstname", "lastname"];

const REQUIRED_ADDRESS_FIELDS: &[&str] = &["firstname", "lastname", "zipcode", "city", "street"];

const BLOCKLIST: &[&str] = &[
    "validation",
    "lockeduntil",
    "failedlogins",
    "paymentpreset",
    "language",
    "referer",
    "internalcomment",
    "changed",
    "sessionID",
    "pricegroupID",
    "doubleOptinRegister",
    "doubleOptinEmailSentDate",
    "doubleOptinConfirmDate",
    "login_token",
    "group",
    "_locale",
];

pub struct CustomerConverter;

#[async_trait]
impl Converter for CustomerConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        entities::CUSTOMER
    }

    async fn convert(
        &self,
        mut data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError> {
        let connection_id = ctx.connection_id();
        let old_id = field_str(&data, "id").unwrap_or_default();

        let missing = empty_required_fields(&data, REQUIRED_FIELDS);
        if !missing.is_empty() {
            services.logger.add_warning(
                ctx.run_id,
                LogType::EmptyNecessaryDataFields,
                "Empty necessary data fields",
                format!(
                    "Customer-Entity could not be converted cause of empty necessary field(s): {}.",
                    missing.join(", ")
                ),
                json!({ "id": old_id, "entity": entities::CUSTOMER, "fields": missing }),
                missing.len() as u32,
            );
            return Ok(ConvertStruct::not_converted(data));
        }

        let salutation = field_str(&data, "salutation").unwrap_or_default();
        let Some(salutation_id) = services
            .mapping
            .resolve_uuid(connection_id, entities::SALUTATION, &salutation)
            .await?
        else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::UnknownCustomerSalutation,
                "Cannot find customer salutation",
                "Customer-Entity could not be converted cause of unknown salutation",
                json!({ "id": old_id, "entity": entities::CUSTOMER, "salutation": salutation }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        let group_id = match object(&data, "group").and_then(|g| field_str(g, "id")) {
            Some(group) => {
                services
                    .mapping
                    .resolve_uuid(connection_id, entities::CUSTOMER_GROUP, &group)
                    .await?
            }
            None => None,
        };
        let Some(group_id) = group_id else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::AssociationRequiredMissing,
                "Cannot find customer group",
                "Customer-Entity could not be converted cause of unknown customer group",
                json!({
                    "id": old_id,
                    "entity": entities::CUSTOMER,
                    "customerGroup": data.get("customergroup"),
                }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        let payment = object(&data, "defaultpayment")
            .and_then(|p| field_str(p, "id"))
            .or_else(|| field_str(&data, "paymentID"))
            .unwrap_or_default();
        let Some(payment_method_id) = services
            .mapping
            .resolve_uuid(connection_id, entities::PAYMENT_METHOD, &payment)
            .await?
        else {
            services.logger.add_warning(
                ctx.run_id,
                LogType::UnknownPaymentMethod,
                "Cannot find payment method",
                "Customer-Entity could not be converted cause of unknown payment method",
                json!({ "id": old_id, "entity": entities::CUSTOMER, "paymentMethod": payment }),
                1,
            );
            return Ok(ConvertStruct::not_converted(data));
        };

        let original = data.clone();
        let mut converted = TargetRecord::new();
        let id = services
            .mapping
            .create_uuid(connection_id, entities::CUSTOMER, &old_id)
            .await?;
        converted.insert("id".into(), uuid_value(id));
        data.remove("id");

        // Orders reference customers by email as well as by id.
        if let Some(email) = field_str(&data, "email") {
            services
                .mapping
                .create_uuid_with(connection_id, entities::CUSTOMER, &email, None, Some(id))
                .await?;
        }

        converted.insert("groupId".into(), uuid_value(group_id));
        converted.insert("defaultPaymentMethodId".into(), uuid_value(payment_method_id));
        converted.insert("salutationId".into(), uuid_value(salutation_id));
        remove_keys(&mut data, &["customergroup", "defaultpayment", "paymentID", "salutation"]);

        let mut sales_channel_id = ctx.target.sales_channel_id;
        if let Some(shop) = field_str(&data, "subshopID") {
            if let Some(mapped) = services
                .mapping
                .resolve_uuid(connection_id, entities::SALES_CHANNEL, &shop)
                .await?
            {
                sales_channel_id = mapped;
            }
        }
        converted.insert("salesChannelId".into(), uuid_value(sales_channel_id));
        data.remove("subshopID");

        convert_value(&mut converted, "active", &mut data, "active", FieldType::Bool);
        convert_value(&mut converted, "email", &mut data, "email", FieldType::String);
        convert_value(&mut converted, "guest", &mut data, "accountmode", FieldType::Bool);
        convert_value(&mut converted, "firstLogin", &mut data, "firstlogin", FieldType::DateTime);
        convert_value(&mut converted, "lastLogin", &mut data, "lastlogin", FieldType::DateTime);
        convert_value(&mut converted, "newsletter", &mut data, "newsletter", FieldType::Bool);
        convert_value(&mut converted, "affiliate", &mut data, "affiliate", FieldType::Bool);
        convert_value(&mut converted, "title", &mut data, "title", FieldType::String);
        convert_value(&mut converted, "firstName", &mut data, "firstname", FieldType::String);
        convert_value(&mut converted, "lastName", &mut data, "lastname", FieldType::String);
        convert_value(&mut converted, "birthday", &mut data, "birthday", FieldType::DateTime);
        convert_value(&mut converted, "legacyPassword", &mut data, "password", FieldType::String);
        convert_value(&mut converted, "legacyEncoder", &mut data, "encoder", FieldType::String);

        let customer_number = field_str(&data, "customernumber").unwrap_or_else(|| old_id.clone());
        converted.insert("customerNumber".into(), json!(customer_number));
        data.remove("customernumber");

        if let Some(Value::Array(addresses)) = data.remove("addresses") {
            let default_billing = field_str(&data, "default_billing_address_id");
            let default_shipping = field_str(&data, "default_shipping_address_id");
            let mut converted_addresses = Vec::new();
            let mut billing_id = None;
            let mut shipping_id = None;

            for address in addresses.into_iter().filter_map(|a| match a {
                Value::Object(o) => Some(o),
                _ => None,
            }) {
                let address_old_id = field_str(&address, "id");
                let Some(record) =
                    convert_address(address, id, salutation_id, &old_id, ctx, services).await?
                else {
                    continue;
                };
                let address_id = record
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                if address_old_id.is_some() && address_old_id == default_billing {
                    billing_id = address_id;
                }
                if address_old_id.is_some() && address_old_id == default_shipping {
                    shipping_id = address_id;
                }
                converted_addresses.push(record);
            }

            if converted_addresses.is_empty() {
                services.logger.add_warning(
                    ctx.run_id,
                    LogType::EmptyNecessaryDataFields,
                    "Empty necessary data fields",
                    "Customer-Entity could not be converted cause of empty necessary field(s): addresses.",
                    json!({ "id": old_id, "entity": entities::CUSTOMER, "fields": ["addresses"] }),
                    1,
                );
                return Ok(ConvertStruct::not_converted(original));
            }

            let first = converted_addresses
                .first()
                .and_then(|a| a.get("id"))
                .cloned()
                .unwrap_or(Value::Null);
            let billing = billing_id.map(uuid_value).unwrap_or_else(|| first.clone());
            let shipping = shipping_id.map(uuid_value).unwrap_or_else(|| billing.clone());
            converted.insert("defaultBillingAddressId".into(), billing);
            converted.insert("defaultShippingAddressId".into(), shipping);
            converted.insert(
                "addresses".into(),
                Value::Array(converted_addresses.into_iter().map(Value::Object).collect()),
            );
        }
        remove_keys(
            &mut data,
            &["default_billing_address_id", "default_shipping_address_id"],
        );

        if let Some(attributes) = take_object(&mut data, "attributes") {
            let fields = custom_fields(entities::CUSTOMER, &attributes, &["id", "userID"]);
            converted.insert("customFields".into(), Value::Object(fields));
        }

        remove_keys(&mut data, BLOCKLIST);

        Ok(ConvertStruct::new(converted, data))
    }
}

/// Convert one customer address. Addresses with empty required fields or an
/// unresolvable country are logged and skipped.
async fn convert_address(
    mut data: RawRecord,
    customer_id: Uuid,
    customer_salutation: Uuid,
    customer_old_id: &str,
    ctx: &MigrationContext,
    services: &mut RunServices,
) -> Result<Option<TargetRecord>, MigrationError> {
    let connection_id = ctx.connection_id();
    let old_id = field_str(&data, "id").unwrap_or_default();

    let missing = empty_required_fields(&data, REQUIRED_ADDRESS_FIELDS);
    if !missing.is_empty() {
        services.logger.add_info(
            ctx.run_id,
            LogType::EmptyNecessaryDataFields,
            "Empty necessary data fields for address",
            format!(
                "Address-Entity could not be converted cause of empty necessary field(s): {}.",
                missing.join(", ")
            ),
            json!({
                "id": old_id,
                "customerId": customer_old_id,
                "entity": entities::CUSTOMER_ADDRESS,
                "fields": missing,
            }),
        );
        return Ok(None);
    }

    let mut country_id = match field_str(&data, "countryID") {
        Some(country) => {
            services
                .mapping
                .resolve_uuid(connection_id, entities::COUNTRY, &country)
                .await?
        }
        None => None,
    };
    if country_id.is_none() {
        if let Some(country) = object(&data, "country") {
            if let (Some(country_old_id), Some(iso), Some(iso3)) = (
                field_str(country, "id"),
                field_str(country, "countryiso"),
                field_str(country, "iso3"),
            ) {
                country_id = services
                    .mapping
                    .country_uuid(connection_id, &country_old_id, &iso, &iso3)
                    .await?;
            }
        }
    }
    let Some(country_id) = country_id else {
        services.logger.add_info(
            ctx.run_id,
            LogType::AssociationRequiredMissing,
            "Cannot find country for address",
            "Address-Entity could not be converted cause of unknown country",
            json!({
                "id": old_id,
                "customerId": customer_old_id,
                "entity": entities::CUSTOMER_ADDRESS,
                "countryID": data.get("countryID"),
            }),
        );
        return Ok(None);
    };

    let salutation_id = match field_str(&data, "salutation") {
        Some(salutation) => services
            .mapping
            .resolve_uuid(connection_id, entities::SALUTATION, &salutation)
            .await?
            .unwrap_or(customer_salutation),
        None => customer_salutation,
    };

    let mut address = TargetRecord::new();
    let id = services
        .mapping
        .create_uuid(connection_id, entities::CUSTOMER_ADDRESS, &old_id)
        .await?;
    address.insert("id".into(), uuid_value(id));
    address.insert("customerId".into(), uuid_value(customer_id));
    address.insert("countryId".into(), uuid_value(country_id));
    address.insert("salutationId".into(), uuid_value(salutation_id));

    if let Some(state) = field_str(&data, "stateID") {
        if let Some(state_id) = services
            .mapping
            .resolve_uuid(connection_id, entities::COUNTRY_STATE, &state)
            .await?
        {
            address.insert("countryStateId".into(), uuid_value(state_id));
        }
    }

    for (target, source) in [
        ("firstName", "firstname"),
        ("lastName", "lastname"),
        ("zipcode", "zipcode"),
        ("city", "city"),
        ("company", "company"),
        ("street", "street"),
        ("department", "department"),
        ("title", "title"),
        ("vatId", "ustid"),
        ("phoneNumber", "phone"),
        ("additionalAddressLine1", "additional_address_line1"),
        ("additionalAddressLine2", "additional_address_line2"),
    ] {
        convert_value(&mut address, target, &mut data, source, FieldType::String);
    }

    Ok(Some(address))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::convert::test_support::{fixture, record, Fixture};
    use crate::data_selection;
    use crate::mapping::{MappingStore, NewMapping};

    async fn premap(fx: &Fixture) -> Uuid {
        let conn = fx.ctx.connection_id();
        let group = Uuid::new_v4();
        fx.store
            .insert(&[
                NewMapping::identity(conn, "customer_group", "1", group),
                NewMapping::identity(conn, "salutation", "mr", Uuid::new_v4()),
                NewMapping::identity(conn, "payment_method", "5", Uuid::new_v4()),
                NewMapping::identity(conn, "country", "2", Uuid::new_v4()),
            ])
            .await
            .unwrap();
        group
    }

    fn customer() -> RawRecord {
        record(json!({
            "id": "1",
            "email": "max@example.com",
            "firstname": "Max",
            "lastname": "Mustermann",
            "salutation": "mr",
            "active": "1",
            "accountmode": "0",
            "customernumber": "20001",
            "customergroup": "EK",
            "group": {"id": "1", "groupkey": "EK"},
            "defaultpayment": {"id": "5"},
            "paymentID": "5",
            "password": "a256a310bc1e5db755fd392c524028a8",
            "encoder": "md5",
            "default_billing_address_id": "1",
            "default_shipping_address_id": "2",
            "addresses": [
                {"id": "1", "firstname": "Max", "lastname": "Mustermann", "zipcode": "48624", "city": "Schöppingen", "street": "Musterstr. 1", "countryID": "2"},
                {"id": "2", "firstname": "Max", "lastname": "Mustermann", "zipcode": "10115", "city": "Berlin", "street": "Hauptstr. 5", "countryID": "2"},
                {"id": "3", "firstname": "", "lastname": "Mustermann", "countryID": "2"},
            ],
            "attributes": {"id": "1", "userID": "1", "loyalty": "gold"},
            "_locale": "de-DE",
        }))
    }

    // -- conversion ----------------------------------------------------------

    #[tokio::test]
    async fn converts_customer_with_addresses() {
        let mut fx = fixture(data_selection::CUSTOMER).await;
        let group = premap(&fx).await;

        let result = CustomerConverter
            .convert(customer(), &fx.ctx, &mut fx.services)
            .await
            .unwrap();
        let converted = result.converted.unwrap();

        assert_eq!(converted["groupId"], json!(group.to_string()));
        assert_eq!(converted["customerNumber"], json!("20001"));
        assert_eq!(converted["guest"], json!(false));
        assert_eq!(converted["legacyEncoder"], json!("md5"));
        assert_eq!(converted["customFields"], json!({"customer_loyalty": "gold"}));

        let addresses = converted["addresses"].as_array().unwrap();
        assert_eq!(addresses.len(), 2);
        assert_eq!(converted["defaultBillingAddressId"], addresses[0]["id"]);
        assert_eq!(converted["defaultShippingAddressId"], addresses[1]["id"]);
        assert!(result.unmapped.is_none());
    }

    #[tokio::test]
    async fn email_resolves_to_customer_id() {
        let mut fx = fixture(data_selection::CUSTOMER).await;
        premap(&fx).await;
        let conn = fx.ctx.connection_id();

        let converted = CustomerConverter
            .convert(customer(), &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();
        fx.services.mapping.flush().await.unwrap();

        let by_email = fx
            .services
            .mapping
            .resolve_uuid(conn, "customer", "max@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(json!(by_email.to_string()), converted["id"]);
    }

    #[tokio::test]
    async fn skipped_address_is_logged() {
        let mut fx = fixture(data_selection::CUSTOMER).await;
        premap(&fx).await;

        CustomerConverter
            .convert(customer(), &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        let entry = &fx.services.logger.entries()[0];
        assert_eq!(entry.log_type, "SHOPWARE_55_EMPTY_NECESSARY_DATA_FIELDS");
        assert_eq!(entry.details["id"], json!("3"));
    }

    // -- failures ------------------------------------------------------------

    #[tokio::test]
    async fn missing_email_is_a_warning() {
        let mut fx = fixture(data_selection::CUSTOMER).await;
        let mut data = customer();
        data.remove("email");

        let result = CustomerConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(fx.services.logger.entries()[0].details["fields"], json!(["email"]));
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn unknown_group_allocates_nothing() {
        let mut fx = fixture(data_selection::CUSTOMER).await;
        premap(&fx).await;
        let mut data = customer();
        data.insert("group".into(), json!({"id": "99"}));

        let result = CustomerConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(
            fx.services.logger.entries()[0].log_type,
            "SHOPWARE_55_ASSOCIATION_REQUIRED_MISSING"
        );
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn no_usable_address_is_not_converted() {
        let mut fx = fixture(data_selection::CUSTOMER).await;
        premap(&fx).await;
        let mut data = customer();
        data.insert("addresses".into(), json!([{"id": "9", "firstname": "Max"}]));

        let result = CustomerConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(result.unmapped.unwrap()["id"], json!("1"));
    }
}
