use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{
    add_translation, convert_value, custom_fields, empty_required_fields, field_bool, field_f64,
    field_i64, field_str, is_default_locale, is_filled, object, remove_keys, take_object,
    uuid_value, ConvertStruct, Converter, FieldType,
};
use crate::context::MigrationContext;
use crate::data_selection::SHOPWARE55_PROFILE;
use crate::entities;
use crate::error::MigrationError;
use crate::logging::LogType;
use crate::price::{
    calculate_taxes, round, tax_rules_from_rates, CalculatedPrice, CalculatedTax, CartPrice,
    QuantityPriceDefinition, TaxRule, TaxState,
};
use crate::services::RunServices;
use crate::types::{RawRecord, TargetRecord};

const REQUIRED_FIELDS: &[&str] = &[
    "id",
    "customer",
    "currency",
    "currencyFactor",
    "payment",
    "paymentcurrency",
    "status",
];

const REQUIRED_ADDRESS_FIELDS: &[&str] = &[
    "firstname",
    "lastname",
    "zipcode",
    "city",
    "street",
    "salutation",
];

/// Legacy fields with no target equivalent.
const BLOCKLIST: &[&str] = &[
    "invoice_shipping_tax_rate",
    "transactionID",
    "comment",
    "customercomment",
    "internalcomment",
    "partnerID",
    "temporaryID",
    "referer",
    "cleareddate",
    "remote_addr",
    "deviceType",
    "is_proportional_calculation",
    "changed",
    "payment",
    "paymentID",
    "language",
    "documents",
];

const LINE_ITEM_TYPE_PRODUCT: &str = "product";
const LINE_ITEM_TYPE_DISCOUNT_SURCHARGE: &str = "discount_surcharge";
const DEFAULT_DELIVERY_TIME: &str = "default_delivery_time";

pub struct OrderConverter;

#[async_trait]
impl Converter for OrderConverter {
    fn supported_profile(&self) -> &'static str {
        SHOPWARE55_PROFILE
    }

    fn supported_entity(&self) -> &'static str {
        entities::ORDER
    }

    async fn convert(
        &self,
        mut data: RawRecord,
        ctx: &MigrationContext,
        services: &mut RunServices,
    ) -> Result<ConvertStruct, MigrationError> {
        let old_id = field_str(&data, "id").unwrap_or_default();

        let mut missing = empty_required_fields(&data, REQUIRED_FIELDS);
        if !object(&data, "billingaddress").is_some_and(|a| is_filled(a.get("id"))) {
            missing.push("billingaddress".into());
        }
        if object(&data, "payment").is_some_and(|p| !is_filled(p.get("name"))) {
            missing.push("paymentMethod".into());
        }
        if !missing.is_empty() {
            log_empty_fields(services, ctx, &old_id, missing);
            return Ok(ConvertStruct::not_converted(data));
        }

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
        let foreign_locale = !is_default_locale(ctx, services, &locale).await?;
        let original = data.clone();
        data.remove("_locale");

        let mut scope = OrderScope {
            ctx,
            services,
            connection_id: ctx.connection_id(),
            old_id,
            locale,
            foreign_locale,
        };

        // Everything that can reject the order is resolved before the first
        // uuid is allocated.
        let customer = object(&data, "customer").cloned().unwrap_or_default();
        let Some(customer_id) = scope.resolve_customer(&customer, &data).await? else {
            scope.services.logger.add_warning(
                ctx.run_id,
                LogType::AssociationRequiredMissing,
                "Cannot find customer",
                "Order-Entity could not converted cause of unknown customer",
                json!({
                    "id": scope.old_id,
                    "entity": entities::ORDER,
                    "email": customer.get("email"),
                    "userID": data.get("userID"),
                }),
                1,
            );
            return Ok(ConvertStruct::not_converted(original));
        };

        let salutation = field_str(&customer, "salutation").unwrap_or_default();
        let Some(salutation_id) = scope.salutation(&salutation).await? else {
            return Ok(ConvertStruct::not_converted(original));
        };

        let status = field_str(&data, "status").unwrap_or_default();
        let Some(state_id) = scope.resolve(entities::ORDER_STATE, &status).await? else {
            scope.services.logger.add_warning(
                ctx.run_id,
                LogType::UnknownOrderState,
                "Cannot find order state",
                "Order-Entity could not converted cause of unknown order state",
                json!({ "id": scope.old_id, "orderState": status }),
                1,
            );
            return Ok(ConvertStruct::not_converted(original));
        };

        let billing = object(&data, "billingaddress").cloned().unwrap_or_default();
        let Some(billing_address) = scope.address(billing).await? else {
            log_empty_fields(&mut *scope.services, ctx, &scope.old_id, vec!["billingaddress".into()]);
            return Ok(ConvertStruct::not_converted(original));
        };

        let mut converted = TargetRecord::new();
        let order_old_id = scope.old_id.clone();
        let id = scope.create(entities::ORDER, &order_old_id).await?;
        converted.insert("id".into(), uuid_value(id));
        data.remove("id");

        convert_value(&mut converted, "orderNumber", &mut data, "ordernumber", FieldType::String);

        let mut customer = customer;
        let mut order_customer = TargetRecord::new();
        order_customer.insert("customerId".into(), uuid_value(customer_id));
        order_customer.insert("salutationId".into(), uuid_value(salutation_id));
        convert_value(&mut order_customer, "email", &mut customer, "email", FieldType::String);
        convert_value(&mut order_customer, "firstName", &mut customer, "firstname", FieldType::String);
        convert_value(&mut order_customer, "lastName", &mut customer, "lastname", FieldType::String);
        convert_value(&mut order_customer, "customerNumber", &mut customer, "customernumber", FieldType::String);
        converted.insert("orderCustomer".into(), Value::Object(order_customer));
        remove_keys(&mut data, &["userID", "customer"]);

        convert_value(&mut converted, "currencyFactor", &mut data, "currencyFactor", FieldType::Float);
        if let Some(payment_currency) = take_object(&mut data, "paymentcurrency") {
            let currency = scope.currency(payment_currency).await?;
            converted.insert("currency".into(), Value::Object(currency));
        }
        data.remove("currency");

        convert_value(&mut converted, "orderDate", &mut data, "ordertime", FieldType::DateTime);
        converted.insert("stateId".into(), uuid_value(state_id));
        remove_keys(&mut data, &["status", "orderstatus"]);

        let shipping = field_f64(&data, "invoice_shipping").unwrap_or(0.0);
        let shipping_costs = CalculatedPrice {
            unit_price: shipping,
            total_price: shipping,
            calculated_taxes: Vec::new(),
            tax_rules: Vec::new(),
            quantity: 1,
        };

        let mut line_items = Vec::new();
        let mut cart_price = None;
        if let Some(Value::Array(details)) = data.get("details") {
            let details: Vec<RawRecord> = details
                .iter()
                .filter_map(|d| d.as_object().cloned())
                .collect();
            let rules = tax_rules_from_rates(details.iter().filter_map(|d| field_f64(d, "tax_rate")));
            let tax_status = TaxState::from_flags(field_bool(&data, "net"), field_bool(&data, "isTaxFree"));

            line_items = scope.line_items(details, &rules, tax_status).await?;

            let total = field_f64(&data, "invoice_amount").unwrap_or(0.0);
            let price = CartPrice {
                net_price: field_f64(&data, "invoice_amount_net").unwrap_or(0.0),
                total_price: total,
                position_price: total - shipping,
                calculated_taxes: sum_taxes(&line_items, ctx.target.currency_precision),
                tax_rules: rules,
                tax_status,
            };
            converted.insert(
                "lineItems".into(),
                Value::Array(line_items.iter().map(|li| Value::Object(li.record.clone())).collect()),
            );
            converted.insert("price".into(), to_json(&price));
            converted.insert("shippingCosts".into(), to_json(&shipping_costs));
            cart_price = Some(price);
        }
        remove_keys(
            &mut data,
            &[
                "net",
                "isTaxFree",
                "taxfree",
                "invoice_amount_net",
                "invoice_amount",
                "invoice_shipping_net",
                "invoice_shipping",
                "details",
            ],
        );

        let deliveries = scope
            .deliveries(&data, &converted, &line_items, &shipping_costs)
            .await?;
        converted.insert("deliveries".into(), Value::Array(deliveries));
        remove_keys(&mut data, &["trackingcode", "shippingMethod", "dispatchID", "shippingaddress"]);

        let transactions = match &cart_price {
            Some(price) => scope.transactions(&data, price).await?,
            None => Vec::new(),
        };
        converted.insert("transactions".into(), Value::Array(transactions));
        remove_keys(&mut data, &["cleared", "paymentstatus"]);

        if let Some(address_id) = billing_address.get("id") {
            converted.insert("billingAddressId".into(), address_id.clone());
        }
        converted.insert("addresses".into(), json!([billing_address]));
        data.remove("billingaddress");

        let mut sales_channel_id = ctx.target.sales_channel_id;
        if let Some(shop) = field_str(&data, "subshopID") {
            if let Some(mapped) = scope.resolve(entities::SALES_CHANNEL, &shop).await? {
                sales_channel_id = mapped;
                data.remove("subshopID");
            }
        }
        converted.insert("salesChannelId".into(), uuid_value(sales_channel_id));

        if let Some(attributes) = take_object(&mut data, "attributes") {
            let fields = custom_fields(entities::ORDER, &attributes, &["id", "orderID"]);
            converted.insert("customFields".into(), Value::Object(fields));
        }

        remove_keys(&mut data, BLOCKLIST);

        Ok(ConvertStruct::new(converted, data))
    }
}

// ---------------------------------------------------------------------------
// Per-order conversion state
// ---------------------------------------------------------------------------

struct OrderScope<'a> {
    ctx: &'a MigrationContext,
    services: &'a mut RunServices,
    connection_id: Uuid,
    old_id: String,
    locale: String,
    foreign_locale: bool,
}

/// A converted line item and the price needed by positions and totals.
struct LineItem {
    id: Uuid,
    record: TargetRecord,
    price: Option<CalculatedPrice>,
}

impl OrderScope<'_> {
    async fn resolve(&mut self, entity: &str, old_id: &str) -> Result<Option<Uuid>, MigrationError> {
        self.services
            .mapping
            .resolve_uuid(self.connection_id, entity, old_id)
            .await
    }

    async fn create(&mut self, entity: &str, old_id: &str) -> Result<Uuid, MigrationError> {
        self.services
            .mapping
            .create_uuid(self.connection_id, entity, old_id)
            .await
    }

    /// Customer by email first, then by legacy user id.
    async fn resolve_customer(
        &mut self,
        customer: &RawRecord,
        data: &RawRecord,
    ) -> Result<Option<Uuid>, MigrationError> {
        if let Some(email) = field_str(customer, "email") {
            if let Some(uuid) = self.resolve(entities::CUSTOMER, &email).await? {
                return Ok(Some(uuid));
            }
        }
        match field_str(data, "userID") {
            Some(user_id) => self.resolve(entities::CUSTOMER, &user_id).await,
            None => Ok(None),
        }
    }

    async fn salutation(&mut self, salutation: &str) -> Result<Option<Uuid>, MigrationError> {
        let uuid = self.resolve(entities::SALUTATION, salutation).await?;
        if uuid.is_none() {
            self.services.logger.add_warning(
                self.ctx.run_id,
                LogType::UnknownCustomerSalutation,
                "Cannot find customer salutation for order",
                "Order-Entity could not converted cause of unknown customer salutation",
                json!({
                    "id": self.old_id,
                    "entity": entities::ORDER,
                    "salutation": salutation,
                }),
                1,
            );
        }
        Ok(uuid)
    }

    /// Translation sub-record for the order's locale, or `None` when the
    /// locale is the system one or has no language.
    async fn translation(
        &mut self,
        entity: &str,
        old_id: &str,
        mut fields: TargetRecord,
    ) -> Result<Option<(Uuid, TargetRecord)>, MigrationError> {
        if !self.foreign_locale {
            return Ok(None);
        }
        let locale = self.locale.clone();
        let Some(language_id) = self
            .services
            .mapping
            .language_uuid(self.connection_id, &locale)
            .await?
        else {
            return Ok(None);
        };

        let id = self.create(entity, &format!("{old_id}:{locale}")).await?;
        fields.insert("id".into(), uuid_value(id));
        fields.insert("languageId".into(), uuid_value(language_id));
        Ok(Some((language_id, fields)))
    }

    // -- currency ------------------------------------------------------------

    async fn currency(&mut self, mut data: RawRecord) -> Result<TargetRecord, MigrationError> {
        let old_id = field_str(&data, "id").unwrap_or_default();
        let iso = field_str(&data, "currency").unwrap_or_default();

        let id = match self
            .services
            .mapping
            .currency_uuid(self.connection_id, &iso)
            .await?
        {
            Some(id) => id,
            None => self.create(entities::CURRENCY, &old_id).await?,
        };

        let mut currency = TargetRecord::new();
        currency.insert("id".into(), uuid_value(id));
        convert_value(&mut currency, "isDefault", &mut data, "standard", FieldType::Bool);
        convert_value(&mut currency, "factor", &mut data, "factor", FieldType::Float);
        convert_value(&mut currency, "position", &mut data, "position", FieldType::Int);

        let symbol = field_str(&data, "templatechar").unwrap_or_default();
        currency.insert("symbol".into(), json!(decode_html_entities(&symbol)));
        let placed_in_front = field_i64(&data, "symbol_position").unwrap_or(0) > 16;
        currency.insert("placedInFront".into(), json!(placed_in_front));
        currency.insert(
            "decimalPrecision".into(),
            json!(self.ctx.target.currency_precision),
        );

        let mut fields = TargetRecord::new();
        convert_value(&mut fields, "shortName", &mut data.clone(), "currency", FieldType::String);
        convert_value(&mut fields, "name", &mut data.clone(), "name", FieldType::String);
        if let Some((language_id, translation)) = self
            .translation(entities::CURRENCY_TRANSLATION, &old_id, fields)
            .await?
        {
            add_translation(&mut currency, language_id, translation);
        }

        convert_value(&mut currency, "shortName", &mut data, "currency", FieldType::String);
        convert_value(&mut currency, "name", &mut data, "name", FieldType::String);
        Ok(currency)
    }

    // -- line items ----------------------------------------------------------

    async fn line_items(
        &mut self,
        details: Vec<RawRecord>,
        rules: &[TaxRule],
        tax_status: TaxState,
    ) -> Result<Vec<LineItem>, MigrationError> {
        let precision = self.ctx.target.currency_precision;
        let mut items = Vec::with_capacity(details.len());

        for mut detail in details {
            let detail_id = field_str(&detail, "id").unwrap_or_default();
            let article_id = field_i64(&detail, "articleID").unwrap_or(0);
            let is_product = field_i64(&detail, "modus").unwrap_or(0) == 0 && article_id != 0;
            let order_number = field_str(&detail, "articleordernumber");

            let (identifier, item_type) = if is_product {
                let mapped = match &order_number {
                    Some(number) => self.resolve(entities::PRODUCT, number).await?,
                    None => None,
                };
                let identifier = match mapped {
                    Some(uuid) => uuid.to_string(),
                    None => format!(
                        "unmapped-product-{}-{article_id}",
                        order_number.clone().unwrap_or_default()
                    ),
                };
                (Some(identifier), LINE_ITEM_TYPE_PRODUCT)
            } else {
                (order_number.clone(), LINE_ITEM_TYPE_DISCOUNT_SURCHARGE)
            };

            let Some(identifier) = identifier else {
                self.services.logger.add_info(
                    self.ctx.run_id,
                    LogType::EmptyLineItemIdentifier,
                    "Line item could not converted",
                    "Order-Line-Item-Entity could not converted cause of empty identifier",
                    json!({ "orderId": self.old_id, "lineItemId": detail_id }),
                );
                continue;
            };

            let id = self.create(entities::ORDER_LINE_ITEM, &detail_id).await?;
            let mut record = TargetRecord::new();
            record.insert("id".into(), uuid_value(id));
            record.insert("identifier".into(), json!(identifier));
            record.insert("type".into(), json!(item_type));
            convert_value(&mut record, "quantity", &mut detail, "quantity", FieldType::Int);
            convert_value(&mut record, "label", &mut detail, "name", FieldType::String);

            let quantity = record.get("quantity").and_then(Value::as_i64).unwrap_or(0);
            let unit_price = field_f64(&detail, "price").unwrap_or(0.0);
            let total_price = quantity as f64 * unit_price;
            let price = CalculatedPrice {
                unit_price,
                total_price,
                calculated_taxes: calculate_taxes(tax_status, total_price, precision, rules),
                tax_rules: rules.to_vec(),
                quantity,
            };
            record.insert("price".into(), to_json(&price));
            record.insert(
                "priceDefinition".into(),
                to_json(&QuantityPriceDefinition {
                    price: unit_price,
                    tax_rules: rules.to_vec(),
                    precision,
                    quantity,
                }),
            );

            items.push(LineItem {
                id,
                record,
                price: Some(price),
            });
        }

        Ok(items)
    }

    // -- deliveries ----------------------------------------------------------

    async fn deliveries(
        &mut self,
        data: &RawRecord,
        converted: &TargetRecord,
        line_items: &[LineItem],
        shipping_costs: &CalculatedPrice,
    ) -> Result<Vec<Value>, MigrationError> {
        let Some(method) = object(data, "shippingMethod").filter(|m| is_filled(m.get("id"))) else {
            return Ok(Vec::new());
        };
        let method = method.clone();

        let old_id = self.old_id.clone();
        let mut delivery = TargetRecord::new();
        let id = self.create(entities::ORDER_DELIVERY, &old_id).await?;
        delivery.insert("id".into(), uuid_value(id));
        if let Some(state) = converted.get("stateId") {
            delivery.insert("stateId".into(), state.clone());
        }
        if let Some(date) = converted.get("orderDate") {
            delivery.insert("shippingDateEarliest".into(), date.clone());
            delivery.insert("shippingDateLatest".into(), date.clone());
        }

        let shipping_method = self.shipping_method(method).await?;
        delivery.insert("shippingMethod".into(), Value::Object(shipping_method));

        let mut address = None;
        if let Some(shipping) = object(data, "shippingaddress").filter(|a| is_filled(a.get("id"))) {
            address = self.address(shipping.clone()).await?;
        }
        if address.is_none() {
            let billing = object(data, "billingaddress").cloned().unwrap_or_default();
            address = self.address(billing).await?;
        }
        if let Some(address) = address {
            delivery.insert("shippingOrderAddress".into(), Value::Object(address));
        }

        if let Some(code) = field_str(data, "trackingcode") {
            delivery.insert("trackingCode".into(), json!(code));
        }

        if !line_items.is_empty() {
            let mut positions = Vec::with_capacity(line_items.len());
            for item in line_items {
                let position_id = self
                    .create(entities::ORDER_DELIVERY_POSITION, &item.id.to_string())
                    .await?;
                let mut position = TargetRecord::new();
                position.insert("id".into(), uuid_value(position_id));
                position.insert("orderLineItemId".into(), uuid_value(item.id));
                if let Some(price) = &item.price {
                    position.insert("price".into(), to_json(price));
                }
                positions.push(Value::Object(position));
            }
            delivery.insert("positions".into(), Value::Array(positions));
        }
        delivery.insert("shippingCosts".into(), to_json(shipping_costs));

        Ok(vec![Value::Object(delivery)])
    }

    async fn shipping_method(&mut self, mut data: RawRecord) -> Result<TargetRecord, MigrationError> {
        let old_id = field_str(&data, "id").unwrap_or_default();
        let id = self.create(entities::SHIPPING_METHOD, &old_id).await?;

        let mut method = TargetRecord::new();
        method.insert("id".into(), uuid_value(id));

        let mut fields = TargetRecord::new();
        fields.insert("shippingMethodId".into(), uuid_value(id));
        for key in ["name", "description", "comment"] {
            convert_value(&mut fields, key, &mut data.clone(), key, FieldType::String);
        }
        if let Some((language_id, translation)) = self
            .translation(entities::SHIPPING_METHOD_TRANSLATION, &old_id, fields)
            .await?
        {
            add_translation(&mut method, language_id, translation);
        }

        convert_value(&mut method, "bindShippingfree", &mut data, "bind_shippingfree", FieldType::Bool);
        convert_value(&mut method, "active", &mut data, "active", FieldType::Bool);
        convert_value(&mut method, "shippingFree", &mut data, "shippingfree", FieldType::Float);
        convert_value(&mut method, "name", &mut data, "name", FieldType::String);
        convert_value(&mut method, "description", &mut data, "description", FieldType::String);
        convert_value(&mut method, "comment", &mut data, "comment", FieldType::String);

        match self.resolve(entities::DELIVERY_TIME, DEFAULT_DELIVERY_TIME).await? {
            Some(uuid) => {
                method.insert("deliveryTimeId".into(), uuid_value(uuid));
            }
            None => self.warn_missing_field("delivery_time"),
        }

        match self
            .services
            .mapping
            .default_availability_rule(self.connection_id)
            .await?
        {
            Some(uuid) => {
                method.insert("availabilityRuleId".into(), uuid_value(uuid));
            }
            None => self.warn_missing_field("availability_rule_id"),
        }

        Ok(method)
    }

    fn warn_missing_field(&mut self, field: &str) {
        self.services.logger.add_warning(
            self.ctx.run_id,
            LogType::EmptyNecessaryDataFields,
            "Empty necessary data fields",
            format!("Order-Entity could not converted cause of empty necessary field(s): {field}."),
            json!({ "id": self.old_id, "entity": entities::ORDER, "fields": [field] }),
            1,
        );
    }

    // -- transactions --------------------------------------------------------

    async fn transactions(
        &mut self,
        data: &RawRecord,
        price: &CartPrice,
    ) -> Result<Vec<Value>, MigrationError> {
        let cleared = field_str(data, "cleared").unwrap_or_default();
        let Some(state_id) = self.resolve(entities::TRANSACTION_STATE, &cleared).await? else {
            self.services.logger.add_warning(
                self.ctx.run_id,
                LogType::UnknownTransactionState,
                "Cannot find transaction state",
                "Transaction-Order-Entity could not converted cause of unknown transaction state",
                json!({ "id": self.old_id, "transactionState": cleared }),
                1,
            );
            return Ok(Vec::new());
        };

        let payment_id = object(data, "payment")
            .and_then(|p| field_str(p, "id"))
            .unwrap_or_default();
        let Some(payment_method_id) = self.resolve(entities::PAYMENT_METHOD, &payment_id).await?
        else {
            self.services.logger.add_info(
                self.ctx.run_id,
                LogType::UnknownPaymentMethod,
                "Cannot find payment method",
                "Order-Transaction-Entity could not converted cause of unknown payment method",
                json!({
                    "id": self.old_id,
                    "entity": entities::ORDER,
                    "paymentMethod": payment_id,
                }),
            );
            return Ok(Vec::new());
        };

        let old_id = self.old_id.clone();
        let id = self.create(entities::ORDER_TRANSACTION, &old_id).await?;
        let amount = CalculatedPrice {
            unit_price: price.total_price,
            total_price: price.total_price,
            calculated_taxes: price.calculated_taxes.clone(),
            tax_rules: price.tax_rules.clone(),
            quantity: 1,
        };

        Ok(vec![json!({
            "id": id.to_string(),
            "paymentMethodId": payment_method_id.to_string(),
            "stateId": state_id.to_string(),
            "amount": to_json(&amount),
        })])
    }

    // -- addresses -----------------------------------------------------------

    /// Convert an order address; `None` if required fields are empty or the
    /// salutation is unknown.
    async fn address(&mut self, mut data: RawRecord) -> Result<Option<TargetRecord>, MigrationError> {
        let missing = empty_required_fields(&data, REQUIRED_ADDRESS_FIELDS);
        if !missing.is_empty() {
            self.services.logger.add_info(
                self.ctx.run_id,
                LogType::EmptyNecessaryDataFields,
                "Empty necessary data fields for address",
                format!(
                    "Address-Entity could not converted cause of empty necessary field(s): {}.",
                    missing.join(", ")
                ),
                json!({ "id": self.old_id, "entity": "Address", "fields": missing }),
            );
            return Ok(None);
        }

        let salutation = field_str(&data, "salutation").unwrap_or_default();
        let Some(salutation_id) = self.salutation(&salutation).await? else {
            return Ok(None);
        };

        let old_id = field_str(&data, "id").unwrap_or_default();
        let mut address = TargetRecord::new();
        let id = self.create(entities::ORDER_ADDRESS, &old_id).await?;
        address.insert("id".into(), uuid_value(id));

        let mut country_id = match field_str(&data, "countryID") {
            Some(country) => self.resolve(entities::COUNTRY, &country).await?,
            None => None,
        };
        if country_id.is_none() {
            if let Some(country) = take_object(&mut data, "country") {
                let record = self.country(country).await?;
                country_id = record
                    .get("id")
                    .and_then(Value::as_str)
                    .and_then(|s| Uuid::parse_str(s).ok());
                address.insert("country".into(), Value::Object(record));
            }
        }
        if let Some(country_id) = country_id {
            address.insert("countryId".into(), uuid_value(country_id));
        }

        if let Some(state) = field_str(&data, "stateID") {
            match self.resolve(entities::COUNTRY_STATE, &state).await? {
                Some(state_id) => {
                    address.insert("countryStateId".into(), uuid_value(state_id));
                }
                None => {
                    if let (Some(state), Some(country_id)) = (take_object(&mut data, "state"), country_id) {
                        let record = self.country_state(state, country_id).await?;
                        address.insert("countryState".into(), Value::Object(record));
                    }
                }
            }
        }

        address.insert("salutationId".into(), uuid_value(salutation_id));
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

    async fn country(&mut self, mut data: RawRecord) -> Result<TargetRecord, MigrationError> {
        let old_id = field_str(&data, "id").unwrap_or_default();
        let mut id = None;
        if let (Some(iso), Some(iso3)) = (field_str(&data, "countryiso"), field_str(&data, "iso3")) {
            id = self
                .services
                .mapping
                .country_uuid(self.connection_id, &old_id, &iso, &iso3)
                .await?;
        }
        let id = match id {
            Some(id) => id,
            None => self.create(entities::COUNTRY, &old_id).await?,
        };

        let mut country = TargetRecord::new();
        country.insert("id".into(), uuid_value(id));

        let mut fields = TargetRecord::new();
        fields.insert("countryId".into(), uuid_value(id));
        convert_value(&mut fields, "name", &mut data.clone(), "countryname", FieldType::String);
        if let Some((language_id, translation)) = self
            .translation(entities::COUNTRY_TRANSLATION, &old_id, fields)
            .await?
        {
            add_translation(&mut country, language_id, translation);
        }

        convert_value(&mut country, "iso", &mut data, "countryiso", FieldType::String);
        convert_value(&mut country, "position", &mut data, "position", FieldType::Int);
        convert_value(&mut country, "taxFree", &mut data, "taxfree", FieldType::Bool);
        convert_value(&mut country, "taxfreeForVatId", &mut data, "taxfree_ustid", FieldType::Bool);
        convert_value(&mut country, "taxfreeVatidChecked", &mut data, "taxfree_ustid_checked", FieldType::Bool);
        convert_value(&mut country, "active", &mut data, "active", FieldType::Bool);
        convert_value(&mut country, "iso3", &mut data, "iso3", FieldType::String);
        convert_value(&mut country, "displayStateInRegistration", &mut data, "display_state_in_registration", FieldType::Bool);
        convert_value(&mut country, "forceStateInRegistration", &mut data, "force_state_in_registration", FieldType::Bool);
        convert_value(&mut country, "name", &mut data, "countryname", FieldType::String);

        Ok(country)
    }

    async fn country_state(
        &mut self,
        mut data: RawRecord,
        country_id: Uuid,
    ) -> Result<TargetRecord, MigrationError> {
        let old_id = field_str(&data, "id").unwrap_or_default();
        let id = self.create(entities::COUNTRY_STATE, &old_id).await?;

        let mut state = TargetRecord::new();
        state.insert("id".into(), uuid_value(id));
        state.insert("countryId".into(), uuid_value(country_id));

        let mut fields = TargetRecord::new();
        fields.insert("countryStateId".into(), uuid_value(id));
        convert_value(&mut fields, "name", &mut data.clone(), "name", FieldType::String);
        if let Some((language_id, translation)) = self
            .translation(entities::COUNTRY_STATE_TRANSLATION, &old_id, fields)
            .await?
        {
            add_translation(&mut state, language_id, translation);
        }

        convert_value(&mut state, "shortCode", &mut data, "shortcode", FieldType::String);
        convert_value(&mut state, "position", &mut data, "position", FieldType::Int);
        convert_value(&mut state, "active", &mut data, "active", FieldType::Bool);
        convert_value(&mut state, "name", &mut data, "name", FieldType::String);

        Ok(state)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn log_empty_fields(services: &mut RunServices, ctx: &MigrationContext, old_id: &str, fields: Vec<String>) {
    let count = fields.len() as u32;
    services.logger.add_warning(
        ctx.run_id,
        LogType::EmptyNecessaryDataFields,
        "Empty necessary data",
        format!(
            "Order-Entity could not converted cause of empty necessary field(s): {}.",
            fields.join(", ")
        ),
        json!({ "id": old_id, "entity": "Order", "fields": fields }),
        count,
    );
}

/// Sum line item taxes per rate.
fn sum_taxes(items: &[LineItem], precision: u32) -> Vec<CalculatedTax> {
    let mut sums: Vec<CalculatedTax> = Vec::new();
    for tax in items.iter().filter_map(|i| i.price.as_ref()).flat_map(|p| &p.calculated_taxes) {
        match sums.iter_mut().find(|s| s.tax_rate == tax.tax_rate) {
            Some(sum) => {
                sum.tax = round(sum.tax + tax.tax, precision);
                sum.price += tax.price;
            }
            None => sums.push(*tax),
        }
    }
    sums
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

/// Currency symbols are stored HTML-escaped in the legacy shop.
fn decode_html_entities(s: &str) -> String {
    s.replace("&euro;", "€")
        .replace("&pound;", "£")
        .replace("&yen;", "¥")
        .replace("&dollar;", "$")
        .replace("&#36;", "$")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::convert::test_support::{fixture, record, Fixture};
    use crate::data_selection;
    use crate::mapping::{MappingStore, NewMapping};

    struct Premapped {
        customer: Uuid,
        product: Uuid,
    }

    async fn premap(fx: &Fixture) -> Premapped {
        let conn = fx.ctx.connection_id();
        let customer = Uuid::new_v4();
        let product = Uuid::new_v4();
        fx.store
            .insert(&[
                NewMapping::identity(conn, "customer", "max@example.com", customer),
                NewMapping::identity(conn, "salutation", "mr", Uuid::new_v4()),
                NewMapping::identity(conn, "order_state", "0", Uuid::new_v4()),
                NewMapping::identity(conn, "transaction_state", "17", Uuid::new_v4()),
                NewMapping::identity(conn, "payment_method", "5", Uuid::new_v4()),
                NewMapping::identity(conn, "product", "SW10001", product),
            ])
            .await
            .unwrap();
        Premapped { customer, product }
    }

    fn address(id: &str) -> Value {
        json!({
            "id": id, "firstname": "Max", "lastname": "Mustermann", "zipcode": "48624",
            "city": "Schöppingen", "street": "Mustermannstraße 92", "salutation": "mr",
            "countryID": "2",
            "country": {"id": "2", "countryiso": "DE", "iso3": "DEU", "countryname": "Deutschland"},
        })
    }

    fn order() -> RawRecord {
        record(json!({
            "id": "15",
            "ordernumber": "20001",
            "userID": "1",
            "_locale": "de-DE",
            "status": "0",
            "cleared": "17",
            "currency": "EUR",
            "currencyFactor": "1",
            "ordertime": "2012-08-30 10:15:54",
            "net": "0",
            "invoice_amount": "119",
            "invoice_amount_net": "100",
            "invoice_shipping": "0",
            "customer": {"email": "max@example.com", "salutation": "mr", "firstname": "Max"},
            "payment": {"id": "5", "name": "prepayment"},
            "paymentcurrency": {"id": "1", "currency": "EUR", "name": "Euro", "templatechar": "&euro;", "symbol_position": "0", "factor": "1"},
            "billingaddress": address("1"),
            "shippingMethod": {"id": "9", "name": "Standard"},
            "details": [
                {"id": "42", "articleID": "2", "modus": "0", "articleordernumber": "SW10001", "name": "Shirt", "quantity": "1", "price": "119", "tax_rate": "19"},
                {"id": "43", "articleID": "0", "modus": "4", "articleordernumber": "SHIPPINGDISCOUNT", "name": "Discount", "quantity": "1", "price": "-2", "tax_rate": "19"},
            ],
            "attributes": {"id": "1", "orderID": "15", "attribute1": "gift"},
        }))
    }

    // -- conversion ----------------------------------------------------------

    #[tokio::test]
    async fn converts_complete_order() {
        let mut fx = fixture(data_selection::ORDER).await;
        let mapped = premap(&fx).await;

        let result = OrderConverter
            .convert(order(), &fx.ctx, &mut fx.services)
            .await
            .unwrap();
        let converted = result.converted.unwrap();

        assert_eq!(converted["orderCustomer"]["customerId"], json!(mapped.customer.to_string()));
        assert_eq!(converted["orderNumber"], json!("20001"));
        assert_eq!(converted["currency"]["symbol"], json!("€"));
        assert_eq!(converted["customFields"], json!({"order_attribute1": "gift"}));
        assert_eq!(converted["price"]["taxStatus"], json!("gross"));

        let items = converted["lineItems"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["identifier"], json!(mapped.product.to_string()));
        assert_eq!(items[0]["type"], json!("product"));
        assert_eq!(items[0]["price"]["calculatedTaxes"][0]["tax"], json!(19.0));
        assert_eq!(items[1]["identifier"], json!("SHIPPINGDISCOUNT"));
        assert_eq!(items[1]["type"], json!("discount_surcharge"));

        assert_eq!(converted["transactions"].as_array().unwrap().len(), 1);
        let delivery = &converted["deliveries"][0];
        assert_eq!(delivery["positions"].as_array().unwrap().len(), 2);
        assert_eq!(delivery["shippingOrderAddress"]["id"], converted["billingAddressId"]);
        assert_eq!(converted["salesChannelId"], json!(fx.ctx.target.sales_channel_id.to_string()));
    }

    #[tokio::test]
    async fn unmapped_product_gets_placeholder_identifier() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data["details"][0]["articleordernumber"] = json!("SW99999");

        let converted = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();

        assert_eq!(converted["lineItems"][0]["identifier"], json!("unmapped-product-SW99999-2"));
    }

    #[tokio::test]
    async fn net_and_tax_free_flags_set_tax_status() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data.insert("isTaxFree".into(), json!("1"));

        let converted = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();

        assert_eq!(converted["price"]["taxStatus"], json!("tax-free"));
        assert_eq!(converted["lineItems"][0]["price"]["calculatedTaxes"], json!([]));
    }

    #[tokio::test]
    async fn customer_is_resolved_by_user_id() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let by_id = Uuid::new_v4();
        fx.store
            .insert(&[NewMapping::identity(fx.ctx.connection_id(), "customer", "77", by_id)])
            .await
            .unwrap();
        let mut data = order();
        data["customer"]["email"] = json!("unknown@example.com");
        data.insert("userID".into(), json!("77"));

        let converted = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();
        assert_eq!(converted["orderCustomer"]["customerId"], json!(by_id.to_string()));
    }

    // -- failures ------------------------------------------------------------

    #[tokio::test]
    async fn unknown_customer_buffers_no_mapping() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data["customer"]["email"] = json!("nobody@example.com");
        data.insert("userID".into(), json!("999"));

        let result = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(fx.services.mapping.pending_len(), 0);
        let entry = &fx.services.logger.entries()[0];
        assert_eq!(entry.log_type, "SHOPWARE_55_ASSOCIATION_REQUIRED_MISSING");
        assert_eq!(entry.details["id"], json!("15"));
    }

    #[tokio::test]
    async fn empty_required_fields_are_reported() {
        let mut fx = fixture(data_selection::ORDER).await;
        let mut data = order();
        data.remove("currency");
        data.insert("billingaddress".into(), json!({}));

        let result = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        let entry = &fx.services.logger.entries()[0];
        assert_eq!(entry.count, 2);
        assert_eq!(entry.details["fields"], json!(["currency", "billingaddress"]));
    }

    #[tokio::test]
    async fn incomplete_billing_address_buffers_no_mapping() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data["billingaddress"]["zipcode"] = json!("");

        let result = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(fx.services.mapping.pending_len(), 0);
        assert!(fx
            .services
            .logger
            .entries()
            .iter()
            .any(|e| e.details["fields"] == json!(["billingaddress"])));
    }

    #[tokio::test]
    async fn missing_id_is_reported() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data.remove("id");

        let result = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(fx.services.logger.entries()[0].details["fields"], json!(["id"]));
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn unknown_order_state_is_a_warning() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data.insert("status".into(), json!("99"));

        let result = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap();

        assert!(result.converted.is_none());
        assert_eq!(fx.services.logger.entries()[0].log_type, "SHOPWARE_55_UNKNOWN_ORDER_STATE");
        assert_eq!(fx.services.mapping.pending_len(), 0);
    }

    #[tokio::test]
    async fn unknown_payment_method_drops_transaction() {
        let mut fx = fixture(data_selection::ORDER).await;
        premap(&fx).await;
        let mut data = order();
        data["payment"]["id"] = json!("404");

        let converted = OrderConverter
            .convert(data, &fx.ctx, &mut fx.services)
            .await
            .unwrap()
            .converted
            .unwrap();

        assert_eq!(converted["transactions"], json!([]));
        assert!(fx
            .services
            .logger
            .entries()
            .iter()
            .any(|e| e.log_type == "SHOPWARE_55_UNKNOWN_PAYMENT_METHOD"));
    }
}
