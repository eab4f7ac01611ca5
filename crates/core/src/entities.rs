//! Logical entity names used as the `entity` column of mapping rows and as
//! data set identifiers.

pub const CATEGORY: &str = "category";
pub const CATEGORY_TRANSLATION: &str = "category_translation";
pub const CATEGORY_CUSTOM_FIELD: &str = "category_custom_field";
pub const ROOT_CATEGORY: &str = "root_category";

pub const CMS_PAGE: &str = "cms_page";

pub const COUNTRY: &str = "country";
pub const COUNTRY_TRANSLATION: &str = "country_translation";
pub const COUNTRY_STATE: &str = "country_state";
pub const COUNTRY_STATE_TRANSLATION: &str = "country_state_translation";

pub const CURRENCY: &str = "currency";
pub const CURRENCY_TRANSLATION: &str = "currency_translation";

pub const CUSTOMER: &str = "customer";
pub const CUSTOMER_ADDRESS: &str = "customer_address";
pub const CUSTOMER_CUSTOM_FIELD: &str = "customer_custom_field";
pub const CUSTOMER_GROUP: &str = "customer_group";
pub const CUSTOMER_GROUP_TRANSLATION: &str = "customer_group_translation";
pub const CUSTOMER_GROUP_CUSTOM_FIELD: &str = "customer_group_custom_field";

pub const CUSTOM_FIELD_SET: &str = "custom_field_set";
pub const CUSTOM_FIELD_SET_RELATION: &str = "custom_field_set_relation";

pub const DELIVERY_TIME: &str = "delivery_time";

pub const LANGUAGE: &str = "language";
pub const LOCALE: &str = "locale";

pub const MEDIA: &str = "media";
pub const MEDIA_TRANSLATION: &str = "media_translation";
pub const MEDIA_FOLDER: &str = "media_folder";
pub const MEDIA_DEFAULT_FOLDER: &str = "media_default_folder";
pub const MEDIA_THUMBNAIL_SIZE: &str = "media_thumbnail_size";

pub const NUMBER_RANGE: &str = "number_range";

pub const ORDER: &str = "order";
pub const ORDER_ADDRESS: &str = "order_address";
pub const ORDER_CUSTOM_FIELD: &str = "order_custom_field";
pub const ORDER_DELIVERY: &str = "order_delivery";
pub const ORDER_DELIVERY_POSITION: &str = "order_delivery_position";
pub const ORDER_LINE_ITEM: &str = "order_line_item";
pub const ORDER_TRANSACTION: &str = "order_transaction";

pub const PRODUCT: &str = "product";
pub const PRODUCT_MAIN: &str = "product_mainProduct";
pub const PRODUCT_TRANSLATION: &str = "product_translation";
pub const PRODUCT_CUSTOM_FIELD: &str = "product_custom_field";
pub const PRODUCT_MANUFACTURER: &str = "product_manufacturer";
pub const PRODUCT_MANUFACTURER_TRANSLATION: &str = "product_manufacturer_translation";
pub const PRODUCT_MEDIA: &str = "product_media";
pub const PRODUCT_PRICE: &str = "product_price";

pub const RULE: &str = "rule";
pub const SALES_CHANNEL: &str = "sales_channel";

pub const SHIPPING_METHOD: &str = "shipping_method";
pub const SHIPPING_METHOD_TRANSLATION: &str = "shipping_method_translation";

pub const TAX: &str = "tax";

// Premapping tables filled by the administration before conversion.
pub const ORDER_STATE: &str = "order_state";
pub const TRANSACTION_STATE: &str = "transaction_state";
pub const PAYMENT_METHOD: &str = "payment_method";
pub const SALUTATION: &str = "salutation";
