//! Data sets (one per legacy entity type) and the selections that group
//! them into an ordered processing plan.

use serde::Serialize;

use crate::entities;

/// Profile name of the Shopware 5.5 source system.
pub const SHOPWARE55_PROFILE: &str = "shopware55";

/// One legacy entity type as exposed by the source gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataSet {
    /// Entity name used by converters, mappings, and the writer.
    pub entity: &'static str,
    /// Route the API gateway reads this data set from.
    pub api_route: &'static str,
}

impl DataSet {
    pub const fn new(entity: &'static str, api_route: &'static str) -> Self {
        Self { entity, api_route }
    }
}

pub const CATEGORY_ATTRIBUTE: DataSet =
    DataSet::new(entities::CATEGORY_CUSTOM_FIELD, "SwagMigrationAttributes");
pub const CATEGORY: DataSet = DataSet::new(entities::CATEGORY, "SwagMigrationCategories");
pub const CUSTOMER_GROUP_ATTRIBUTE: DataSet =
    DataSet::new(entities::CUSTOMER_GROUP_CUSTOM_FIELD, "SwagMigrationAttributes");
pub const CUSTOMER_GROUP: DataSet =
    DataSet::new(entities::CUSTOMER_GROUP, "SwagMigrationCustomerGroups");
pub const CUSTOMER_ATTRIBUTE: DataSet =
    DataSet::new(entities::CUSTOMER_CUSTOM_FIELD, "SwagMigrationAttributes");
pub const CUSTOMER: DataSet = DataSet::new(entities::CUSTOMER, "SwagMigrationCustomers");
pub const MEDIA: DataSet = DataSet::new(entities::MEDIA, "SwagMigrationAssets");
pub const ORDER_ATTRIBUTE: DataSet =
    DataSet::new(entities::ORDER_CUSTOM_FIELD, "SwagMigrationAttributes");
pub const ORDER: DataSet = DataSet::new(entities::ORDER, "SwagMigrationOrders");
pub const PRODUCT_ATTRIBUTE: DataSet =
    DataSet::new(entities::PRODUCT_CUSTOM_FIELD, "SwagMigrationAttributes");
pub const PRODUCT: DataSet = DataSet::new(entities::PRODUCT, "SwagMigrationProducts");

/// Every data set the `shopware55` profile knows about.
pub const ALL_DATA_SETS: &[DataSet] = &[
    CATEGORY_ATTRIBUTE,
    CATEGORY,
    CUSTOMER_GROUP_ATTRIBUTE,
    CUSTOMER_GROUP,
    CUSTOMER_ATTRIBUTE,
    CUSTOMER,
    MEDIA,
    ORDER_ATTRIBUTE,
    ORDER,
    PRODUCT_ATTRIBUTE,
    PRODUCT,
];

/// Look up a data set by entity name.
pub fn data_set_by_entity(entity: &str) -> Option<DataSet> {
    ALL_DATA_SETS.iter().copied().find(|ds| ds.entity == entity)
}

/// An ordered group of data sets the user can select for migration.
///
/// Order matters: referenced entities come before the entities that
/// reference them.
#[derive(Debug, Clone, Serialize)]
pub struct DataSelection {
    pub id: &'static str,
    pub data_sets: Vec<DataSet>,
    pub position: u32,
}

impl DataSelection {
    pub fn entity_names(&self) -> Vec<&'static str> {
        self.data_sets.iter().map(|ds| ds.entity).collect()
    }
}

pub fn categories_products_selection() -> DataSelection {
    DataSelection {
        id: "categoriesProducts",
        data_sets: vec![
            CATEGORY_ATTRIBUTE,
            CATEGORY,
            PRODUCT_ATTRIBUTE,
            PRODUCT,
            MEDIA,
        ],
        position: 100,
    }
}

pub fn customers_orders_selection() -> DataSelection {
    DataSelection {
        id: "customersOrders",
        data_sets: vec![
            CUSTOMER_GROUP_ATTRIBUTE,
            CUSTOMER_GROUP,
            CUSTOMER_ATTRIBUTE,
            CUSTOMER,
            ORDER_ATTRIBUTE,
            ORDER,
        ],
        position: 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn customers_orders_lists_customers_before_orders() {
        let names = customers_orders_selection().entity_names();
        let customer = names.iter().position(|n| *n == "customer").unwrap();
        let order = names.iter().position(|n| *n == "order").unwrap();
        assert!(customer < order);
        assert_eq!(names[0], "customer_group_custom_field");
    }

    #[test]
    fn lookup_by_entity() {
        assert_eq!(data_set_by_entity("media").unwrap().api_route, "SwagMigrationAssets");
        assert!(data_set_by_entity("wishlist").is_none());
    }

    #[test]
    fn categories_come_before_products() {
        let names = categories_products_selection().entity_names();
        assert!(
            names.iter().position(|n| *n == "category").unwrap()
                < names.iter().position(|n| *n == "product").unwrap()
        );
    }
}
