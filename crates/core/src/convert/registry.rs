use std::sync::Arc;

use super::attribute::AttributeConverter;
use super::category::CategoryConverter;
use super::customer::CustomerConverter;
use super::customer_group::CustomerGroupConverter;
use super::media::MediaConverter;
use super::order::OrderConverter;
use super::product::ProductConverter;
use super::Converter;
use crate::error::MigrationError;

/// Dispatch from `(profile, entity)` to the converter that handles it.
///
/// Stateless once built; resolve once per batch, not per record.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    converters: Vec<Arc<dyn Converter>>,
}

impl ConverterRegistry {
    pub fn new(converters: Vec<Arc<dyn Converter>>) -> Self {
        Self { converters }
    }

    /// Every converter of the `shopware55` profile.
    pub fn shopware55() -> Self {
        Self::new(vec![
            Arc::new(AttributeConverter::category()),
            Arc::new(CategoryConverter),
            Arc::new(AttributeConverter::customer_group()),
            Arc::new(CustomerGroupConverter),
            Arc::new(AttributeConverter::customer()),
            Arc::new(CustomerConverter),
            Arc::new(MediaConverter),
            Arc::new(AttributeConverter::order()),
            Arc::new(OrderConverter),
            Arc::new(AttributeConverter::product()),
            Arc::new(ProductConverter),
        ])
    }

    pub fn get_converter(
        &self,
        profile: &str,
        entity: &str,
    ) -> Result<Arc<dyn Converter>, MigrationError> {
        self.converters
            .iter()
            .find(|c| c.supports(profile, entity))
            .cloned()
            .ok_or_else(|| MigrationError::ConverterNotFound {
                profile: profile.to_string(),
                entity: entity.to_string(),
            })
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }
}
