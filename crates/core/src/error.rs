use uuid::Uuid;

/// Coarse classification of a [`MigrationError`], used by the orchestrator
/// and the run driver to decide how far a failure may travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required parent or association is definitively missing. Fatal to
    /// the single record only.
    StructuralIntegrity,
    /// No converter or processor is registered. Fatal to the run segment.
    DependencyNotFound,
    /// Store, gateway or media I/O failed.
    Infrastructure,
    /// A lookup against an upstream collaborator failed for a reason other
    /// than "does not exist".
    Upstream,
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("Parent entity for {entity} child with old id {old_id} not found")]
    ParentEntityForChildNotFound { entity: &'static str, old_id: String },

    #[error("Mapping of {required} is missing, but it is a required association for {entity}")]
    AssociationEntityRequiredMissing {
        entity: &'static str,
        required: &'static str,
    },

    #[error("Locale entity for code {0} not found")]
    LocaleNotFound(String),

    #[error("Converter for profile {profile} and entity {entity} not found")]
    ConverterNotFound { profile: String, entity: String },

    #[error("Media file processor for profile {profile}, gateway {gateway} and entity {entity} not found")]
    ProcessorNotFound {
        profile: String,
        gateway: String,
        entity: String,
    },

    #[error("No {entity} with id {id} exists")]
    EntityNotExists { entity: &'static str, id: Uuid },

    #[error("Mapping store error: {0}")]
    Store(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Media processing error: {0}")]
    Media(String),
}

impl MigrationError {
    /// Machine-readable code, written as the log type of error entries.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ParentEntityForChildNotFound { .. } => "SWAG_MIGRATION__PARENT_ENTITY_NOT_FOUND",
            Self::AssociationEntityRequiredMissing { .. } => {
                "SWAG_MIGRATION__ASSOCIATION_REQUIRED_MISSING"
            }
            Self::LocaleNotFound(_) => "SWAG_MIGRATION__LOCALE_NOT_FOUND",
            Self::ConverterNotFound { .. } => "SWAG_MIGRATION__CONVERTER_NOT_FOUND",
            Self::ProcessorNotFound { .. } => "SWAG_MIGRATION__PROCESSOR_NOT_FOUND",
            Self::EntityNotExists { .. } => "SWAG_MIGRATION__ENTITY_NOT_EXISTS",
            Self::Store(_) => "SWAG_MIGRATION__STORE_ERROR",
            Self::Gateway(_) => "SWAG_MIGRATION__GATEWAY_READ_ERROR",
            Self::Media(_) => "SWAG_MIGRATION__MEDIA_PROCESS_ERROR",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ParentEntityForChildNotFound { .. }
            | Self::AssociationEntityRequiredMissing { .. } => ErrorKind::StructuralIntegrity,
            Self::ConverterNotFound { .. }
            | Self::ProcessorNotFound { .. }
            | Self::EntityNotExists { .. } => ErrorKind::DependencyNotFound,
            Self::Store(_) | Self::Gateway(_) | Self::Media(_) => ErrorKind::Infrastructure,
            Self::LocaleNotFound(_) => ErrorKind::Upstream,
        }
    }

    /// Whether this error may cross the orchestrator boundary.
    ///
    /// Only dependency resolution and store I/O failures reach the run-level
    /// caller; everything else is logged and counted per record.
    pub fn propagates_to_run(&self) -> bool {
        matches!(
            self,
            Self::ConverterNotFound { .. } | Self::ProcessorNotFound { .. } | Self::Store(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_do_not_propagate() {
        let err = MigrationError::ParentEntityForChildNotFound {
            entity: "category",
            old_id: "7".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::StructuralIntegrity);
        assert!(!err.propagates_to_run());
    }

    #[test]
    fn store_and_registry_errors_propagate() {
        assert!(MigrationError::Store("down".into()).propagates_to_run());
        let err = MigrationError::ConverterNotFound {
            profile: "shopware55".into(),
            entity: "wishlist".into(),
        };
        assert!(err.propagates_to_run());
        assert_eq!(err.kind(), ErrorKind::DependencyNotFound);
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            MigrationError::LocaleNotFound("xx-XX".into()),
            MigrationError::Store(String::new()),
            MigrationError::Gateway(String::new()),
            MigrationError::Media(String::new()),
        ];
        let mut codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn display_names_the_missing_association() {
        let err = MigrationError::AssociationEntityRequiredMissing {
            entity: "order",
            required: "customer",
        };
        assert_eq!(
            err.to_string(),
            "Mapping of customer is missing, but it is a required association for order"
        );
    }
}
