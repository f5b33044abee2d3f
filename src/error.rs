use thiserror::Error;

/// Error taxonomy for the catalog service.
///
/// `UniquenessConflict` is internal: the upsert engine recovers from it by
/// retrying the submission as an update. Every other variant propagates to
/// the API boundary and is mapped to an HTTP status there.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Invalid submission field, rejected before any store access.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Uploaded bytes could not be decoded as an image. Nothing is written.
    #[error("uploaded image could not be decoded: {0}")]
    MalformedImage(String),

    /// Object storage write or signing failed.
    #[error("object storage unavailable: {0}")]
    StorageUnavailable(anyhow::Error),

    /// Variant store query or write failed.
    #[error("variant store unavailable: {0}")]
    StoreUnavailable(anyhow::Error),

    /// The unique triple index rejected an insert. Recovered internally.
    #[error("variant triple already exists")]
    UniquenessConflict,

    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl CatalogError {
    /// Stable machine-readable code for API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CatalogError::Validation(_) => "VALIDATION_ERROR",
            CatalogError::MalformedImage(_) => "MALFORMED_IMAGE",
            CatalogError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            CatalogError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            CatalogError::UniquenessConflict => "UNIQUENESS_CONFLICT",
            CatalogError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the caller sent a bad request, as opposed to an infrastructure
    /// failure on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            CatalogError::Validation(_) | CatalogError::MalformedImage(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CatalogError::Validation("bad".into()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(CatalogError::UniquenessConflict.code(), "UNIQUENESS_CONFLICT");
    }

    #[test]
    fn test_client_error_classification() {
        assert!(CatalogError::Validation("bad".into()).is_client_error());
        assert!(CatalogError::MalformedImage("bad".into()).is_client_error());
        assert!(!CatalogError::UniquenessConflict.is_client_error());
        assert!(!CatalogError::Configuration("missing".into()).is_client_error());
    }
}
