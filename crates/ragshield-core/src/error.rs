//! Enforcement error types.

use crate::enforcement::retriever::SearchError;
use crate::registry::{BackendKind, Operator};
use ragshield_proto::MetadataField;
use thiserror::Error;

/// Errors raised while resolving, compiling or applying an enforcement filter.
///
/// Every variant aborts retrieval. None of them is transient, so none is
/// retried.
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// The target backend is not in the capability registry.
    #[error("unsupported backend: {backend}")]
    UnsupportedBackend {
        /// Backend identifier as supplied by the retriever.
        backend: String,
    },

    /// The constraint needs an operator the backend cannot express.
    #[error("backend {backend} cannot express {operator} required by the constraint")]
    UnsupportedFilterOperator {
        /// Target backend.
        backend: BackendKind,
        /// Operator with no native representation.
        operator: Operator,
    },

    /// An abstract metadata field has no native name on the backend.
    #[error("backend {backend} has no mapping for {field} metadata")]
    MissingFieldMapping {
        /// Target backend.
        backend: BackendKind,
        /// Unmapped field.
        field: MetadataField,
    },

    /// Malformed identity or semantic context.
    #[error("invalid constraint: {0}")]
    InvalidConstraint(String),

    /// The compiled filter exceeds a structural limit of the backend.
    #[error("backend {backend} limit exceeded: {limit}")]
    LimitExceeded {
        /// Target backend.
        backend: BackendKind,
        /// Description of the violated limit.
        limit: String,
    },

    /// Invalid enforcement configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A search was attempted with no enforcement outcome attached.
    #[error("no enforcement filter attached to {backend}; search refused")]
    FilterNotAttached {
        /// Store the search was refused on.
        backend: String,
    },

    /// The similarity search itself failed.
    #[error("search failed: {0}")]
    Search(#[from] SearchError),

    /// Request payload error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ragshield_proto::Error),
}

impl EnforcementError {
    /// The backend is not supported at all.
    pub fn is_backend_unsupported(&self) -> bool {
        matches!(self, EnforcementError::UnsupportedBackend { .. })
    }

    /// The backend is supported but this particular constraint could not be
    /// enforced on it.
    pub fn is_enforcement_failure(&self) -> bool {
        matches!(
            self,
            EnforcementError::UnsupportedFilterOperator { .. }
                | EnforcementError::MissingFieldMapping { .. }
                | EnforcementError::InvalidConstraint(_)
                | EnforcementError::LimitExceeded { .. }
        )
    }
}

/// Result type for enforcement operations.
pub type EnforcementResult<T> = Result<T, EnforcementError>;
