//! Error types for attribute resolution.

use lineage_store::StoreError;
use lineage_types::{AttributeKey, EntityId};

/// Structural failures raised while resolving an attribute.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// Walking the ancestor chain revisited an entity.
    #[error("cyclic hierarchy: entity {entity} reached twice while walking ancestors")]
    CyclicHierarchy {
        /// The entity that was reached a second time.
        entity: EntityId,
    },

    /// The `merge` strategy met a value that is not a map.
    #[error("type mismatch resolving {key} at {entity}: merge expects a map, found {found}")]
    TypeMismatch {
        key: AttributeKey,
        /// The chain level holding the offending value.
        entity: EntityId,
        /// JSON kind of the offending value.
        found: &'static str,
    },

    /// An unrecognized strategy token was requested.
    #[error("invalid merge strategy: {0:?}")]
    InvalidStrategy(String),

    /// The underlying store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias for resolution results.
pub type ResolveResult<T> = Result<T, ResolveError>;
