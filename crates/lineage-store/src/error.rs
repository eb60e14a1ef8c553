use lineage_types::EntityId;

/// Errors from attribute store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The entity was never defined in the hierarchy table.
    #[error("unknown entity: {0}")]
    UnknownEntity(EntityId),

    /// An entity with this name already exists.
    #[error("entity already defined: {0}")]
    DuplicateEntity(String),

    /// No entity carries this name.
    #[error("no entity named {0:?}")]
    EntityNotFound(String),

    /// Every `EntityId` index is taken.
    #[error("entity table is full ({0} entities)")]
    CapacityExceeded(usize),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
