use lineage_store::StoreError;

/// Errors raised while flushing a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("store error during batch flush: {0}")]
    Store(#[from] StoreError),
}

pub type BatchResult<T> = Result<T, BatchError>;
