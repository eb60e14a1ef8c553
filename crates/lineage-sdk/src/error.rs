use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("type error: {0}")]
    Type(#[from] lineage_types::TypeError),

    #[error("store error: {0}")]
    Store(#[from] lineage_store::StoreError),

    #[error("resolve error: {0}")]
    Resolve(#[from] lineage_resolve::ResolveError),

    #[error("loader error: {0}")]
    Loader(#[from] lineage_lazy::LoaderError),

    #[error("batch error: {0}")]
    Batch(#[from] lineage_batch::BatchError),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
