//! High-level SDK for Lineage.
//!
//! [`Lineage`] is the main entry point for applications embedding the
//! attribute store. It ties together raw storage, inheritance resolution,
//! the resolution cache, lazy loaders and batching, and keeps the cache
//! coherent with every mutation made through it.

mod bindings;

pub mod batch;
pub mod config;
pub mod declaration;
pub mod error;
pub mod lineage;

pub use batch::AttributeBatch;
pub use config::LineageConfig;
pub use declaration::Declaration;
pub use error::{SdkError, SdkResult};
pub use lineage::Lineage;

// Re-export key types
pub use lineage_batch::{BatchOperation, BatchResults, ResultKey};
pub use lineage_cache::{CacheConfig, CacheStats, Clock, ManualClock, SystemClock};
pub use lineage_lazy::{BoxError, LoadState, LoaderError, LoaderKey};
pub use lineage_resolve::ResolveError;
pub use lineage_store::{AttributeStore, InMemoryAttributeStore, StoreError};
pub use lineage_types::{AttrValue, AttributeKey, EntityId, KeyRegistry, Member, MergeStrategy};
