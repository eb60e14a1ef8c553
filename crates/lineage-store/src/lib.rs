//! Raw attribute storage for Lineage.
//!
//! This crate holds the primitive `(key, entity, member) -> value` records
//! and the entity hierarchy they hang off. It performs no inheritance: every
//! read returns only the value set directly on the requested entity.
//!
//! # Storage Backends
//!
//! All backends implement the [`AttributeStore`] trait:
//!
//! - [`InMemoryAttributeStore`] -- `HashMap`-based store for tests and embedding
//!
//! # Design Rules
//!
//! 1. Records are overwritten on set and removed on delete.
//! 2. The store never interprets attribute values.
//! 3. Hierarchy lookups go through [`AttributeStore::parent_of`]; cycles are
//!    representable here and detected by the resolver.
//! 4. Unknown entities are errors, missing records are `None`.

pub mod error;
pub mod hierarchy;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use hierarchy::EntityTable;
pub use memory::InMemoryAttributeStore;
pub use traits::{AttributeStore, RecordRef};
