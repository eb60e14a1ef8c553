//! Inheritance-aware attribute resolution for Lineage.
//!
//! [`InheritanceResolver`] walks an entity's ancestor chain through an
//! [`AttributeStore`](lineage_store::AttributeStore), collects the own value
//! found at each level, and combines them with a
//! [`MergeStrategy`](lineage_types::MergeStrategy).
//!
//! # Resolution Rules
//!
//! - No value anywhere in the chain resolves to `None`.
//! - A single value is returned verbatim under every strategy.
//! - Several values combine per strategy: `override` keeps the most-derived,
//!   `merge` shallow-merges maps base-first, `concat` appends sequences
//!   base-first.
//! - Revisiting an entity while walking the chain is a
//!   [`ResolveError::CyclicHierarchy`].

pub mod error;
pub mod merge;
pub mod resolver;

pub use error::{ResolveError, ResolveResult};
pub use merge::{merge_records, value_kind, LevelRecord};
pub use resolver::InheritanceResolver;
