//! Bounded resolution cache for Lineage.
//!
//! [`ResolutionCache`] memoizes resolver output keyed by
//! `(attribute key, entity, member, strategy)`. Entries are derived and
//! disposable: dropping any of them never loses information, it only costs
//! a recomputation.
//!
//! # Policy
//!
//! - Capacity is bounded by [`CacheConfig::max_size`]; inserting into a full
//!   cache evicts the least-recently-used entry first.
//! - Entries older than [`CacheConfig::ttl_millis`] are treated as misses.
//! - A non-positive TTL disables caching entirely.
//! - The cache does not know the entity hierarchy. Callers that mutate the
//!   store pass the affected entity and its descendants to
//!   [`ResolutionCache::invalidate_for`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod entry;

pub use cache::{CacheStats, ResolutionCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheKey};
