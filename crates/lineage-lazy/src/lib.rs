//! Dependency-tracked lazy loading for Lineage.
//!
//! A [`LazyLoader`] holds named loader functions together with the keys
//! they depend on. [`LazyLoader::ensure_loaded`] runs a loader at most once
//! until it is invalidated, loading its dependencies first.
//!
//! # State Machine
//!
//! ```text
//! NotLoaded --ensure_loaded--> Loading --ok--> Loaded
//!     ^                           |              |
//!     +----------- err -----------+              |
//!     +---------------- invalidate --------------+
//! ```
//!
//! Concurrent callers for a key that is already `Loading` share the running
//! load and observe the same outcome. Invalidating a key also resets every
//! key that depends on it, directly or transitively.

pub mod error;
pub mod key;
pub mod loader;

pub use error::{BoxError, LoaderError, LoaderResult};
pub use key::{LoadState, LoaderKey};
pub use loader::{LazyLoader, LoadFuture};
