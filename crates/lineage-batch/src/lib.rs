//! Batched attribute access for Lineage.
//!
//! A [`BatchScheduler`] queues [`BatchOperation`]s and executes them
//! against an [`AttributeStore`](lineage_store::AttributeStore) on
//! [`flush`](BatchScheduler::flush).
//!
//! # Execution Order
//!
//! A flush runs every `Set` first, in enqueue order, then every `Get`, in
//! enqueue order. A `Get` therefore observes all writes queued in the same
//! batch, including ones queued after it:
//!
//! ```text
//! enqueue:  Set(k, v1)  Get(k)  Set(k, v2)  Get(k)
//! execute:  Set(k, v1)  Set(k, v2)  Get(k) -> v2  Get(k) -> v2
//! ```

pub mod error;
pub mod operation;
pub mod scheduler;

pub use error::{BatchError, BatchResult};
pub use operation::{BatchOperation, OperationKind, ResultKey};
pub use scheduler::{BatchResults, BatchScheduler};
