use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use lineage_store::{AttributeStore, RecordRef};
use lineage_types::AttrValue;

use crate::error::BatchResult;
use crate::operation::{BatchOperation, OperationKind, ResultKey};

/// Results of a flush, one per `Get`. `Set`s never appear.
///
/// Two `Get`s sharing a result key collapse into one entry; the later one
/// wins.
pub type BatchResults = HashMap<ResultKey, Option<AttrValue>>;

/// Queues store operations and runs them in a single pass.
///
/// See the crate docs for the execution order.
pub struct BatchScheduler<S: AttributeStore + ?Sized> {
    store: Arc<S>,
    queue: Mutex<Vec<BatchOperation>>,
}

impl<S: AttributeStore + ?Sized> BatchScheduler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            queue: Mutex::new(Vec::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Queue an operation for the next flush.
    pub fn enqueue(&self, operation: BatchOperation) {
        self.lock().push(operation);
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Snapshot of the queued operations, in enqueue order.
    pub fn pending(&self) -> Vec<BatchOperation> {
        self.lock().clone()
    }

    /// Drop every queued operation without running it. Returns how many
    /// were dropped.
    pub fn discard(&self) -> usize {
        let mut queue = self.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    /// Take every queued operation, leaving the queue empty.
    pub fn drain(&self) -> Vec<BatchOperation> {
        std::mem::take(&mut *self.lock())
    }

    /// Drain the queue and execute it.
    ///
    /// The queue is emptied even if execution fails.
    pub fn flush(&self) -> BatchResult<BatchResults> {
        let operations = self.drain();
        self.execute(operations)
    }

    /// Execute `operations` against the store: every `Set` first, then every
    /// `Get`, each in the order given.
    pub fn execute(&self, operations: Vec<BatchOperation>) -> BatchResult<BatchResults> {
        if operations.is_empty() {
            return Ok(BatchResults::new());
        }

        let (sets, gets): (Vec<_>, Vec<_>) =
            operations.iter().partition(|operation| operation.is_set());

        let writes: Vec<(RecordRef<'_>, AttrValue)> = sets
            .iter()
            .filter_map(|operation| match &operation.kind {
                OperationKind::Set(value) => Some((
                    RecordRef::new(&operation.key, operation.entity, operation.member.as_ref()),
                    value.clone(),
                )),
                OperationKind::Get => None,
            })
            .collect();
        self.store.set_batch(writes)?;

        let reads: Vec<RecordRef<'_>> = gets
            .iter()
            .map(|operation| {
                RecordRef::new(&operation.key, operation.entity, operation.member.as_ref())
            })
            .collect();
        let values = self.store.get_batch(&reads)?;

        let results: BatchResults = gets
            .iter()
            .map(|operation| operation.result_key())
            .zip(values)
            .collect();

        debug!(
            sets = sets.len(),
            gets = gets.len(),
            results = results.len(),
            "flushed batch"
        );
        Ok(results)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<BatchOperation>> {
        self.queue.lock().expect("batch queue lock poisoned")
    }
}

impl<S: AttributeStore + ?Sized> std::fmt::Debug for BatchScheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let queued = self.queue.lock().map(|q| q.len()).unwrap_or_default();
        f.debug_struct("BatchScheduler")
            .field("queued", &queued)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_store::{InMemoryAttributeStore, StoreError};
    use lineage_types::{AttributeKey, EntityId, Member};
    use serde_json::json;

    use crate::error::BatchError;

    fn setup() -> (Arc<InMemoryAttributeStore>, EntityId, BatchScheduler<InMemoryAttributeStore>) {
        let store = Arc::new(InMemoryAttributeStore::new());
        let entity = store.define_entity("Widget", None).unwrap();
        let scheduler = BatchScheduler::new(Arc::clone(&store));
        (store, entity, scheduler)
    }

    fn key(name: &str) -> AttributeKey {
        AttributeKey::new("ui", name).unwrap()
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[test]
    fn sets_run_before_gets() {
        let (_store, e, batch) = setup();
        batch.enqueue(BatchOperation::set(key("color"), e, None, json!("v1")));
        batch.enqueue(BatchOperation::get(key("color"), e, None).with_id("g1"));
        batch.enqueue(BatchOperation::set(key("color"), e, None, json!("v2")));
        batch.enqueue(BatchOperation::get(key("color"), e, None).with_id("g2"));

        let results = batch.flush().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[&ResultKey::id("g1")], Some(json!("v2")));
        assert_eq!(results[&ResultKey::id("g2")], Some(json!("v2")));
    }

    #[test]
    fn sets_apply_in_enqueue_order() {
        let (store, e, batch) = setup();
        for n in 0..5 {
            batch.enqueue(BatchOperation::set(key("count"), e, None, json!(n)));
        }
        assert!(batch.flush().unwrap().is_empty());
        assert_eq!(store.get_own(&key("count"), e, None).unwrap(), Some(json!(4)));
    }

    // -----------------------------------------------------------------------
    // Result keys
    // -----------------------------------------------------------------------

    #[test]
    fn results_keyed_by_target_without_id() {
        let (store, e, batch) = setup();
        let title = Member::new("title").unwrap();
        store.set_own(&key("label"), e, Some(&title), json!("Name")).unwrap();

        batch.enqueue(BatchOperation::get(key("label"), e, Some(title.clone())));
        batch.enqueue(BatchOperation::get(key("label"), e, None));

        let results = batch.flush().unwrap();
        assert_eq!(
            results[&ResultKey::target(key("label"), e, Some(title))],
            Some(json!("Name"))
        );
        assert_eq!(results[&ResultKey::target(key("label"), e, None)], None);
    }

    #[test]
    fn sets_never_appear_in_results() {
        let (_store, e, batch) = setup();
        batch.enqueue(BatchOperation::set(key("a"), e, None, json!(1)).with_id("write"));
        let results = batch.flush().unwrap();
        assert!(!results.contains_key(&ResultKey::id("write")));
        assert!(results.is_empty());
    }

    #[test]
    fn gets_see_own_values_only() {
        let (store, parent, batch) = setup();
        let child = store.define_entity("Button", Some(parent)).unwrap();
        batch.enqueue(BatchOperation::set(key("color"), parent, None, json!("red")));
        batch.enqueue(BatchOperation::get(key("color"), child, None));

        let results = batch.flush().unwrap();
        assert_eq!(results[&ResultKey::target(key("color"), child, None)], None);
    }

    // -----------------------------------------------------------------------
    // Queue management
    // -----------------------------------------------------------------------

    #[test]
    fn empty_flush_returns_empty_map() {
        let (_store, _e, batch) = setup();
        assert!(batch.is_empty());
        assert!(batch.flush().unwrap().is_empty());
    }

    #[test]
    fn flush_drains_queue() {
        let (_store, e, batch) = setup();
        batch.enqueue(BatchOperation::get(key("a"), e, None));
        assert_eq!(batch.len(), 1);
        batch.flush().unwrap();
        assert!(batch.is_empty());
        assert!(batch.flush().unwrap().is_empty());
    }

    #[test]
    fn pending_and_discard() {
        let (store, e, batch) = setup();
        batch.enqueue(BatchOperation::set(key("a"), e, None, json!(1)));
        batch.enqueue(BatchOperation::get(key("a"), e, None));
        let pending = batch.pending();
        assert_eq!(pending.len(), 2);
        assert!(pending[0].is_set());

        assert_eq!(batch.discard(), 2);
        assert!(batch.is_empty());
        assert_eq!(store.get_own(&key("a"), e, None).unwrap(), None);
    }

    #[test]
    fn failed_flush_still_drains() {
        let (store, e, batch) = setup();
        let ghost = EntityId::from_index(99);
        batch.enqueue(BatchOperation::set(key("a"), e, None, json!(1)));
        batch.enqueue(BatchOperation::set(key("a"), ghost, None, json!(2)));

        let err = batch.flush().unwrap_err();
        assert_eq!(err, BatchError::Store(StoreError::UnknownEntity(ghost)));
        assert!(batch.is_empty());
        // The in-memory backend validates every write before applying any.
        assert_eq!(store.get_own(&key("a"), e, None).unwrap(), None);
    }

    #[test]
    fn works_over_trait_objects() {
        let store = Arc::new(InMemoryAttributeStore::new());
        let e = store.define_entity("Widget", None).unwrap();
        let dyn_store: Arc<dyn AttributeStore> = store;
        let batch = BatchScheduler::new(dyn_store);
        batch.enqueue(BatchOperation::set(key("a"), e, None, json!(true)));
        batch.enqueue(BatchOperation::get(key("a"), e, None).with_id("a"));
        assert_eq!(batch.flush().unwrap()[&ResultKey::id("a")], Some(json!(true)));
    }
}
