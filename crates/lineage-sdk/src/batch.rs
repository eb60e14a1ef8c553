use std::collections::BTreeSet;

use tracing::debug;

use lineage_batch::{BatchOperation, BatchResults, BatchScheduler};
use lineage_store::InMemoryAttributeStore;
use lineage_types::{AttrValue, AttributeKey, EntityId, Member};

use crate::error::SdkResult;
use crate::lineage::Lineage;

/// A batch of own-value reads and writes bound to a [`Lineage`].
///
/// Flushing runs every write before any read (see [`lineage_batch`]) and
/// drops cached resolutions of every written entity and its descendants.
pub struct AttributeBatch<'a> {
    lineage: &'a Lineage,
    scheduler: BatchScheduler<InMemoryAttributeStore>,
}

impl<'a> AttributeBatch<'a> {
    pub(crate) fn new(
        lineage: &'a Lineage,
        scheduler: BatchScheduler<InMemoryAttributeStore>,
    ) -> Self {
        Self { lineage, scheduler }
    }

    pub fn enqueue(&self, operation: BatchOperation) -> &Self {
        self.scheduler.enqueue(operation);
        self
    }

    /// Queue a write.
    pub fn set(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        value: impl Into<AttrValue>,
    ) -> &Self {
        self.enqueue(BatchOperation::set(
            key.clone(),
            entity,
            member.cloned(),
            value.into(),
        ))
    }

    /// Queue a read, reported under its `(key, entity, member)` target.
    pub fn get(&self, key: &AttributeKey, entity: EntityId, member: Option<&Member>) -> &Self {
        self.enqueue(BatchOperation::get(key.clone(), entity, member.cloned()))
    }

    /// Queue a read reported under `id`.
    pub fn get_as(
        &self,
        id: impl Into<String>,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> &Self {
        self.enqueue(BatchOperation::get(key.clone(), entity, member.cloned()).with_id(id))
    }

    pub fn len(&self) -> usize {
        self.scheduler.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduler.is_empty()
    }

    pub fn pending(&self) -> Vec<BatchOperation> {
        self.scheduler.pending()
    }

    pub fn discard(&self) -> usize {
        self.scheduler.discard()
    }

    /// Execute the queued operations.
    ///
    /// Written entities are purged from the cache even when the flush
    /// fails, since a store may have applied part of the writes.
    pub fn flush(&self) -> SdkResult<BatchResults> {
        let operations = self.scheduler.drain();
        let written: BTreeSet<EntityId> = operations
            .iter()
            .filter(|operation| operation.is_set())
            .map(|operation| operation.entity)
            .collect();

        let outcome = self.scheduler.execute(operations);
        if !written.is_empty() {
            let purged = self.lineage.purge(written);
            debug!(purged, "purged cache after batch");
        }
        Ok(outcome?)
    }
}

#[cfg(test)]
mod tests {
    use lineage_batch::ResultKey;
    use lineage_types::MergeStrategy;
    use serde_json::json;

    use super::*;

    fn key(text: &str) -> AttributeKey {
        AttributeKey::parse(text).unwrap()
    }

    #[test]
    fn all_sets_then_all_gets() {
        let lineage = Lineage::new();
        let e = lineage.define_entity("E", None).unwrap();
        let k = key("ui:color");

        let batch = lineage.batch();
        batch
            .set(&k, e, None, "v1")
            .get_as("first", &k, e, None)
            .set(&k, e, None, "v2")
            .get_as("second", &k, e, None);
        assert_eq!(batch.len(), 4);

        let results = batch.flush().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[&ResultKey::id("first")], Some(json!("v2")));
        assert_eq!(results[&ResultKey::id("second")], Some(json!("v2")));
        assert!(batch.is_empty());
    }

    #[test]
    fn flush_refreshes_cached_descendants() {
        let lineage = Lineage::new();
        let base = lineage.define_entity("Base", None).unwrap();
        let child = lineage.define_entity("Child", Some(base)).unwrap();
        let k = key("ui:color");
        lineage.set(&k, base, None, "red").unwrap();
        assert_eq!(
            lineage.resolve(&k, child, None, MergeStrategy::Override).unwrap(),
            Some(json!("red"))
        );

        let batch = lineage.batch();
        batch.set(&k, base, None, "blue").get(&k, child, None);
        let results = batch.flush().unwrap();
        // Batch reads are own values; the child has none.
        assert_eq!(results[&ResultKey::target(k.clone(), child, None)], None);
        assert_eq!(
            lineage.resolve(&k, child, None, MergeStrategy::Override).unwrap(),
            Some(json!("blue"))
        );
    }

    #[test]
    fn get_only_batch_keeps_cache() {
        let lineage = Lineage::new();
        let e = lineage.define_entity("E", None).unwrap();
        let k = key("ui:color");
        lineage.set(&k, e, None, 1).unwrap();
        lineage.resolve(&k, e, None, MergeStrategy::Override).unwrap();

        let batch = lineage.batch();
        batch.get(&k, e, None);
        batch.flush().unwrap();
        assert_eq!(lineage.cache_stats().size, 1);
    }

    #[test]
    fn empty_and_discarded_batches() {
        let lineage = Lineage::new();
        let e = lineage.define_entity("E", None).unwrap();
        let batch = lineage.batch();
        assert!(batch.flush().unwrap().is_empty());

        batch.set(&key("ui:a"), e, None, 1);
        assert_eq!(batch.pending().len(), 1);
        assert_eq!(batch.discard(), 1);
        assert!(batch.flush().unwrap().is_empty());
        assert_eq!(lineage.get_own(&key("ui:a"), e, None).unwrap(), None);
    }

    #[test]
    fn failed_flush_reports_store_error() {
        let lineage = Lineage::new();
        let batch = lineage.batch();
        batch.set(&key("ui:a"), EntityId::from_index(9), None, 1);
        assert!(matches!(
            batch.flush(),
            Err(crate::error::SdkError::Batch(_))
        ));
        assert!(batch.is_empty());
    }
}
