use std::collections::BTreeSet;

use lineage_types::{AttrValue, AttributeKey, EntityId, Member};

use crate::error::StoreResult;

/// Borrowed address of one raw record: `(key, entity, member)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RecordRef<'a> {
    pub key: &'a AttributeKey,
    pub entity: EntityId,
    pub member: Option<&'a Member>,
}

impl<'a> RecordRef<'a> {
    pub fn new(key: &'a AttributeKey, entity: EntityId, member: Option<&'a Member>) -> Self {
        Self { key, entity, member }
    }
}

/// Primitive own-value attribute storage.
///
/// All implementations must satisfy these invariants:
/// - Only values set directly on `(key, entity, member)` are visible; there
///   is no implicit inheritance at this layer.
/// - `set_own` overwrites, `delete_own` removes.
/// - The store never interprets values.
/// - Referencing an entity the store does not know is an error.
pub trait AttributeStore: Send + Sync {
    /// Set the own value of `key` on `entity` (optionally narrowed to `member`).
    fn set_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        value: AttrValue,
    ) -> StoreResult<()>;

    /// Read the own value. Returns `Ok(None)` when no record exists.
    fn get_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<Option<AttrValue>>;

    /// Check whether an own record exists.
    fn has_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<bool> {
        Ok(self.get_own(key, entity, member)?.is_some())
    }

    /// Delete an own record. Returns `true` if it existed.
    fn delete_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<bool>;

    /// Keys that have an own record on `(entity, member)`.
    fn list_own_keys(
        &self,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<BTreeSet<AttributeKey>>;

    /// The parent of `entity`, or `None` for a root.
    fn parent_of(&self, entity: EntityId) -> StoreResult<Option<EntityId>>;

    /// Set several records in order.
    ///
    /// Default implementation calls `set_own()` for each record and stops at
    /// the first failure. Backends may override to take their write lock once.
    fn set_batch(&self, records: Vec<(RecordRef<'_>, AttrValue)>) -> StoreResult<()> {
        for (record, value) in records {
            self.set_own(record.key, record.entity, record.member, value)?;
        }
        Ok(())
    }

    /// Read several records in order.
    ///
    /// Default implementation calls `get_own()` for each record.
    fn get_batch(&self, records: &[RecordRef<'_>]) -> StoreResult<Vec<Option<AttrValue>>> {
        records
            .iter()
            .map(|record| self.get_own(record.key, record.entity, record.member))
            .collect()
    }
}
