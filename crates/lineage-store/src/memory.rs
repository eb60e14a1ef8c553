use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use tracing::debug;

use lineage_types::{AttrValue, AttributeKey, EntityId, Member};

use crate::error::StoreResult;
use crate::hierarchy::EntityTable;
use crate::traits::{AttributeStore, RecordRef};

/// Records grouped by the scope they are attached to.
type Scope = (EntityId, Option<Member>);

/// In-memory, HashMap-based attribute store.
///
/// Intended for tests and embedding. The hierarchy table and the records
/// sit behind separate `RwLock`s; values are cloned on read and write.
pub struct InMemoryAttributeStore {
    hierarchy: RwLock<EntityTable>,
    records: RwLock<HashMap<Scope, BTreeMap<AttributeKey, AttrValue>>>,
}

impl InMemoryAttributeStore {
    /// Create a new store with an empty hierarchy.
    pub fn new() -> Self {
        Self::with_hierarchy(EntityTable::new())
    }

    /// Create a store over an existing hierarchy table.
    pub fn with_hierarchy(table: EntityTable) -> Self {
        Self {
            hierarchy: RwLock::new(table),
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Define an entity; see [`EntityTable::define`].
    pub fn define_entity(&self, name: &str, parent: Option<EntityId>) -> StoreResult<EntityId> {
        self.hierarchy
            .write()
            .expect("hierarchy lock poisoned")
            .define(name, parent)
    }

    /// Re-point an entity at a new parent; see [`EntityTable::set_parent`].
    pub fn set_parent(&self, entity: EntityId, parent: Option<EntityId>) -> StoreResult<()> {
        self.hierarchy
            .write()
            .expect("hierarchy lock poisoned")
            .set_parent(entity, parent)
    }

    pub fn lookup(&self, name: &str) -> StoreResult<EntityId> {
        self.hierarchy.read().expect("hierarchy lock poisoned").lookup(name)
    }

    pub fn name_of(&self, entity: EntityId) -> StoreResult<String> {
        self.hierarchy
            .read()
            .expect("hierarchy lock poisoned")
            .name_of(entity)
            .map(str::to_string)
    }

    /// `entity` and every entity that inherits from it.
    pub fn subtree_of(&self, entity: EntityId) -> StoreResult<Vec<EntityId>> {
        self.hierarchy
            .read()
            .expect("hierarchy lock poisoned")
            .subtree_of(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.hierarchy.read().expect("hierarchy lock poisoned").len()
    }

    /// Total number of own records across all scopes.
    pub fn record_count(&self) -> usize {
        self.records
            .read()
            .expect("records lock poisoned")
            .values()
            .map(BTreeMap::len)
            .sum()
    }

    /// Remove every record. The hierarchy is kept.
    pub fn clear_records(&self) {
        self.records.write().expect("records lock poisoned").clear();
    }

    fn ensure_known(&self, entity: EntityId) -> StoreResult<()> {
        self.hierarchy
            .read()
            .expect("hierarchy lock poisoned")
            .ensure_known(entity)
    }
}

impl Default for InMemoryAttributeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeStore for InMemoryAttributeStore {
    fn set_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        value: AttrValue,
    ) -> StoreResult<()> {
        self.ensure_known(entity)?;
        let mut map = self.records.write().expect("records lock poisoned");
        map.entry((entity, member.cloned()))
            .or_default()
            .insert(key.clone(), value);
        debug!(key = %key, entity = %entity, member = ?member, "set own attribute");
        Ok(())
    }

    fn get_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<Option<AttrValue>> {
        self.ensure_known(entity)?;
        let map = self.records.read().expect("records lock poisoned");
        Ok(map
            .get(&(entity, member.cloned()))
            .and_then(|scope| scope.get(key))
            .cloned())
    }

    fn has_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<bool> {
        self.ensure_known(entity)?;
        let map = self.records.read().expect("records lock poisoned");
        Ok(map
            .get(&(entity, member.cloned()))
            .is_some_and(|scope| scope.contains_key(key)))
    }

    fn delete_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<bool> {
        self.ensure_known(entity)?;
        let mut map = self.records.write().expect("records lock poisoned");
        let scope_key = (entity, member.cloned());
        let Some(scope) = map.get_mut(&scope_key) else {
            return Ok(false);
        };
        let removed = scope.remove(key).is_some();
        if scope.is_empty() {
            map.remove(&scope_key);
        }
        if removed {
            debug!(key = %key, entity = %entity, member = ?member, "deleted own attribute");
        }
        Ok(removed)
    }

    fn list_own_keys(
        &self,
        entity: EntityId,
        member: Option<&Member>,
    ) -> StoreResult<BTreeSet<AttributeKey>> {
        self.ensure_known(entity)?;
        let map = self.records.read().expect("records lock poisoned");
        Ok(map
            .get(&(entity, member.cloned()))
            .map(|scope| scope.keys().cloned().collect())
            .unwrap_or_default())
    }

    fn parent_of(&self, entity: EntityId) -> StoreResult<Option<EntityId>> {
        self.hierarchy
            .read()
            .expect("hierarchy lock poisoned")
            .parent_of(entity)
    }

    fn set_batch(&self, records: Vec<(RecordRef<'_>, AttrValue)>) -> StoreResult<()> {
        {
            let hierarchy = self.hierarchy.read().expect("hierarchy lock poisoned");
            for (record, _) in &records {
                hierarchy.ensure_known(record.entity)?;
            }
        }
        let count = records.len();
        let mut map = self.records.write().expect("records lock poisoned");
        for (record, value) in records {
            map.entry((record.entity, record.member.cloned()))
                .or_default()
                .insert(record.key.clone(), value);
        }
        debug!(count, "set attribute batch");
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryAttributeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAttributeStore")
            .field("entity_count", &self.entity_count())
            .field("record_count", &self.record_count())
            .finish()
    }
}
