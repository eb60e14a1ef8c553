//! Entity hierarchy arena.
//!
//! [`EntityTable`] stores every entity as a record in a `Vec`, addressed by
//! [`EntityId`] index, together with a parent index and a reverse
//! `children` index for descendant queries.
//!
//! The table does not reject parent assignments that close a cycle. A cycle
//! is an invalid state that traversal code detects and reports.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tracing::debug;

use lineage_types::EntityId;

use crate::error::{StoreError, StoreResult};

#[derive(Clone, Debug)]
struct EntityRecord {
    name: String,
    parent: Option<EntityId>,
}

/// Arena of entity records with parent links.
#[derive(Clone, Debug, Default)]
pub struct EntityTable {
    records: Vec<EntityRecord>,
    by_name: HashMap<String, EntityId>,
    /// Reverse-edge index: parent -> direct children.
    children: HashMap<EntityId, BTreeSet<EntityId>>,
}

impl EntityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Define a new entity, optionally extending `parent`.
    pub fn define(&mut self, name: &str, parent: Option<EntityId>) -> StoreResult<EntityId> {
        if self.by_name.contains_key(name) {
            return Err(StoreError::DuplicateEntity(name.to_string()));
        }
        if let Some(parent) = parent {
            self.ensure_known(parent)?;
        }

        let id = next_id(self.records.len())?;
        self.records.push(EntityRecord {
            name: name.to_string(),
            parent,
        });
        self.by_name.insert(name.to_string(), id);
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().insert(id);
        }

        debug!(entity = %id, name, parent = ?parent, "defined entity");
        Ok(id)
    }

    /// Re-point `entity` at a new parent (or detach it with `None`).
    pub fn set_parent(&mut self, entity: EntityId, parent: Option<EntityId>) -> StoreResult<()> {
        self.ensure_known(entity)?;
        if let Some(parent) = parent {
            self.ensure_known(parent)?;
        }

        let old = self.records[entity.index() as usize].parent;
        if let Some(old) = old {
            if let Some(siblings) = self.children.get_mut(&old) {
                siblings.remove(&entity);
                if siblings.is_empty() {
                    self.children.remove(&old);
                }
            }
        }
        if let Some(parent) = parent {
            self.children.entry(parent).or_default().insert(entity);
        }
        self.records[entity.index() as usize].parent = parent;

        debug!(entity = %entity, old = ?old, new = ?parent, "reparented entity");
        Ok(())
    }

    pub fn parent_of(&self, entity: EntityId) -> StoreResult<Option<EntityId>> {
        self.record(entity).map(|record| record.parent)
    }

    pub fn name_of(&self, entity: EntityId) -> StoreResult<&str> {
        self.record(entity).map(|record| record.name.as_str())
    }

    /// Look up an entity by name.
    pub fn lookup(&self, name: &str) -> StoreResult<EntityId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| StoreError::EntityNotFound(name.to_string()))
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        (entity.index() as usize) < self.records.len()
    }

    /// Direct children of `entity`, sorted by id.
    pub fn children_of(&self, entity: EntityId) -> StoreResult<Vec<EntityId>> {
        self.ensure_known(entity)?;
        Ok(self
            .children
            .get(&entity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    /// All transitive descendants of `entity` (BFS order, excluding `entity`).
    ///
    /// Terminates on cyclic hierarchies; every node is reported at most once.
    pub fn descendants_of(&self, entity: EntityId) -> StoreResult<Vec<EntityId>> {
        self.ensure_known(entity)?;

        let mut visited = HashSet::new();
        visited.insert(entity);
        let mut result = Vec::new();
        let mut queue = VecDeque::from([entity]);

        while let Some(current) = queue.pop_front() {
            if let Some(children) = self.children.get(&current) {
                for child in children {
                    if visited.insert(*child) {
                        result.push(*child);
                        queue.push_back(*child);
                    }
                }
            }
        }

        Ok(result)
    }

    /// `entity` followed by all of its descendants.
    pub fn subtree_of(&self, entity: EntityId) -> StoreResult<Vec<EntityId>> {
        let mut subtree = vec![entity];
        subtree.extend(self.descendants_of(entity)?);
        Ok(subtree)
    }

    pub fn ensure_known(&self, entity: EntityId) -> StoreResult<()> {
        if self.contains(entity) {
            Ok(())
        } else {
            Err(StoreError::UnknownEntity(entity))
        }
    }

    fn record(&self, entity: EntityId) -> StoreResult<&EntityRecord> {
        self.records
            .get(entity.index() as usize)
            .ok_or(StoreError::UnknownEntity(entity))
    }
}

/// The id for the record that will land at index `len`.
fn next_id(len: usize) -> StoreResult<EntityId> {
    u32::try_from(len)
        .map(EntityId::from_index)
        .map_err(|_| StoreError::CapacityExceeded(len))
}
