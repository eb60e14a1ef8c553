//! Chain walking and strategy dispatch.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, trace};

use lineage_store::AttributeStore;
use lineage_types::{AttrValue, AttributeKey, EntityId, Member, MergeStrategy};

use crate::error::{ResolveError, ResolveResult};
use crate::merge::{merge_records, LevelRecord};

/// Resolves attribute values across an entity's ancestor chain.
///
/// The resolver holds no state of its own besides the store handle; every
/// call reads the store afresh.
pub struct InheritanceResolver<S: AttributeStore + ?Sized> {
    store: Arc<S>,
}

impl<S: AttributeStore + ?Sized> Clone for InheritanceResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: AttributeStore + ?Sized> InheritanceResolver<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// The ancestor chain of `entity`, most-derived first, `entity` included.
    pub fn chain(&self, entity: EntityId) -> ResolveResult<Vec<EntityId>> {
        let mut visited = HashSet::new();
        let mut chain = Vec::new();
        let mut current = Some(entity);

        while let Some(level) = current {
            if !visited.insert(level) {
                debug!(start = %entity, repeated = %level, "cyclic hierarchy");
                return Err(ResolveError::CyclicHierarchy { entity: level });
            }
            chain.push(level);
            current = self.store.parent_of(level)?;
        }

        Ok(chain)
    }

    /// Own records for `(key, member)` at each chain level that has one,
    /// most-derived first.
    pub fn collect(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> ResolveResult<Vec<LevelRecord>> {
        let mut records = Vec::new();
        for level in self.chain(entity)? {
            if let Some(value) = self.store.get_own(key, level, member)? {
                records.push(LevelRecord {
                    entity: level,
                    value,
                });
            }
        }
        Ok(records)
    }

    /// Resolve `key` on `entity` (optionally narrowed to `member`).
    ///
    /// Returns `Ok(None)` when no level of the chain carries the key.
    pub fn resolve(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        strategy: MergeStrategy,
    ) -> ResolveResult<Option<AttrValue>> {
        let records = self.collect(key, entity, member)?;
        trace!(
            key = %key,
            entity = %entity,
            levels = records.len(),
            strategy = %strategy,
            "resolving attribute"
        );
        merge_records(key, strategy, records)
    }

    /// Like [`resolve`](Self::resolve), with the strategy given as a token.
    pub fn resolve_token(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        token: &str,
    ) -> ResolveResult<Option<AttrValue>> {
        let strategy = token
            .parse::<MergeStrategy>()
            .map_err(|_| ResolveError::InvalidStrategy(token.to_string()))?;
        self.resolve(key, entity, member, strategy)
    }

    /// Resolve every key that has an own record anywhere in the chain.
    pub fn resolve_all(
        &self,
        entity: EntityId,
        member: Option<&Member>,
        strategy: MergeStrategy,
    ) -> ResolveResult<BTreeMap<AttributeKey, AttrValue>> {
        let mut keys = BTreeSet::new();
        for level in self.chain(entity)? {
            keys.extend(self.store.list_own_keys(level, member)?);
        }

        let mut resolved = BTreeMap::new();
        for key in keys {
            if let Some(value) = self.resolve(&key, entity, member, strategy)? {
                resolved.insert(key, value);
            }
        }
        Ok(resolved)
    }
}
