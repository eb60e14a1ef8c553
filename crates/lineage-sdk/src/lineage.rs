use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info};

use lineage_batch::BatchScheduler;
use lineage_cache::{CacheKey, CacheStats, Clock, ResolutionCache};
use lineage_lazy::{BoxError, LazyLoader, LoadState, LoaderError, LoaderKey};
use lineage_resolve::{InheritanceResolver, ResolveError};
use lineage_store::{AttributeStore, InMemoryAttributeStore};
use lineage_types::{AttrValue, AttributeKey, EntityId, KeyRegistry, Member, MergeStrategy};

use crate::batch::AttributeBatch;
use crate::bindings::LoaderBindings;
use crate::config::LineageConfig;
use crate::declaration::Declaration;
use crate::error::SdkResult;

/// High-level Lineage API.
///
/// Owns an in-memory store and keeps the resolution cache coherent with it:
/// every mutation made through this type drops the cached resolutions of
/// the mutated entity and of everything that inherits from it.
pub struct Lineage {
    config: LineageConfig,
    store: Arc<InMemoryAttributeStore>,
    resolver: InheritanceResolver<InMemoryAttributeStore>,
    cache: Arc<ResolutionCache>,
    loader: LazyLoader<()>,
    bindings: Arc<LoaderBindings>,
    keys: KeyRegistry,
}

impl Lineage {
    pub fn new() -> Self {
        Self::with_config(LineageConfig::default())
    }

    pub fn with_config(config: LineageConfig) -> Self {
        let cache = ResolutionCache::new(config.cache.clone());
        Self::assemble(config, cache)
    }

    /// Build an instance whose cache runs on `clock`.
    pub fn with_clock(config: LineageConfig, clock: Arc<dyn Clock>) -> Self {
        let cache = ResolutionCache::with_clock(config.cache.clone(), clock);
        Self::assemble(config, cache)
    }

    fn assemble(config: LineageConfig, cache: ResolutionCache) -> Self {
        let store = Arc::new(InMemoryAttributeStore::new());
        info!(
            cache_max_size = config.cache.max_size,
            cache_ttl_millis = config.cache.ttl_millis,
            cache_enabled = config.cache.is_enabled(),
            "lineage initialized"
        );
        Self {
            config,
            resolver: InheritanceResolver::new(Arc::clone(&store)),
            store,
            cache: Arc::new(cache),
            loader: LazyLoader::new(),
            bindings: Arc::new(LoaderBindings::default()),
            keys: KeyRegistry::new(),
        }
    }

    pub fn config(&self) -> &LineageConfig {
        &self.config
    }

    /// The underlying store. Writes made directly on it bypass cache
    /// invalidation.
    pub fn store(&self) -> &Arc<InMemoryAttributeStore> {
        &self.store
    }

    // ---- Entities ----

    pub fn define_entity(&self, name: &str, parent: Option<EntityId>) -> SdkResult<EntityId> {
        Ok(self.store.define_entity(name, parent)?)
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> SdkResult<EntityId> {
        Ok(self.store.lookup(name)?)
    }

    pub fn entity_name(&self, entity: EntityId) -> SdkResult<String> {
        Ok(self.store.name_of(entity)?)
    }

    /// Re-point `entity` at a new parent.
    pub fn set_parent(&self, entity: EntityId, parent: Option<EntityId>) -> SdkResult<()> {
        self.store.set_parent(entity, parent)?;
        self.purge([entity]);
        Ok(())
    }

    // ---- Keys ----

    /// Parse `text` and register it as a known attribute key.
    pub fn key(&self, text: &str) -> SdkResult<AttributeKey> {
        Ok(self.keys.register_str(text)?)
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    // ---- Own values ----

    pub fn set(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        value: impl Into<AttrValue>,
    ) -> SdkResult<()> {
        self.store.set_own(key, entity, member, value.into())?;
        self.purge([entity]);
        Ok(())
    }

    /// Remove an own value. Returns `true` if it existed.
    pub fn delete(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> SdkResult<bool> {
        let existed = self.store.delete_own(key, entity, member)?;
        if existed {
            self.purge([entity]);
        }
        Ok(existed)
    }

    /// The value set directly on `entity`, ignoring inheritance.
    pub fn get_own(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
    ) -> SdkResult<Option<AttrValue>> {
        Ok(self.store.get_own(key, entity, member)?)
    }

    /// Start declaring attributes on `entity`.
    pub fn declare(&self, entity: EntityId) -> Declaration<'_> {
        Declaration::new(self, entity)
    }

    /// Start a batch of reads and writes.
    pub fn batch(&self) -> AttributeBatch<'_> {
        AttributeBatch::new(self, BatchScheduler::new(Arc::clone(&self.store)))
    }

    // ---- Resolution ----

    /// Resolve `key` on `entity` through its ancestor chain, using the
    /// cache.
    pub fn resolve(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        strategy: MergeStrategy,
    ) -> SdkResult<Option<AttrValue>> {
        let cache_key = CacheKey::new(key.clone(), entity, member.cloned(), strategy);
        let value = self.cache.get(&cache_key, || {
            self.resolver.resolve(key, entity, member, strategy)
        })?;
        Ok(value)
    }

    /// Like [`resolve`](Self::resolve), with the strategy given as a token
    /// such as `"merge"`.
    pub fn resolve_token(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        token: &str,
    ) -> SdkResult<Option<AttrValue>> {
        let strategy = token
            .parse::<MergeStrategy>()
            .map_err(|_| ResolveError::InvalidStrategy(token.to_string()))?;
        self.resolve(key, entity, member, strategy)
    }

    /// Resolve every attribute visible on `entity`. Not cached.
    pub fn resolve_all(
        &self,
        entity: EntityId,
        member: Option<&Member>,
        strategy: MergeStrategy,
    ) -> SdkResult<BTreeMap<AttributeKey, AttrValue>> {
        Ok(self.resolver.resolve_all(entity, member, strategy)?)
    }

    /// Run every loader bound to an entity in the chain of `entity`, then
    /// resolve.
    pub async fn resolve_loaded(
        &self,
        key: &AttributeKey,
        entity: EntityId,
        member: Option<&Member>,
        strategy: MergeStrategy,
    ) -> SdkResult<Option<AttrValue>> {
        let chain = self.resolver.chain(entity)?;
        for loader in self.bindings.loaders_for(&chain) {
            self.loader.ensure_loaded(&loader).await?;
        }
        self.resolve(key, entity, member, strategy)
    }

    /// The ancestor chain of `entity`, most-derived first.
    pub fn chain(&self, entity: EntityId) -> SdkResult<Vec<EntityId>> {
        Ok(self.resolver.chain(entity)?)
    }

    // ---- Loaders ----

    /// Register a loader that populates the store.
    ///
    /// `loader` receives a handle to the store and writes into it directly.
    /// When it succeeds, cached resolutions of every entity bound to `key`
    /// (and their descendants) are dropped. Returns `true` if an existing
    /// loader was replaced.
    pub fn register_loader<F, Fut, E, I, D>(
        &self,
        key: impl Into<LoaderKey>,
        dependencies: I,
        loader: F,
    ) -> bool
    where
        F: Fn(Arc<InMemoryAttributeStore>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
        I: IntoIterator<Item = D>,
        D: Into<LoaderKey>,
    {
        let key = key.into();
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let bindings = Arc::clone(&self.bindings);
        let name = key.clone();

        let replaced = self
            .loader
            .register_with_dependencies(key.clone(), dependencies, move || {
                let populate = loader(Arc::clone(&store));
                let store = Arc::clone(&store);
                let cache = Arc::clone(&cache);
                let bindings = Arc::clone(&bindings);
                let name = name.clone();
                async move {
                    populate.await.map_err(Into::<BoxError>::into)?;
                    let bound = bindings.entities_for([&name]);
                    purge_subtrees(&store, &cache, bound);
                    Ok::<(), BoxError>(())
                }
            });

        if replaced {
            self.invalidate_loader(&key);
        }
        replaced
    }

    /// Declare that `loader` populates attributes of `entity`.
    ///
    /// [`resolve_loaded`](Self::resolve_loaded) on `entity` or any of its
    /// descendants runs the loader first.
    pub fn bind_loader(&self, entity: EntityId, loader: impl Into<LoaderKey>) -> SdkResult<()> {
        let loader = loader.into();
        self.store.name_of(entity)?;
        if self.loader.state(&loader).is_none() {
            return Err(LoaderError::UnknownLoader(loader).into());
        }
        if self.bindings.bind(loader.clone(), entity) {
            debug!(loader = %loader, entity = %entity, "bound loader");
        }
        Ok(())
    }

    /// Remove a binding made with [`bind_loader`](Self::bind_loader).
    pub fn unbind_loader(&self, entity: EntityId, loader: &LoaderKey) -> bool {
        self.bindings.unbind(loader, entity)
    }

    /// Run `key` (and its dependencies) if it has not run yet.
    pub async fn ensure_loaded(&self, key: &LoaderKey) -> SdkResult<()> {
        self.loader.ensure_loaded(key).await?;
        Ok(())
    }

    /// Reset `key` and every loader depending on it, dropping cached
    /// resolutions of all entities bound to any of them.
    ///
    /// Returns the loader keys that were reset.
    pub fn invalidate_loader(&self, key: &LoaderKey) -> Vec<LoaderKey> {
        let reset = self.loader.invalidate(key);
        let bound = self.bindings.entities_for(&reset);
        purge_subtrees(&self.store, &self.cache, bound);
        reset
    }

    pub fn loader_state(&self, key: &LoaderKey) -> Option<LoadState> {
        self.loader.state(key)
    }

    // ---- Cache ----

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Drop every cached resolution.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Drop cached resolutions of `roots` and all of their descendants.
    pub(crate) fn purge<I>(&self, roots: I) -> usize
    where
        I: IntoIterator<Item = EntityId>,
    {
        purge_subtrees(&self.store, &self.cache, roots)
    }
}

impl Default for Lineage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Lineage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lineage")
            .field("store", &self.store)
            .field("cache", &self.cache)
            .field("loader", &self.loader)
            .field("keys", &self.keys.len())
            .finish()
    }
}

fn purge_subtrees<I>(store: &InMemoryAttributeStore, cache: &ResolutionCache, roots: I) -> usize
where
    I: IntoIterator<Item = EntityId>,
{
    let mut affected = BTreeSet::new();
    for root in roots {
        match store.subtree_of(root) {
            Ok(subtree) => affected.extend(subtree),
            Err(_) => {
                affected.insert(root);
            }
        }
    }
    cache.invalidate_for(affected)
}
