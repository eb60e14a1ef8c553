use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use lineage_types::{AttrValue, AttributeKey, EntityId};

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::entry::{CacheEntry, CacheKey};

/// Counters exposed by [`ResolutionCache::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Entries dropped because their TTL had passed.
    pub expirations: u64,
    /// Entries dropped by explicit invalidation.
    pub invalidations: u64,
    /// Entries currently held.
    pub size: usize,
}

impl CacheStats {
    /// Fraction of lookups served from the cache, `0.0` when none happened.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, CacheEntry>,
    next_seq: u64,
    /// Bumped by every invalidation; a miss only inserts if it is unchanged.
    epoch: u64,
    stats: CacheStats,
}

impl CacheState {
    /// Look up `key`, dropping it if expired. Returns the value on a hit.
    fn lookup(&mut self, key: &CacheKey, now: u64, ttl: u64) -> Option<Option<AttrValue>> {
        let expired = match self.entries.get_mut(key) {
            None => return None,
            Some(entry) if entry.is_expired(now, ttl) => true,
            Some(entry) => {
                entry.touch(now);
                self.stats.hits += 1;
                return Some(entry.value.clone());
            }
        };
        if expired {
            self.entries.remove(key);
            self.stats.expirations += 1;
            trace!(key = %key.key, entity = %key.entity, "cache entry expired");
        }
        None
    }

    fn insert(&mut self, key: CacheKey, value: Option<AttrValue>, now: u64, max_size: usize) {
        if !self.entries.contains_key(&key) && self.entries.len() >= max_size {
            self.evict_one();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(key, CacheEntry::new(value, now, seq));
    }

    fn evict_one(&mut self) {
        let victim = self
            .entries
            .iter()
            .min_by(|(_, a), (_, b)| a.eviction_order(b))
            .map(|(key, _)| key.clone());
        if let Some(victim) = victim {
            self.entries.remove(&victim);
            self.stats.evictions += 1;
            debug!(key = %victim.key, entity = %victim.entity, "evicted cache entry");
        }
    }

    fn remove_where(&mut self, mut predicate: impl FnMut(&CacheKey) -> bool) -> usize {
        self.epoch += 1;
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        let removed = before - self.entries.len();
        self.stats.invalidations += removed as u64;
        removed
    }
}

/// Bounded, TTL-aware memo of resolution results.
///
/// All bookkeeping sits behind one `Mutex`, so each lookup, insert and
/// eviction is atomic. The `compute` callback of [`get`](Self::get) runs
/// outside the lock; two callers missing on the same key concurrently may
/// both compute, and the later insert replaces the earlier one. A result
/// whose compute overlapped any invalidation is returned but not stored.
pub struct ResolutionCache {
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<CacheState>,
}

impl ResolutionCache {
    /// Create a cache driven by the system clock.
    pub fn new(config: CacheConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Create a cache driven by a caller-supplied clock.
    pub fn with_clock(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached resolution for `key`, computing and storing it on
    /// a miss.
    ///
    /// Errors from `compute` are returned as-is and nothing is stored.
    pub fn get<E, F>(&self, key: &CacheKey, compute: F) -> Result<Option<AttrValue>, E>
    where
        F: FnOnce() -> Result<Option<AttrValue>, E>,
    {
        if !self.config.is_enabled() {
            self.lock().stats.misses += 1;
            return compute();
        }

        let ttl = self.config.ttl_millis as u64;
        let epoch = {
            let mut state = self.lock();
            if let Some(value) = state.lookup(key, self.clock.now_millis(), ttl) {
                trace!(key = %key.key, entity = %key.entity, "cache hit");
                return Ok(value);
            }
            state.stats.misses += 1;
            state.epoch
        };

        trace!(key = %key.key, entity = %key.entity, "cache miss");
        let value = compute()?;

        let mut state = self.lock();
        if state.epoch != epoch {
            trace!(key = %key.key, entity = %key.entity, "invalidated during compute; not stored");
            return Ok(value);
        }
        state.insert(
            key.clone(),
            value.clone(),
            self.clock.now_millis(),
            self.config.max_size,
        );
        Ok(value)
    }

    /// Whether a live (unexpired) entry exists. Does not touch LRU state or
    /// statistics.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.peek(key).is_some()
    }

    /// A copy of the live entry for `key`, without touching LRU state or
    /// statistics.
    pub fn peek(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = self.clock.now_millis();
        let ttl = self.config.ttl_millis.max(0) as u64;
        let state = self.lock();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now, ttl))
            .cloned()
    }

    /// Drop every entry keyed by one of `entities`.
    ///
    /// Callers pass the mutated entity together with all of its descendants,
    /// since a descendant's resolution walks through its ancestors.
    pub fn invalidate_for<I>(&self, entities: I) -> usize
    where
        I: IntoIterator<Item = EntityId>,
    {
        let targets: HashSet<EntityId> = entities.into_iter().collect();
        if targets.is_empty() {
            return 0;
        }
        let removed = self.lock().remove_where(|key| targets.contains(&key.entity));
        if removed > 0 {
            debug!(removed, entities = targets.len(), "invalidated cache entries");
        }
        removed
    }

    /// Drop every entry for `attribute`, across all entities and strategies.
    pub fn invalidate_key(&self, attribute: &AttributeKey) -> usize {
        let removed = self.lock().remove_where(|key| &key.key == attribute);
        if removed > 0 {
            debug!(key = %attribute, removed, "invalidated cache entries");
        }
        removed
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        if !self.config.is_enabled() {
            return 0;
        }
        let now = self.clock.now_millis();
        let ttl = self.config.ttl_millis as u64;
        let mut state = self.lock();
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.is_expired(now, ttl));
        let removed = before - state.entries.len();
        state.stats.expirations += removed as u64;
        removed
    }

    /// Drop everything. Statistics other than `size` are kept.
    pub fn clear(&self) {
        let mut state = self.lock();
        let removed = state.entries.len();
        state.entries.clear();
        state.epoch += 1;
        state.stats.invalidations += removed as u64;
        debug!(removed, "cleared resolution cache");
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        CacheStats {
            size: state.entries.len(),
            ..state.stats
        }
    }

    /// Zero the counters. Entries are kept.
    pub fn reset_stats(&self) {
        self.lock().stats = CacheStats::default();
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().expect("cache lock poisoned")
    }
}

impl std::fmt::Debug for ResolutionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionCache")
            .field("config", &self.config)
            .field("size", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use lineage_types::{Member, MergeStrategy};
    use serde_json::json;
    use std::cell::Cell;
    use std::convert::Infallible;

    fn ckey(name: &str, entity: u32) -> CacheKey {
        CacheKey::new(
            AttributeKey::new("test", name).unwrap(),
            EntityId::from_index(entity),
            None,
            MergeStrategy::Override,
        )
    }

    fn cache(max_size: usize, ttl: i64) -> (ResolutionCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResolutionCache::with_clock(CacheConfig::new(max_size, ttl), clock.clone());
        (cache, clock)
    }

    /// Look up `key`, computing `value` on a miss.
    fn fetch(cache: &ResolutionCache, key: &CacheKey, value: i64) -> Option<AttrValue> {
        cache
            .get(key, || Ok::<_, Infallible>(Some(json!(value))))
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Hits and misses
    // -----------------------------------------------------------------------

    #[test]
    fn second_get_is_a_hit() {
        let (cache, _) = cache(4, 1000);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, Infallible>(Some(json!({"a": 1})))
        };

        let first = cache.get(&ckey("a", 0), compute).unwrap();
        let second = cache.get(&ckey("a", 0), compute).unwrap();
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(cache.peek(&ckey("a", 0)).unwrap().hit_count, 1);
    }

    #[test]
    fn absent_results_are_cached() {
        let (cache, _) = cache(4, 1000);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, Infallible>(None)
        };
        assert_eq!(cache.get(&ckey("a", 0), compute).unwrap(), None);
        assert_eq!(cache.get(&ckey("a", 0), compute).unwrap(), None);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn errors_are_not_cached() {
        let (cache, _) = cache(4, 1000);
        let err = cache.get(&ckey("a", 0), || Err::<Option<AttrValue>, _>("boom"));
        assert_eq!(err, Err("boom"));
        assert!(cache.is_empty());
        assert_eq!(fetch(&cache, &ckey("a", 0), 1), Some(json!(1)));
    }

    #[test]
    fn strategy_and_member_are_part_of_the_key() {
        let (cache, _) = cache(8, 1000);
        let base = ckey("a", 0);
        let merged = CacheKey {
            strategy: MergeStrategy::Merge,
            ..base.clone()
        };
        let scoped = CacheKey {
            member: Some(Member::new("email").unwrap()),
            ..base.clone()
        };
        fetch(&cache, &base, 1);
        fetch(&cache, &merged, 2);
        fetch(&cache, &scoped, 3);
        assert_eq!(cache.len(), 3);
        assert_eq!(fetch(&cache, &merged, 99), Some(json!(2)));
    }

    // -----------------------------------------------------------------------
    // LRU eviction
    // -----------------------------------------------------------------------

    #[test]
    fn overflow_evicts_least_recently_used() {
        let (cache, clock) = cache(3, 10_000);
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            fetch(&cache, &ckey(name, 0), i as i64);
            clock.advance(1);
        }
        // Touch "a" so "b" becomes the oldest access.
        fetch(&cache, &ckey("a", 0), 0);
        clock.advance(1);
        fetch(&cache, &ckey("d", 0), 3);

        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&ckey("b", 0)));

        cache.reset_stats();
        for name in ["a", "c", "d"] {
            fetch(&cache, &ckey(name, 0), -1);
        }
        assert_eq!(cache.stats().hits, 3);
        assert_eq!(cache.stats().misses, 0);

        fetch(&cache, &ckey("b", 0), 1);
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn eviction_ties_break_on_hits_then_insertion() {
        // Frozen clock: every entry shares last_access and inserted_at.
        let (cache, _) = cache(3, 10_000);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("b", 0), 1);
        fetch(&cache, &ckey("c", 0), 2);
        fetch(&cache, &ckey("a", 0), 0); // a: 1 hit

        fetch(&cache, &ckey("d", 0), 3);
        // b and c tie on access and hits; b was inserted first.
        assert!(!cache.contains(&ckey("b", 0)));
        assert!(cache.contains(&ckey("a", 0)));
        assert!(cache.contains(&ckey("c", 0)));
    }

    #[test]
    fn replacing_existing_key_does_not_evict() {
        let (cache, clock) = cache(2, 100);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("b", 0), 1);
        clock.advance(101);
        // "a" expired: the miss recomputes and reinserts in place.
        assert_eq!(fetch(&cache, &ckey("a", 0), 7), Some(json!(7)));
        assert_eq!(cache.stats().evictions, 0);
    }

    // -----------------------------------------------------------------------
    // TTL
    // -----------------------------------------------------------------------

    #[test]
    fn entry_expires_after_ttl() {
        let (cache, clock) = cache(4, 100);
        fetch(&cache, &ckey("a", 0), 1);

        clock.advance(100);
        assert_eq!(fetch(&cache, &ckey("a", 0), 2), Some(json!(1)));

        clock.advance(1);
        assert_eq!(fetch(&cache, &ckey("a", 0), 2), Some(json!(2)));

        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn hits_do_not_extend_lifetime() {
        let (cache, clock) = cache(4, 100);
        fetch(&cache, &ckey("a", 0), 1);
        clock.advance(60);
        fetch(&cache, &ckey("a", 0), 1);
        clock.advance(60);
        assert!(!cache.contains(&ckey("a", 0)));
    }

    #[test]
    fn purge_expired_removes_stale_entries() {
        let (cache, clock) = cache(4, 100);
        fetch(&cache, &ckey("a", 0), 1);
        clock.advance(50);
        fetch(&cache, &ckey("b", 0), 2);
        clock.advance(60);
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.contains(&ckey("b", 0)));
    }

    #[test]
    fn non_positive_ttl_always_recomputes() {
        let (cache, _) = cache(4, 0);
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            Ok::<_, Infallible>(Some(json!(calls.get())))
        };
        assert_eq!(cache.get(&ckey("a", 0), compute).unwrap(), Some(json!(1)));
        assert_eq!(cache.get(&ckey("a", 0), compute).unwrap(), Some(json!(2)));
        assert!(cache.is_empty());
        assert_eq!(cache.stats().misses, 2);
    }

    // -----------------------------------------------------------------------
    // Invalidation
    // -----------------------------------------------------------------------

    #[test]
    fn invalidate_for_drops_listed_entities_only() {
        let (cache, _) = cache(8, 1000);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("a", 1), 1);
        fetch(&cache, &ckey("b", 1), 2);
        fetch(&cache, &ckey("a", 2), 3);

        let removed = cache.invalidate_for([EntityId::from_index(1), EntityId::from_index(2)]);
        assert_eq!(removed, 3);
        assert!(cache.contains(&ckey("a", 0)));
        assert_eq!(cache.stats().invalidations, 3);
        assert_eq!(cache.invalidate_for(Vec::new()), 0);
    }

    #[test]
    fn invalidate_key_spans_entities() {
        let (cache, _) = cache(8, 1000);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("a", 1), 1);
        fetch(&cache, &ckey("b", 1), 2);
        assert_eq!(cache.invalidate_key(&AttributeKey::new("test", "a").unwrap()), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn clear_empties_cache() {
        let (cache, _) = cache(8, 1000);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("b", 0), 0);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().size, 0);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn invalidation_during_compute_is_not_stored() {
        let (cache, _) = cache(8, 1000);
        let key = ckey("a", 0);

        let stale = cache
            .get(&key, || {
                cache.invalidate_for([EntityId::from_index(0)]);
                Ok::<_, Infallible>(Some(json!("old")))
            })
            .unwrap();
        assert_eq!(stale, Some(json!("old")));
        assert!(!cache.contains(&key));

        let fresh = cache
            .get(&key, || Ok::<_, Infallible>(Some(json!("new"))))
            .unwrap();
        assert_eq!(fresh, Some(json!("new")));
        let cached = cache.get(&key, || Ok::<_, Infallible>(None)).unwrap();
        assert_eq!(cached, Some(json!("new")));
    }

    #[test]
    fn key_invalidation_or_clear_during_compute_is_not_stored() {
        let (cache, _) = cache(8, 1000);
        let attribute = AttributeKey::new("test", "a").unwrap();

        cache
            .get(&ckey("a", 1), || {
                cache.invalidate_key(&attribute);
                Ok::<_, Infallible>(Some(json!(1)))
            })
            .unwrap();
        assert!(!cache.contains(&ckey("a", 1)));

        cache
            .get(&ckey("b", 1), || {
                cache.clear();
                Ok::<_, Infallible>(Some(json!(2)))
            })
            .unwrap();
        assert!(cache.is_empty());

        fetch(&cache, &ckey("b", 1), 3);
        assert!(cache.contains(&ckey("b", 1)));
    }

    #[test]
    fn hit_rate() {
        let (cache, _) = cache(8, 1000);
        assert_eq!(cache.stats().hit_rate(), 0.0);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("a", 0), 0);
        fetch(&cache, &ckey("b", 0), 0);
        assert_eq!(cache.stats().hit_rate(), 0.5);
    }

    #[test]
    fn concurrent_gets_stay_within_bounds() {
        use std::thread;

        let cache = Arc::new(ResolutionCache::new(CacheConfig::new(16, 60_000)));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for i in 0..50u32 {
                        let key = ckey("k", (t * 50 + i) % 40);
                        cache
                            .get(&key, || Ok::<_, Infallible>(Some(json!(i))))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("thread should not panic");
        }
        assert!(cache.len() <= 16);
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 400);
    }
}
