use std::cmp::Ordering;

use lineage_types::{AttrValue, AttributeKey, EntityId, Member, MergeStrategy};

/// Identity of one memoized resolution.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub key: AttributeKey,
    pub entity: EntityId,
    pub member: Option<Member>,
    pub strategy: MergeStrategy,
}

impl CacheKey {
    pub fn new(
        key: AttributeKey,
        entity: EntityId,
        member: Option<Member>,
        strategy: MergeStrategy,
    ) -> Self {
        Self {
            key,
            entity,
            member,
            strategy,
        }
    }
}

/// A memoized resolution result plus its bookkeeping.
///
/// `value` is `None` when the resolution itself was absent; absence is a
/// cacheable outcome.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub value: Option<AttrValue>,
    pub last_access: u64,
    pub inserted_at: u64,
    pub hit_count: u64,
    /// Insertion sequence number; breaks ties between same-millisecond inserts.
    pub(crate) seq: u64,
}

impl CacheEntry {
    pub(crate) fn new(value: Option<AttrValue>, now: u64, seq: u64) -> Self {
        Self {
            value,
            last_access: now,
            inserted_at: now,
            hit_count: 0,
            seq,
        }
    }

    /// Expired once more than `ttl_millis` have passed since insertion.
    pub(crate) fn is_expired(&self, now: u64, ttl_millis: u64) -> bool {
        now.saturating_sub(self.inserted_at) > ttl_millis
    }

    pub(crate) fn touch(&mut self, now: u64) {
        self.last_access = now;
        self.hit_count += 1;
    }

    /// Eviction order: the entry that compares lowest is evicted first.
    ///
    /// Lowest `last_access`, then lowest `hit_count`, then earliest
    /// `inserted_at`, then earliest insertion.
    pub(crate) fn eviction_order(&self, other: &Self) -> Ordering {
        self.last_access
            .cmp(&other.last_access)
            .then(self.hit_count.cmp(&other.hit_count))
            .then(self.inserted_at.cmp(&other.inserted_at))
            .then(self.seq.cmp(&other.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let entry = CacheEntry::new(None, 100, 0);
        assert!(!entry.is_expired(100, 50));
        assert!(!entry.is_expired(150, 50));
        assert!(entry.is_expired(151, 50));
    }

    #[test]
    fn eviction_order_tie_breaks() {
        let mut a = CacheEntry::new(None, 10, 0);
        let b = CacheEntry::new(None, 10, 1);
        // Same access time, same hits: earlier insertion goes first.
        assert_eq!(a.eviction_order(&b), Ordering::Less);

        // A hit at the same millisecond keeps last_access equal but wins on hits.
        a.touch(10);
        assert_eq!(a.eviction_order(&b), Ordering::Greater);

        // Older access always loses regardless of hits.
        let mut c = CacheEntry::new(None, 5, 2);
        c.touch(5);
        c.touch(5);
        assert_eq!(c.eviction_order(&b), Ordering::Less);
    }
}
