use serde::{Deserialize, Serialize};

/// Configuration for the [`ResolutionCache`](crate::ResolutionCache).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held at once.
    pub max_size: usize,
    /// Entry lifetime in milliseconds. Zero or negative disables caching.
    pub ttl_millis: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1024,
            ttl_millis: 60_000,
        }
    }
}

impl CacheConfig {
    pub fn new(max_size: usize, ttl_millis: i64) -> Self {
        Self {
            max_size,
            ttl_millis,
        }
    }

    /// A configuration that never stores anything.
    pub fn disabled() -> Self {
        Self {
            ttl_millis: 0,
            ..Default::default()
        }
    }

    /// Whether entries are stored at all.
    pub fn is_enabled(&self) -> bool {
        self.ttl_millis > 0 && self.max_size > 0
    }
}
