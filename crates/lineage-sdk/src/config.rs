use serde::{Deserialize, Serialize};

use lineage_cache::CacheConfig;

use crate::error::SdkResult;

/// Top-level configuration for a [`Lineage`](crate::Lineage) instance.
///
/// ```toml
/// [cache]
/// max_size = 4096
/// ttl_millis = 30000
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineageConfig {
    pub cache: CacheConfig,
}

impl LineageConfig {
    /// Parse a TOML document. Missing tables and fields take their defaults.
    pub fn from_toml_str(text: &str) -> SdkResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }
}
