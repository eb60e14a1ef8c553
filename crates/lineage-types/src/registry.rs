//! Registry of known attribute keys.
//!
//! [`KeyRegistry`] is an explicit, constructible object rather than a
//! process-wide table: each test or embedding owns its own instance.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use tracing::debug;

use crate::error::{TypeError, TypeResult};
use crate::key::AttributeKey;

/// Thread-safe set of registered attribute keys, indexed by namespace.
#[derive(Debug, Default)]
pub struct KeyRegistry {
    namespaces: RwLock<BTreeMap<String, BTreeSet<AttributeKey>>>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a key. Returns `false` if it was already present.
    pub fn register(&self, key: AttributeKey) -> bool {
        let mut map = self.namespaces.write().expect("key registry lock poisoned");
        let inserted = map
            .entry(key.namespace().to_string())
            .or_default()
            .insert(key.clone());
        if inserted {
            debug!(key = %key, "registered attribute key");
        }
        inserted
    }

    /// Parse and register a key from its textual form.
    pub fn register_str(&self, text: &str) -> TypeResult<AttributeKey> {
        let key = AttributeKey::parse(text)?;
        self.register(key.clone());
        Ok(key)
    }

    /// Parse a key and require that it was registered.
    pub fn lookup(&self, text: &str) -> TypeResult<AttributeKey> {
        let key = AttributeKey::parse(text)?;
        if self.contains(&key) {
            Ok(key)
        } else {
            Err(TypeError::UnknownKey(key.to_string()))
        }
    }

    pub fn contains(&self, key: &AttributeKey) -> bool {
        let map = self.namespaces.read().expect("key registry lock poisoned");
        map.get(key.namespace())
            .is_some_and(|keys| keys.contains(key))
    }

    /// Remove a key. Returns `true` if it was registered.
    pub fn unregister(&self, key: &AttributeKey) -> bool {
        let mut map = self.namespaces.write().expect("key registry lock poisoned");
        let Some(keys) = map.get_mut(key.namespace()) else {
            return false;
        };
        let removed = keys.remove(key);
        if keys.is_empty() {
            map.remove(key.namespace());
        }
        removed
    }

    /// All registered keys, sorted.
    pub fn keys(&self) -> Vec<AttributeKey> {
        let map = self.namespaces.read().expect("key registry lock poisoned");
        map.values().flatten().cloned().collect()
    }

    /// Registered keys within one namespace, sorted.
    pub fn in_namespace(&self, namespace: &str) -> Vec<AttributeKey> {
        let map = self.namespaces.read().expect("key registry lock poisoned");
        map.get(namespace)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Namespaces that hold at least one key, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let map = self.namespaces.read().expect("key registry lock poisoned");
        map.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        let map = self.namespaces.read().expect("key registry lock poisoned");
        map.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> AttributeKey {
        AttributeKey::parse(text).unwrap()
    }

    #[test]
    fn register_is_idempotent() {
        let registry = KeyRegistry::new();
        assert!(registry.register(key("validation:required")));
        assert!(!registry.register(key("validation:required")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_requires_registration() {
        let registry = KeyRegistry::new();
        registry.register_str("route:path").unwrap();
        assert_eq!(registry.lookup("route:path").unwrap(), key("route:path"));
        assert_eq!(
            registry.lookup("route:method").unwrap_err(),
            TypeError::UnknownKey("route:method".into())
        );
        assert!(matches!(
            registry.lookup("garbage").unwrap_err(),
            TypeError::InvalidKey { .. }
        ));
    }

    #[test]
    fn keys_grouped_by_namespace() {
        let registry = KeyRegistry::new();
        registry.register(key("schema:type"));
        registry.register(key("route:path"));
        registry.register(key("schema:format"));

        assert_eq!(registry.namespaces(), vec!["route".to_string(), "schema".to_string()]);
        assert_eq!(
            registry.in_namespace("schema"),
            vec![key("schema:format"), key("schema:type")]
        );
        assert!(registry.in_namespace("missing").is_empty());
        assert_eq!(registry.keys().len(), 3);
    }

    #[test]
    fn unregister_drops_empty_namespace() {
        let registry = KeyRegistry::new();
        registry.register(key("route:path"));
        assert!(registry.unregister(&key("route:path")));
        assert!(!registry.unregister(&key("route:path")));
        assert!(registry.namespaces().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn instances_are_independent() {
        let a = KeyRegistry::new();
        let b = KeyRegistry::new();
        a.register(key("ns:one"));
        assert!(a.contains(&key("ns:one")));
        assert!(!b.contains(&key("ns:one")));
    }
}
