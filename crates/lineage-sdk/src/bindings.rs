use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use lineage_lazy::LoaderKey;
use lineage_types::EntityId;

/// Which entities each loader populates.
#[derive(Debug, Default)]
pub(crate) struct LoaderBindings {
    by_loader: RwLock<HashMap<LoaderKey, BTreeSet<EntityId>>>,
}

impl LoaderBindings {
    /// Returns `true` if the binding is new.
    pub(crate) fn bind(&self, loader: LoaderKey, entity: EntityId) -> bool {
        self.by_loader
            .write()
            .expect("bindings lock poisoned")
            .entry(loader)
            .or_default()
            .insert(entity)
    }

    pub(crate) fn unbind(&self, loader: &LoaderKey, entity: EntityId) -> bool {
        let mut map = self.by_loader.write().expect("bindings lock poisoned");
        let Some(entities) = map.get_mut(loader) else {
            return false;
        };
        let removed = entities.remove(&entity);
        if entities.is_empty() {
            map.remove(loader);
        }
        removed
    }

    /// Entities bound to any of `loaders`.
    pub(crate) fn entities_for<'a, I>(&self, loaders: I) -> BTreeSet<EntityId>
    where
        I: IntoIterator<Item = &'a LoaderKey>,
    {
        let map = self.by_loader.read().expect("bindings lock poisoned");
        loaders
            .into_iter()
            .filter_map(|loader| map.get(loader))
            .flatten()
            .copied()
            .collect()
    }

    /// Loaders bound to any of `entities`, sorted.
    pub(crate) fn loaders_for(&self, entities: &[EntityId]) -> Vec<LoaderKey> {
        let map = self.by_loader.read().expect("bindings lock poisoned");
        let mut loaders: Vec<LoaderKey> = map
            .iter()
            .filter(|(_, bound)| entities.iter().any(|entity| bound.contains(entity)))
            .map(|(loader, _)| loader.clone())
            .collect();
        loaders.sort();
        loaders
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_and_query_both_directions() {
        let bindings = LoaderBindings::default();
        let a = EntityId::from_index(0);
        let b = EntityId::from_index(1);
        assert!(bindings.bind(LoaderKey::new("schema"), a));
        assert!(!bindings.bind(LoaderKey::new("schema"), a));
        bindings.bind(LoaderKey::new("schema"), b);
        bindings.bind(LoaderKey::new("docs"), b);

        let schema = LoaderKey::new("schema");
        assert_eq!(
            bindings.entities_for([&schema]),
            BTreeSet::from([a, b])
        );
        assert_eq!(
            bindings.loaders_for(&[b]),
            vec![LoaderKey::new("docs"), LoaderKey::new("schema")]
        );
        assert_eq!(bindings.loaders_for(&[a]), vec![schema]);
    }

    #[test]
    fn unbind_drops_empty_sets() {
        let bindings = LoaderBindings::default();
        let a = EntityId::from_index(0);
        let key = LoaderKey::new("schema");
        bindings.bind(key.clone(), a);
        assert!(bindings.unbind(&key, a));
        assert!(!bindings.unbind(&key, a));
        assert!(bindings.loaders_for(&[a]).is_empty());
    }
}
