//! Process-wide metadata cache with explicit invalidation.

use crate::metadata::{PropertyMetadata, PropertyNameCollection, PropertyOptions, ResourceMetadata};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type PropertyKey = (String, String, u64);

/// Readers never block each other; racing writers store equal values, last one wins.
#[derive(Debug, Default)]
pub struct MetadataCache {
    resources: RwLock<HashMap<String, ResourceMetadata>>,
    properties: RwLock<HashMap<PropertyKey, PropertyMetadata>>,
    property_names: RwLock<HashMap<String, PropertyNameCollection>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource(&self, class: &str) -> Option<ResourceMetadata> {
        read(&self.resources).get(class).cloned()
    }

    pub fn store_resource(&self, class: &str, metadata: ResourceMetadata) {
        write(&self.resources).insert(class.to_string(), metadata);
    }

    pub fn property(&self, class: &str, property: &str, options: &PropertyOptions) -> Option<PropertyMetadata> {
        let key = (class.to_string(), property.to_string(), options.cache_hash());
        read(&self.properties).get(&key).cloned()
    }

    pub fn store_property(&self, class: &str, property: &str, options: &PropertyOptions, metadata: PropertyMetadata) {
        let key = (class.to_string(), property.to_string(), options.cache_hash());
        write(&self.properties).insert(key, metadata);
    }

    pub fn property_names(&self, class: &str) -> Option<PropertyNameCollection> {
        read(&self.property_names).get(class).cloned()
    }

    pub fn store_property_names(&self, class: &str, names: PropertyNameCollection) {
        write(&self.property_names).insert(class.to_string(), names);
    }

    /// Drops every entry computed for `class`.
    pub fn invalidate_class(&self, class: &str) {
        write(&self.resources).remove(class);
        write(&self.property_names).remove(class);
        write(&self.properties).retain(|(c, _, _), _| c != class);
        tracing::debug!(class = %class, "metadata cache invalidated");
    }

    pub fn clear(&self) {
        write(&self.resources).clear();
        write(&self.property_names).clear();
        write(&self.properties).clear();
        tracing::debug!("metadata cache cleared");
    }

    pub fn len(&self) -> usize {
        read(&self.resources).len() + read(&self.properties).len() + read(&self.property_names).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn property_entries_are_keyed_by_options() {
        let cache = MetadataCache::new();
        let foo = PropertyOptions::with_groups(Some(vec!["foo".into()]));
        let bar = PropertyOptions::with_groups(Some(vec!["bar".into()]));
        cache.store_property("Dummy", "name", &foo, PropertyMetadata::new().with_readable(true));
        assert_eq!(cache.property("Dummy", "name", &foo).unwrap().is_readable(), Some(true));
        assert!(cache.property("Dummy", "name", &bar).is_none());
    }

    #[test]
    fn invalidate_class_only_drops_that_class() {
        let cache = MetadataCache::new();
        let opts = PropertyOptions::default();
        cache.store_resource("Dummy", ResourceMetadata::new());
        cache.store_resource("Other", ResourceMetadata::new());
        cache.store_property("Dummy", "id", &opts, PropertyMetadata::new());
        cache.store_property("Other", "id", &opts, PropertyMetadata::new());
        cache.invalidate_class("Dummy");
        assert!(cache.resource("Dummy").is_none());
        assert!(cache.property("Dummy", "id", &opts).is_none());
        assert!(cache.resource("Other").is_some());
        assert!(cache.property("Other", "id", &opts).is_some());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn concurrent_writers_are_idempotent() {
        let cache = Arc::new(MetadataCache::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || {
                    cache.store_resource("Dummy", ResourceMetadata::new().with_short_name("Dummy"));
                    cache.resource("Dummy")
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap().unwrap().short_name(), Some("Dummy"));
        }
        assert_eq!(cache.len(), 1);
    }
}
