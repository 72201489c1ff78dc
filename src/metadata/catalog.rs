//! Index over resource declarations: class lookup, parent chains and inherited properties.

use crate::config::{FullConfig, PropertyConfig, ResourceConfig};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
pub struct ResourceCatalog {
    order: Vec<String>,
    resources: HashMap<String, ResourceConfig>,
}

impl ResourceCatalog {
    pub fn new(resources: Vec<ResourceConfig>) -> Self {
        let order = resources.iter().map(|r| r.class.clone()).collect();
        let resources = resources.into_iter().map(|r| (r.class.clone(), r)).collect();
        ResourceCatalog { order, resources }
    }

    pub fn from_config(config: &FullConfig) -> Self {
        Self::new(config.resources.clone())
    }

    pub fn class_names(&self) -> &[String] {
        &self.order
    }

    pub fn resource(&self, class: &str) -> Option<&ResourceConfig> {
        self.resources.get(class)
    }

    pub fn is_resource_class(&self, class: &str) -> bool {
        self.resources.contains_key(class)
    }

    /// Parent chain, nearest first. Stops on cycles.
    pub fn ancestors(&self, class: &str) -> Vec<&str> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([class]);
        let mut cursor = self.resources.get(class).and_then(|r| r.parent.as_deref());
        while let Some(parent) = cursor {
            if !seen.insert(parent) {
                break;
            }
            out.push(parent);
            cursor = self.resources.get(parent).and_then(|r| r.parent.as_deref());
        }
        out
    }

    pub fn is_subclass_of(&self, child: &str, parent: &str) -> bool {
        self.ancestors(child).contains(&parent)
    }

    /// Property declared on the class itself (not inherited).
    pub fn own_property(&self, class: &str, property: &str) -> Option<&PropertyConfig> {
        self.resources
            .get(class)?
            .properties
            .iter()
            .find(|p| p.name == property)
    }

    /// Property declared on the class or inherited from the nearest ancestor declaring it.
    pub fn property(&self, class: &str, property: &str) -> Option<&PropertyConfig> {
        self.own_property(class, property).or_else(|| {
            self.ancestors(class)
                .into_iter()
                .find_map(|a| self.own_property(a, property))
        })
    }

    /// Ancestor properties first, then the class's own, without duplicates.
    pub fn property_names(&self, class: &str) -> Vec<String> {
        let mut chain = self.ancestors(class);
        chain.reverse();
        chain.push(class);
        let mut out: Vec<String> = Vec::new();
        for c in chain {
            if let Some(r) = self.resources.get(c) {
                for p in &r.properties {
                    if !out.contains(&p.name) {
                        out.push(p.name.clone());
                    }
                }
            }
        }
        out
    }

    /// Every serializer group used by the class's properties.
    pub fn resource_groups(&self, class: &str) -> HashSet<String> {
        self.property_names(class)
            .iter()
            .filter_map(|p| self.property(class, p))
            .flat_map(|p| p.groups.iter().flatten().cloned())
            .collect()
    }
}
