//! Config validation: referential integrity between resources, entities and filters.

use crate::config::FullConfig;
use crate::error::ConfigError;
use crate::filter::FILTER_TYPES;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let entity_classes: HashSet<&str> = config.entities.iter().map(|e| e.class.as_str()).collect();
    let resource_classes: HashSet<&str> = config.resources.iter().map(|r| r.class.as_str()).collect();
    let embeddable_classes: HashSet<&str> = config.embeddables.iter().map(|e| e.class.as_str()).collect();

    for e in &config.entities {
        let field_names: HashSet<&str> = e.fields.iter().map(|f| f.name.as_str()).collect();
        let association_names: HashSet<&str> = e.associations.iter().map(|a| a.name.as_str()).collect();
        if e.identifier.is_empty() {
            return Err(ConfigError::Validation(format!("entity {} has no identifier", e.class)));
        }
        for id in &e.identifier {
            if !field_names.contains(id.as_str()) && !association_names.contains(id.as_str()) {
                return Err(ConfigError::InvalidIdentifier {
                    class: e.class.clone(),
                    field: id.clone(),
                });
            }
        }
        for a in &e.associations {
            if !entity_classes.contains(a.target.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "association target",
                    id: format!("{}.{} -> {}", e.class, a.name, a.target),
                });
            }
        }
        for (property, class) in &e.embedded {
            let class = class.as_str().unwrap_or_default();
            if !embeddable_classes.contains(class) {
                return Err(ConfigError::MissingReference {
                    kind: "embeddable",
                    id: format!("{}.{} -> {}", e.class, property, class),
                });
            }
        }
        for sub in &e.sub_classes {
            if !entity_classes.contains(sub.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "sub class",
                    id: sub.clone(),
                });
            }
        }
    }

    let entity_parents: HashMap<&str, &str> = config
        .entities
        .iter()
        .flat_map(|e| e.sub_classes.iter().map(move |s| (s.as_str(), e.class.as_str())))
        .collect();
    for e in &config.entities {
        let mut chain = HashSet::from([e.class.as_str()]);
        let mut cursor = e.class.as_str();
        while let Some(&parent) = entity_parents.get(cursor) {
            if !chain.insert(parent) {
                return Err(ConfigError::Validation(format!("entity {} has a parent cycle", e.class)));
            }
            cursor = parent;
        }
    }

    let mut short_names = HashSet::new();
    for r in &config.resources {
        if let Some(parent) = &r.parent {
            if !resource_classes.contains(parent.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "parent resource",
                    id: parent.clone(),
                });
            }
        }
        let mut chain = HashSet::from([r.class.as_str()]);
        let mut cursor = r.parent.as_deref();
        while let Some(parent) = cursor {
            if !chain.insert(parent) {
                return Err(ConfigError::Validation(format!("resource {} has a parent cycle", r.class)));
            }
            cursor = config
                .resources
                .iter()
                .find(|p| p.class == parent)
                .and_then(|p| p.parent.as_deref());
        }
        let short = r
            .short_name
            .clone()
            .unwrap_or_else(|| crate::case::short_name_of(&r.class));
        if !short_names.insert(short.clone()) {
            return Err(ConfigError::DuplicateShortName(short));
        }
        let mut seen = HashSet::new();
        for p in &r.properties {
            if !seen.insert(p.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "property {} declared twice on {}",
                    p.name, r.class
                )));
            }
            if let Some(pattern) = p.constraints.as_ref().and_then(|c| c.pattern.as_deref()) {
                regex::Regex::new(pattern).map_err(|_| {
                    ConfigError::Validation(format!("invalid pattern for {}.{}", r.class, p.name))
                })?;
            }
        }
    }

    let mut filter_ids = HashSet::new();
    for f in &config.filters {
        if !FILTER_TYPES.contains(&f.kind.as_str()) {
            return Err(ConfigError::UnknownFilterType {
                id: f.id.clone(),
                kind: f.kind.clone(),
            });
        }
        if !filter_ids.insert(f.id.as_str()) {
            return Err(ConfigError::Validation(format!("duplicate filter id {}", f.id)));
        }
    }
    Ok(())
}
