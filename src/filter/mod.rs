//! Collection filters. Query-builder filters append conditions; opaque filters only document parameters.

mod search;

pub use search::{SearchFilter, SearchStrategy};

use crate::config::FilterConfig;
use crate::error::{AppError, ConfigError};
use crate::orm::{ClassMetadataRegistry, JoinType, QueryBuilder};
use crate::query::QueryNameGenerator;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Values accepted for `type` in `filters.json`.
pub const FILTER_TYPES: &[&str] = &["search", "opaque"];

/// One query parameter a filter understands.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FilterDescription {
    pub parameter: String,
    pub property: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

pub trait ApiFilter: Send + Sync {
    fn description(&self, resource_class: &str) -> Vec<FilterDescription>;
}

pub trait QueryBuilderFilter: ApiFilter {
    fn apply(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        operation_name: Option<&str>,
    ) -> Result<(), AppError>;
}

/// A registered filter. Only the query-builder variant takes part in collection queries.
#[derive(Clone)]
pub enum Filter {
    QueryBuilder(Arc<dyn QueryBuilderFilter>),
    Opaque(Arc<dyn ApiFilter>),
}

impl Filter {
    pub fn as_query_builder(&self) -> Option<&dyn QueryBuilderFilter> {
        match self {
            Filter::QueryBuilder(f) => Some(f.as_ref()),
            Filter::Opaque(_) => None,
        }
    }

    pub fn description(&self, resource_class: &str) -> Vec<FilterDescription> {
        match self {
            Filter::QueryBuilder(f) => f.description(resource_class),
            Filter::Opaque(f) => f.description(resource_class),
        }
    }
}

pub trait FilterLocator: Send + Sync {
    fn has(&self, id: &str) -> bool;
    fn get(&self, id: &str) -> Option<Filter>;
}

/// Filters keyed by id.
#[derive(Clone, Default)]
pub struct FilterCollection {
    filters: HashMap<String, Filter>,
}

impl FilterCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, filter: Filter) {
        self.filters.insert(id.into(), filter);
    }

    pub fn from_config(configs: &[FilterConfig], registry: Arc<ClassMetadataRegistry>) -> Result<Self, ConfigError> {
        let mut collection = FilterCollection::new();
        for c in configs {
            let filter = match c.kind.as_str() {
                "search" => Filter::QueryBuilder(Arc::new(SearchFilter::from_config(c, registry.clone())?)),
                "opaque" => Filter::Opaque(Arc::new(OpaqueFilter::new(c.properties.keys().cloned().collect()))),
                other => {
                    return Err(ConfigError::UnknownFilterType {
                        id: c.id.clone(),
                        kind: other.to_string(),
                    })
                }
            };
            collection.insert(c.id.clone(), filter);
        }
        Ok(collection)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }
}

impl FilterLocator for FilterCollection {
    fn has(&self, id: &str) -> bool {
        self.filters.contains_key(id)
    }

    fn get(&self, id: &str) -> Option<Filter> {
        self.filters.get(id).cloned()
    }
}

/// Documents parameters consumed outside the query layer.
pub struct OpaqueFilter {
    properties: Vec<String>,
}

impl OpaqueFilter {
    pub fn new(properties: Vec<String>) -> Self {
        OpaqueFilter { properties }
    }
}

impl ApiFilter for OpaqueFilter {
    fn description(&self, _resource_class: &str) -> Vec<FilterDescription> {
        self.properties
            .iter()
            .map(|p| FilterDescription {
                parameter: p.clone(),
                property: p.clone(),
                type_: "string".into(),
                required: false,
                strategy: None,
            })
            .collect()
    }
}

/// `relatedDummy.thirdLevel.name` split into its association path and final field.
#[derive(Debug, PartialEq, Eq)]
pub struct PropertyPath<'a> {
    pub associations: Vec<&'a str>,
    pub field: &'a str,
}

pub fn split_properties(property: &str) -> PropertyPath<'_> {
    match property.rsplit_once('.') {
        Some((path, field)) => PropertyPath {
            associations: path.split('.').collect(),
            field,
        },
        None => PropertyPath {
            associations: Vec::new(),
            field: property,
        },
    }
}

/// Alias of `alias.association`, joining it first when no such join exists yet.
pub fn add_join_once(
    qb: &mut QueryBuilder,
    names: &mut QueryNameGenerator,
    alias: &str,
    association: &str,
    join_type: JoinType,
) -> String {
    if let Some(existing) = qb.existing_join(alias, association) {
        return existing.alias.clone();
    }
    let join_alias = names.generate_join_alias(association);
    let path = format!("{}.{}", alias, association);
    match join_type {
        JoinType::Inner => qb.inner_join(&path, &join_alias),
        JoinType::Left => qb.left_join(&path, &join_alias),
    };
    join_alias
}

/// Joins each association of a nested property and returns `(alias, field)` for its last segment.
pub fn add_joins_for_nested_property(
    property: &str,
    root_alias: &str,
    qb: &mut QueryBuilder,
    names: &mut QueryNameGenerator,
    join_type: JoinType,
) -> (String, String) {
    let path = split_properties(property);
    let mut alias = root_alias.to_string();
    for association in &path.associations {
        alias = add_join_once(qb, names, &alias, association, join_type);
    }
    (alias, path.field.to_string())
}
