//! Property descriptor, property name collection and lookup options.

use crate::metadata::Attributes;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Type {
    pub builtin_type: String,
    pub nullable: bool,
    pub class_name: Option<String>,
    pub collection: bool,
}

impl Type {
    /// Class of the related resource, for both to-one and collection types.
    pub fn related_class(&self) -> Option<&str> {
        self.class_name.as_deref()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubresourceMetadata {
    pub resource_class: String,
    pub collection: bool,
}

/// Immutable; every `with_*` returns a new value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PropertyMetadata {
    type_: Option<Type>,
    description: Option<String>,
    readable: Option<bool>,
    writable: Option<bool>,
    readable_link: Option<bool>,
    writable_link: Option<bool>,
    required: Option<bool>,
    iri: Option<String>,
    identifier: Option<bool>,
    child_inherited: Option<String>,
    attributes: Attributes,
    subresource: Option<SubresourceMetadata>,
}

impl PropertyMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_(&self) -> Option<&Type> {
        self.type_.as_ref()
    }

    pub fn with_type(mut self, type_: Option<Type>) -> Self {
        self.type_ = type_;
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn is_readable(&self) -> Option<bool> {
        self.readable
    }

    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = Some(readable);
        self
    }

    pub fn is_writable(&self) -> Option<bool> {
        self.writable
    }

    pub fn with_writable(mut self, writable: bool) -> Self {
        self.writable = Some(writable);
        self
    }

    pub fn is_readable_link(&self) -> Option<bool> {
        self.readable_link
    }

    pub fn with_readable_link(mut self, readable_link: bool) -> Self {
        self.readable_link = Some(readable_link);
        self
    }

    pub fn is_writable_link(&self) -> Option<bool> {
        self.writable_link
    }

    pub fn with_writable_link(mut self, writable_link: bool) -> Self {
        self.writable_link = Some(writable_link);
        self
    }

    pub fn is_required(&self) -> Option<bool> {
        self.required
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }

    pub fn iri(&self) -> Option<&str> {
        self.iri.as_deref()
    }

    pub fn with_iri(mut self, iri: Option<String>) -> Self {
        self.iri = iri;
        self
    }

    pub fn is_identifier(&self) -> Option<bool> {
        self.identifier
    }

    pub fn with_identifier(mut self, identifier: bool) -> Self {
        self.identifier = Some(identifier);
        self
    }

    /// Child resource class that re-declares this property, when resolved through inheritance.
    pub fn child_inherited(&self) -> Option<&str> {
        self.child_inherited.as_deref()
    }

    pub fn with_child_inherited(mut self, class: impl Into<String>) -> Self {
        self.child_inherited = Some(class.into());
        self
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// Boolean attribute; absent or non-boolean is `None`.
    pub fn bool_attribute(&self, key: &str) -> Option<bool> {
        self.attributes.get(key).and_then(Value::as_bool)
    }

    pub fn subresource(&self) -> Option<&SubresourceMetadata> {
        self.subresource.as_ref()
    }

    pub fn with_subresource(mut self, subresource: Option<SubresourceMetadata>) -> Self {
        self.subresource = subresource;
        self
    }
}

/// Property names in declaration order, without duplicates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyNameCollection(Vec<String>);

impl PropertyNameCollection {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for n in names {
            let n = n.into();
            if !out.contains(&n) {
                out.push(n);
            }
        }
        PropertyNameCollection(out)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a PropertyNameCollection {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Options a property lookup is made with; part of the cache key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PropertyOptions {
    pub serializer_groups: Option<Vec<String>>,
    pub collection_operation_name: Option<String>,
    pub item_operation_name: Option<String>,
}

impl PropertyOptions {
    pub fn with_groups(groups: Option<Vec<String>>) -> Self {
        PropertyOptions {
            serializer_groups: groups,
            ..Default::default()
        }
    }

    pub fn cache_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.hash(&mut h);
        h.finish()
    }
}

/// Groups from a `groups` context value: a single string or a list of strings.
pub fn groups_from_value(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::String(s) => Some(vec![s.clone()]),
        Value::Array(items) => Some(items.iter().filter_map(Value::as_str).map(str::to_string).collect()),
        _ => None,
    }
}
