//! Resource descriptor: short name, operations and the free-form attribute bag.

use serde_json::{Map, Value};

/// Free-form attributes (`order`, `pagination_*`, `normalization_context`, ...).
pub type Attributes = Map<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationType {
    Item,
    Collection,
    Subresource,
}

impl OperationType {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::Item => "item",
            OperationType::Collection => "collection",
            OperationType::Subresource => "subresource",
        }
    }
}

/// Immutable; every `with_*` returns a new value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResourceMetadata {
    short_name: Option<String>,
    description: Option<String>,
    iri: Option<String>,
    item_operations: Option<Attributes>,
    collection_operations: Option<Attributes>,
    subresource_operations: Option<Attributes>,
    attributes: Attributes,
}

impl ResourceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn short_name(&self) -> Option<&str> {
        self.short_name.as_deref()
    }

    pub fn with_short_name(mut self, short_name: impl Into<String>) -> Self {
        self.short_name = Some(short_name.into());
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn iri(&self) -> Option<&str> {
        self.iri.as_deref()
    }

    pub fn with_iri(mut self, iri: Option<String>) -> Self {
        self.iri = iri;
        self
    }

    pub fn item_operations(&self) -> Option<&Attributes> {
        self.item_operations.as_ref()
    }

    pub fn with_item_operations(mut self, operations: Option<Attributes>) -> Self {
        self.item_operations = operations;
        self
    }

    pub fn collection_operations(&self) -> Option<&Attributes> {
        self.collection_operations.as_ref()
    }

    pub fn with_collection_operations(mut self, operations: Option<Attributes>) -> Self {
        self.collection_operations = operations;
        self
    }

    pub fn subresource_operations(&self) -> Option<&Attributes> {
        self.subresource_operations.as_ref()
    }

    pub fn with_subresource_operations(mut self, operations: Option<Attributes>) -> Self {
        self.subresource_operations = operations;
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

    pub fn operations(&self, operation_type: OperationType) -> Option<&Attributes> {
        match operation_type {
            OperationType::Item => self.item_operations.as_ref(),
            OperationType::Collection => self.collection_operations.as_ref(),
            OperationType::Subresource => self.subresource_operations.as_ref(),
        }
    }

    /// Attribute of one operation, falling back to the resource attribute when `resource_fallback` is set.
    pub fn operation_attribute(
        &self,
        operation_type: OperationType,
        operation_name: Option<&str>,
        key: &str,
        resource_fallback: bool,
    ) -> Option<&Value> {
        let from_operation = operation_name
            .and_then(|name| self.operations(operation_type)?.get(name))
            .and_then(|op| op.get(key));
        match from_operation {
            Some(v) => Some(v),
            None if resource_fallback => self.attributes.get(key),
            None => None,
        }
    }

    pub fn item_operation_attribute(&self, operation_name: Option<&str>, key: &str, resource_fallback: bool) -> Option<&Value> {
        self.operation_attribute(OperationType::Item, operation_name, key, resource_fallback)
    }

    pub fn collection_operation_attribute(
        &self,
        operation_name: Option<&str>,
        key: &str,
        resource_fallback: bool,
    ) -> Option<&Value> {
        self.operation_attribute(OperationType::Collection, operation_name, key, resource_fallback)
    }

    /// HTTP method of an operation: explicit `method` attribute, else the operation name itself.
    pub fn operation_method(&self, operation_type: OperationType, operation_name: &str) -> Option<String> {
        let op = self.operations(operation_type)?.get(operation_name)?;
        let method = op
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or(operation_name);
        Some(method.to_uppercase())
    }
}
