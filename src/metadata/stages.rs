//! Concrete resource and property stages.

use crate::case::short_name_of;
use crate::config::PropertyConfig;
use crate::error::AppError;
use crate::metadata::{
    groups_from_value, Attributes, OperationType, PropertyMetadata, PropertyOptions, PropertyStage,
    ResourceCatalog, ResourceMetadata, ResourceMetadataFactory, ResourceStage, StageContext,
    SubresourceMetadata, Type,
};
use crate::orm::ClassMetadataRegistry;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Base resource metadata from configuration.
pub struct ConfigResourceStage {
    catalog: Arc<ResourceCatalog>,
}

impl ConfigResourceStage {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        ConfigResourceStage { catalog }
    }
}

impl ResourceStage for ConfigResourceStage {
    fn process(&self, resource_class: &str, previous: Option<ResourceMetadata>) -> Result<Option<ResourceMetadata>, AppError> {
        if previous.is_some() {
            return Ok(previous);
        }
        let Some(r) = self.catalog.resource(resource_class) else {
            return Ok(None);
        };
        let mut m = ResourceMetadata::new()
            .with_description(r.description.clone())
            .with_iri(r.iri.clone())
            .with_item_operations(r.item_operations.clone())
            .with_collection_operations(r.collection_operations.clone())
            .with_subresource_operations(r.subresource_operations.clone())
            .with_attributes(r.attributes.clone());
        if let Some(short) = &r.short_name {
            m = m.with_short_name(short.clone());
        }
        Ok(Some(m))
    }
}

/// Derives the short name from the class name when none is configured.
pub struct ShortNameStage;

impl ResourceStage for ShortNameStage {
    fn process(&self, resource_class: &str, previous: Option<ResourceMetadata>) -> Result<Option<ResourceMetadata>, AppError> {
        Ok(previous.map(|m| match m.short_name() {
            Some(_) => m,
            None => m.with_short_name(short_name_of(resource_class)),
        }))
    }
}

/// Fills in default item, collection and subresource operations.
pub struct OperationDefaultsStage {
    catalog: Arc<ResourceCatalog>,
}

impl OperationDefaultsStage {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        OperationDefaultsStage { catalog }
    }
}

fn operations(names: &[&str]) -> Attributes {
    names
        .iter()
        .map(|n| (n.to_string(), json!({ "method": n.to_uppercase() })))
        .collect()
}

impl ResourceStage for OperationDefaultsStage {
    fn process(&self, resource_class: &str, previous: Option<ResourceMetadata>) -> Result<Option<ResourceMetadata>, AppError> {
        let Some(mut m) = previous else {
            return Ok(None);
        };
        if m.item_operations().is_none() {
            m = m.with_item_operations(Some(operations(&["get", "put", "delete"])));
        }
        if m.collection_operations().is_none() {
            m = m.with_collection_operations(Some(operations(&["get", "post"])));
        }
        if m.subresource_operations().is_none() {
            let subresources: Attributes = self
                .catalog
                .property_names(resource_class)
                .iter()
                .filter_map(|p| self.catalog.property(resource_class, p))
                .filter(|p| p.subresource)
                .map(|p| {
                    (
                        format!("{}_get_subresource", p.name),
                        json!({ "method": "GET", "property": p.name }),
                    )
                })
                .collect();
            if !subresources.is_empty() {
                m = m.with_subresource_operations(Some(subresources));
            }
        }
        Ok(Some(m))
    }
}

/// Copies attributes a child resource does not set from its ancestors.
pub struct ParentResourceStage {
    catalog: Arc<ResourceCatalog>,
}

impl ParentResourceStage {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        ParentResourceStage { catalog }
    }
}

impl ResourceStage for ParentResourceStage {
    fn process(&self, resource_class: &str, previous: Option<ResourceMetadata>) -> Result<Option<ResourceMetadata>, AppError> {
        let Some(m) = previous else {
            return Ok(None);
        };
        let ancestors = self.catalog.ancestors(resource_class);
        if ancestors.is_empty() {
            return Ok(Some(m));
        }
        let mut attributes = m.attributes().clone();
        let mut description = m.description().map(str::to_string);
        for a in ancestors {
            let Some(parent) = self.catalog.resource(a) else { continue };
            for (k, v) in &parent.attributes {
                attributes.entry(k.clone()).or_insert_with(|| v.clone());
            }
            if description.is_none() {
                description = parent.description.clone();
            }
        }
        Ok(Some(m.with_attributes(attributes).with_description(description)))
    }
}

/// Base property metadata from configuration. Entities that are not exposed as resources get
/// readable/writable metadata for their mapped fields.
pub struct ConfigPropertyStage {
    catalog: Arc<ResourceCatalog>,
    registry: Arc<ClassMetadataRegistry>,
}

impl ConfigPropertyStage {
    pub fn new(catalog: Arc<ResourceCatalog>, registry: Arc<ClassMetadataRegistry>) -> Self {
        ConfigPropertyStage { catalog, registry }
    }
}

fn from_config(p: &PropertyConfig) -> PropertyMetadata {
    let type_ = p.type_.as_ref().map(|t| Type {
        builtin_type: t.builtin.clone(),
        nullable: t.nullable,
        class_name: t.class.clone(),
        collection: t.collection,
    });
    let subresource = if p.subresource {
        type_.as_ref().and_then(|t| {
            t.class_name.as_ref().map(|c| SubresourceMetadata {
                resource_class: c.clone(),
                collection: t.collection,
            })
        })
    } else {
        None
    };
    let mut m = PropertyMetadata::new()
        .with_type(type_)
        .with_description(p.description.clone())
        .with_iri(p.iri.clone())
        .with_attributes(p.attributes.clone())
        .with_subresource(subresource);
    if let Some(v) = p.readable {
        m = m.with_readable(v);
    }
    if let Some(v) = p.writable {
        m = m.with_writable(v);
    }
    if let Some(v) = p.readable_link {
        m = m.with_readable_link(v);
    }
    if let Some(v) = p.writable_link {
        m = m.with_writable_link(v);
    }
    if let Some(v) = p.required {
        m = m.with_required(v);
    }
    if let Some(v) = p.identifier {
        m = m.with_identifier(v);
    }
    m
}

impl PropertyStage for ConfigPropertyStage {
    fn process(
        &self,
        resource_class: &str,
        property: &str,
        _options: &PropertyOptions,
        _previous: Option<PropertyMetadata>,
        _ctx: &StageContext<'_>,
    ) -> Result<Option<PropertyMetadata>, AppError> {
        if self.catalog.is_resource_class(resource_class) {
            return Ok(self.catalog.property(resource_class, property).map(from_config));
        }
        let Some(meta) = self.registry.get(resource_class) else {
            return Err(AppError::ResourceClassNotFound(resource_class.to_string()));
        };
        let mapped = meta.has_field(property)
            || meta.has_association(property)
            || meta.embedded_classes.contains_key(property);
        if !mapped {
            return Ok(None);
        }
        let type_ = meta.association(property).map(|a| Type {
            builtin_type: if a.kind.is_to_many() { "array" } else { "object" }.to_string(),
            nullable: a.is_nullable(),
            class_name: Some(a.target_entity.clone()),
            collection: a.kind.is_to_many(),
        });
        Ok(Some(
            PropertyMetadata::new()
                .with_type(type_)
                .with_readable(true)
                .with_writable(true),
        ))
    }
}

/// Identifier flag and identifier writability from ORM metadata.
pub struct OrmPropertyStage {
    registry: Arc<ClassMetadataRegistry>,
}

impl OrmPropertyStage {
    pub fn new(registry: Arc<ClassMetadataRegistry>) -> Self {
        OrmPropertyStage { registry }
    }
}

impl PropertyStage for OrmPropertyStage {
    fn process(
        &self,
        resource_class: &str,
        property: &str,
        _options: &PropertyOptions,
        previous: Option<PropertyMetadata>,
        _ctx: &StageContext<'_>,
    ) -> Result<Option<PropertyMetadata>, AppError> {
        let Some(m) = previous else {
            return Ok(None);
        };
        if m.is_identifier() == Some(true) {
            return Ok(Some(m));
        }
        let Some(meta) = self.registry.get(resource_class) else {
            return Ok(Some(m));
        };
        if meta.identifier.iter().any(|id| id == property) {
            let writable = m.is_writable().unwrap_or_else(|| meta.is_identifier_natural());
            return Ok(Some(m.with_identifier(true).with_writable(writable)));
        }
        Ok(Some(m.with_identifier(false)))
    }
}

/// Restricts readable/writable to the requested serializer groups and decides link status for relations.
pub struct SerializerGroupStage {
    catalog: Arc<ResourceCatalog>,
    resources: Arc<dyn ResourceMetadataFactory>,
}

impl SerializerGroupStage {
    pub fn new(catalog: Arc<ResourceCatalog>, resources: Arc<dyn ResourceMetadataFactory>) -> Self {
        SerializerGroupStage { catalog, resources }
    }

    /// (normalization groups, denormalization groups); `None` means unrestricted.
    fn effective_groups(
        &self,
        resource_class: &str,
        options: &PropertyOptions,
    ) -> Result<(Option<Vec<String>>, Option<Vec<String>>), AppError> {
        if let Some(groups) = &options.serializer_groups {
            return Ok((Some(groups.clone()), Some(groups.clone())));
        }
        let resource = match self.resources.create(resource_class) {
            Ok(r) => r,
            Err(e) if e.is_metadata_not_found() => return Ok((None, None)),
            Err(e) => return Err(e),
        };
        let (operation_type, operation_name) = match (&options.collection_operation_name, &options.item_operation_name) {
            (Some(name), _) => (OperationType::Collection, Some(name.as_str())),
            (None, Some(name)) => (OperationType::Item, Some(name.as_str())),
            (None, None) => (OperationType::Item, None),
        };
        let groups = |key: &str| {
            resource
                .operation_attribute(operation_type, operation_name, key, true)
                .and_then(|ctx| ctx.get("groups"))
                .and_then(groups_from_value)
        };
        Ok((groups("normalization_context"), groups("denormalization_context")))
    }
}

fn intersects(wanted: &[String], available: &HashSet<String>) -> bool {
    wanted.iter().any(|g| available.contains(g))
}

impl PropertyStage for SerializerGroupStage {
    fn process(
        &self,
        resource_class: &str,
        property: &str,
        options: &PropertyOptions,
        previous: Option<PropertyMetadata>,
        _ctx: &StageContext<'_>,
    ) -> Result<Option<PropertyMetadata>, AppError> {
        let Some(mut m) = previous else {
            return Ok(None);
        };
        let (normalization, denormalization) = self.effective_groups(resource_class, options)?;
        let Some(config) = self.catalog.property(resource_class, property) else {
            return Ok(Some(m));
        };
        let groups: HashSet<String> = config.groups.iter().flatten().cloned().collect();

        if m.is_readable() != Some(false) {
            let readable = normalization.as_ref().map_or(true, |n| intersects(n, &groups));
            m = m.with_readable(readable);
        }
        if m.is_writable() != Some(false) {
            let writable = denormalization.as_ref().map_or(true, |d| intersects(d, &groups));
            m = m.with_writable(writable);
        }

        let related = m.type_().and_then(|t| t.related_class()).map(str::to_string);
        if let Some(related) = related.filter(|r| self.catalog.is_resource_class(r)) {
            let related_groups = self.catalog.resource_groups(&related);
            if m.is_readable_link().is_none() {
                let link = normalization.as_ref().is_some_and(|n| intersects(n, &related_groups));
                m = m.with_readable_link(link);
            }
            if m.is_writable_link().is_none() {
                let link = denormalization.as_ref().is_some_and(|d| intersects(d, &related_groups));
                m = m.with_writable_link(link);
            }
        }
        Ok(Some(m))
    }
}

/// Resolves a property through the first child resource class that re-declares it.
pub struct InheritedPropertyStage {
    catalog: Arc<ResourceCatalog>,
}

impl InheritedPropertyStage {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        InheritedPropertyStage { catalog }
    }
}

impl PropertyStage for InheritedPropertyStage {
    fn process(
        &self,
        resource_class: &str,
        property: &str,
        options: &PropertyOptions,
        previous: Option<PropertyMetadata>,
        ctx: &StageContext<'_>,
    ) -> Result<Option<PropertyMetadata>, AppError> {
        for known in self.catalog.class_names() {
            if known == resource_class
                || !self.catalog.is_subclass_of(known, resource_class)
                || self.catalog.own_property(known, property).is_none()
            {
                continue;
            }
            if let Some(child) = ctx.evaluate(known, property, options)? {
                return Ok(Some(child.with_child_inherited(known.clone())));
            }
        }
        Ok(previous)
    }
}

/// Value of a truthy flag in a context map (`true`, `"true"`, `1`).
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "on" | "yes"),
        Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FullConfig, ResourceConfig};
    use crate::metadata::{PropertyMetadataFactory, PropertyPipeline, ResourcePipeline};
    use crate::orm::{ClassMetadata, FieldMapping};

    fn catalog() -> Arc<ResourceCatalog> {
        let resources: Vec<ResourceConfig> = serde_json::from_value(json!([
            {
                "class": "App\\Dummy",
                "attributes": {"normalization_context": {"groups": ["read"]}, "order": {"id": "DESC"}},
                "properties": [
                    {"name": "id"},
                    {"name": "name", "groups": ["read", "write"]},
                    {"name": "secret", "groups": ["admin"]},
                    {"name": "relatedDummy", "type": {"builtin": "object", "class": "App\\RelatedDummy"}},
                    {"name": "children", "subresource": true,
                     "type": {"builtin": "array", "class": "App\\RelatedDummy", "collection": true}}
                ]
            },
            {
                "class": "App\\RelatedDummy",
                "short_name": "Related",
                "item_operations": {"get": {"method": "GET"}},
                "properties": [{"name": "id"}, {"name": "label", "groups": ["read"]}]
            },
            {
                "class": "App\\SpecialDummy",
                "parent": "App\\Dummy",
                "attributes": {"order": ["name"]},
                "properties": [{"name": "name", "description": "special", "groups": ["read"]}]
            }
        ]))
        .unwrap();
        Arc::new(ResourceCatalog::from_config(&FullConfig {
            resources,
            ..Default::default()
        }))
    }

    fn registry() -> Arc<ClassMetadataRegistry> {
        let field = |n: &str| FieldMapping {
            field_name: n.into(),
            column_name: n.into(),
            sql_type: None,
            nullable: false,
        };
        let mut r = ClassMetadataRegistry::new();
        r.register(ClassMetadata {
            name: "App\\Dummy".into(),
            identifier: vec!["id".into()],
            identifier_generated: true,
            fields: vec![field("id"), field("name"), field("secret")],
            ..Default::default()
        });
        r.register(ClassMetadata {
            name: "App\\Tag".into(),
            identifier: vec!["code".into()],
            identifier_generated: false,
            fields: vec![field("code"), field("label")],
            ..Default::default()
        });
        Arc::new(r)
    }

    fn resources(catalog: &Arc<ResourceCatalog>) -> Arc<dyn ResourceMetadataFactory> {
        Arc::new(
            ResourcePipeline::new()
                .stage(ConfigResourceStage::new(catalog.clone()))
                .stage(ShortNameStage)
                .stage(OperationDefaultsStage::new(catalog.clone()))
                .stage(ParentResourceStage::new(catalog.clone())),
        )
    }

    fn properties() -> PropertyPipeline {
        let catalog = catalog();
        let registry = registry();
        PropertyPipeline::new()
            .stage(ConfigPropertyStage::new(catalog.clone(), registry.clone()))
            .stage(OrmPropertyStage::new(registry))
            .stage(SerializerGroupStage::new(catalog.clone(), resources(&catalog)))
            .stage(InheritedPropertyStage::new(catalog))
    }

    #[test]
    fn resource_defaults() {
        let catalog = catalog();
        let factory = resources(&catalog);
        let dummy = factory.create("App\\Dummy").unwrap();
        assert_eq!(dummy.short_name(), Some("Dummy"));
        let item_ops: Vec<&String> = dummy.item_operations().unwrap().keys().collect();
        assert_eq!(item_ops, vec!["get", "put", "delete"]);
        let collection_ops: Vec<&String> = dummy.collection_operations().unwrap().keys().collect();
        assert_eq!(collection_ops, vec!["get", "post"]);
        assert!(dummy.subresource_operations().unwrap().contains_key("children_get_subresource"));

        let related = factory.create("App\\RelatedDummy").unwrap();
        assert_eq!(related.short_name(), Some("Related"));
        assert_eq!(related.item_operations().unwrap().len(), 1);
    }

    #[test]
    fn child_resource_inherits_missing_attributes() {
        let catalog = catalog();
        let special = resources(&catalog).create("App\\SpecialDummy").unwrap();
        assert_eq!(special.attribute("order"), Some(&json!(["name"])));
        assert!(special.attribute("normalization_context").is_some());
    }

    #[test]
    fn groups_restrict_readability() {
        let pipeline = properties();
        let opts = PropertyOptions::default();
        assert_eq!(pipeline.create("App\\Dummy", "name", &opts).unwrap().is_readable(), Some(true));
        assert_eq!(pipeline.create("App\\Dummy", "secret", &opts).unwrap().is_readable(), Some(false));

        let admin = PropertyOptions::with_groups(Some(vec!["admin".into()]));
        assert_eq!(pipeline.create("App\\Dummy", "secret", &admin).unwrap().is_readable(), Some(true));
    }

    #[test]
    fn related_resource_sharing_groups_is_embedded() {
        let pipeline = properties();
        let m = pipeline
            .create("App\\Dummy", "relatedDummy", &PropertyOptions::default())
            .unwrap();
        assert_eq!(m.is_readable_link(), Some(true));
        assert_eq!(m.is_writable_link(), Some(false));
    }

    #[test]
    fn orm_identifier_flags() {
        let pipeline = properties();
        let opts = PropertyOptions::default();
        let id = pipeline.create("App\\Dummy", "id", &opts).unwrap();
        assert_eq!(id.is_identifier(), Some(true));
        assert_eq!(pipeline.create("App\\Dummy", "name", &opts).unwrap().is_identifier(), Some(false));

        let code = pipeline.create("App\\Tag", "code", &opts).unwrap();
        assert_eq!(code.is_identifier(), Some(true));
        assert_eq!(code.is_writable(), Some(true));
    }

    #[test]
    fn orm_stage_leaves_existing_identifier_alone() {
        let stage = OrmPropertyStage::new(Arc::new(ClassMetadataRegistry::new()));
        let pipeline = PropertyPipeline::new();
        let ctx = StageContext::for_tests(&pipeline);
        let m = PropertyMetadata::new().with_identifier(true);
        let out = stage
            .process("Unknown", "id", &PropertyOptions::default(), Some(m.clone()), &ctx)
            .unwrap();
        assert_eq!(out, Some(m));
        let plain = PropertyMetadata::new();
        let out = stage
            .process("Unknown", "name", &PropertyOptions::default(), Some(plain.clone()), &ctx)
            .unwrap();
        assert_eq!(out, Some(plain));
    }

    #[test]
    fn inherited_property_reports_child_class() {
        let pipeline = properties();
        let m = pipeline.create("App\\Dummy", "name", &PropertyOptions::default()).unwrap();
        assert_eq!(m.child_inherited(), Some("App\\SpecialDummy"));
        assert_eq!(m.description(), Some("special"));
        let id = pipeline.create("App\\Dummy", "id", &PropertyOptions::default()).unwrap();
        assert_eq!(id.child_inherited(), None);
    }

    #[test]
    fn inherited_property_survives_parent_cycle() {
        let resources: Vec<ResourceConfig> = serde_json::from_value(json!([
            {"class": "A", "parent": "B", "properties": [{"name": "name"}]},
            {"class": "B", "parent": "A", "properties": [{"name": "name"}]}
        ]))
        .unwrap();
        let config = FullConfig {
            resources,
            ..Default::default()
        };
        assert!(matches!(
            crate::config::validate(&config),
            Err(crate::error::ConfigError::Validation(_))
        ));

        let catalog = Arc::new(ResourceCatalog::from_config(&config));
        let pipeline = PropertyPipeline::new()
            .stage(ConfigPropertyStage::new(catalog.clone(), Arc::new(ClassMetadataRegistry::new())))
            .stage(InheritedPropertyStage::new(catalog));
        let m = pipeline.create("A", "name", &PropertyOptions::default()).unwrap();
        assert_eq!(m.child_inherited(), Some("B"));
    }

    #[test]
    fn unknown_property_and_class() {
        let pipeline = properties();
        let opts = PropertyOptions::default();
        assert!(matches!(
            pipeline.create("App\\Dummy", "nope", &opts),
            Err(AppError::PropertyNotFound { .. })
        ));
        assert!(matches!(
            pipeline.create("App\\Nope", "id", &opts),
            Err(AppError::ResourceClassNotFound(_))
        ));
    }

    #[test]
    fn truthy_values() {
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("true"))));
        assert!(!is_truthy(Some(&json!("false"))));
        assert!(!is_truthy(None));
    }
}
