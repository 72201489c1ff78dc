//! Eager loading: joins and selects the associations the serializer is going to read.
//!
//! The walk starts at the root alias and follows ORM association mappings in declaration
//! order. Every association is looked up as a property with the active serializer groups;
//! only eager (or force-eager) associations that are readable, linked or flagged
//! `fetchEager` get joined. Depth is bounded by the serializer `max_depth` attributes when
//! `enable_max_depth` is set in the normalization context, and the total number of joins is
//! bounded by `max_joins`.

use super::{QueryCollectionExtension, QueryItemExtension};
use crate::config::EagerLoadingSettings;
use crate::error::AppError;
use crate::metadata::{
    groups_from_value, is_truthy, Attributes, OperationType, PropertyMetadataFactory, PropertyNameCollectionFactory,
    PropertyOptions, ResourceMetadata, ResourceMetadataFactory,
};
use crate::orm::{ClassMetadata, ClassMetadataRegistry, FetchMode, QueryBuilder};
use crate::query::QueryNameGenerator;
use crate::request::RequestStack;
use crate::serializer::{MaxDepthMetadataFactory, SerializerContextBuilder};
use serde_json::Value;
use std::sync::Arc;

const MAX_JOINS_EXCEEDED: &str = "The total number of joined relations has exceeded the specified maximum. \
     Raise the limit if necessary, or use the max_depth option of the serializer.";

pub struct EagerLoadingExtension {
    property_names: Arc<dyn PropertyNameCollectionFactory>,
    properties: Arc<dyn PropertyMetadataFactory>,
    resources: Arc<dyn ResourceMetadataFactory>,
    registry: Arc<ClassMetadataRegistry>,
    settings: EagerLoadingSettings,
    context_builder: Option<Arc<dyn SerializerContextBuilder>>,
    max_depth: Option<Arc<dyn MaxDepthMetadataFactory>>,
}

/// Per-query state shared by every branch of the walk.
struct Walk<'a> {
    options: &'a PropertyOptions,
    enable_max_depth: bool,
    force_eager: bool,
    fetch_partial: bool,
    joins: usize,
}

impl EagerLoadingExtension {
    pub fn new(
        property_names: Arc<dyn PropertyNameCollectionFactory>,
        properties: Arc<dyn PropertyMetadataFactory>,
        resources: Arc<dyn ResourceMetadataFactory>,
        registry: Arc<ClassMetadataRegistry>,
        settings: EagerLoadingSettings,
    ) -> Self {
        EagerLoadingExtension {
            property_names,
            properties,
            resources,
            registry,
            settings,
            context_builder: None,
            max_depth: None,
        }
    }

    /// Collection groups come from this builder when the current request targets the same class.
    pub fn with_context_builder(mut self, builder: Arc<dyn SerializerContextBuilder>) -> Self {
        self.context_builder = Some(builder);
        self
    }

    pub fn with_max_depth(mut self, factory: Arc<dyn MaxDepthMetadataFactory>) -> Self {
        self.max_depth = Some(factory);
        self
    }

    /// Operation attribute, then resource attribute, then the global setting.
    fn flag(
        metadata: &ResourceMetadata,
        operation_type: OperationType,
        operation_name: Option<&str>,
        key: &str,
        default: bool,
    ) -> bool {
        match metadata.operation_attribute(operation_type, operation_name, key, true) {
            Some(Value::Bool(b)) => *b,
            Some(other) => is_truthy(Some(other)),
            None => default,
        }
    }

    fn collection_context(
        &self,
        resource_class: &str,
        metadata: &ResourceMetadata,
        operation_name: Option<&str>,
    ) -> Result<Attributes, AppError> {
        if let (Some(builder), Some(request)) = (&self.context_builder, RequestStack::current()) {
            if request.attributes.resource_class.as_deref() == Some(resource_class) {
                return builder.create_from_request(&request, true);
            }
        }
        Ok(metadata
            .collection_operation_attribute(operation_name, "normalization_context", true)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default())
    }

    /// Groups and normalization context for an item: explicit `groups` in the context win,
    /// then the context's `resource_class` (denormalization when `api_denormalize` is set),
    /// then the item operation of the fetched class.
    fn item_context(
        &self,
        metadata: &ResourceMetadata,
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<(Option<Vec<String>>, Attributes), AppError> {
        if let Some(groups) = context.get("groups") {
            return Ok((groups_from_value(groups), context.clone()));
        }
        let from_metadata = |m: &ResourceMetadata, key: &str| {
            m.item_operation_attribute(operation_name, key, true)
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default()
        };
        let metadata_context = match context.get("resource_class").and_then(Value::as_str) {
            Some(class) => {
                let key = if is_truthy(context.get("api_denormalize")) {
                    "denormalization_context"
                } else {
                    "normalization_context"
                };
                from_metadata(&self.resources.create(class)?, key)
            }
            None => from_metadata(metadata, "normalization_context"),
        };
        let groups = metadata_context.get("groups").and_then(groups_from_value);
        let normalization = if context.is_empty() { metadata_context } else { context.clone() };
        Ok((groups, normalization))
    }

    #[allow(clippy::too_many_arguments)]
    fn join_relations(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        walk: &mut Walk<'_>,
        resource_class: &str,
        parent_alias: &str,
        was_left_join: bool,
        current_depth: Option<u32>,
    ) -> Result<(), AppError> {
        let Some(class) = self.registry.get(resource_class) else {
            tracing::debug!(class = %resource_class, "no ORM metadata, eager loading stops here");
            return Ok(());
        };
        let current_depth = current_depth.map(|d| d.saturating_sub(1));

        for mapping in &class.association_mappings {
            let association = mapping.field_name.as_str();
            if walk.enable_max_depth && current_depth == Some(0) {
                continue;
            }

            let property = match self.properties.create(resource_class, association, walk.options) {
                Ok(p) => p,
                Err(e) if e.is_metadata_not_found() => {
                    tracing::debug!(class = %resource_class, property = %association, "no property metadata, not joined");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if mapping.fetch == FetchMode::ExtraLazy {
                continue;
            }
            if !walk.force_eager && mapping.fetch != FetchMode::Eager {
                continue;
            }
            let fetch_eager = property.bool_attribute("fetchEager");
            if fetch_eager == Some(false) {
                continue;
            }
            if fetch_eager != Some(true)
                && property.is_readable() != Some(true)
                && property.is_readable_link() != Some(true)
            {
                continue;
            }

            let mut branch_depth = current_depth;
            if let Some(limit) = self.max_depth.as_ref().and_then(|f| f.max_depth(resource_class, association)) {
                if branch_depth.map_or(true, |d| limit < d) {
                    branch_depth = Some(limit);
                }
            }

            let Some(target) = self.registry.get(&mapping.target_entity) else {
                tracing::debug!(class = %mapping.target_entity, "association target has no ORM metadata, not joined");
                continue;
            };

            if walk.joins >= self.settings.max_joins {
                tracing::warn!(max_joins = self.settings.max_joins, "eager loading join budget exhausted");
                return Err(AppError::Runtime(MAX_JOINS_EXCEEDED.into()));
            }

            let is_left_join = was_left_join || mapping.is_nullable();
            let alias = names.generate_join_alias(association);
            let path = format!("{}.{}", parent_alias, association);
            if is_left_join {
                qb.left_join(&path, &alias);
            } else {
                qb.inner_join(&path, &alias);
            }
            walk.joins += 1;

            if walk.fetch_partial && target.sub_classes.is_empty() {
                match self.partial_fields(&target, walk.options) {
                    Ok(fields) => {
                        qb.add_select(format!("partial {}.{{{}}}", alias, fields.join(",")));
                    }
                    Err(e) if matches!(e, AppError::ResourceClassNotFound(_)) => {
                        tracing::debug!(class = %target.name, "target is not a resource, nested associations skipped");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            } else {
                qb.add_select(alias.clone());
            }

            self.join_relations(qb, names, walk, &target.name, &alias, is_left_join, branch_depth)?;
        }
        Ok(())
    }

    /// Identifiers, plus mapped fields that are readable or flagged `fetchable`; embedded
    /// properties contribute their flattened fields.
    fn partial_fields(&self, target: &ClassMetadata, options: &PropertyOptions) -> Result<Vec<String>, AppError> {
        let mut fields = Vec::new();
        for property in self.property_names.create(&target.name)?.iter() {
            let metadata = match self.properties.create(&target.name, property, options) {
                Ok(m) => m,
                Err(e) if e.is_metadata_not_found() => continue,
                Err(e) => return Err(e),
            };
            if metadata.is_identifier() == Some(true) || target.identifier.iter().any(|id| id == property) {
                fields.push(property.to_string());
                continue;
            }
            if target.embedded_classes.contains_key(property) {
                fields.extend(target.embedded_field_names(property).into_iter().map(str::to_string));
                continue;
            }
            let fetchable = metadata.bool_attribute("fetchable") == Some(true);
            if target.has_field(property) && (fetchable || metadata.is_readable() == Some(true)) {
                fields.push(property.to_string());
            }
        }
        Ok(fields)
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        metadata: &ResourceMetadata,
        operation_type: OperationType,
        operation_name: Option<&str>,
        groups: Option<Vec<String>>,
        normalization_context: &Attributes,
    ) -> Result<(), AppError> {
        let Some(root) = qb.root_aliases().first().map(|a| a.to_string()) else {
            return Ok(());
        };
        let mut options = PropertyOptions::with_groups(groups);
        match operation_type {
            OperationType::Item => options.item_operation_name = operation_name.map(String::from),
            _ => options.collection_operation_name = operation_name.map(String::from),
        }
        let mut walk = Walk {
            options: &options,
            enable_max_depth: is_truthy(normalization_context.get("enable_max_depth")),
            force_eager: Self::flag(metadata, operation_type, operation_name, "force_eager", self.settings.force_eager),
            fetch_partial: Self::flag(
                metadata,
                operation_type,
                operation_name,
                "fetch_partial",
                self.settings.fetch_partial,
            ),
            joins: 0,
        };
        self.join_relations(qb, names, &mut walk, resource_class, &root, false, None)
    }
}

impl QueryCollectionExtension for EagerLoadingExtension {
    fn apply_to_collection(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        operation_name: Option<&str>,
        _context: &Attributes,
    ) -> Result<(), AppError> {
        let metadata = self.resources.create(resource_class)?;
        let context = self.collection_context(resource_class, &metadata, operation_name)?;
        let groups = context.get("groups").and_then(groups_from_value);
        self.apply(
            qb,
            names,
            resource_class,
            &metadata,
            OperationType::Collection,
            operation_name,
            groups,
            &context,
        )
    }
}

impl QueryItemExtension for EagerLoadingExtension {
    fn apply_to_item(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        _identifiers: &[(String, Value)],
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<(), AppError> {
        let metadata = self.resources.create(resource_class)?;
        let (groups, normalization) = self.item_context(&metadata, operation_name, context)?;
        self.apply(
            qb,
            names,
            resource_class,
            &metadata,
            OperationType::Item,
            operation_name,
            groups,
            &normalization,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PropertyMetadata, ResourceMetadata};
    use crate::orm::{AssociationKind, AssociationMapping, FieldMapping, JoinColumn, JoinTable};
    use crate::testing::{StaticNames, StaticProperties, StaticResources};
    use serde_json::json;
    use std::collections::HashMap;

    fn assoc(name: &str, target: &str, fetch: FetchMode, nullable: Option<bool>) -> AssociationMapping {
        AssociationMapping {
            field_name: name.into(),
            target_entity: target.into(),
            kind: AssociationKind::ManyToOne,
            fetch,
            join_columns: nullable
                .map(|n| {
                    vec![JoinColumn {
                        name: format!("{}_id", name),
                        referenced_column: "id".into(),
                        nullable: Some(n),
                    }]
                })
                .unwrap_or_default(),
            mapped_by: None,
            join_table: None,
        }
    }

    fn field(name: &str) -> FieldMapping {
        FieldMapping {
            field_name: name.into(),
            column_name: name.replace('.', "_"),
            sql_type: None,
            nullable: true,
        }
    }

    fn class(name: &str, fields: &[&str], associations: Vec<AssociationMapping>) -> ClassMetadata {
        ClassMetadata {
            name: name.into(),
            identifier: vec!["id".into()],
            fields: fields.iter().map(|f| field(f)).collect(),
            association_mappings: associations,
            ..Default::default()
        }
    }

    fn settings(force_eager: bool, fetch_partial: bool, max_joins: usize) -> EagerLoadingSettings {
        EagerLoadingSettings {
            max_joins,
            force_eager,
            fetch_partial,
        }
    }

    fn linked() -> PropertyMetadata {
        PropertyMetadata::new().with_readable_link(true)
    }

    fn identifier() -> PropertyMetadata {
        PropertyMetadata::new().with_identifier(true)
    }

    fn joins(qb: &QueryBuilder) -> Vec<String> {
        qb.joins()
            .iter()
            .map(|j| format!("{:?} {} {}", j.join_type, j.target, j.alias))
            .collect()
    }

    fn item_fixture() -> (Arc<ClassMetadataRegistry>, StaticNames, StaticProperties) {
        let mut registry = ClassMetadataRegistry::new();
        let mut relation_table = assoc("relatedDummy3", "UnknownDummy", FetchMode::Eager, None);
        relation_table.kind = AssociationKind::ManyToMany;
        relation_table.join_table = Some(JoinTable {
            name: "dummy_related3".into(),
            schema: None,
            join_columns: vec![JoinColumn {
                name: "dummy_id".into(),
                referenced_column: "id".into(),
                nullable: Some(false),
            }],
            inverse_join_columns: vec![],
        });
        registry.register(class(
            "Dummy",
            &["id"],
            vec![
                assoc("relatedDummy", "RelatedDummy", FetchMode::Eager, Some(true)),
                assoc("relatedDummy2", "UnknownDummy", FetchMode::Eager, Some(false)),
                relation_table,
                assoc("relatedDummy4", "UnknownDummy", FetchMode::Eager, None),
                assoc("relatedDummy5", "UnknownDummy", FetchMode::Lazy, None),
                assoc("singleInheritanceRelation", "AbstractDummy", FetchMode::Eager, None),
            ],
        ));
        let mut related = class(
            "RelatedDummy",
            &["id", "name", "notreadable", "embeddedDummy.name"],
            vec![assoc("relation", "UnknownDummy", FetchMode::Eager, Some(false))],
        );
        related.embedded_classes = HashMap::from([("embeddedDummy".to_string(), "EmbeddableDummy".to_string())]);
        registry.register(related);
        registry.register(class("UnknownDummy", &["id"], vec![]));
        let mut abstract_dummy = class("AbstractDummy", &["id"], vec![]);
        abstract_dummy.sub_classes = vec!["ConcreteDummy".into()];
        registry.register(abstract_dummy);

        let names = StaticNames::new()
            .with(
                "RelatedDummy",
                &["id", "name", "embeddedDummy", "notindatabase", "notreadable", "relation"],
            )
            .with("UnknownDummy", &["id"]);
        let readable = || PropertyMetadata::new().with_readable(true);
        let properties = StaticProperties::new()
            .with("Dummy", "relatedDummy", linked())
            .with("Dummy", "relatedDummy2", linked())
            .with("Dummy", "relatedDummy3", linked())
            .with("Dummy", "relatedDummy4", linked())
            .with("Dummy", "relatedDummy5", linked())
            .with("Dummy", "singleInheritanceRelation", linked())
            .with("RelatedDummy", "id", identifier())
            .with("RelatedDummy", "name", readable())
            .with("RelatedDummy", "embeddedDummy", readable())
            .with("RelatedDummy", "notindatabase", readable())
            .with("RelatedDummy", "notreadable", PropertyMetadata::new().with_readable(false))
            .with("RelatedDummy", "relation", linked())
            .with("UnknownDummy", "id", identifier());
        (Arc::new(registry), names, properties)
    }

    #[test]
    fn item_joins_and_partial_selects() {
        let (registry, names, properties) = item_fixture();
        let ext = EagerLoadingExtension::new(
            Arc::new(names),
            Arc::new(properties),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            registry,
            settings(false, true, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_item(&mut qb, &mut QueryNameGenerator::new(), "Dummy", &[], None, &Attributes::new())
            .unwrap();

        assert_eq!(
            joins(&qb),
            vec![
                "Left o.relatedDummy relatedDummy_a1",
                "Left relatedDummy_a1.relation relation_a2",
                "Inner o.relatedDummy2 relatedDummy2_a3",
                "Left o.relatedDummy3 relatedDummy3_a4",
                "Left o.relatedDummy4 relatedDummy4_a5",
                "Left o.singleInheritanceRelation singleInheritanceRelation_a6",
            ]
        );
        assert_eq!(
            qb.select_parts(),
            [
                "o",
                "partial relatedDummy_a1.{id,name,embeddedDummy.name}",
                "partial relation_a2.{id}",
                "partial relatedDummy2_a3.{id}",
                "partial relatedDummy3_a4.{id}",
                "partial relatedDummy4_a5.{id}",
                "singleInheritanceRelation_a6",
            ]
        );
    }

    #[test]
    fn item_operation_name_reaches_property_lookups() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![assoc("foo", "Dummy", FetchMode::Lazy, None)],
        ));
        let properties = Arc::new(StaticProperties::new().with("Dummy", "foo", PropertyMetadata::new()));
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            properties.clone(),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            Arc::new(registry),
            settings(false, true, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_item(
            &mut qb,
            &mut QueryNameGenerator::new(),
            "Dummy",
            &[],
            Some("item_operation"),
            &Attributes::new(),
        )
        .unwrap();
        let seen = properties.seen_options.lock().unwrap();
        assert_eq!(seen[0].item_operation_name.as_deref(), Some("item_operation"));
        assert!(seen[0].collection_operation_name.is_none());
        assert!(qb.joins().is_empty());
    }

    #[test]
    fn collection_without_partial_selects_whole_entities() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![
                assoc("relatedDummy", "RelatedDummy", FetchMode::Eager, Some(true)),
                assoc("relatedDummy2", "RelatedDummy", FetchMode::Eager, Some(false)),
            ],
        ));
        registry.register(class("RelatedDummy", &["id"], vec![]));
        let properties = StaticProperties::new()
            .with("Dummy", "relatedDummy", linked())
            .with("Dummy", "relatedDummy2", linked());
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            Arc::new(properties),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            Arc::new(registry),
            settings(true, false, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap();
        assert_eq!(
            joins(&qb),
            vec![
                "Left o.relatedDummy relatedDummy_a1",
                "Inner o.relatedDummy2 relatedDummy2_a2"
            ]
        );
        assert_eq!(qb.select_parts(), ["o", "relatedDummy_a1", "relatedDummy2_a2"]);
    }

    #[test]
    fn non_readable_property_flagged_fetch_eager_is_joined() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![
                assoc("relatedDummy", "RelatedDummy", FetchMode::Eager, Some(true)),
                assoc("relatedDummy2", "RelatedDummy", FetchMode::Eager, Some(false)),
            ],
        ));
        registry.register(class("RelatedDummy", &["id"], vec![]));
        let mut attrs = Attributes::new();
        attrs.insert("fetchEager".into(), json!(true));
        let hidden = PropertyMetadata::new()
            .with_attributes(attrs)
            .with_readable(false)
            .with_readable_link(false);
        let properties = StaticProperties::new()
            .with("Dummy", "relatedDummy", hidden.clone())
            .with("Dummy", "relatedDummy2", hidden);
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            Arc::new(properties),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            Arc::new(registry),
            settings(true, false, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap();
        assert_eq!(qb.joins().len(), 2);
        assert_eq!(qb.select_parts(), ["o", "relatedDummy_a1", "relatedDummy2_a2"]);
    }

    #[test]
    fn fetch_eager_false_is_never_joined() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![assoc("relatedDummy", "RelatedDummy", FetchMode::Eager, Some(true))],
        ));
        registry.register(class("RelatedDummy", &["id"], vec![]));
        let mut attrs = Attributes::new();
        attrs.insert("fetchEager".into(), json!(false));
        let properties = StaticProperties::new().with("Dummy", "relatedDummy", linked().with_attributes(attrs));
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            Arc::new(properties),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            Arc::new(registry),
            settings(true, false, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap();
        assert!(qb.joins().is_empty());
    }

    fn cyclic_registry() -> Arc<ClassMetadataRegistry> {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![assoc("relatedDummy", "RelatedDummy", FetchMode::Eager, Some(false))],
        ));
        registry.register(class(
            "RelatedDummy",
            &["id"],
            vec![assoc("dummy", "Dummy", FetchMode::Eager, Some(false))],
        ));
        Arc::new(registry)
    }

    fn cyclic_properties() -> StaticProperties {
        StaticProperties::new()
            .with("Dummy", "relatedDummy", linked())
            .with("RelatedDummy", "dummy", linked())
    }

    #[test]
    fn max_joins_is_a_runtime_error() {
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            Arc::new(cyclic_properties()),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            cyclic_registry(),
            settings(true, false, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        let err = ext
            .apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap_err();
        match err {
            AppError::Runtime(message) => assert!(message.starts_with("The total number of joined relations")),
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(qb.joins().len(), 30);
    }

    struct Depths;
    impl MaxDepthMetadataFactory for Depths {
        fn max_depth(&self, class: &str, property: &str) -> Option<u32> {
            match (class, property) {
                ("Dummy", "relatedDummy") => Some(2),
                ("RelatedDummy", "dummy") => Some(4),
                _ => None,
            }
        }
    }

    #[test]
    fn max_depth_bounds_the_walk() {
        let metadata = ResourceMetadata::new()
            .with_attributes(json!({"normalization_context": {"enable_max_depth": "true"}}).as_object().cloned().unwrap());
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new().with("RelatedDummy", &["dummy"]).with("Dummy", &["relatedDummy"])),
            Arc::new(cyclic_properties()),
            Arc::new(StaticResources::new().with("Dummy", metadata)),
            cyclic_registry(),
            settings(false, false, 30),
        )
        .with_max_depth(Arc::new(Depths));
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap();
        assert_eq!(
            joins(&qb),
            vec!["Inner o.relatedDummy relatedDummy_a1", "Inner relatedDummy_a1.dummy dummy_a2"]
        );
    }

    #[test]
    fn force_eager_joins_lazy_associations() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![assoc("relation", "UnknownDummy", FetchMode::Lazy, Some(false))],
        ));
        registry.register(class("UnknownDummy", &["id"], vec![]));
        let metadata = ResourceMetadata::new()
            .with_attributes(json!({"normalization_context": {"groups": "foobar"}}).as_object().cloned().unwrap());
        let properties = Arc::new(
            StaticProperties::new()
                .with("Dummy", "relation", linked())
                .with("UnknownDummy", "id", identifier()),
        );
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new().with("UnknownDummy", &["id"])),
            properties.clone(),
            Arc::new(StaticResources::new().with("Dummy", metadata)),
            Arc::new(registry),
            settings(true, true, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_item(&mut qb, &mut QueryNameGenerator::new(), "Dummy", &[], None, &Attributes::new())
            .unwrap();
        assert_eq!(joins(&qb), vec!["Inner o.relation relation_a1"]);
        assert_eq!(qb.select_parts(), ["o", "partial relation_a1.{id}"]);
        let seen = properties.seen_options.lock().unwrap();
        assert!(seen
            .iter()
            .all(|o| o.serializer_groups.as_deref() == Some(&["foobar".to_string()][..])));
    }

    #[test]
    fn missing_metadata_skips_the_branch() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "Dummy",
            &["id"],
            vec![
                assoc("relation", "UnknownDummy", FetchMode::Eager, Some(false)),
                assoc("missing", "UnknownDummy", FetchMode::Eager, Some(false)),
            ],
        ));
        registry.register(class(
            "UnknownDummy",
            &["id"],
            vec![assoc("deeper", "Dummy", FetchMode::Eager, Some(false))],
        ));
        let properties = StaticProperties::new()
            .with("Dummy", "relation", linked())
            .with("UnknownDummy", "deeper", linked());
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            Arc::new(properties),
            Arc::new(StaticResources::new().with("Dummy", ResourceMetadata::new())),
            Arc::new(registry),
            settings(false, true, 30),
        );
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap();
        // UnknownDummy has no property names, so nothing under relation_a1 is walked
        assert_eq!(joins(&qb), vec!["Inner o.relation relation_a1"]);
    }

    #[test]
    fn existing_context_groups_are_used_as_is() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "RelatedDummy",
            &["id"],
            vec![assoc("thirdLevel", "RelatedDummy", FetchMode::Lazy, None)],
        ));
        let properties = Arc::new(StaticProperties::new().with("RelatedDummy", "thirdLevel", PropertyMetadata::new()));
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            properties.clone(),
            Arc::new(StaticResources::new().with("RelatedDummy", ResourceMetadata::new())),
            Arc::new(registry),
            settings(false, true, 30),
        );
        let mut context = Attributes::new();
        context.insert("groups".into(), json!("some_groups"));
        context.insert("resource_class".into(), json!("Dummy"));
        let mut qb = QueryBuilder::new("RelatedDummy", "o");
        ext.apply_to_item(
            &mut qb,
            &mut QueryNameGenerator::new(),
            "RelatedDummy",
            &[("id".into(), json!(1))],
            Some("item_operation"),
            &context,
        )
        .unwrap();
        let seen = properties.seen_options.lock().unwrap();
        assert_eq!(seen[0].serializer_groups, Some(vec!["some_groups".to_string()]));
    }

    #[test]
    fn denormalization_groups_come_from_the_context_class() {
        let mut registry = ClassMetadataRegistry::new();
        registry.register(class(
            "RelatedDummy",
            &["id"],
            vec![assoc("thirdLevel", "RelatedDummy", FetchMode::Lazy, None)],
        ));
        let dummy = ResourceMetadata::new().with_attributes(
            json!({"denormalization_context": {"groups": ["write"]}, "normalization_context": {"groups": ["read"]}})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let properties = Arc::new(StaticProperties::new().with("RelatedDummy", "thirdLevel", PropertyMetadata::new()));
        let ext = EagerLoadingExtension::new(
            Arc::new(StaticNames::new()),
            properties.clone(),
            Arc::new(
                StaticResources::new()
                    .with("RelatedDummy", ResourceMetadata::new())
                    .with("Dummy", dummy),
            ),
            Arc::new(registry),
            settings(false, true, 30),
        );
        let mut context = Attributes::new();
        context.insert("resource_class".into(), json!("Dummy"));
        context.insert("api_denormalize".into(), json!(true));
        let mut qb = QueryBuilder::new("RelatedDummy", "o");
        ext.apply_to_item(&mut qb, &mut QueryNameGenerator::new(), "RelatedDummy", &[], None, &context)
            .unwrap();
        let seen = properties.seen_options.lock().unwrap();
        assert_eq!(seen[0].serializer_groups, Some(vec!["write".to_string()]));
    }
}
