//! Load config documents from a directory and resolve the ORM class metadata registry.

use crate::case::to_snake_case;
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use crate::orm::{
    AssociationKind, AssociationMapping, ClassMetadata, ClassMetadataRegistry, FetchMode, FieldMapping,
    InheritanceType, JoinColumn, JoinTable,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::Path;

/// Reads `resources.json`, `entities.json`, `embeddables.json` and `filters.json` from `dir`.
/// Missing files count as empty lists.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let config = FullConfig {
        resources: read_list(dir, "resources.json").await?,
        entities: read_list(dir, "entities.json").await?,
        embeddables: read_list(dir, "embeddables.json").await?,
        filters: read_list(dir, "filters.json").await?,
    };
    validate(&config)?;
    tracing::info!(
        resources = config.resources.len(),
        entities = config.entities.len(),
        filters = config.filters.len(),
        dir = %dir.display(),
        "config loaded"
    );
    Ok(config)
}

async fn read_list<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<Vec<T>, ConfigError> {
    let path = dir.join(file);
    let raw = match tokio::fs::read_to_string(&path).await {
        Ok(s) => s,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(ConfigError::Load(format!("{}: {}", path.display(), e))),
    };
    serde_json::from_str(&raw).map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
}

/// Build the class metadata registry from entity mappings (call after validate).
pub fn resolve(config: &FullConfig) -> Result<ClassMetadataRegistry, ConfigError> {
    validate(config)?;
    let embeddables: HashMap<&str, &EmbeddableConfig> =
        config.embeddables.iter().map(|e| (e.class.as_str(), e)).collect();
    let parents: HashMap<&str, &str> = config
        .entities
        .iter()
        .flat_map(|e| e.sub_classes.iter().map(move |s| (s.as_str(), e.class.as_str())))
        .collect();

    let mut registry = ClassMetadataRegistry::new();
    for e in &config.entities {
        let mut fields: Vec<FieldMapping> = e.fields.iter().map(|f| field_mapping(f, None)).collect();
        let mut embedded_classes = HashMap::new();
        for (property, class) in &e.embedded {
            let class = class.as_str().unwrap_or_default();
            let embeddable = embeddables.get(class).ok_or_else(|| ConfigError::MissingReference {
                kind: "embeddable",
                id: class.to_string(),
            })?;
            fields.extend(embeddable.fields.iter().map(|f| field_mapping(f, Some(property))));
            embedded_classes.insert(property.clone(), class.to_string());
        }

        let mut parent_classes = Vec::new();
        let mut cursor = e.class.as_str();
        while let Some(parent) = parents.get(cursor) {
            parent_classes.push(parent.to_string());
            cursor = parent;
        }

        registry.register(ClassMetadata {
            name: e.class.clone(),
            table_name: e.table.clone(),
            schema_name: e.schema.clone(),
            identifier: e.identifier.clone(),
            identifier_generated: e.identifier_generated,
            fields,
            association_mappings: e.associations.iter().map(association_mapping).collect(),
            embedded_classes,
            sub_classes: e.sub_classes.clone(),
            parent_classes,
            inheritance: match e.inheritance {
                InheritanceConfig::None => InheritanceType::None,
                InheritanceConfig::SingleTable => InheritanceType::SingleTable,
                InheritanceConfig::Joined => InheritanceType::Joined,
            },
            discriminator_column: e.discriminator.as_ref().map(|d| d.column.clone()),
            discriminator_value: e.discriminator.as_ref().map(|d| d.value.clone()),
        });
    }
    Ok(registry)
}

fn field_mapping(f: &FieldConfig, embedded_in: Option<&str>) -> FieldMapping {
    let field_name = match embedded_in {
        Some(prefix) => format!("{}.{}", prefix, f.name),
        None => f.name.clone(),
    };
    let column_name = match (&f.column, embedded_in) {
        (Some(c), Some(prefix)) => format!("{}_{}", to_snake_case(prefix), c),
        (Some(c), None) => c.clone(),
        (None, _) => to_snake_case(&field_name),
    };
    FieldMapping {
        field_name,
        column_name,
        sql_type: f.sql_type.clone(),
        nullable: f.nullable,
    }
}

fn join_column(c: &JoinColumnConfig) -> JoinColumn {
    JoinColumn {
        name: c.name.clone(),
        referenced_column: c.referenced_column.clone(),
        nullable: c.nullable,
    }
}

fn association_mapping(a: &AssociationConfig) -> AssociationMapping {
    AssociationMapping {
        field_name: a.name.clone(),
        target_entity: a.target.clone(),
        kind: match a.kind {
            AssociationKindConfig::ManyToOne => AssociationKind::ManyToOne,
            AssociationKindConfig::OneToOne => AssociationKind::OneToOne,
            AssociationKindConfig::OneToMany => AssociationKind::OneToMany,
            AssociationKindConfig::ManyToMany => AssociationKind::ManyToMany,
        },
        fetch: match a.fetch {
            FetchConfig::Lazy => FetchMode::Lazy,
            FetchConfig::Eager => FetchMode::Eager,
            FetchConfig::ExtraLazy => FetchMode::ExtraLazy,
        },
        join_columns: a.join_columns.iter().map(join_column).collect(),
        mapped_by: a.mapped_by.clone(),
        join_table: a.join_table.as_ref().map(|t| JoinTable {
            name: t.name.clone(),
            schema: t.schema.clone(),
            join_columns: t.join_columns.iter().map(join_column).collect(),
            inverse_join_columns: t.inverse_join_columns.iter().map(join_column).collect(),
        }),
    }
}
