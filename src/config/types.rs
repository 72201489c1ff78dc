//! Raw config types matching the JSON documents (resources.json, entities.json, filters.json).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub class: String,
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub iri: Option<String>,
    /// Parent resource class; attributes and properties are inherited from it.
    #[serde(default)]
    pub parent: Option<String>,
    /// Operation name → operation attributes. Absent means the default operations.
    #[serde(default)]
    pub item_operations: Option<Map<String, Value>>,
    #[serde(default)]
    pub collection_operations: Option<Map<String, Value>>,
    #[serde(default)]
    pub subresource_operations: Option<Map<String, Value>>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeConfig {
    pub builtin: String,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_: Option<TypeConfig>,
    #[serde(default)]
    pub readable: Option<bool>,
    #[serde(default)]
    pub writable: Option<bool>,
    #[serde(default)]
    pub readable_link: Option<bool>,
    #[serde(default)]
    pub writable_link: Option<bool>,
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub identifier: Option<bool>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub iri: Option<String>,
    /// Serializer groups the property belongs to.
    #[serde(default)]
    pub groups: Option<Vec<String>>,
    /// Serializer max depth for this property.
    #[serde(default)]
    pub max_depth: Option<u32>,
    /// Exposed as a subresource route.
    #[serde(default)]
    pub subresource: bool,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub constraints: Option<ConstraintsConfig>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConstraintsConfig {
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKindConfig {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchConfig {
    #[default]
    Lazy,
    Eager,
    ExtraLazy,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InheritanceConfig {
    #[default]
    None,
    SingleTable,
    Joined,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    /// Defaults to the snake_case field name.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type", default)]
    pub sql_type: Option<String>,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinColumnConfig {
    pub name: String,
    #[serde(default = "default_referenced_column")]
    pub referenced_column: String,
    #[serde(default)]
    pub nullable: Option<bool>,
}

fn default_referenced_column() -> String {
    "id".to_string()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JoinTableConfig {
    pub name: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub join_columns: Vec<JoinColumnConfig>,
    pub inverse_join_columns: Vec<JoinColumnConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AssociationConfig {
    pub name: String,
    pub kind: AssociationKindConfig,
    pub target: String,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub join_columns: Vec<JoinColumnConfig>,
    #[serde(default)]
    pub mapped_by: Option<String>,
    #[serde(default)]
    pub join_table: Option<JoinTableConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddableConfig {
    pub class: String,
    pub fields: Vec<FieldConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub class: String,
    pub table: String,
    #[serde(default)]
    pub schema: Option<String>,
    pub identifier: Vec<String>,
    #[serde(default = "default_true")]
    pub identifier_generated: bool,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub associations: Vec<AssociationConfig>,
    /// Embedded property → embeddable class.
    #[serde(default)]
    pub embedded: Map<String, Value>,
    #[serde(default)]
    pub inheritance: InheritanceConfig,
    #[serde(default)]
    pub sub_classes: Vec<String>,
    #[serde(default)]
    pub discriminator: Option<DiscriminatorConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiscriminatorConfig {
    pub column: String,
    pub value: String,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Property → strategy. Null strategy means `exact`.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// All config documents in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub embeddables: Vec<EmbeddableConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
}

impl FullConfig {
    pub fn resource(&self, class: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.class == class)
    }

    pub fn entity(&self, class: &str) -> Option<&EntityConfig> {
        self.entities.iter().find(|e| e.class == class)
    }
}
