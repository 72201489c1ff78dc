//! ORM class metadata: identifiers, field and association mappings, embeddables, inheritance.

use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    Lazy,
    Eager,
    ExtraLazy,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssociationKind {
    ManyToOne,
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl AssociationKind {
    pub fn is_to_many(self) -> bool {
        matches!(self, AssociationKind::OneToMany | AssociationKind::ManyToMany)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum InheritanceType {
    #[default]
    None,
    SingleTable,
    Joined,
}

#[derive(Clone, Debug)]
pub struct JoinColumn {
    pub name: String,
    pub referenced_column: String,
    /// Unset means nullable.
    pub nullable: Option<bool>,
}

#[derive(Clone, Debug)]
pub struct JoinTable {
    pub name: String,
    pub schema: Option<String>,
    /// Columns pointing at the owning class.
    pub join_columns: Vec<JoinColumn>,
    /// Columns pointing at the target class.
    pub inverse_join_columns: Vec<JoinColumn>,
}

#[derive(Clone, Debug)]
pub struct AssociationMapping {
    pub field_name: String,
    pub target_entity: String,
    pub kind: AssociationKind,
    pub fetch: FetchMode,
    pub join_columns: Vec<JoinColumn>,
    pub mapped_by: Option<String>,
    pub join_table: Option<JoinTable>,
}

impl AssociationMapping {
    /// Nullability of the first join column; associations without join columns count as nullable.
    pub fn is_nullable(&self) -> bool {
        self.join_columns
            .first()
            .and_then(|c| c.nullable)
            .unwrap_or(true)
    }

    pub fn is_owning_side(&self) -> bool {
        self.mapped_by.is_none()
    }
}

#[derive(Clone, Debug)]
pub struct FieldMapping {
    /// Field name; embedded fields are flattened as `embedded.field`.
    pub field_name: String,
    pub column_name: String,
    pub sql_type: Option<String>,
    pub nullable: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ClassMetadata {
    pub name: String,
    pub table_name: String,
    pub schema_name: Option<String>,
    pub identifier: Vec<String>,
    pub identifier_generated: bool,
    pub fields: Vec<FieldMapping>,
    /// Declaration order is kept; the eager-loading walk depends on it.
    pub association_mappings: Vec<AssociationMapping>,
    /// Embedded property name → embeddable class.
    pub embedded_classes: HashMap<String, String>,
    pub sub_classes: Vec<String>,
    pub parent_classes: Vec<String>,
    pub inheritance: InheritanceType,
    pub discriminator_column: Option<String>,
    pub discriminator_value: Option<String>,
}

impl ClassMetadata {
    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.field_name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    pub fn has_association(&self, name: &str) -> bool {
        self.association(name).is_some()
    }

    pub fn association(&self, name: &str) -> Option<&AssociationMapping> {
        self.association_mappings.iter().find(|a| a.field_name == name)
    }

    pub fn is_collection_valued_association(&self, name: &str) -> bool {
        self.association(name).map(|a| a.kind.is_to_many()).unwrap_or(false)
    }

    pub fn is_single_valued_association(&self, name: &str) -> bool {
        self.association(name).map(|a| !a.kind.is_to_many()).unwrap_or(false)
    }

    pub fn associations_by_target_class(&self, target: &str) -> Vec<&AssociationMapping> {
        self.association_mappings
            .iter()
            .filter(|a| a.target_entity == target)
            .collect()
    }

    pub fn is_identifier_composite(&self) -> bool {
        self.identifier.len() > 1
    }

    /// True when an identifier field is itself an association.
    pub fn contains_foreign_identifier(&self) -> bool {
        self.identifier.iter().any(|id| self.has_association(id))
    }

    pub fn is_identifier_natural(&self) -> bool {
        !self.identifier_generated
    }

    /// Flattened `embedded.field` names for one embedded property.
    pub fn embedded_field_names(&self, property: &str) -> Vec<&str> {
        let prefix = format!("{}.", property);
        self.fields
            .iter()
            .filter(|f| f.field_name.starts_with(&prefix))
            .map(|f| f.field_name.as_str())
            .collect()
    }

    /// Column backing an identifier field, through the join column when the identifier is a to-one association.
    pub fn identifier_columns(&self) -> Vec<&str> {
        self.identifier
            .iter()
            .filter_map(|id| match self.field(id) {
                Some(f) => Some(f.column_name.as_str()),
                None => self
                    .association(id)
                    .and_then(|a| a.join_columns.first())
                    .map(|c| c.name.as_str()),
            })
            .collect()
    }
}

/// Manager registry: class name → ORM metadata. A missing entry means no manager handles the class.
#[derive(Clone, Debug, Default)]
pub struct ClassMetadataRegistry {
    classes: HashMap<String, Arc<ClassMetadata>>,
}

impl ClassMetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, metadata: ClassMetadata) {
        self.classes.insert(metadata.name.clone(), Arc::new(metadata));
    }

    pub fn get(&self, class: &str) -> Option<Arc<ClassMetadata>> {
        self.classes.get(class).cloned()
    }

    pub fn has_manager_for(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }
}
