use super::{fetch_one, ItemDataProvider, ROOT_ALIAS};
use crate::error::AppError;
use crate::metadata::Attributes;
use crate::orm::{ClassMetadata, ClassMetadataRegistry, QueryBuilder};
use crate::query::extension::QueryItemExtension;
use crate::query::QueryNameGenerator;
use crate::service::QueryExecutor;
use crate::sql::value_from_text;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub struct OrmItemDataProvider {
    registry: Arc<ClassMetadataRegistry>,
    executor: Arc<dyn QueryExecutor>,
    extensions: Vec<Arc<dyn QueryItemExtension>>,
}

impl OrmItemDataProvider {
    pub fn new(
        registry: Arc<ClassMetadataRegistry>,
        executor: Arc<dyn QueryExecutor>,
        extensions: Vec<Arc<dyn QueryItemExtension>>,
    ) -> Self {
        OrmItemDataProvider {
            registry,
            executor,
            extensions,
        }
    }
}

/// SQL type of an identifier field; for a to-one identifier, the type of the referenced target field.
fn identifier_sql_type(registry: &ClassMetadataRegistry, class: &ClassMetadata, field: &str) -> Option<String> {
    if let Some(f) = class.field(field) {
        return f.sql_type.clone();
    }
    let association = class.association(field)?;
    let referenced = &association.join_columns.first()?.referenced_column;
    let target = registry.get(&association.target_entity)?;
    let found = target
        .fields
        .iter()
        .find(|f| f.column_name == *referenced)
        .and_then(|f| f.sql_type.clone());
    found
}

/// Identifier values from the `id` path segment. One identifier takes the whole segment;
/// composite identifiers are written `a=1;b=2` and every part must be present.
pub fn normalize_identifiers(
    registry: &ClassMetadataRegistry,
    class: &ClassMetadata,
    id: &str,
) -> Result<Vec<(String, Value)>, AppError> {
    let typed = |field: &str, raw: &str| value_from_text(identifier_sql_type(registry, class, field).as_deref(), raw);
    match class.identifier.as_slice() {
        [] => Err(AppError::InvalidArgument(format!("{} has no identifier", class.name))),
        [single] => Ok(vec![(single.clone(), typed(single.as_str(), id))]),
        fields => {
            let parts: Vec<(&str, &str)> = id
                .split(';')
                .filter_map(|part| part.split_once('='))
                .collect();
            fields
                .iter()
                .map(|field| {
                    parts
                        .iter()
                        .find(|(name, _)| *name == field.as_str())
                        .map(|(_, raw)| (field.clone(), typed(field.as_str(), raw)))
                        .ok_or_else(|| {
                            AppError::InvalidArgument(format!(
                                "Invalid identifier \"{}\", \"{}\" has not been found.",
                                id, field
                            ))
                        })
                })
                .collect()
        }
    }
}

#[async_trait]
impl ItemDataProvider for OrmItemDataProvider {
    async fn get_item(
        &self,
        resource_class: &str,
        id: &str,
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<Option<Value>, AppError> {
        let class = self
            .registry
            .get(resource_class)
            .ok_or_else(|| AppError::ResourceClassNotSupported(resource_class.to_string()))?;
        let identifiers = normalize_identifiers(&self.registry, &class, id)?;

        let mut qb = QueryBuilder::new(resource_class, ROOT_ALIAS);
        let mut names = QueryNameGenerator::new();
        for (field, value) in &identifiers {
            let parameter = names.generate_parameter_name(field);
            qb.and_where(format!("{}.{} = :{}", ROOT_ALIAS, field, parameter))
                .set_parameter(&parameter, value.clone());
        }
        for extension in &self.extensions {
            extension.apply_to_item(&mut qb, &mut names, resource_class, &identifiers, operation_name, context)?;
        }
        fetch_one(&qb, &self.registry, self.executor.as_ref()).await
    }
}
