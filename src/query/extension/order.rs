//! Default ordering: the resource `order` attribute, else a configured direction on the identifier.

use super::QueryCollectionExtension;
use crate::error::AppError;
use crate::filter::add_joins_for_nested_property;
use crate::metadata::{Attributes, ResourceMetadataFactory};
use crate::orm::{ClassMetadataRegistry, JoinType, QueryBuilder};
use crate::query::QueryNameGenerator;
use serde_json::Value;
use std::sync::Arc;

pub struct OrderExtension {
    order: Option<String>,
    resources: Arc<dyn ResourceMetadataFactory>,
    registry: Arc<ClassMetadataRegistry>,
}

impl OrderExtension {
    pub fn new(
        order: Option<String>,
        resources: Arc<dyn ResourceMetadataFactory>,
        registry: Arc<ClassMetadataRegistry>,
    ) -> Self {
        OrderExtension {
            order,
            resources,
            registry,
        }
    }
}

fn direction(value: Option<&Value>) -> Result<String, AppError> {
    let raw = value.and_then(Value::as_str).unwrap_or("ASC").to_uppercase();
    match raw.as_str() {
        "ASC" | "DESC" => Ok(raw),
        other => Err(AppError::InvalidArgument(format!("invalid order direction '{}'", other))),
    }
}

/// `{"foo": "DESC"}` or `["foo", {"bar": "DESC"}]`; bare names are ascending.
fn order_entries(order: &Value) -> Result<Vec<(String, String)>, AppError> {
    let mut out = Vec::new();
    match order {
        Value::Object(map) => {
            for (field, dir) in map {
                out.push((field.clone(), direction(Some(dir))?));
            }
        }
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(field) => out.push((field.clone(), "ASC".into())),
                    Value::Object(_) => out.extend(order_entries(item)?),
                    _ => {}
                }
            }
        }
        Value::String(field) => out.push((field.clone(), "ASC".into())),
        _ => {}
    }
    Ok(out)
}

impl QueryCollectionExtension for OrderExtension {
    fn apply_to_collection(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        _operation_name: Option<&str>,
        _context: &Attributes,
    ) -> Result<(), AppError> {
        let Some(root) = qb.root_aliases().first().map(|a| a.to_string()) else {
            return Ok(());
        };
        let metadata = self.resources.create(resource_class)?;
        if let Some(order) = metadata.attribute("order") {
            for (field, dir) in order_entries(order)? {
                let expr = if field.contains('.') {
                    let (alias, last) = add_joins_for_nested_property(&field, &root, qb, names, JoinType::Left);
                    format!("{}.{}", alias, last)
                } else {
                    format!("{}.{}", root, field)
                };
                qb.add_order_by(expr, dir);
            }
            return Ok(());
        }
        let Some(default) = &self.order else {
            return Ok(());
        };
        let Some(class) = self.registry.get(resource_class) else {
            return Ok(());
        };
        if let [identifier] = class.identifier.as_slice() {
            qb.add_order_by(format!("{}.{}", root, identifier), direction(Some(&Value::from(default.as_str())))?);
        }
        Ok(())
    }
}
