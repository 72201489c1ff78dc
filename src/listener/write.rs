use crate::error::AppError;
use crate::orm::ClassMetadataRegistry;
use crate::provider::Data;
use crate::request::ApiRequest;
use crate::service::DataPersister;
use axum::http::Method;
use serde_json::Value;
use std::sync::Arc;

/// Persists, updates or removes the item a write operation produced.
pub struct WriteListener {
    persister: Arc<dyn DataPersister>,
    registry: Arc<ClassMetadataRegistry>,
}

impl WriteListener {
    pub fn new(persister: Arc<dyn DataPersister>, registry: Arc<ClassMetadataRegistry>) -> Self {
        WriteListener { persister, registry }
    }

    /// Identifier values carried by `item`; a related identifier may be embedded as an object.
    fn identifiers(&self, resource_class: &str, item: &Value) -> Result<Vec<(String, Value)>, AppError> {
        let class = self
            .registry
            .get(resource_class)
            .ok_or_else(|| AppError::ResourceClassNotSupported(resource_class.to_string()))?;
        class
            .identifier
            .iter()
            .map(|field| {
                let value = match item.get(field) {
                    Some(Value::Object(related)) => related.get("id").cloned(),
                    Some(Value::Null) | None => None,
                    Some(v) => Some(v.clone()),
                };
                value
                    .map(|v| (field.clone(), v))
                    .ok_or_else(|| AppError::InvalidArgument(format!("missing identifier '{}'", field)))
            })
            .collect()
    }

    pub async fn on_view(&self, request: &ApiRequest, result: Option<Data>) -> Result<Option<Data>, AppError> {
        if request.is_method_safe() {
            return Ok(result);
        }
        let Some(resource_class) = request.attributes.resource_class.as_deref() else {
            return Ok(result);
        };
        if !self.persister.supports(resource_class) {
            return Ok(result);
        }
        let item = match result {
            Some(Data::Item(item)) if item.is_object() => item,
            other => return Ok(other),
        };

        match request.method {
            Method::POST => {
                let stored = self.persister.persist(resource_class, &item).await?;
                Ok(Some(Data::Item(stored)))
            }
            Method::PUT | Method::PATCH => {
                let identifiers = self.identifiers(resource_class, &item)?;
                let stored = self.persister.update(resource_class, &identifiers, &item).await?;
                Ok(Some(Data::Item(stored)))
            }
            Method::DELETE => {
                let identifiers = self.identifiers(resource_class, &item)?;
                self.persister.remove(resource_class, &identifiers).await?;
                Ok(None)
            }
            _ => Ok(Some(Data::Item(item))),
        }
    }
}
