//! Serializer collaborators: context building from a request and per-property max depth.

use crate::error::AppError;
use crate::metadata::{Attributes, ResourceCatalog, ResourceMetadataFactory};
use crate::request::ApiRequest;
use axum::http::Method;
use serde_json::Value;
use std::sync::Arc;

pub trait SerializerContextBuilder: Send + Sync {
    /// Normalization context when `normalization` is set, denormalization context otherwise.
    fn create_from_request(&self, request: &ApiRequest, normalization: bool) -> Result<Attributes, AppError>;
}

/// Operation context with resource-level fallback, plus `resource_class` and the operation name.
pub struct ResourceContextBuilder {
    resources: Arc<dyn ResourceMetadataFactory>,
}

impl ResourceContextBuilder {
    pub fn new(resources: Arc<dyn ResourceMetadataFactory>) -> Self {
        ResourceContextBuilder { resources }
    }
}

impl SerializerContextBuilder for ResourceContextBuilder {
    fn create_from_request(&self, request: &ApiRequest, normalization: bool) -> Result<Attributes, AppError> {
        let (Some(resource_class), Some((operation_type, operation_name))) =
            (request.attributes.resource_class.as_deref(), request.operation())
        else {
            return Err(AppError::BadRequest("request attributes are not valid".into()));
        };
        let metadata = self.resources.create(resource_class)?;
        let key = if normalization {
            "normalization_context"
        } else {
            "denormalization_context"
        };
        let mut context = metadata
            .operation_attribute(operation_type, Some(operation_name), key, true)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        context.insert("resource_class".into(), Value::from(resource_class));
        context.insert("operation_type".into(), Value::from(operation_type.as_str()));
        context.insert(
            format!("{}_operation_name", operation_type.as_str()),
            Value::from(operation_name),
        );
        if !normalization {
            let update = matches!(request.method, Method::PUT | Method::PATCH);
            context.insert("api_allow_update".into(), Value::Bool(update));
        }
        Ok(context)
    }
}

pub trait MaxDepthMetadataFactory: Send + Sync {
    /// Serializer max-depth attribute of `class.property`, if declared.
    fn max_depth(&self, class: &str, property: &str) -> Option<u32>;
}

pub struct ConfigMaxDepthFactory {
    catalog: Arc<ResourceCatalog>,
}

impl ConfigMaxDepthFactory {
    pub fn new(catalog: Arc<ResourceCatalog>) -> Self {
        ConfigMaxDepthFactory { catalog }
    }
}

impl MaxDepthMetadataFactory for ConfigMaxDepthFactory {
    fn max_depth(&self, class: &str, property: &str) -> Option<u32> {
        self.catalog.property(class, property).and_then(|p| p.max_depth)
    }
}
