use crate::error::AppError;
use crate::metadata::PropertyOptions;
use crate::request::ApiRequest;
use crate::service::RequestValidator;
use axum::http::Method;
use std::sync::Arc;

/// Validates the request body of write operations before anything is persisted.
pub struct ValidateListener {
    validator: Arc<RequestValidator>,
}

impl ValidateListener {
    pub fn new(validator: Arc<RequestValidator>) -> Self {
        ValidateListener { validator }
    }

    pub fn on_view(&self, request: &ApiRequest) -> Result<(), AppError> {
        if request.is_method_safe() || request.method == Method::DELETE {
            return Ok(());
        }
        let attributes = &request.attributes;
        let (Some(resource_class), true) = (attributes.resource_class.as_deref(), attributes.receive) else {
            return Ok(());
        };
        let Some(body) = &request.body else {
            return Ok(());
        };
        let body = body
            .as_object()
            .ok_or_else(|| AppError::BadRequest("body must be a JSON object".into()))?;
        let options = PropertyOptions {
            serializer_groups: None,
            collection_operation_name: attributes.collection_operation_name.clone(),
            item_operation_name: attributes.item_operation_name.clone(),
        };
        self.validator
            .validate(resource_class, body, request.method != Method::POST, &options)
    }
}
