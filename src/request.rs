//! Framework-independent request model and the task-local current request.

use crate::metadata::OperationType;
use axum::http::Method;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Parent side of a subresource request: `GET /dummies/1/related_dummies`.
#[derive(Clone, Debug, PartialEq)]
pub struct SubresourceContext {
    pub parent_class: String,
    pub property: String,
    pub collection: bool,
    /// Parent identifier field → value.
    pub identifiers: Vec<(String, Value)>,
}

#[derive(Clone, Debug)]
pub struct RequestAttributes {
    pub resource_class: Option<String>,
    pub collection_operation_name: Option<String>,
    pub item_operation_name: Option<String>,
    pub subresource_operation_name: Option<String>,
    pub id: Option<String>,
    pub subresource_context: Option<SubresourceContext>,
    /// Whether the read listener should load data for this request.
    pub receive: bool,
}

impl Default for RequestAttributes {
    fn default() -> Self {
        RequestAttributes {
            resource_class: None,
            collection_operation_name: None,
            item_operation_name: None,
            subresource_operation_name: None,
            id: None,
            subresource_context: None,
            receive: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    /// Query pairs in request order.
    pub query: Vec<(String, String)>,
    pub attributes: RequestAttributes,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            attributes: RequestAttributes::default(),
            body: None,
        }
    }

    pub fn with_query(mut self, name: &str, value: &str) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_attributes(mut self, attributes: RequestAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// All values of `name` and `name[]`.
    pub fn query_values(&self, name: &str) -> Vec<&str> {
        let list = format!("{}[]", name);
        self.query
            .iter()
            .filter(|(k, _)| k == name || *k == list)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn is_method_safe(&self) -> bool {
        matches!(self.method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
    }

    /// Operation type and name from the attributes, subresource first.
    pub fn operation(&self) -> Option<(OperationType, &str)> {
        let a = &self.attributes;
        if let Some(name) = &a.subresource_operation_name {
            return Some((OperationType::Subresource, name));
        }
        if let Some(name) = &a.collection_operation_name {
            return Some((OperationType::Collection, name));
        }
        a.item_operation_name
            .as_deref()
            .map(|name| (OperationType::Item, name))
    }
}

tokio::task_local! {
    static CURRENT_REQUEST: Arc<ApiRequest>;
}

/// Access to the request being handled on the current task. Absent outside a scope
/// (e.g. when providers run from a CLI or a background job).
pub struct RequestStack;

impl RequestStack {
    pub async fn scope<F: Future>(request: Arc<ApiRequest>, f: F) -> F::Output {
        CURRENT_REQUEST.scope(request, f).await
    }

    pub fn sync_scope<R>(request: Arc<ApiRequest>, f: impl FnOnce() -> R) -> R {
        CURRENT_REQUEST.sync_scope(request, f)
    }

    pub fn current() -> Option<Arc<ApiRequest>> {
        CURRENT_REQUEST.try_with(Arc::clone).ok()
    }
}
