//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid identifier: class {class} field {field}")]
    InvalidIdentifier { class: String, field: String },
    #[error("duplicate short name: {0}")]
    DuplicateShortName(String),
    #[error("unknown filter type '{kind}' for filter '{id}'")]
    UnknownFilterType { id: String, kind: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Invalid configuration or argument detected while building a query (e.g. items per page <= 0).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// Resource exhaustion while building a query (e.g. join budget exceeded).
    #[error("{0}")]
    Runtime(String),
    #[error("resource class '{0}' not found")]
    ResourceClassNotFound(String),
    #[error("property '{property}' of resource class '{resource_class}' not found")]
    PropertyNotFound {
        resource_class: String,
        property: String,
    },
    #[error("resource class '{0}' is not supported by this data provider")]
    ResourceClassNotSupported(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    pub fn property_not_found(resource_class: &str, property: &str) -> Self {
        AppError::PropertyNotFound {
            resource_class: resource_class.to_string(),
            property: property.to_string(),
        }
    }

    /// Not-found conditions that callers walking partial metadata may swallow.
    pub fn is_metadata_not_found(&self) -> bool {
        matches!(
            self,
            AppError::ResourceClassNotFound(_) | AppError::PropertyNotFound { .. }
        )
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "invalid_argument"),
            AppError::Runtime(_) => (StatusCode::BAD_REQUEST, "runtime_error"),
            AppError::ResourceClassNotFound(_)
            | AppError::PropertyNotFound { .. }
            | AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::ResourceClassNotSupported(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "resource_class_not_supported")
            }
            AppError::MethodNotAllowed(_) => (StatusCode::METHOD_NOT_ALLOWED, "method_not_allowed"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
