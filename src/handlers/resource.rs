//! Resource handlers: turn the HTTP request into an `ApiRequest`, run it and shape the envelope.

use crate::api::Target;
use crate::error::AppError;
use crate::provider::Data;
use crate::request::ApiRequest;
use crate::response::{success_collection, success_one, success_one_ok};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;

fn respond(method: &Method, data: Option<Data>) -> Response {
    match data {
        None => StatusCode::NO_CONTENT.into_response(),
        Some(Data::Item(item)) if *method == Method::POST => success_one(item).into_response(),
        Some(Data::Item(item)) => success_one_ok(item).into_response(),
        Some(Data::Collection(result)) => success_collection(result).into_response(),
    }
}

async fn dispatch(
    state: &AppState,
    method: Method,
    uri: &Uri,
    segment: &str,
    target: Target<'_>,
    query: Vec<(String, String)>,
    body: Option<Value>,
) -> Result<Response, AppError> {
    let attributes = state.api.attributes(segment, target, &method)?;
    let mut request = ApiRequest::new(method.clone(), uri.path()).with_attributes(attributes);
    request.query = query;
    if let Some(body) = body {
        request = request.with_body(body);
    }
    tracing::debug!(method = %method, path = %uri.path(), "resource request");
    let data = state.api.handle(request).await?;
    Ok(respond(&method, data))
}

/// GET /:path_segment
pub async fn list(
    State(state): State<AppState>,
    uri: Uri,
    Path(segment): Path<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    dispatch(&state, Method::GET, &uri, &segment, Target::Collection, query, None).await
}

/// POST /:path_segment
pub async fn create(
    State(state): State<AppState>,
    uri: Uri,
    Path(segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    dispatch(&state, Method::POST, &uri, &segment, Target::Collection, Vec::new(), Some(body)).await
}

/// GET /:path_segment/:id
pub async fn read(
    State(state): State<AppState>,
    uri: Uri,
    Path((segment, id)): Path<(String, String)>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    dispatch(&state, Method::GET, &uri, &segment, Target::Item(&id), query, None).await
}

/// PUT or PATCH /:path_segment/:id
pub async fn update(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    Path((segment, id)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    dispatch(&state, method, &uri, &segment, Target::Item(&id), Vec::new(), Some(body)).await
}

/// DELETE /:path_segment/:id
pub async fn delete(
    State(state): State<AppState>,
    uri: Uri,
    Path((segment, id)): Path<(String, String)>,
) -> Result<Response, AppError> {
    dispatch(&state, Method::DELETE, &uri, &segment, Target::Item(&id), Vec::new(), None).await
}

/// GET /:path_segment/:id/:property
pub async fn subresource(
    State(state): State<AppState>,
    uri: Uri,
    Path((segment, id, property)): Path<(String, String, String)>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let target = Target::Subresource {
        id: &id,
        property: &property,
    };
    dispatch(&state, Method::GET, &uri, &segment, target, query, None).await
}
