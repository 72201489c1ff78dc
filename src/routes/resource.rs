//! Resource routes. One parameterized path per shape; handlers resolve the resource class by path segment.

use crate::handlers::resource::{create, delete, list, read, subresource, update};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

/// Request bodies above this size are answered with 413.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn resource_routes(state: AppState) -> Router {
    Router::new()
        .route("/:path_segment", get(list).post(create))
        .route(
            "/:path_segment/:id",
            get(read).put(update).patch(update).delete(delete),
        )
        .route("/:path_segment/:id/:property", get(subresource))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}
