//! Standard response envelope helpers.

use crate::query::extension::CollectionResult;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct SuccessOne<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

#[derive(Serialize)]
pub struct SuccessMany<T> {
    pub data: Vec<T>,
    pub meta: CollectionMeta,
}

/// `count` is the size of this response; the rest is only present on paginated collections.
#[derive(Serialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_per_page: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_page: Option<u64>,
}

pub fn success_one<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::CREATED, Json(SuccessOne { data, meta: None }))
}

pub fn success_one_ok<T: Serialize>(data: T) -> (StatusCode, Json<SuccessOne<T>>) {
    (StatusCode::OK, Json(SuccessOne { data, meta: None }))
}

pub fn success_collection(result: CollectionResult) -> (StatusCode, Json<SuccessMany<Value>>) {
    let meta = match &result {
        CollectionResult::Items(items) => CollectionMeta {
            count: items.len() as u64,
            total_items: None,
            page: None,
            items_per_page: None,
            last_page: None,
        },
        CollectionResult::Paginated(p) => CollectionMeta {
            count: p.items.len() as u64,
            total_items: Some(p.total_items),
            page: Some(p.current_page),
            items_per_page: Some(p.items_per_page),
            last_page: Some(p.last_page()),
        },
    };
    (
        StatusCode::OK,
        Json(SuccessMany {
            data: result.into_items(),
            meta,
        }),
    )
}
