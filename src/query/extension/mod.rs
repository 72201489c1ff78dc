//! Query extensions: ordered mutators of a collection or item query.

mod eager_loading;
mod filter;
mod order;
mod pagination;

pub use eager_loading::EagerLoadingExtension;
pub use filter::FilterExtension;
pub use order::OrderExtension;
pub use pagination::{PaginationExtension, Paginator};

use crate::error::AppError;
use crate::metadata::Attributes;
use crate::orm::QueryBuilder;
use crate::query::QueryNameGenerator;
use crate::service::QueryExecutor;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

pub trait QueryCollectionExtension: Send + Sync {
    fn apply_to_collection(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<(), AppError>;
}

pub trait QueryItemExtension: Send + Sync {
    /// `identifiers` are the already-normalized identifier values, field → value.
    fn apply_to_item(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        identifiers: &[(String, Value)],
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<(), AppError>;
}

/// A collection extension that can also produce the result itself.
#[async_trait]
pub trait QueryResultCollectionExtension: QueryCollectionExtension {
    fn supports_result(&self, resource_class: &str, operation_name: Option<&str>) -> bool;

    async fn get_result(&self, qb: &QueryBuilder, executor: &dyn QueryExecutor) -> Result<CollectionResult, AppError>;
}

#[derive(Clone)]
pub enum CollectionExtension {
    Plain(Arc<dyn QueryCollectionExtension>),
    WithResult(Arc<dyn QueryResultCollectionExtension>),
}

impl CollectionExtension {
    pub fn apply(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<(), AppError> {
        match self {
            CollectionExtension::Plain(e) => e.apply_to_collection(qb, names, resource_class, operation_name, context),
            CollectionExtension::WithResult(e) => {
                e.apply_to_collection(qb, names, resource_class, operation_name, context)
            }
        }
    }

    pub fn as_result_extension(&self) -> Option<&dyn QueryResultCollectionExtension> {
        match self {
            CollectionExtension::WithResult(e) => Some(e.as_ref()),
            CollectionExtension::Plain(_) => None,
        }
    }
}

/// Documents returned for a collection, with page information when paginated.
#[derive(Clone, Debug, PartialEq)]
pub enum CollectionResult {
    Items(Vec<Value>),
    Paginated(Paginator),
}

impl CollectionResult {
    pub fn items(&self) -> &[Value] {
        match self {
            CollectionResult::Items(items) => items,
            CollectionResult::Paginated(p) => &p.items,
        }
    }

    pub fn into_items(self) -> Vec<Value> {
        match self {
            CollectionResult::Items(items) => items,
            CollectionResult::Paginated(p) => p.items,
        }
    }
}
