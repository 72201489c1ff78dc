//! Data providers: build the query for a resource class, run the extensions, execute.

mod collection;
mod item;
mod subresource;

pub use collection::OrmCollectionDataProvider;
pub use item::{normalize_identifiers, OrmItemDataProvider};
pub use subresource::OrmSubresourceDataProvider;

use crate::error::AppError;
use crate::metadata::Attributes;
use crate::orm::{ClassMetadataRegistry, QueryBuilder};
use crate::query::extension::{CollectionExtension, CollectionResult};
use crate::query::QueryNameGenerator;
use crate::request::SubresourceContext;
use crate::service::QueryExecutor;
use crate::sql;
use async_trait::async_trait;
use serde_json::Value;

/// Alias of the queried class in every provider query.
pub const ROOT_ALIAS: &str = "o";

/// What a read produced.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    Item(Value),
    Collection(CollectionResult),
}

#[async_trait]
pub trait CollectionDataProvider: Send + Sync {
    async fn get_collection(&self, resource_class: &str, operation_name: Option<&str>) -> Result<CollectionResult, AppError>;
}

#[async_trait]
pub trait ItemDataProvider: Send + Sync {
    /// `None` when no row matches `id`.
    async fn get_item(
        &self,
        resource_class: &str,
        id: &str,
        operation_name: Option<&str>,
        context: &Attributes,
    ) -> Result<Option<Value>, AppError>;
}

#[async_trait]
pub trait SubresourceDataProvider: Send + Sync {
    /// A collection for to-many subresources, an item (or `None`) for to-one.
    async fn get_subresource(
        &self,
        resource_class: &str,
        context: &SubresourceContext,
        operation_name: Option<&str>,
    ) -> Result<Option<Data>, AppError>;
}

/// Applies `extensions` in order; the first result extension that supports the query produces the
/// result, otherwise the query is rendered and hydrated here.
pub(crate) async fn run_collection(
    mut qb: QueryBuilder,
    mut names: QueryNameGenerator,
    extensions: &[CollectionExtension],
    registry: &ClassMetadataRegistry,
    executor: &dyn QueryExecutor,
    resource_class: &str,
    operation_name: Option<&str>,
) -> Result<CollectionResult, AppError> {
    let context = Attributes::new();
    for extension in extensions {
        extension.apply(&mut qb, &mut names, resource_class, operation_name, &context)?;
        if let Some(result) = extension.as_result_extension() {
            if result.supports_result(resource_class, operation_name) {
                return result.get_result(&qb, executor).await;
            }
        }
    }
    tracing::debug!(dql = %qb.dql(), "collection query");
    let select = sql::render_select(&qb, registry, true)?;
    let rows = executor.fetch_rows(&select).await?;
    Ok(CollectionResult::Items(sql::hydrate(&qb, registry, rows)?))
}

/// First hydrated document of `qb`.
pub(crate) async fn fetch_one(
    qb: &QueryBuilder,
    registry: &ClassMetadataRegistry,
    executor: &dyn QueryExecutor,
) -> Result<Option<Value>, AppError> {
    tracing::debug!(dql = %qb.dql(), "item query");
    let select = sql::render_select(qb, registry, true)?;
    let rows = executor.fetch_rows(&select).await?;
    Ok(sql::hydrate(qb, registry, rows)?.into_iter().next())
}
