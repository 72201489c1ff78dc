//! Persists resource documents of ORM-managed classes through a `QueryExecutor`.

use super::{DataPersister, QueryExecutor};
use crate::error::AppError;
use crate::orm::{ClassMetadata, ClassMetadataRegistry, QueryBuilder};
use crate::sql;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

pub struct OrmDataPersister {
    registry: Arc<ClassMetadataRegistry>,
    executor: Arc<dyn QueryExecutor>,
}

impl OrmDataPersister {
    pub fn new(registry: Arc<ClassMetadataRegistry>, executor: Arc<dyn QueryExecutor>) -> Self {
        OrmDataPersister { registry, executor }
    }

    fn class(&self, resource_class: &str) -> Result<Arc<ClassMetadata>, AppError> {
        self.registry
            .get(resource_class)
            .ok_or_else(|| AppError::ResourceClassNotSupported(resource_class.to_string()))
    }

    /// Runs a statement returning `o.field` columns and hydrates its single row.
    async fn returning_one(&self, resource_class: &str, q: &sql::QueryBuf) -> Result<Option<Value>, AppError> {
        let rows = self.executor.fetch_rows(q).await?;
        let qb = QueryBuilder::new(resource_class, "o");
        Ok(sql::hydrate(&qb, &self.registry, rows)?.into_iter().next())
    }
}

fn object(data: &Value) -> Result<&Map<String, Value>, AppError> {
    data.as_object()
        .ok_or_else(|| AppError::BadRequest("body must be a JSON object".into()))
}

#[async_trait]
impl DataPersister for OrmDataPersister {
    fn supports(&self, resource_class: &str) -> bool {
        self.registry.has_manager_for(resource_class)
    }

    async fn persist(&self, resource_class: &str, data: &Value) -> Result<Value, AppError> {
        let class = self.class(resource_class)?;
        let q = sql::insert(&class, object(data)?);
        self.returning_one(resource_class, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(&self, resource_class: &str, identifiers: &[(String, Value)], data: &Value) -> Result<Value, AppError> {
        let class = self.class(resource_class)?;
        let q = sql::update(&class, identifiers, object(data)?)?;
        self.returning_one(resource_class, &q)
            .await?
            .ok_or_else(|| AppError::NotFound(resource_class.to_string()))
    }

    async fn remove(&self, resource_class: &str, identifiers: &[(String, Value)]) -> Result<(), AppError> {
        let class = self.class(resource_class)?;
        let q = sql::delete(&class, identifiers)?;
        if self.executor.execute(&q).await? == 0 {
            return Err(AppError::NotFound(resource_class.to_string()));
        }
        Ok(())
    }
}
