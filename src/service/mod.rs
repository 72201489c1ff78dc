//! Query execution and persistence against PostgreSQL, plus request body validation.

mod executor;
mod persister;
mod validation;

pub use executor::PgExecutor;
pub use persister::OrmDataPersister;
pub use validation::RequestValidator;

use crate::error::AppError;
use crate::sql::QueryBuf;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// One result row, columns labelled `alias.field`.
pub type Row = Map<String, Value>;

#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn fetch_rows(&self, query: &QueryBuf) -> Result<Vec<Row>, AppError>;

    /// First column of the single row, as a count.
    async fn fetch_count(&self, query: &QueryBuf) -> Result<i64, AppError>;

    /// Rows affected.
    async fn execute(&self, query: &QueryBuf) -> Result<u64, AppError>;
}

/// Writes resource documents back to storage.
#[async_trait]
pub trait DataPersister: Send + Sync {
    fn supports(&self, resource_class: &str) -> bool;

    /// Inserts `data` and returns the stored document.
    async fn persist(&self, resource_class: &str, data: &Value) -> Result<Value, AppError>;

    /// Updates the row addressed by `identifiers` with the fields of `data`.
    async fn update(&self, resource_class: &str, identifiers: &[(String, Value)], data: &Value) -> Result<Value, AppError>;

    async fn remove(&self, resource_class: &str, identifiers: &[(String, Value)]) -> Result<(), AppError>;
}
