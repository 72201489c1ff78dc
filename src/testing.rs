//! In-memory fakes shared by unit tests.

use crate::error::AppError;
use crate::metadata::{
    PropertyMetadata, PropertyMetadataFactory, PropertyNameCollection, PropertyNameCollectionFactory, PropertyOptions,
    ResourceMetadata, ResourceMetadataFactory,
};
use crate::service::{QueryExecutor, Row};
use crate::sql::QueryBuf;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

#[derive(Default)]
pub struct StaticResources(HashMap<String, ResourceMetadata>);

impl StaticResources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: &str, metadata: ResourceMetadata) -> Self {
        self.0.insert(class.to_string(), metadata);
        self
    }
}

impl ResourceMetadataFactory for StaticResources {
    fn create(&self, resource_class: &str) -> Result<ResourceMetadata, AppError> {
        self.0
            .get(resource_class)
            .cloned()
            .ok_or_else(|| AppError::ResourceClassNotFound(resource_class.to_string()))
    }
}

/// Property metadata by (class, property), ignoring options; records the options each lookup used.
#[derive(Default)]
pub struct StaticProperties {
    entries: HashMap<(String, String), PropertyMetadata>,
    pub seen_options: Mutex<Vec<PropertyOptions>>,
}

impl StaticProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: &str, property: &str, metadata: PropertyMetadata) -> Self {
        self.entries.insert((class.to_string(), property.to_string()), metadata);
        self
    }
}

impl PropertyMetadataFactory for StaticProperties {
    fn create(&self, resource_class: &str, property: &str, options: &PropertyOptions) -> Result<PropertyMetadata, AppError> {
        self.seen_options.lock().unwrap().push(options.clone());
        self.entries
            .get(&(resource_class.to_string(), property.to_string()))
            .cloned()
            .ok_or_else(|| AppError::property_not_found(resource_class, property))
    }
}

#[derive(Default)]
pub struct StaticNames(HashMap<String, Vec<String>>);

impl StaticNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, class: &str, names: &[&str]) -> Self {
        self.0
            .insert(class.to_string(), names.iter().map(|s| s.to_string()).collect());
        self
    }
}

impl PropertyNameCollectionFactory for StaticNames {
    fn create(&self, resource_class: &str) -> Result<PropertyNameCollection, AppError> {
        self.0
            .get(resource_class)
            .map(|names| PropertyNameCollection::new(names.clone()))
            .ok_or_else(|| AppError::ResourceClassNotFound(resource_class.to_string()))
    }
}

/// Records every statement and answers row queries from a queue.
#[derive(Default)]
pub struct RecordingExecutor {
    pub queries: Mutex<Vec<QueryBuf>>,
    responses: Mutex<VecDeque<Vec<Row>>>,
    count: i64,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, rows: Vec<Row>) -> Self {
        self.responses.lock().unwrap().push_back(rows);
        self
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn sql(&self) -> Vec<String> {
        self.queries.lock().unwrap().iter().map(|q| q.sql.clone()).collect()
    }
}

#[async_trait]
impl QueryExecutor for RecordingExecutor {
    async fn fetch_rows(&self, query: &QueryBuf) -> Result<Vec<Row>, AppError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }

    async fn fetch_count(&self, query: &QueryBuf) -> Result<i64, AppError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(self.count)
    }

    async fn execute(&self, query: &QueryBuf) -> Result<u64, AppError> {
        self.queries.lock().unwrap().push(query.clone());
        Ok(1)
    }
}

/// Row from `(label, value)` pairs.
pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}
