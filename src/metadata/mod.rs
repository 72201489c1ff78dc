//! Resource and property metadata: descriptors, factory contracts, stage pipelines and the cache.

mod cache;
mod catalog;
mod pipeline;
mod property;
mod resource;
pub mod stages;

pub use cache::MetadataCache;
pub use catalog::ResourceCatalog;
pub use pipeline::*;
pub use property::*;
pub use resource::*;
pub use stages::is_truthy;

use crate::error::AppError;

pub trait ResourceMetadataFactory: Send + Sync {
    /// `ResourceClassNotFound` when the class is not a resource.
    fn create(&self, resource_class: &str) -> Result<ResourceMetadata, AppError>;
}

pub trait PropertyMetadataFactory: Send + Sync {
    /// `PropertyNotFound` when the class has no such property.
    fn create(&self, resource_class: &str, property: &str, options: &PropertyOptions)
        -> Result<PropertyMetadata, AppError>;
}

pub trait PropertyNameCollectionFactory: Send + Sync {
    fn create(&self, resource_class: &str) -> Result<PropertyNameCollection, AppError>;
}

pub trait ResourceNameCollectionFactory: Send + Sync {
    fn create(&self) -> Result<Vec<String>, AppError>;
}
