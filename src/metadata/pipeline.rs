//! Metadata factories as ordered stage lists. Each stage receives the previous stage's result and may
//! refine it; the cache sits in front of the whole list.

use crate::error::AppError;
use crate::metadata::{
    MetadataCache, PropertyMetadata, PropertyMetadataFactory, PropertyNameCollection,
    PropertyNameCollectionFactory, PropertyOptions, ResourceCatalog, ResourceMetadata,
    ResourceMetadataFactory, ResourceNameCollectionFactory,
};
use crate::orm::ClassMetadataRegistry;
use std::sync::Arc;

pub trait ResourceStage: Send + Sync {
    fn process(&self, resource_class: &str, previous: Option<ResourceMetadata>)
        -> Result<Option<ResourceMetadata>, AppError>;
}

pub trait PropertyStage: Send + Sync {
    fn process(
        &self,
        resource_class: &str,
        property: &str,
        options: &PropertyOptions,
        previous: Option<PropertyMetadata>,
        ctx: &StageContext<'_>,
    ) -> Result<Option<PropertyMetadata>, AppError>;
}

#[derive(Default)]
pub struct ResourcePipeline {
    stages: Vec<Box<dyn ResourceStage>>,
    cache: Option<Arc<MetadataCache>>,
}

impl ResourcePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl ResourceStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl ResourceMetadataFactory for ResourcePipeline {
    fn create(&self, resource_class: &str) -> Result<ResourceMetadata, AppError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.resource(resource_class)) {
            return Ok(hit);
        }
        let mut current = None;
        for stage in &self.stages {
            current = stage.process(resource_class, current)?;
        }
        let metadata = current.ok_or_else(|| AppError::ResourceClassNotFound(resource_class.to_string()))?;
        if let Some(cache) = &self.cache {
            cache.store_resource(resource_class, metadata.clone());
        }
        Ok(metadata)
    }
}

/// Lets a stage run the stages before it for another class.
pub struct StageContext<'a> {
    pipeline: &'a PropertyPipeline,
    position: usize,
}

impl<'a> StageContext<'a> {
    #[cfg(test)]
    pub(crate) fn for_tests(pipeline: &'a PropertyPipeline) -> Self {
        StageContext { pipeline, position: 0 }
    }

    pub fn evaluate(
        &self,
        resource_class: &str,
        property: &str,
        options: &PropertyOptions,
    ) -> Result<Option<PropertyMetadata>, AppError> {
        self.pipeline.run(resource_class, property, options, self.position)
    }
}

#[derive(Default)]
pub struct PropertyPipeline {
    stages: Vec<Box<dyn PropertyStage>>,
    cache: Option<Arc<MetadataCache>>,
}

impl PropertyPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: impl PropertyStage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    fn run(
        &self,
        resource_class: &str,
        property: &str,
        options: &PropertyOptions,
        upto: usize,
    ) -> Result<Option<PropertyMetadata>, AppError> {
        let mut current = None;
        for (position, stage) in self.stages.iter().take(upto).enumerate() {
            let ctx = StageContext { pipeline: self, position };
            current = stage.process(resource_class, property, options, current, &ctx)?;
        }
        Ok(current)
    }
}

impl PropertyMetadataFactory for PropertyPipeline {
    fn create(
        &self,
        resource_class: &str,
        property: &str,
        options: &PropertyOptions,
    ) -> Result<PropertyMetadata, AppError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.property(resource_class, property, options)) {
            return Ok(hit);
        }
        let metadata = self
            .run(resource_class, property, options, self.stages.len())?
            .ok_or_else(|| AppError::property_not_found(resource_class, property))?;
        if let Some(cache) = &self.cache {
            cache.store_property(resource_class, property, options, metadata.clone());
        }
        Ok(metadata)
    }
}

/// Declared resource properties, or the mapped fields of an entity that is not exposed as a resource.
pub struct ConfigPropertyNameCollectionFactory {
    catalog: Arc<ResourceCatalog>,
    registry: Arc<ClassMetadataRegistry>,
    cache: Option<Arc<MetadataCache>>,
}

impl ConfigPropertyNameCollectionFactory {
    pub fn new(catalog: Arc<ResourceCatalog>, registry: Arc<ClassMetadataRegistry>) -> Self {
        ConfigPropertyNameCollectionFactory {
            catalog,
            registry,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
        self
    }
}

impl PropertyNameCollectionFactory for ConfigPropertyNameCollectionFactory {
    fn create(&self, resource_class: &str) -> Result<PropertyNameCollection, AppError> {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.property_names(resource_class)) {
            return Ok(hit);
        }
        let names = if self.catalog.is_resource_class(resource_class) {
            PropertyNameCollection::new(self.catalog.property_names(resource_class))
        } else if let Some(meta) = self.registry.get(resource_class) {
            let mut names: Vec<String> = meta.identifier.clone();
            for f in &meta.fields {
                let name = f.field_name.split('.').next().unwrap_or(&f.field_name);
                names.push(name.to_string());
            }
            names.extend(meta.association_mappings.iter().map(|a| a.field_name.clone()));
            PropertyNameCollection::new(names)
        } else {
            return Err(AppError::ResourceClassNotFound(resource_class.to_string()));
        };
        if let Some(cache) = &self.cache {
            cache.store_property_names(resource_class, names.clone());
        }
        Ok(names)
    }
}

impl ResourceNameCollectionFactory for ResourceCatalog {
    fn create(&self) -> Result<Vec<String>, AppError> {
        Ok(self.class_names().to_vec())
    }
}
