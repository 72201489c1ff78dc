//! One configured API: metadata factories, query extensions, providers and listeners built from a `FullConfig`.

use crate::case::{path_segment, short_name_of, to_snake_case};
use crate::config::{resolve, FullConfig, Settings};
use crate::error::AppError;
use crate::filter::FilterCollection;
use crate::listener::{ReadListener, ValidateListener, WriteListener};
use crate::metadata::stages::{
    ConfigPropertyStage, ConfigResourceStage, InheritedPropertyStage, OperationDefaultsStage, OrmPropertyStage,
    ParentResourceStage, SerializerGroupStage, ShortNameStage,
};
use crate::metadata::{
    ConfigPropertyNameCollectionFactory, MetadataCache, OperationType, PropertyMetadataFactory,
    PropertyNameCollectionFactory, PropertyOptions, PropertyPipeline, ResourceCatalog, ResourceMetadata,
    ResourceMetadataFactory, ResourcePipeline,
};
use crate::orm::ClassMetadataRegistry;
use crate::provider::{
    normalize_identifiers, Data, OrmCollectionDataProvider, OrmItemDataProvider, OrmSubresourceDataProvider,
};
use crate::query::extension::{
    CollectionExtension, EagerLoadingExtension, FilterExtension, OrderExtension, PaginationExtension,
    QueryItemExtension,
};
use crate::request::{ApiRequest, RequestAttributes, RequestStack, SubresourceContext};
use crate::serializer::{ConfigMaxDepthFactory, ResourceContextBuilder};
use crate::service::{OrmDataPersister, QueryExecutor, RequestValidator};
use axum::http::Method;
use serde_json::Value;
use std::sync::Arc;

/// What a path below a resource collection points at.
#[derive(Clone, Copy, Debug)]
pub enum Target<'a> {
    Collection,
    Item(&'a str),
    Subresource { id: &'a str, property: &'a str },
}

pub struct Api {
    catalog: Arc<ResourceCatalog>,
    registry: Arc<ClassMetadataRegistry>,
    resources: Arc<dyn ResourceMetadataFactory>,
    properties: Arc<dyn PropertyMetadataFactory>,
    cache: Arc<MetadataCache>,
    read: ReadListener,
    validate: ValidateListener,
    write: WriteListener,
}

impl Api {
    pub fn new(config: &FullConfig, settings: &Settings, executor: Arc<dyn QueryExecutor>) -> Result<Self, AppError> {
        let registry = Arc::new(resolve(config)?);
        let catalog = Arc::new(ResourceCatalog::from_config(config));
        let cache = Arc::new(MetadataCache::new());

        let resources: Arc<dyn ResourceMetadataFactory> = Arc::new(
            ResourcePipeline::new()
                .stage(ConfigResourceStage::new(catalog.clone()))
                .stage(ShortNameStage)
                .stage(OperationDefaultsStage::new(catalog.clone()))
                .stage(ParentResourceStage::new(catalog.clone()))
                .with_cache(cache.clone()),
        );
        let properties: Arc<dyn PropertyMetadataFactory> = Arc::new(
            PropertyPipeline::new()
                .stage(ConfigPropertyStage::new(catalog.clone(), registry.clone()))
                .stage(OrmPropertyStage::new(registry.clone()))
                .stage(SerializerGroupStage::new(catalog.clone(), resources.clone()))
                .stage(InheritedPropertyStage::new(catalog.clone()))
                .with_cache(cache.clone()),
        );
        let names: Arc<dyn PropertyNameCollectionFactory> = Arc::new(
            ConfigPropertyNameCollectionFactory::new(catalog.clone(), registry.clone()).with_cache(cache.clone()),
        );
        let filters = Arc::new(FilterCollection::from_config(&config.filters, registry.clone())?);

        let eager_loading = Arc::new(
            EagerLoadingExtension::new(
                names.clone(),
                properties.clone(),
                resources.clone(),
                registry.clone(),
                settings.eager_loading.clone(),
            )
            .with_context_builder(Arc::new(ResourceContextBuilder::new(resources.clone())))
            .with_max_depth(Arc::new(ConfigMaxDepthFactory::new(catalog.clone()))),
        );
        let collection_extensions = vec![
            CollectionExtension::Plain(eager_loading.clone()),
            CollectionExtension::Plain(Arc::new(FilterExtension::new(resources.clone(), filters))),
            CollectionExtension::Plain(Arc::new(OrderExtension::new(
                settings.default_order.clone(),
                resources.clone(),
                registry.clone(),
            ))),
            CollectionExtension::WithResult(Arc::new(PaginationExtension::new(
                resources.clone(),
                registry.clone(),
                settings.pagination.clone(),
            ))),
        ];
        let item_extensions = vec![eager_loading as Arc<dyn QueryItemExtension>];

        let read = ReadListener::new(
            Arc::new(OrmCollectionDataProvider::new(
                registry.clone(),
                executor.clone(),
                collection_extensions.clone(),
            )),
            Arc::new(OrmItemDataProvider::new(registry.clone(), executor.clone(), item_extensions)),
            Arc::new(OrmSubresourceDataProvider::new(
                registry.clone(),
                executor.clone(),
                collection_extensions,
            )),
        );
        let validate = ValidateListener::new(Arc::new(RequestValidator::new(
            catalog.clone(),
            names,
            properties.clone(),
        )));
        let write = WriteListener::new(Arc::new(OrmDataPersister::new(registry.clone(), executor)), registry.clone());

        tracing::info!(
            resources = catalog.class_names().len(),
            classes = registry.class_names().count(),
            "api built"
        );
        Ok(Api {
            catalog,
            registry,
            resources,
            properties,
            cache,
            read,
            validate,
            write,
        })
    }

    pub fn registry(&self) -> &Arc<ClassMetadataRegistry> {
        &self.registry
    }

    pub fn resources(&self) -> &Arc<dyn ResourceMetadataFactory> {
        &self.resources
    }

    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Resource class served under `/{segment}`.
    pub fn resource_class_for(&self, segment: &str) -> Result<String, AppError> {
        for class in self.catalog.class_names() {
            let metadata = self.resources.create(class)?;
            let short_name = metadata
                .short_name()
                .map(String::from)
                .unwrap_or_else(|| short_name_of(class));
            if path_segment(&short_name) == segment {
                return Ok(class.clone());
            }
        }
        Err(AppError::NotFound(format!("no resource at /{}", segment)))
    }

    fn operation_for(metadata: &ResourceMetadata, operation_type: OperationType, method: &Method) -> Result<String, AppError> {
        metadata
            .operations(operation_type)
            .into_iter()
            .flat_map(|ops| ops.keys())
            .find(|name| metadata.operation_method(operation_type, name).as_deref() == Some(method.as_str()))
            .cloned()
            .ok_or_else(|| AppError::MethodNotAllowed(method.to_string()))
    }

    /// Request attributes for `method` on `target` below `/{segment}`.
    pub fn attributes(&self, segment: &str, target: Target<'_>, method: &Method) -> Result<RequestAttributes, AppError> {
        let class = self.resource_class_for(segment)?;
        let metadata = self.resources.create(&class)?;
        match target {
            Target::Collection => Ok(RequestAttributes {
                collection_operation_name: Some(Self::operation_for(&metadata, OperationType::Collection, method)?),
                resource_class: Some(class),
                ..Default::default()
            }),
            Target::Item(id) => Ok(RequestAttributes {
                item_operation_name: Some(Self::operation_for(&metadata, OperationType::Item, method)?),
                resource_class: Some(class),
                id: Some(id.to_string()),
                ..Default::default()
            }),
            Target::Subresource { id, property } => self.subresource_attributes(class, &metadata, id, property, method),
        }
    }

    fn subresource_attributes(
        &self,
        parent_class: String,
        metadata: &ResourceMetadata,
        id: &str,
        property: &str,
        method: &Method,
    ) -> Result<RequestAttributes, AppError> {
        let not_found = || AppError::NotFound(format!("no subresource '{}'", property));
        let (operation_name, property_name) = metadata
            .subresource_operations()
            .into_iter()
            .flat_map(|ops| ops.iter())
            .find_map(|(name, op)| {
                let p = op.get("property")?.as_str()?;
                (p == property || to_snake_case(p) == property).then(|| (name.clone(), p.to_string()))
            })
            .ok_or_else(not_found)?;
        if metadata.operation_method(OperationType::Subresource, &operation_name).as_deref() != Some(method.as_str()) {
            return Err(AppError::MethodNotAllowed(method.to_string()));
        }

        let property_metadata = self
            .properties
            .create(&parent_class, &property_name, &PropertyOptions::default())?;
        let subresource = property_metadata.subresource().ok_or_else(not_found)?;
        let parent = self
            .registry
            .get(&parent_class)
            .ok_or_else(|| AppError::ResourceClassNotSupported(parent_class.clone()))?;
        let identifiers = normalize_identifiers(&self.registry, &parent, id)
            .map_err(|_| AppError::NotFound("Not Found".into()))?;

        Ok(RequestAttributes {
            resource_class: Some(subresource.resource_class.clone()),
            subresource_operation_name: Some(operation_name),
            subresource_context: Some(SubresourceContext {
                parent_class,
                property: property_name,
                collection: subresource.collection,
                identifiers,
            }),
            ..Default::default()
        })
    }

    /// Read, deserialize, validate and write for one request, with the request current for the whole run.
    pub async fn handle(&self, request: ApiRequest) -> Result<Option<Data>, AppError> {
        let request = Arc::new(request);
        RequestStack::scope(request.clone(), self.run(&request)).await
    }

    async fn run(&self, request: &ApiRequest) -> Result<Option<Data>, AppError> {
        let mut data = self.read.on_request(request).await?;
        if !request.is_method_safe() && request.method != Method::DELETE {
            data = match (data, &request.body) {
                (Some(Data::Item(existing)), Some(body)) => Some(Data::Item(merge(existing, body))),
                (None, Some(body)) => Some(Data::Item(body.clone())),
                (other, _) => other,
            };
        }
        self.validate.on_view(request)?;
        self.write.on_view(request, data).await
    }
}

/// Body fields written over the loaded item.
fn merge(mut existing: Value, body: &Value) -> Value {
    if let (Some(target), Some(changes)) = (existing.as_object_mut(), body.as_object()) {
        for (k, v) in changes {
            target.insert(k.clone(), v.clone());
        }
    }
    existing
}
