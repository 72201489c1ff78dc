use crate::error::AppError;
use crate::metadata::Attributes;
use crate::provider::{CollectionDataProvider, Data, ItemDataProvider, SubresourceDataProvider};
use crate::request::ApiRequest;
use axum::http::Method;
use std::sync::Arc;

/// Loads the data an API request operates on.
pub struct ReadListener {
    collection: Arc<dyn CollectionDataProvider>,
    item: Arc<dyn ItemDataProvider>,
    subresource: Arc<dyn SubresourceDataProvider>,
}

impl ReadListener {
    pub fn new(
        collection: Arc<dyn CollectionDataProvider>,
        item: Arc<dyn ItemDataProvider>,
        subresource: Arc<dyn SubresourceDataProvider>,
    ) -> Self {
        ReadListener {
            collection,
            item,
            subresource,
        }
    }

    /// `None` for requests that are not API requests, that opted out of receiving,
    /// or that create a new resource.
    pub async fn on_request(&self, request: &ApiRequest) -> Result<Option<Data>, AppError> {
        let attributes = &request.attributes;
        let Some(resource_class) = attributes.resource_class.as_deref() else {
            return Ok(None);
        };
        if !attributes.receive {
            return Ok(None);
        }

        if let Some(operation) = attributes.collection_operation_name.as_deref() {
            if request.method == Method::POST {
                return Ok(None);
            }
            let collection = self.collection.get_collection(resource_class, Some(operation)).await?;
            return Ok(Some(Data::Collection(collection)));
        }

        if let Some(operation) = attributes.subresource_operation_name.as_deref() {
            let context = attributes
                .subresource_context
                .as_ref()
                .ok_or_else(|| AppError::InvalidArgument("subresource request without a parent context".into()))?;
            return match self.subresource.get_subresource(resource_class, context, Some(operation)).await? {
                Some(data) => Ok(Some(data)),
                None => Err(AppError::NotFound("Not Found".into())),
            };
        }

        let (Some(operation), Some(id)) = (attributes.item_operation_name.as_deref(), attributes.id.as_deref()) else {
            return Ok(None);
        };
        match self.item.get_item(resource_class, id, Some(operation), &Attributes::new()).await {
            Ok(Some(item)) => Ok(Some(Data::Item(item))),
            Ok(None) | Err(AppError::InvalidArgument(_)) => Err(AppError::NotFound("Not Found".into())),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::extension::CollectionResult;
    use crate::request::{RequestAttributes, SubresourceContext};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    /// Answers every provider call and records it.
    #[derive(Default)]
    struct Providers {
        calls: Mutex<Vec<String>>,
        item: Option<Value>,
    }

    #[async_trait]
    impl CollectionDataProvider for Providers {
        async fn get_collection(&self, resource_class: &str, operation_name: Option<&str>) -> Result<CollectionResult, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("collection {} {:?}", resource_class, operation_name));
            Ok(CollectionResult::Items(vec![]))
        }
    }

    #[async_trait]
    impl ItemDataProvider for Providers {
        async fn get_item(
            &self,
            resource_class: &str,
            id: &str,
            operation_name: Option<&str>,
            _context: &Attributes,
        ) -> Result<Option<Value>, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("item {} {} {:?}", resource_class, id, operation_name));
            Ok(self.item.clone())
        }
    }

    #[async_trait]
    impl SubresourceDataProvider for Providers {
        async fn get_subresource(
            &self,
            resource_class: &str,
            context: &SubresourceContext,
            _operation_name: Option<&str>,
        ) -> Result<Option<Data>, AppError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("subresource {} {}", resource_class, context.property));
            Ok(self.item.clone().map(Data::Item))
        }
    }

    fn listener(providers: &Arc<Providers>) -> ReadListener {
        ReadListener::new(providers.clone(), providers.clone(), providers.clone())
    }

    fn request(method: Method, attributes: RequestAttributes) -> ApiRequest {
        ApiRequest::new(method, "/foos").with_attributes(attributes)
    }

    #[tokio::test]
    async fn not_an_api_request() {
        let providers = Arc::new(Providers::default());
        let data = listener(&providers)
            .on_request(&ApiRequest::new(Method::GET, "/"))
            .await
            .unwrap();
        assert_eq!(data, None);
        assert!(providers.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn receive_flag_false_skips_providers() {
        let providers = Arc::new(Providers::default());
        let attributes = RequestAttributes {
            resource_class: Some("Foo".into()),
            collection_operation_name: Some("post".into()),
            receive: false,
            ..Default::default()
        };
        let data = listener(&providers).on_request(&request(Method::PUT, attributes)).await.unwrap();
        assert_eq!(data, None);
        assert!(providers.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn collection_post_has_no_data() {
        let providers = Arc::new(Providers::default());
        let attributes = RequestAttributes {
            resource_class: Some("Foo".into()),
            collection_operation_name: Some("post".into()),
            ..Default::default()
        };
        let data = listener(&providers).on_request(&request(Method::POST, attributes)).await.unwrap();
        assert_eq!(data, None);
        assert!(providers.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn collection_get() {
        let providers = Arc::new(Providers::default());
        let attributes = RequestAttributes {
            resource_class: Some("Foo".into()),
            collection_operation_name: Some("get".into()),
            ..Default::default()
        };
        let data = listener(&providers).on_request(&request(Method::GET, attributes)).await.unwrap();
        assert_eq!(data, Some(Data::Collection(CollectionResult::Items(vec![]))));
        assert_eq!(*providers.calls.lock().unwrap(), vec!["collection Foo Some(\"get\")".to_string()]);
    }

    #[tokio::test]
    async fn item_get_and_not_found() {
        let attributes = RequestAttributes {
            resource_class: Some("Foo".into()),
            item_operation_name: Some("get".into()),
            id: Some("1".into()),
            ..Default::default()
        };
        let found = Arc::new(Providers {
            item: Some(json!({"id": 1})),
            ..Default::default()
        });
        let data = listener(&found)
            .on_request(&request(Method::GET, attributes.clone()))
            .await
            .unwrap();
        assert_eq!(data, Some(Data::Item(json!({"id": 1}))));
        assert_eq!(*found.calls.lock().unwrap(), vec!["item Foo 1 Some(\"get\")".to_string()]);

        let missing = Arc::new(Providers::default());
        assert!(matches!(
            listener(&missing).on_request(&request(Method::GET, attributes)).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn subresource_get() {
        let providers = Arc::new(Providers {
            item: Some(json!({"id": 2})),
            ..Default::default()
        });
        let attributes = RequestAttributes {
            resource_class: Some("Bar".into()),
            subresource_operation_name: Some("api_foos_bar_get_subresource".into()),
            subresource_context: Some(SubresourceContext {
                parent_class: "Foo".into(),
                property: "bar".into(),
                collection: false,
                identifiers: vec![("id".into(), json!(1))],
            }),
            ..Default::default()
        };
        let data = listener(&providers).on_request(&request(Method::GET, attributes)).await.unwrap();
        assert_eq!(data, Some(Data::Item(json!({"id": 2}))));
        assert_eq!(*providers.calls.lock().unwrap(), vec!["subresource Bar bar".to_string()]);
    }
}
