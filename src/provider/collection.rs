use super::{run_collection, CollectionDataProvider, ROOT_ALIAS};
use crate::error::AppError;
use crate::orm::{ClassMetadataRegistry, QueryBuilder};
use crate::query::extension::{CollectionExtension, CollectionResult};
use crate::query::QueryNameGenerator;
use crate::service::QueryExecutor;
use async_trait::async_trait;
use std::sync::Arc;

pub struct OrmCollectionDataProvider {
    registry: Arc<ClassMetadataRegistry>,
    executor: Arc<dyn QueryExecutor>,
    extensions: Vec<CollectionExtension>,
}

impl OrmCollectionDataProvider {
    pub fn new(
        registry: Arc<ClassMetadataRegistry>,
        executor: Arc<dyn QueryExecutor>,
        extensions: Vec<CollectionExtension>,
    ) -> Self {
        OrmCollectionDataProvider {
            registry,
            executor,
            extensions,
        }
    }
}

#[async_trait]
impl CollectionDataProvider for OrmCollectionDataProvider {
    async fn get_collection(&self, resource_class: &str, operation_name: Option<&str>) -> Result<CollectionResult, AppError> {
        if !self.registry.has_manager_for(resource_class) {
            return Err(AppError::ResourceClassNotSupported(resource_class.to_string()));
        }
        run_collection(
            QueryBuilder::new(resource_class, ROOT_ALIAS),
            QueryNameGenerator::new(),
            &self.extensions,
            &self.registry,
            self.executor.as_ref(),
            resource_class,
            operation_name,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Attributes;
    use crate::orm::{ClassMetadata, FieldMapping};
    use crate::query::extension::{QueryCollectionExtension, QueryResultCollectionExtension};
    use crate::testing::{row, RecordingExecutor};
    use serde_json::{json, Value};
    use std::sync::Mutex;

    fn registry() -> Arc<ClassMetadataRegistry> {
        let mut r = ClassMetadataRegistry::new();
        r.register(ClassMetadata {
            name: "Dummy".into(),
            table_name: "dummy".into(),
            identifier: vec!["id".into()],
            fields: vec![FieldMapping {
                field_name: "id".into(),
                column_name: "id".into(),
                sql_type: Some("int".into()),
                nullable: false,
            }],
            ..Default::default()
        });
        Arc::new(r)
    }

    /// Records the calls it receives; optionally answers with a fixed result.
    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<(String, Option<String>)>>,
        result: Option<Vec<Value>>,
    }

    impl QueryCollectionExtension for Recording {
        fn apply_to_collection(
            &self,
            qb: &mut QueryBuilder,
            _names: &mut QueryNameGenerator,
            resource_class: &str,
            operation_name: Option<&str>,
            _context: &Attributes,
        ) -> Result<(), AppError> {
            qb.and_where("o.id > 0");
            self.calls
                .lock()
                .unwrap()
                .push((resource_class.to_string(), operation_name.map(str::to_string)));
            Ok(())
        }
    }

    #[async_trait]
    impl QueryResultCollectionExtension for Recording {
        fn supports_result(&self, _resource_class: &str, _operation_name: Option<&str>) -> bool {
            self.result.is_some()
        }

        async fn get_result(&self, _qb: &QueryBuilder, _executor: &dyn QueryExecutor) -> Result<CollectionResult, AppError> {
            Ok(CollectionResult::Items(self.result.clone().unwrap_or_default()))
        }
    }

    #[tokio::test]
    async fn runs_extensions_then_the_query() {
        let extension = Arc::new(Recording::default());
        let executor = Arc::new(RecordingExecutor::new().respond(vec![row(&[("o.id", json!(1))])]));
        let provider = OrmCollectionDataProvider::new(
            registry(),
            executor.clone(),
            vec![CollectionExtension::Plain(extension.clone())],
        );
        let result = provider.get_collection("Dummy", Some("get")).await.unwrap();
        assert_eq!(result, CollectionResult::Items(vec![json!({"id": 1})]));
        assert_eq!(
            *extension.calls.lock().unwrap(),
            vec![("Dummy".to_string(), Some("get".to_string()))]
        );
        assert_eq!(
            executor.sql(),
            vec![r#"SELECT "o"."id" AS "o.id" FROM "dummy" AS "o" WHERE ("o"."id" > 0)"#.to_string()]
        );
    }

    #[tokio::test]
    async fn result_extension_short_circuits() {
        let producing = Arc::new(Recording {
            result: Some(vec![json!({"id": 9})]),
            ..Default::default()
        });
        let after = Arc::new(Recording::default());
        let executor = Arc::new(RecordingExecutor::new());
        let provider = OrmCollectionDataProvider::new(
            registry(),
            executor.clone(),
            vec![
                CollectionExtension::WithResult(producing),
                CollectionExtension::Plain(after.clone()),
            ],
        );
        let result = provider.get_collection("Dummy", None).await.unwrap();
        assert_eq!(result.items(), &[json!({"id": 9})]);
        assert!(after.calls.lock().unwrap().is_empty());
        assert!(executor.sql().is_empty());
    }

    #[tokio::test]
    async fn unmanaged_class_is_not_supported() {
        let provider = OrmCollectionDataProvider::new(registry(), Arc::new(RecordingExecutor::new()), vec![]);
        assert!(matches!(
            provider.get_collection("Unknown", None).await,
            Err(AppError::ResourceClassNotSupported(_))
        ));
    }
}
