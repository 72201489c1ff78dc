//! Offset pagination driven by resource attributes, global settings and client parameters.

use super::{CollectionResult, QueryCollectionExtension, QueryResultCollectionExtension};
use crate::config::PaginationSettings;
use crate::error::AppError;
use crate::metadata::{is_truthy, Attributes, ResourceMetadata, ResourceMetadataFactory};
use crate::orm::{ClassMetadataRegistry, QueryBuilder};
use crate::query::{checker, QueryNameGenerator};
use crate::request::{ApiRequest, RequestStack};
use crate::service::QueryExecutor;
use crate::sql;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// One page of a collection plus the total across all pages.
#[derive(Clone, Debug, PartialEq)]
pub struct Paginator {
    pub items: Vec<Value>,
    pub total_items: i64,
    pub current_page: u64,
    pub items_per_page: u64,
}

impl Paginator {
    pub fn last_page(&self) -> u64 {
        if self.items_per_page == 0 || self.total_items <= 0 {
            return 1;
        }
        (self.total_items as u64).div_ceil(self.items_per_page)
    }
}

pub struct PaginationExtension {
    resources: Arc<dyn ResourceMetadataFactory>,
    registry: Arc<ClassMetadataRegistry>,
    settings: PaginationSettings,
}

impl PaginationExtension {
    pub fn new(
        resources: Arc<dyn ResourceMetadataFactory>,
        registry: Arc<ClassMetadataRegistry>,
        settings: PaginationSettings,
    ) -> Self {
        PaginationExtension {
            resources,
            registry,
            settings,
        }
    }

    fn bool_setting(metadata: &ResourceMetadata, operation_name: Option<&str>, key: &str, default: bool) -> bool {
        match metadata.collection_operation_attribute(operation_name, key, true) {
            Some(v) => is_truthy(Some(v)),
            None => default,
        }
    }

    fn integer_setting(metadata: &ResourceMetadata, operation_name: Option<&str>, key: &str) -> Result<Option<i64>, AppError> {
        match metadata.collection_operation_attribute(operation_name, key, true) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| AppError::InvalidArgument(format!("{} must be an integer, got {}", key, v))),
        }
    }

    fn is_enabled(&self, request: &ApiRequest, metadata: &ResourceMetadata, operation_name: Option<&str>) -> bool {
        let enabled = Self::bool_setting(metadata, operation_name, "pagination_enabled", self.settings.enabled);
        let client_enabled = Self::bool_setting(
            metadata,
            operation_name,
            "pagination_client_enabled",
            self.settings.client_enabled,
        );
        if client_enabled {
            if let Some(raw) = request.query_param(&self.settings.enabled_parameter_name) {
                return is_truthy(Some(&Value::from(raw)));
            }
        }
        enabled
    }

    fn items_per_page(
        &self,
        request: &ApiRequest,
        metadata: &ResourceMetadata,
        operation_name: Option<&str>,
    ) -> Result<u64, AppError> {
        let mut items_per_page = Self::integer_setting(metadata, operation_name, "pagination_items_per_page")?
            .unwrap_or(self.settings.items_per_page);

        let client_items_per_page = Self::bool_setting(
            metadata,
            operation_name,
            "pagination_client_items_per_page",
            self.settings.client_items_per_page,
        );
        if client_items_per_page {
            if let Some(raw) = request.query_param(&self.settings.items_per_page_parameter_name) {
                items_per_page = raw.trim().parse().unwrap_or(0);
            }
        }

        if items_per_page <= 0 {
            return Err(AppError::InvalidArgument(
                "Item per page parameter should not be less than or equal to 0".into(),
            ));
        }

        let maximum = Self::integer_setting(metadata, operation_name, "maximum_items_per_page")?
            .or(self.settings.maximum_items_per_page);
        if let Some(maximum) = maximum.filter(|m| *m > 0) {
            items_per_page = items_per_page.min(maximum);
        }
        Ok(items_per_page as u64)
    }

    fn page(&self, request: &ApiRequest) -> u64 {
        request
            .query_param(&self.settings.page_parameter_name)
            .and_then(|p| p.trim().parse::<i64>().ok())
            .unwrap_or(1)
            .max(1) as u64
    }

    fn use_fetch_join_collection(&self, qb: &QueryBuilder) -> bool {
        !checker::has_root_entity_with_composite_identifier(qb, &self.registry)
    }

    fn use_output_walkers(&self, qb: &QueryBuilder) -> bool {
        checker::has_root_entity_with_composite_identifier(qb, &self.registry)
            || checker::has_root_entity_with_foreign_key_identifier(qb, &self.registry)
            || checker::has_having_clause(qb)
            || (checker::has_max_results(qb) && checker::has_order_by_on_to_many_join(qb, &self.registry))
    }
}

impl QueryCollectionExtension for PaginationExtension {
    fn apply_to_collection(
        &self,
        qb: &mut QueryBuilder,
        _names: &mut QueryNameGenerator,
        resource_class: &str,
        operation_name: Option<&str>,
        _context: &Attributes,
    ) -> Result<(), AppError> {
        let Some(request) = RequestStack::current() else {
            tracing::debug!(class = %resource_class, "no current request, pagination skipped");
            return Ok(());
        };
        let metadata = self.resources.create(resource_class)?;
        if !self.is_enabled(&request, &metadata, operation_name) {
            tracing::debug!(class = %resource_class, "pagination disabled");
            return Ok(());
        }
        let items_per_page = self.items_per_page(&request, &metadata, operation_name)?;
        let first = (self.page(&request) - 1)
            .checked_mul(items_per_page)
            .ok_or_else(|| AppError::InvalidArgument("page parameter is out of range".into()))?;
        qb.set_first_result(first).set_max_results(items_per_page);
        Ok(())
    }
}

#[async_trait]
impl QueryResultCollectionExtension for PaginationExtension {
    fn supports_result(&self, resource_class: &str, operation_name: Option<&str>) -> bool {
        let Some(request) = RequestStack::current() else {
            return false;
        };
        match self.resources.create(resource_class) {
            Ok(metadata) => self.is_enabled(&request, &metadata, operation_name),
            Err(_) => false,
        }
    }

    async fn get_result(&self, qb: &QueryBuilder, executor: &dyn QueryExecutor) -> Result<CollectionResult, AppError> {
        let select = sql::render_select(qb, &self.registry, self.use_fetch_join_collection(qb))?;
        let rows = executor.fetch_rows(&select).await?;
        let items = sql::hydrate(qb, &self.registry, rows)?;
        let count = sql::render_count(qb, &self.registry, self.use_output_walkers(qb))?;
        let total_items = executor.fetch_count(&count).await?;

        let items_per_page = qb.max_results().unwrap_or(items.len() as u64);
        let current_page = match items_per_page {
            0 => 1,
            n => qb.first_result().unwrap_or(0) / n + 1,
        };
        Ok(CollectionResult::Paginated(Paginator {
            items,
            total_items,
            current_page,
            items_per_page,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::{ClassMetadata, FieldMapping};
    use crate::testing::{row, RecordingExecutor, StaticResources};
    use axum::http::Method;
    use serde_json::json;

    fn registry() -> Arc<ClassMetadataRegistry> {
        let mut r = ClassMetadataRegistry::new();
        r.register(ClassMetadata {
            name: "Dummy".into(),
            table_name: "dummy".into(),
            identifier: vec!["id".into()],
            fields: vec![
                FieldMapping {
                    field_name: "id".into(),
                    column_name: "id".into(),
                    sql_type: Some("int".into()),
                    nullable: false,
                },
                FieldMapping {
                    field_name: "name".into(),
                    column_name: "name".into(),
                    sql_type: Some("text".into()),
                    nullable: true,
                },
            ],
            ..Default::default()
        });
        Arc::new(r)
    }

    fn extension(attributes: Value, settings: PaginationSettings) -> PaginationExtension {
        let metadata = ResourceMetadata::new().with_attributes(attributes.as_object().cloned().unwrap_or_default());
        PaginationExtension::new(
            Arc::new(StaticResources::new().with("Dummy", metadata)),
            registry(),
            settings,
        )
    }

    fn apply(ext: &PaginationExtension, request: ApiRequest) -> (Result<(), AppError>, QueryBuilder) {
        let mut qb = QueryBuilder::new("Dummy", "o");
        let result = RequestStack::sync_scope(Arc::new(request), || {
            ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", Some("op"), &Attributes::new())
        });
        (result, qb)
    }

    fn underscore_page() -> PaginationSettings {
        PaginationSettings {
            page_parameter_name: "_page".into(),
            ..Default::default()
        }
    }

    #[test]
    fn client_parameters_resolve_the_page() {
        let ext = extension(
            json!({"pagination_enabled": true, "pagination_client_enabled": true, "pagination_items_per_page": 40}),
            underscore_page(),
        );
        let request = ApiRequest::new(Method::GET, "/dummies")
            .with_query("pagination", "true")
            .with_query("itemsPerPage", "20")
            .with_query("_page", "2");
        let (result, qb) = apply(&ext, request);
        result.unwrap();
        assert_eq!(qb.first_result(), Some(40));
        assert_eq!(qb.max_results(), Some(40));
    }

    #[test]
    fn client_items_per_page_is_clamped_to_the_maximum() {
        let settings = PaginationSettings {
            maximum_items_per_page: Some(300),
            ..underscore_page()
        };
        let ext = extension(
            json!({"pagination_client_items_per_page": true, "pagination_items_per_page": 40}),
            settings,
        );
        let request = ApiRequest::new(Method::GET, "/dummies")
            .with_query("itemsPerPage", "301")
            .with_query("_page", "2");
        let (result, qb) = apply(&ext, request);
        result.unwrap();
        assert_eq!(qb.first_result(), Some(300));
        assert_eq!(qb.max_results(), Some(300));
    }

    #[test]
    fn zero_items_per_page_is_rejected_without_touching_the_query() {
        let ext = extension(json!({"pagination_items_per_page": 0}), underscore_page());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies").with_query("_page", "2"));
        match result {
            Err(AppError::InvalidArgument(m)) => {
                assert_eq!(m, "Item per page parameter should not be less than or equal to 0")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(qb.first_result(), None);
        assert_eq!(qb.max_results(), None);
    }

    #[test]
    fn negative_items_per_page_attribute_is_rejected() {
        let ext = extension(json!({"pagination_items_per_page": -5}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies"));
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));
        assert_eq!(qb.first_result(), None);
        assert_eq!(qb.max_results(), None);
    }

    #[test]
    fn negative_client_items_per_page_is_rejected() {
        let ext = extension(
            json!({"pagination_client_items_per_page": true}),
            PaginationSettings::default(),
        );
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies").with_query("itemsPerPage", "-1"));
        match result {
            Err(AppError::InvalidArgument(m)) => {
                assert_eq!(m, "Item per page parameter should not be less than or equal to 0")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(qb.first_result(), None);
        assert_eq!(qb.max_results(), None);
    }

    #[test]
    fn non_integer_page_size_attributes_are_rejected() {
        let ext = extension(json!({"pagination_items_per_page": "40"}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies"));
        match result {
            Err(AppError::InvalidArgument(m)) => assert!(m.starts_with("pagination_items_per_page must be an integer")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(qb.max_results(), None);

        let ext = extension(json!({"maximum_items_per_page": 2.5}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies"));
        assert!(matches!(result, Err(AppError::InvalidArgument(m)) if m.starts_with("maximum_items_per_page")));
        assert_eq!(qb.first_result(), None);
    }

    #[test]
    fn page_below_one_means_first_page() {
        let ext = extension(json!({}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies").with_query("page", "-3"));
        result.unwrap();
        assert_eq!(qb.first_result(), Some(0));
        assert_eq!(qb.max_results(), Some(30));
    }

    #[test]
    fn client_can_disable_pagination() {
        let ext = extension(json!({"pagination_client_enabled": true}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies").with_query("pagination", "false"));
        result.unwrap();
        assert_eq!(qb.max_results(), None);
    }

    #[test]
    fn client_toggle_is_ignored_unless_allowed() {
        let ext = extension(json!({}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies").with_query("pagination", "false"));
        result.unwrap();
        assert_eq!(qb.max_results(), Some(30));
    }

    #[test]
    fn disabled_by_attribute() {
        let ext = extension(json!({"pagination_enabled": false}), PaginationSettings::default());
        let (result, qb) = apply(&ext, ApiRequest::new(Method::GET, "/dummies"));
        result.unwrap();
        assert_eq!(qb.first_result(), None);
    }

    #[test]
    fn no_request_means_no_pagination() {
        let ext = extension(json!({}), PaginationSettings::default());
        let mut qb = QueryBuilder::new("Dummy", "o");
        ext.apply_to_collection(&mut qb, &mut QueryNameGenerator::new(), "Dummy", None, &Attributes::new())
            .unwrap();
        assert_eq!(qb.max_results(), None);
        assert!(!ext.supports_result("Dummy", None));
    }

    #[test]
    fn supports_result_follows_the_resolved_state() {
        let ext = extension(json!({"pagination_client_enabled": true}), PaginationSettings::default());
        let on = Arc::new(ApiRequest::new(Method::GET, "/dummies"));
        let off = Arc::new(ApiRequest::new(Method::GET, "/dummies").with_query("pagination", "0"));
        assert!(RequestStack::sync_scope(on, || ext.supports_result("Dummy", None)));
        assert!(!RequestStack::sync_scope(off, || ext.supports_result("Dummy", None)));
        let unknown = Arc::new(ApiRequest::new(Method::GET, "/unknown"));
        assert!(!RequestStack::sync_scope(unknown, || ext.supports_result("Unknown", None)));
    }

    #[tokio::test]
    async fn result_carries_page_information() {
        let ext = extension(json!({}), PaginationSettings::default());
        let mut qb = QueryBuilder::new("Dummy", "o");
        qb.set_first_result(10).set_max_results(5);
        let executor = RecordingExecutor::new()
            .respond(vec![
                row(&[("o.id", json!(11)), ("o.name", json!("a"))]),
                row(&[("o.id", json!(12)), ("o.name", json!("b"))]),
            ])
            .with_count(12);
        let result = ext.get_result(&qb, &executor).await.unwrap();
        let CollectionResult::Paginated(page) = result else {
            panic!("expected a paginated result");
        };
        assert_eq!(page.items, vec![json!({"id": 11, "name": "a"}), json!({"id": 12, "name": "b"})]);
        assert_eq!(page.total_items, 12);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.items_per_page, 5);
        assert_eq!(page.last_page(), 3);
        let sql = executor.sql();
        assert_eq!(sql.len(), 2);
        assert!(sql[0].ends_with("LIMIT 5 OFFSET 10"));
        assert_eq!(sql[1], r#"SELECT COUNT(DISTINCT "o"."id") FROM "dummy" AS "o""#);
    }
}
