//! Applies the query-builder filters listed in the collection operation's `filters` attribute.

use super::QueryCollectionExtension;
use crate::error::AppError;
use crate::filter::FilterLocator;
use crate::metadata::{Attributes, ResourceMetadataFactory};
use crate::orm::QueryBuilder;
use crate::query::QueryNameGenerator;
use serde_json::Value;
use std::sync::Arc;

pub struct FilterExtension {
    resources: Arc<dyn ResourceMetadataFactory>,
    filters: Arc<dyn FilterLocator>,
}

impl FilterExtension {
    pub fn new(resources: Arc<dyn ResourceMetadataFactory>, filters: Arc<dyn FilterLocator>) -> Self {
        FilterExtension { resources, filters }
    }
}

impl QueryCollectionExtension for FilterExtension {
    fn apply_to_collection(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        operation_name: Option<&str>,
        _context: &Attributes,
    ) -> Result<(), AppError> {
        let metadata = self.resources.create(resource_class)?;
        let Some(ids) = metadata
            .collection_operation_attribute(operation_name, "filters", true)
            .and_then(Value::as_array)
        else {
            return Ok(());
        };
        for id in ids.iter().filter_map(Value::as_str) {
            let Some(filter) = self.filters.get(id) else {
                tracing::debug!(filter = %id, "filter not registered, skipped");
                continue;
            };
            let Some(filter) = filter.as_query_builder() else {
                tracing::debug!(filter = %id, "filter does not apply to queries, skipped");
                continue;
            };
            filter.apply(qb, names, resource_class, operation_name)?;
        }
        Ok(())
    }
}
