use super::{fetch_one, run_collection, Data, SubresourceDataProvider, ROOT_ALIAS};
use crate::error::AppError;
use crate::orm::{ClassMetadataRegistry, QueryBuilder};
use crate::query::extension::CollectionExtension;
use crate::query::QueryNameGenerator;
use crate::request::SubresourceContext;
use crate::service::QueryExecutor;
use async_trait::async_trait;
use std::sync::Arc;

/// Reads the targets of one association of one parent: `GET /dummies/1/related_dummies`.
pub struct OrmSubresourceDataProvider {
    registry: Arc<ClassMetadataRegistry>,
    executor: Arc<dyn QueryExecutor>,
    collection_extensions: Vec<CollectionExtension>,
}

impl OrmSubresourceDataProvider {
    pub fn new(
        registry: Arc<ClassMetadataRegistry>,
        executor: Arc<dyn QueryExecutor>,
        collection_extensions: Vec<CollectionExtension>,
    ) -> Self {
        OrmSubresourceDataProvider {
            registry,
            executor,
            collection_extensions,
        }
    }

    /// `SELECT o FROM Resource o, Parent p JOIN p.property j WHERE j.id = o.id AND p.id = :id`
    fn base_query(
        &self,
        resource_class: &str,
        context: &SubresourceContext,
        names: &mut QueryNameGenerator,
    ) -> Result<QueryBuilder, AppError> {
        let not_supported = |class: &str| AppError::ResourceClassNotSupported(class.to_string());
        let class = self.registry.get(resource_class).ok_or_else(|| not_supported(resource_class))?;
        let parent = self
            .registry
            .get(&context.parent_class)
            .ok_or_else(|| not_supported(&context.parent_class))?;
        let association = parent.association(&context.property).ok_or_else(|| {
            AppError::property_not_found(&context.parent_class, &context.property)
        })?;
        if association.target_entity != resource_class {
            return Err(AppError::InvalidArgument(format!(
                "{}.{} does not target {}",
                context.parent_class, context.property, resource_class
            )));
        }

        let mut qb = QueryBuilder::new(resource_class, ROOT_ALIAS);
        let parent_alias = names.generate_join_alias(&parent.table_name);
        let join_alias = names.generate_join_alias(&context.property);
        qb.add_from(&context.parent_class, &parent_alias)
            .inner_join(&format!("{}.{}", parent_alias, context.property), &join_alias);
        for field in &class.identifier {
            qb.and_where(format!("{}.{} = {}.{}", join_alias, field, ROOT_ALIAS, field));
        }
        for field in &parent.identifier {
            let value = context
                .identifiers
                .iter()
                .find(|(name, _)| name == field)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| AppError::InvalidArgument(format!("missing parent identifier '{}'", field)))?;
            let parameter = names.generate_parameter_name(field);
            qb.and_where(format!("{}.{} = :{}", parent_alias, field, parameter))
                .set_parameter(&parameter, value);
        }
        Ok(qb)
    }
}

#[async_trait]
impl SubresourceDataProvider for OrmSubresourceDataProvider {
    async fn get_subresource(
        &self,
        resource_class: &str,
        context: &SubresourceContext,
        operation_name: Option<&str>,
    ) -> Result<Option<Data>, AppError> {
        let mut names = QueryNameGenerator::new();
        let qb = self.base_query(resource_class, context, &mut names)?;
        if !context.collection {
            let item = fetch_one(&qb, &self.registry, self.executor.as_ref()).await?;
            return Ok(item.map(Data::Item));
        }
        let result = run_collection(
            qb,
            names,
            &self.collection_extensions,
            &self.registry,
            self.executor.as_ref(),
            resource_class,
            operation_name,
        )
        .await?;
        Ok(Some(Data::Collection(result)))
    }
}
