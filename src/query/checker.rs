//! Predicates over a built query's DQL parts. Pagination uses them to pick a safe counting strategy.

use crate::orm::{ClassMetadataRegistry, JoinTarget, QueryBuilder};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

pub fn has_having_clause(qb: &QueryBuilder) -> bool {
    !qb.having_parts().is_empty()
}

pub fn has_max_results(qb: &QueryBuilder) -> bool {
    qb.max_results().is_some()
}

pub fn has_root_entity_with_composite_identifier(qb: &QueryBuilder, registry: &ClassMetadataRegistry) -> bool {
    qb.root_entities()
        .iter()
        .filter_map(|e| registry.get(e))
        .any(|m| m.is_identifier_composite())
}

pub fn has_root_entity_with_foreign_key_identifier(qb: &QueryBuilder, registry: &ClassMetadataRegistry) -> bool {
    qb.root_entities()
        .iter()
        .filter_map(|e| registry.get(e))
        .any(|m| m.contains_foreign_identifier() || m.is_identifier_composite())
}

/// True when some ORDER BY expression references an alias joined onto a collection-valued association.
pub fn has_order_by_on_to_many_join(qb: &QueryBuilder, registry: &ClassMetadataRegistry) -> bool {
    if qb.joins().is_empty() || qb.order_by_parts().is_empty() {
        return false;
    }
    let aliases = order_by_aliases(qb);
    if aliases.is_empty() {
        return false;
    }
    for join in qb.joins() {
        if !aliases.contains(join.alias.as_str()) {
            continue;
        }
        match &join.target {
            JoinTarget::Association { parent_alias, association } => {
                if let Some(parent) = qb.class_for_alias(parent_alias, registry) {
                    if parent.is_collection_valued_association(association) {
                        return true;
                    }
                }
            }
            JoinTarget::Entity(class) => {
                for root in qb.root_entities() {
                    let Some(root_meta) = registry.get(root) else { continue };
                    if root_meta
                        .associations_by_target_class(class)
                        .iter()
                        .any(|a| root_meta.is_collection_valued_association(&a.field_name))
                    {
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn order_by_aliases(qb: &QueryBuilder) -> HashSet<&str> {
    static ALIAS: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = ALIAS
        .get_or_init(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\.[A-Za-z_]").ok())
        .as_ref()
    else {
        return HashSet::new();
    };
    qb.order_by_parts()
        .iter()
        .flat_map(|o| re.captures_iter(&o.expr).filter_map(|c| c.get(1)).map(|m| m.as_str()))
        .collect()
}
