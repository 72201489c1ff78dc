//! Query builder recording DQL parts. Extensions mutate it; the SQL layer renders it.

use crate::orm::{ClassMetadata, ClassMetadataRegistry};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

impl JoinType {
    fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinTarget {
    /// `parent.association`
    Association { parent_alias: String, association: String },
    /// Arbitrary entity joined through an explicit condition.
    Entity(String),
}

impl fmt::Display for JoinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinTarget::Association { parent_alias, association } => {
                write!(f, "{}.{}", parent_alias, association)
            }
            JoinTarget::Entity(class) => f.write_str(class),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Join {
    pub join_type: JoinType,
    pub target: JoinTarget,
    pub alias: String,
    pub condition: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub expr: String,
    pub direction: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Root {
    pub entity: String,
    pub alias: String,
}

#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    roots: Vec<Root>,
    select: Vec<String>,
    distinct: bool,
    joins: Vec<Join>,
    wheres: Vec<String>,
    group_by: Vec<String>,
    having: Vec<String>,
    order_by: Vec<OrderBy>,
    parameters: Vec<(String, Value)>,
    first_result: Option<u64>,
    max_results: Option<u64>,
}

impl QueryBuilder {
    /// `SELECT alias FROM entity alias`
    pub fn new(entity: &str, alias: &str) -> Self {
        QueryBuilder {
            roots: vec![Root {
                entity: entity.to_string(),
                alias: alias.to_string(),
            }],
            select: vec![alias.to_string()],
            ..Default::default()
        }
    }

    pub fn add_from(&mut self, entity: &str, alias: &str) -> &mut Self {
        self.roots.push(Root {
            entity: entity.to_string(),
            alias: alias.to_string(),
        });
        self
    }

    pub fn select(&mut self, expr: impl Into<String>) -> &mut Self {
        self.select = vec![expr.into()];
        self
    }

    pub fn add_select(&mut self, expr: impl Into<String>) -> &mut Self {
        self.select.push(expr.into());
        self
    }

    pub fn distinct(&mut self, distinct: bool) -> &mut Self {
        self.distinct = distinct;
        self
    }

    pub fn inner_join(&mut self, join: &str, alias: &str) -> &mut Self {
        self.push_join(JoinType::Inner, join, alias, None)
    }

    pub fn left_join(&mut self, join: &str, alias: &str) -> &mut Self {
        self.push_join(JoinType::Left, join, alias, None)
    }

    /// Join an entity (not an association path) through `condition`.
    pub fn join_with(&mut self, join_type: JoinType, entity: &str, alias: &str, condition: &str) -> &mut Self {
        self.joins.push(Join {
            join_type,
            target: JoinTarget::Entity(entity.to_string()),
            alias: alias.to_string(),
            condition: Some(condition.to_string()),
        });
        self
    }

    /// `join` is `parent.association`; anything without a dot is an entity join.
    fn push_join(&mut self, join_type: JoinType, join: &str, alias: &str, condition: Option<String>) -> &mut Self {
        let target = match join.split_once('.') {
            Some((parent, association)) => JoinTarget::Association {
                parent_alias: parent.to_string(),
                association: association.to_string(),
            },
            None => JoinTarget::Entity(join.to_string()),
        };
        self.joins.push(Join {
            join_type,
            target,
            alias: alias.to_string(),
            condition,
        });
        self
    }

    pub fn and_where(&mut self, condition: impl Into<String>) -> &mut Self {
        self.wheres.push(condition.into());
        self
    }

    pub fn add_group_by(&mut self, expr: impl Into<String>) -> &mut Self {
        self.group_by.push(expr.into());
        self
    }

    pub fn and_having(&mut self, condition: impl Into<String>) -> &mut Self {
        self.having.push(condition.into());
        self
    }

    pub fn add_order_by(&mut self, expr: impl Into<String>, direction: impl Into<String>) -> &mut Self {
        self.order_by.push(OrderBy {
            expr: expr.into(),
            direction: direction.into(),
        });
        self
    }

    /// Sets or replaces a named parameter.
    pub fn set_parameter(&mut self, name: &str, value: Value) -> &mut Self {
        match self.parameters.iter_mut().find(|(n, _)| n == name) {
            Some(slot) => slot.1 = value,
            None => self.parameters.push((name.to_string(), value)),
        }
        self
    }

    pub fn set_first_result(&mut self, first: u64) -> &mut Self {
        self.first_result = Some(first);
        self
    }

    pub fn set_max_results(&mut self, max: u64) -> &mut Self {
        self.max_results = Some(max);
        self
    }

    pub fn root_aliases(&self) -> Vec<&str> {
        self.roots.iter().map(|r| r.alias.as_str()).collect()
    }

    pub fn root_entities(&self) -> Vec<&str> {
        self.roots.iter().map(|r| r.entity.as_str()).collect()
    }

    pub fn roots(&self) -> &[Root] {
        &self.roots
    }

    pub fn select_parts(&self) -> &[String] {
        &self.select
    }

    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    pub fn joins(&self) -> &[Join] {
        &self.joins
    }

    pub fn where_parts(&self) -> &[String] {
        &self.wheres
    }

    pub fn group_by_parts(&self) -> &[String] {
        &self.group_by
    }

    pub fn having_parts(&self) -> &[String] {
        &self.having
    }

    pub fn order_by_parts(&self) -> &[OrderBy] {
        &self.order_by
    }

    pub fn parameters(&self) -> &[(String, Value)] {
        &self.parameters
    }

    pub fn parameter(&self, name: &str) -> Option<&Value> {
        self.parameters.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn first_result(&self) -> Option<u64> {
        self.first_result
    }

    pub fn max_results(&self) -> Option<u64> {
        self.max_results
    }

    pub fn join_by_alias(&self, alias: &str) -> Option<&Join> {
        self.joins.iter().find(|j| j.alias == alias)
    }

    /// Existing join of `parent_alias.association`, if any.
    pub fn existing_join(&self, parent_alias: &str, association: &str) -> Option<&Join> {
        self.joins.iter().find(|j| match &j.target {
            JoinTarget::Association { parent_alias: p, association: a } => p == parent_alias && a == association,
            JoinTarget::Entity(_) => false,
        })
    }

    /// Entity class bound to `alias`, resolved through roots and association joins.
    pub fn class_for_alias(&self, alias: &str, registry: &ClassMetadataRegistry) -> Option<Arc<ClassMetadata>> {
        if let Some(root) = self.roots.iter().find(|r| r.alias == alias) {
            return registry.get(&root.entity);
        }
        let join = self.join_by_alias(alias)?;
        match &join.target {
            JoinTarget::Association { parent_alias, association } => {
                let parent = self.class_for_alias(parent_alias, registry)?;
                let mapping = parent.association(association)?;
                registry.get(&mapping.target_entity)
            }
            JoinTarget::Entity(class) => registry.get(class),
        }
    }

    /// DQL text, used in logs and assertions.
    pub fn dql(&self) -> String {
        let mut out = String::from("SELECT ");
        if self.distinct {
            out.push_str("DISTINCT ");
        }
        out.push_str(&self.select.join(", "));
        out.push_str(" FROM ");
        out.push_str(
            &self
                .roots
                .iter()
                .map(|r| format!("{} {}", r.entity, r.alias))
                .collect::<Vec<_>>()
                .join(", "),
        );
        for j in &self.joins {
            out.push_str(&format!(" {} {} {}", j.join_type.keyword(), j.target, j.alias));
            if let Some(c) = &j.condition {
                out.push_str(&format!(" WITH {}", c));
            }
        }
        if !self.wheres.is_empty() {
            out.push_str(" WHERE ");
            out.push_str(&self.wheres.join(" AND "));
        }
        if !self.group_by.is_empty() {
            out.push_str(" GROUP BY ");
            out.push_str(&self.group_by.join(", "));
        }
        if !self.having.is_empty() {
            out.push_str(" HAVING ");
            out.push_str(&self.having.join(" AND "));
        }
        if !self.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            out.push_str(
                &self
                    .order_by
                    .iter()
                    .map(|o| format!("{} {}", o.expr, o.direction))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        out
    }
}
