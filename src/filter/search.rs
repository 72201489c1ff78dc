//! Search filter: `?name=foo`, `?relatedDummy.name=bar`, `?name[]=a&name[]=b`.

use super::{add_join_once, add_joins_for_nested_property, split_properties, ApiFilter, FilterDescription, QueryBuilderFilter};
use crate::config::FilterConfig;
use crate::error::{AppError, ConfigError};
use crate::orm::{ClassMetadata, ClassMetadataRegistry, JoinType, QueryBuilder};
use crate::query::QueryNameGenerator;
use crate::request::RequestStack;
use crate::sql::value_from_text;
use serde_json::Value;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchStrategy {
    Exact,
    Partial,
    Start,
    End,
    WordStart,
}

impl SearchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::Exact => "exact",
            SearchStrategy::Partial => "partial",
            SearchStrategy::Start => "start",
            SearchStrategy::End => "end",
            SearchStrategy::WordStart => "word_start",
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(SearchStrategy::Exact),
            "partial" => Ok(SearchStrategy::Partial),
            "start" => Ok(SearchStrategy::Start),
            "end" => Ok(SearchStrategy::End),
            "word_start" => Ok(SearchStrategy::WordStart),
            other => Err(format!("unknown search strategy '{}'", other)),
        }
    }
}

/// Strategy plus case sensitivity; an `i` prefix (`ipartial`) makes the match case-insensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Rule {
    strategy: SearchStrategy,
    case_sensitive: bool,
}

impl Rule {
    fn parse(value: &Value) -> Result<Self, String> {
        let Some(raw) = value.as_str() else {
            return Ok(Rule {
                strategy: SearchStrategy::Exact,
                case_sensitive: true,
            });
        };
        if let Ok(strategy) = raw.parse() {
            return Ok(Rule {
                strategy,
                case_sensitive: true,
            });
        }
        match raw.strip_prefix('i') {
            Some(rest) => Ok(Rule {
                strategy: rest.parse()?,
                case_sensitive: false,
            }),
            None => Err(format!("unknown search strategy '{}'", raw)),
        }
    }
}

pub struct SearchFilter {
    registry: Arc<ClassMetadataRegistry>,
    /// `None` filters on every mapped field of the resource with the exact strategy.
    properties: Option<Vec<(String, Rule)>>,
}

impl SearchFilter {
    /// `properties` maps property → strategy name (`null` means exact).
    pub fn new(registry: Arc<ClassMetadataRegistry>, properties: Option<Vec<(String, Value)>>) -> Result<Self, String> {
        let properties = match properties {
            Some(list) => Some(
                list.into_iter()
                    .map(|(p, v)| Rule::parse(&v).map(|r| (p, r)))
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(SearchFilter { registry, properties })
    }

    pub fn from_config(config: &FilterConfig, registry: Arc<ClassMetadataRegistry>) -> Result<Self, ConfigError> {
        let properties = (!config.properties.is_empty()).then(|| {
            config
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        });
        SearchFilter::new(registry, properties)
            .map_err(|e| ConfigError::Validation(format!("filter {}: {}", config.id, e)))
    }

    fn rules_for(&self, resource_class: &str) -> Vec<(String, Rule)> {
        match &self.properties {
            Some(list) => list.clone(),
            None => self
                .registry
                .get(resource_class)
                .map(|meta| {
                    meta.fields
                        .iter()
                        .map(|f| {
                            (
                                f.field_name.clone(),
                                Rule {
                                    strategy: SearchStrategy::Exact,
                                    case_sensitive: true,
                                },
                            )
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    /// Class metadata owning the last segment of `property`, if every association on the way is mapped.
    fn owning_class(&self, resource_class: &str, property: &str) -> Option<Arc<ClassMetadata>> {
        let path = split_properties(property);
        let mut meta = self.registry.get(resource_class)?;
        for association in &path.associations {
            let target = meta.association(association)?.target_entity.clone();
            meta = self.registry.get(&target)?;
        }
        (meta.has_field(path.field) || meta.has_association(path.field)).then_some(meta)
    }

    fn filter_property(
        &self,
        property: &str,
        rule: Rule,
        values: &[&str],
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
    ) -> Result<(), AppError> {
        let Some(meta) = self.owning_class(resource_class, property) else {
            tracing::debug!(property = %property, resource_class = %resource_class, "search on unmapped property skipped");
            return Ok(());
        };
        let Some(root) = qb.root_aliases().first().map(|a| a.to_string()) else {
            return Ok(());
        };
        let (alias, field) = add_joins_for_nested_property(property, &root, qb, names, JoinType::Inner);

        if let Some(mapping) = meta.field(&field) {
            let typed: Vec<Value> = values
                .iter()
                .map(|v| value_from_text(mapping.sql_type.as_deref(), v))
                .collect();
            add_where_by_strategy(rule, qb, names, &format!("{}.{}", alias, field), &field, typed);
            return Ok(());
        }

        // Association: match the related identifier, accepting IRIs as values.
        let Some(association) = meta.association(&field) else {
            return Ok(());
        };
        let Some(target) = self.registry.get(&association.target_entity) else {
            return Ok(());
        };
        let Some(id_field) = target.identifier.first().cloned() else {
            return Ok(());
        };
        let id_type = target.field(&id_field).and_then(|f| f.sql_type.clone());
        let ids: Vec<Value> = values
            .iter()
            .map(|v| value_from_text(id_type.as_deref(), iri_tail(v)))
            .collect();
        let association_alias = add_join_once(qb, names, &alias, &field, JoinType::Inner);
        let exact = Rule {
            strategy: SearchStrategy::Exact,
            case_sensitive: true,
        };
        add_where_by_strategy(exact, qb, names, &format!("{}.{}", association_alias, id_field), &id_field, ids);
        Ok(())
    }
}

/// `/related_dummies/3` → `3`; plain values pass through.
fn iri_tail(value: &str) -> &str {
    if value.starts_with('/') {
        value.rsplit('/').next().unwrap_or(value)
    } else {
        value
    }
}

fn add_where_by_strategy(
    rule: Rule,
    qb: &mut QueryBuilder,
    names: &mut QueryNameGenerator,
    expr: &str,
    field: &str,
    values: Vec<Value>,
) {
    // LIKE and LOWER only make sense on text.
    let textual = values.iter().all(Value::is_string);
    let strategy = if textual { rule.strategy } else { SearchStrategy::Exact };
    let lower = |s: String| if rule.case_sensitive || !textual { s } else { format!("LOWER({})", s) };

    let mut params = Vec::with_capacity(values.len());
    for value in values {
        let name = names.generate_parameter_name(field);
        qb.set_parameter(&name, value);
        params.push(name);
    }

    let condition = match (strategy, params.as_slice()) {
        (_, []) => return,
        (SearchStrategy::Exact, [single]) => format!("{} = {}", lower(expr.to_string()), lower(format!(":{}", single))),
        (SearchStrategy::Exact, many) => format!(
            "{} IN ({})",
            lower(expr.to_string()),
            many.iter()
                .map(|p| lower(format!(":{}", p)))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        (other, many) => {
            let clauses: Vec<String> = many
                .iter()
                .map(|p| like_clause(other, &lower(expr.to_string()), p, &lower))
                .collect();
            if clauses.len() == 1 {
                clauses.into_iter().collect()
            } else {
                format!("({})", clauses.join(" OR "))
            }
        }
    };
    qb.and_where(condition);
}

fn like_clause(strategy: SearchStrategy, expr: &str, param: &str, lower: &dyn Fn(String) -> String) -> String {
    match strategy {
        SearchStrategy::Exact => format!("{} = {}", expr, lower(format!(":{}", param))),
        SearchStrategy::Partial => format!("{} LIKE {}", expr, lower(format!("CONCAT('%', :{}, '%')", param))),
        SearchStrategy::Start => format!("{} LIKE {}", expr, lower(format!("CONCAT(:{}, '%')", param))),
        SearchStrategy::End => format!("{} LIKE {}", expr, lower(format!("CONCAT('%', :{})", param))),
        SearchStrategy::WordStart => format!(
            "({e} LIKE {a} OR {e} LIKE {b})",
            e = expr,
            a = lower(format!("CONCAT(:{}, '%')", param)),
            b = lower(format!("CONCAT('% ', :{}, '%')", param)),
        ),
    }
}

fn described_type(sql_type: Option<&str>) -> &'static str {
    match value_from_text(sql_type, "0") {
        Value::Number(n) if n.is_i64() => "int",
        Value::Number(_) => "float",
        Value::Bool(_) => "bool",
        _ => "string",
    }
}

impl ApiFilter for SearchFilter {
    fn description(&self, resource_class: &str) -> Vec<FilterDescription> {
        let mut out = Vec::new();
        for (property, rule) in self.rules_for(resource_class) {
            let Some(meta) = self.owning_class(resource_class, &property) else {
                continue;
            };
            let field = split_properties(&property).field;
            let type_ = described_type(meta.field(field).and_then(|f| f.sql_type.as_deref()));
            let mut parameters = vec![property.clone()];
            if rule.strategy == SearchStrategy::Exact {
                parameters.push(format!("{}[]", property));
            }
            for parameter in parameters {
                out.push(FilterDescription {
                    parameter,
                    property: property.clone(),
                    type_: type_.to_string(),
                    required: false,
                    strategy: Some(rule.strategy.as_str().to_string()),
                });
            }
        }
        out
    }
}

impl QueryBuilderFilter for SearchFilter {
    fn apply(
        &self,
        qb: &mut QueryBuilder,
        names: &mut QueryNameGenerator,
        resource_class: &str,
        _operation_name: Option<&str>,
    ) -> Result<(), AppError> {
        let Some(request) = RequestStack::current() else {
            return Ok(());
        };
        for (property, rule) in self.rules_for(resource_class) {
            let values: Vec<&str> = request
                .query_values(&property)
                .into_iter()
                .filter(|v| !v.is_empty())
                .collect();
            if values.is_empty() {
                continue;
            }
            self.filter_property(&property, rule, &values, qb, names, resource_class)?;
        }
        Ok(())
    }
}
