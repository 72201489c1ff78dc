//! Folds flat `alias.field` rows into nested JSON objects, one per distinct root.

use super::builder::identifier_columns;
use super::params::value_from_text;
use super::render::{AliasPlan, Plan};
use crate::error::AppError;
use crate::orm::{ClassMetadataRegistry, QueryBuilder};
use serde_json::{Map, Value};

type Row = Map<String, Value>;

#[derive(Debug, Default)]
struct Node {
    fields: Map<String, Value>,
    relations: Vec<(String, Relation)>,
}

#[derive(Debug)]
enum Relation {
    One(Option<Box<Node>>),
    Many(Vec<(String, Node)>),
}

/// Identity of `entry` in `row`; `None` when any identifier column is null (outer join miss).
fn row_key(entry: &AliasPlan, row: &Row) -> Result<Option<String>, AppError> {
    let mut parts = Vec::new();
    for c in identifier_columns(&entry.class)? {
        match row.get(&format!("{}.{}", entry.alias, c.field)) {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::String(s)) => parts.push(s.clone()),
            Some(other) => parts.push(other.to_string()),
        }
    }
    Ok(Some(parts.join("\u{1f}")))
}

fn cell(row: &Row, alias: &str, field: &str, sql_type: Option<&str>) -> Value {
    match row.get(&format!("{}.{}", alias, field)) {
        Some(Value::String(s)) if matches!(sql_type, Some("numeric") | Some("decimal")) => {
            value_from_text(sql_type, s)
        }
        Some(v) => v.clone(),
        None => Value::Null,
    }
}

fn merge(node: &mut Node, entry: &AliasPlan, plan: &Plan, row: &Row) -> Result<(), AppError> {
    if node.fields.is_empty() {
        for c in entry.selected.iter().flatten() {
            node.fields
                .insert(c.field.clone(), cell(row, &entry.alias, &c.field, c.sql_type.as_deref()));
        }
    }
    for child in plan.selected_children(&entry.alias) {
        let Some((_, association)) = &child.parent else { continue };
        let key = row_key(child, row)?;
        let slot = match node.relations.iter().position(|(name, _)| name == association) {
            Some(i) => i,
            None => {
                let empty = if child.to_many { Relation::Many(Vec::new()) } else { Relation::One(None) };
                node.relations.push((association.clone(), empty));
                node.relations.len() - 1
            }
        };
        let Some(key) = key else { continue };
        match &mut node.relations[slot].1 {
            Relation::Many(items) => {
                let i = match items.iter().position(|(k, _)| *k == key) {
                    Some(i) => i,
                    None => {
                        items.push((key, Node::default()));
                        items.len() - 1
                    }
                };
                merge(&mut items[i].1, child, plan, row)?;
            }
            Relation::One(target) => {
                let target = target.get_or_insert_with(Box::default);
                merge(target, child, plan, row)?;
            }
        }
    }
    Ok(())
}

fn into_value(node: Node) -> Value {
    let mut out = Map::new();
    for (field, value) in node.fields {
        match field.split_once('.') {
            Some((embedded, inner)) => {
                let slot = out
                    .entry(embedded.to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
                if !slot.is_object() {
                    *slot = Value::Object(Map::new());
                }
                if let Value::Object(map) = slot {
                    map.insert(inner.to_string(), value);
                }
            }
            None => {
                out.insert(field, value);
            }
        }
    }
    for (name, relation) in node.relations {
        let value = match relation {
            Relation::One(None) => Value::Null,
            Relation::One(Some(n)) => into_value(*n),
            Relation::Many(items) => Value::Array(items.into_iter().map(|(_, n)| into_value(n)).collect()),
        };
        out.insert(name, value);
    }
    Value::Object(out)
}

/// One object per distinct root identifier, in first-seen order. Joined aliases that were
/// selected nest under their association name; rows whose root identifier is null are dropped.
pub fn hydrate(qb: &QueryBuilder, registry: &ClassMetadataRegistry, rows: Vec<Row>) -> Result<Vec<Value>, AppError> {
    let plan = Plan::build(qb, registry)?;
    let root = plan
        .root()
        .filter(|r| r.selected.is_some())
        .ok_or_else(|| AppError::InvalidArgument("the root alias is not selected".into()))?;
    let mut roots: Vec<(String, Node)> = Vec::new();
    for row in &rows {
        let Some(key) = row_key(root, row)? else { continue };
        let i = match roots.iter().position(|(k, _)| *k == key) {
            Some(i) => i,
            None => {
                roots.push((key, Node::default()));
                roots.len() - 1
            }
        };
        merge(&mut roots[i].1, root, &plan, row)?;
    }
    Ok(roots.into_iter().map(|(_, n)| into_value(n)).collect())
}
