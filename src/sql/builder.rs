//! Parameterized INSERT, UPDATE and DELETE from ORM class metadata, plus the shared
//! quoting and column-list helpers.

use crate::error::AppError;
use crate::orm::{AssociationMapping, ClassMetadata};
use serde_json::{Map, Value};

/// Quote identifier for PostgreSQL (safe: only from config).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Full qualified table name.
pub fn qualified_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(schema), quoted(table))
}

/// Table reference for a class: schema-qualified when the mapping names a schema.
pub fn table_ref(class: &ClassMetadata) -> String {
    match &class.schema_name {
        Some(schema) => qualified_table(schema, &class.table_name),
        None => quoted(&class.table_name),
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_param(&mut self, v: Value) -> u32 {
        let n = self.params.len() as u32 + 1;
        self.params.push(v);
        n
    }
}

/// One column read back for hydration, labelled `alias.field`.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectedColumn {
    pub field: String,
    pub column: String,
    pub sql_type: Option<String>,
}

/// Column expression: custom enum (schema.typename) and numeric as col::text so sqlx returns String.
pub fn column_sql(qualifier: Option<&str>, column: &str, sql_type: Option<&str>) -> String {
    let q = match qualifier {
        Some(alias) => format!("{}.{}", quoted(alias), quoted(column)),
        None => quoted(column),
    };
    let pg_type = sql_type.unwrap_or("");
    if pg_type.contains('.') || pg_type == "numeric" || pg_type == "decimal" {
        format!("{}::text", q)
    } else {
        q
    }
}

fn single_join_column(a: &AssociationMapping) -> Option<&str> {
    match a.join_columns.as_slice() {
        [c] if a.is_owning_side() && !a.kind.is_to_many() => Some(c.name.as_str()),
        _ => None,
    }
}

/// Every mapped field, plus the foreign key of each owning to-one association under the association name.
pub fn class_columns(class: &ClassMetadata) -> Vec<SelectedColumn> {
    let mut columns: Vec<SelectedColumn> = class
        .fields
        .iter()
        .map(|f| SelectedColumn {
            field: f.field_name.clone(),
            column: f.column_name.clone(),
            sql_type: f.sql_type.clone(),
        })
        .collect();
    for a in &class.association_mappings {
        if let Some(column) = single_join_column(a) {
            columns.push(SelectedColumn {
                field: a.field_name.clone(),
                column: column.to_string(),
                sql_type: None,
            });
        }
    }
    columns
}

/// Columns backing each identifier field, in identifier order.
pub fn identifier_columns(class: &ClassMetadata) -> Result<Vec<SelectedColumn>, AppError> {
    class
        .identifier
        .iter()
        .map(|id| {
            if let Some(f) = class.field(id) {
                return Ok(SelectedColumn {
                    field: id.clone(),
                    column: f.column_name.clone(),
                    sql_type: f.sql_type.clone(),
                });
            }
            class
                .association(id)
                .and_then(single_join_column)
                .map(|column| SelectedColumn {
                    field: id.clone(),
                    column: column.to_string(),
                    sql_type: None,
                })
                .ok_or_else(|| AppError::InvalidArgument(format!("identifier '{}' of {} has no column", id, class.name)))
        })
        .collect()
}

fn returning_list(class: &ClassMetadata) -> String {
    class_columns(class)
        .iter()
        .map(|c| {
            format!(
                "{} AS {}",
                column_sql(None, &c.column, c.sql_type.as_deref()),
                quoted(&format!("o.{}", c.field))
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn placeholder(n: u32, sql_type: Option<&str>) -> String {
    sql_type
        .map(|t| format!("${}::{}", n, t))
        .unwrap_or_else(|| format!("${}", n))
}

/// Body value for a field; embedded fields `emb.field` are read from the nested `emb` object.
fn body_value<'a>(body: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    match field.split_once('.') {
        Some((embedded, inner)) => body.get(embedded)?.as_object()?.get(inner),
        None => body.get(field),
    }
}

/// Foreign key from a relation value: a scalar id, an IRI (`/dummies/3`) or an object carrying `id`.
fn reference_value(v: &Value) -> Value {
    match v {
        Value::String(s) => {
            let tail = s.rsplit('/').next().unwrap_or(s);
            tail.parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(tail.to_string()))
        }
        Value::Object(o) => o.get("id").map(reference_value).unwrap_or(Value::Null),
        other => other.clone(),
    }
}

/// `(column, placeholder)` for every mapped field and owning to-one association present in the body.
fn assignments(
    q: &mut QueryBuf,
    class: &ClassMetadata,
    body: &Map<String, Value>,
    skip_identifiers: bool,
) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for f in &class.fields {
        if skip_identifiers && class.identifier.contains(&f.field_name) {
            continue;
        }
        let Some(v) = body_value(body, &f.field_name) else { continue };
        let n = q.push_param(v.clone());
        out.push((quoted(&f.column_name), placeholder(n, f.sql_type.as_deref())));
    }
    for a in &class.association_mappings {
        if skip_identifiers && class.identifier.contains(&a.field_name) {
            continue;
        }
        let Some(column) = single_join_column(a) else { continue };
        let Some(v) = body.get(&a.field_name) else { continue };
        let n = q.push_param(reference_value(v));
        out.push((quoted(column), placeholder(n, None)));
    }
    out
}

fn identifier_condition(
    q: &mut QueryBuf,
    class: &ClassMetadata,
    identifiers: &[(String, Value)],
) -> Result<String, AppError> {
    let mut parts = Vec::new();
    for column in identifier_columns(class)? {
        let value = identifiers
            .iter()
            .find(|(k, _)| *k == column.field)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| AppError::InvalidArgument(format!("missing identifier '{}'", column.field)))?;
        let n = q.push_param(value);
        parts.push(format!(
            "{} = {}",
            quoted(&column.column),
            placeholder(n, column.sql_type.as_deref())
        ));
    }
    Ok(parts.join(" AND "))
}

/// INSERT: columns present in the body; generated identifiers are left to the database.
/// Uses SQL cast (e.g. $n::timestamptz) so string values bind correctly.
pub fn insert(class: &ClassMetadata, body: &Map<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let sets = assignments(&mut q, class, body, class.identifier_generated);
    let table = table_ref(class);
    q.sql = if sets.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, returning_list(class))
    } else {
        let (cols, placeholders): (Vec<String>, Vec<String>) = sets.into_iter().unzip();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            returning_list(class)
        )
    };
    q
}

/// UPDATE by identifiers: SET only what the body carries. An empty change set reads the row back.
pub fn update(
    class: &ClassMetadata,
    identifiers: &[(String, Value)],
    body: &Map<String, Value>,
) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let sets = assignments(&mut q, class, body, true);
    let table = table_ref(class);
    let condition = identifier_condition(&mut q, class, identifiers)?;
    q.sql = if sets.is_empty() {
        format!("SELECT {} FROM {} WHERE {}", returning_list(class), table, condition)
    } else {
        let set_clause = sets
            .iter()
            .map(|(c, p)| format!("{} = {}", c, p))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "UPDATE {} SET {} WHERE {} RETURNING {}",
            table,
            set_clause,
            condition,
            returning_list(class)
        )
    };
    Ok(q)
}

/// DELETE by identifiers.
pub fn delete(class: &ClassMetadata, identifiers: &[(String, Value)]) -> Result<QueryBuf, AppError> {
    let mut q = QueryBuf::new();
    let condition = identifier_condition(&mut q, class, identifiers)?;
    q.sql = format!("DELETE FROM {} WHERE {}", table_ref(class), condition);
    Ok(q)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orm::{AssociationKind, FetchMode, FieldMapping, JoinColumn};
    use serde_json::json;

    fn field(name: &str, column: &str, sql_type: Option<&str>) -> FieldMapping {
        FieldMapping {
            field_name: name.into(),
            column_name: column.into(),
            sql_type: sql_type.map(String::from),
            nullable: true,
        }
    }

    fn dummy() -> ClassMetadata {
        ClassMetadata {
            name: "Dummy".into(),
            table_name: "dummy".into(),
            schema_name: Some("app".into()),
            identifier: vec!["id".into()],
            identifier_generated: true,
            fields: vec![
                field("id", "id", Some("int")),
                field("name", "name", Some("text")),
                field("price", "price", Some("numeric")),
                field("embeddedDummy.dummyName", "embedded_dummy_dummy_name", None),
            ],
            association_mappings: vec![AssociationMapping {
                field_name: "relatedDummy".into(),
                target_entity: "RelatedDummy".into(),
                kind: AssociationKind::ManyToOne,
                fetch: FetchMode::Lazy,
                join_columns: vec![JoinColumn {
                    name: "related_dummy_id".into(),
                    referenced_column: "id".into(),
                    nullable: Some(true),
                }],
                mapped_by: None,
                join_table: None,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn insert_skips_generated_identifier_and_casts() {
        let body = json!({
            "id": 9,
            "name": "foo",
            "embeddedDummy": {"dummyName": "bar"},
            "relatedDummy": "/related_dummies/3"
        });
        let q = insert(&dummy(), body.as_object().unwrap());
        assert!(q.sql.starts_with(
            r#"INSERT INTO "app"."dummy" ("name", "embedded_dummy_dummy_name", "related_dummy_id") VALUES ($1::text, $2, $3) RETURNING "id" AS "o.id", "name" AS "o.name", "price"::text AS "o.price""#
        ));
        assert_eq!(q.params, vec![json!("foo"), json!("bar"), json!(3)]);
    }

    #[test]
    fn insert_without_values_uses_defaults() {
        let q = insert(&dummy(), &Map::new());
        assert!(q.sql.starts_with(r#"INSERT INTO "app"."dummy" DEFAULT VALUES RETURNING"#));
        assert!(q.params.is_empty());
    }

    #[test]
    fn update_sets_only_body_fields() {
        let body = json!({"name": "new", "id": 4});
        let q = update(&dummy(), &[("id".into(), json!("4"))], body.as_object().unwrap()).unwrap();
        assert!(q
            .sql
            .starts_with(r#"UPDATE "app"."dummy" SET "name" = $1::text WHERE "id" = $2::int RETURNING"#));
        assert_eq!(q.params, vec![json!("new"), json!("4")]);
    }

    #[test]
    fn empty_update_reads_back() {
        let q = update(&dummy(), &[("id".into(), json!(4))], &Map::new()).unwrap();
        assert!(q.sql.starts_with("SELECT "));
        assert!(q.sql.ends_with(r#"FROM "app"."dummy" WHERE "id" = $1::int"#));
    }

    #[test]
    fn delete_requires_every_identifier() {
        let q = delete(&dummy(), &[("id".into(), json!(1))]).unwrap();
        assert_eq!(q.sql, r#"DELETE FROM "app"."dummy" WHERE "id" = $1::int"#);
        assert!(matches!(delete(&dummy(), &[]), Err(AppError::InvalidArgument(_))));
    }

    #[test]
    fn relation_references() {
        assert_eq!(reference_value(&json!("/dummies/12")), json!(12));
        assert_eq!(reference_value(&json!({"id": 5, "name": "x"})), json!(5));
        assert_eq!(reference_value(&json!("abc")), json!("abc"));
        assert_eq!(reference_value(&Value::Null), Value::Null);
    }
}
