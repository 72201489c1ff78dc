//! Renders a `QueryBuilder` into PostgreSQL: `alias.field` paths become quoted columns,
//! `:name` parameters become `$n`, association joins become table joins on join columns.

use super::builder::{
    class_columns, column_sql, identifier_columns, qualified_table, quoted, table_ref, QueryBuf, SelectedColumn,
};
use crate::error::AppError;
use crate::orm::{ClassMetadata, ClassMetadataRegistry, InheritanceType, Join, JoinTarget, JoinType, QueryBuilder};
use regex::Regex;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// What the query binds to one alias.
#[derive(Debug)]
pub(crate) struct AliasPlan {
    pub alias: String,
    pub class: Arc<ClassMetadata>,
    /// `(parent alias, association)` for association joins.
    pub parent: Option<(String, String)>,
    pub to_many: bool,
    /// Index of the root this alias hangs off.
    pub root: usize,
    /// Columns read back for hydration; `None` when the alias is only joined.
    pub selected: Option<Vec<SelectedColumn>>,
}

#[derive(Debug)]
pub(crate) struct Plan {
    pub aliases: Vec<AliasPlan>,
}

fn partial_re() -> Option<&'static Regex> {
    static PARTIAL: OnceLock<Option<Regex>> = OnceLock::new();
    PARTIAL
        .get_or_init(|| Regex::new(r"^partial\s+([A-Za-z_][A-Za-z0-9_]*)\.\{([^}]*)\}$").ok())
        .as_ref()
}

fn token_re() -> Option<&'static Regex> {
    static TOKEN: OnceLock<Option<Regex>> = OnceLock::new();
    TOKEN
        .get_or_init(|| {
            Regex::new(
                r"'(?:[^']|'')*'|:([A-Za-z_][A-Za-z0-9_]*)|\b([A-Za-z_][A-Za-z0-9_]*)\.([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)?)",
            )
            .ok()
        })
        .as_ref()
}

impl Plan {
    pub fn build(qb: &QueryBuilder, registry: &ClassMetadataRegistry) -> Result<Plan, AppError> {
        let mut aliases = Vec::new();
        for (i, root) in qb.roots().iter().enumerate() {
            let class = registry
                .get(&root.entity)
                .ok_or_else(|| AppError::ResourceClassNotSupported(root.entity.clone()))?;
            aliases.push(AliasPlan {
                alias: root.alias.clone(),
                class,
                parent: None,
                to_many: false,
                root: i,
                selected: None,
            });
        }
        let mut plan = Plan { aliases };
        for join in qb.joins() {
            let entry = match &join.target {
                JoinTarget::Association { parent_alias, association } => {
                    let parent = plan.require(parent_alias)?;
                    let mapping = parent.class.association(association).ok_or_else(|| {
                        AppError::InvalidArgument(format!("{} has no association '{}'", parent.class.name, association))
                    })?;
                    let class = registry
                        .get(&mapping.target_entity)
                        .ok_or_else(|| AppError::ResourceClassNotSupported(mapping.target_entity.clone()))?;
                    AliasPlan {
                        alias: join.alias.clone(),
                        class,
                        parent: Some((parent_alias.clone(), association.clone())),
                        to_many: mapping.kind.is_to_many(),
                        root: parent.root,
                        selected: None,
                    }
                }
                JoinTarget::Entity(entity) => AliasPlan {
                    alias: join.alias.clone(),
                    class: registry
                        .get(entity)
                        .ok_or_else(|| AppError::ResourceClassNotSupported(entity.clone()))?,
                    parent: None,
                    to_many: true,
                    root: 0,
                    selected: None,
                },
            };
            plan.aliases.push(entry);
        }
        for part in qb.select_parts() {
            plan.select(part.trim())?;
        }
        Ok(plan)
    }

    pub fn get(&self, alias: &str) -> Option<&AliasPlan> {
        self.aliases.iter().find(|a| a.alias == alias)
    }

    fn require(&self, alias: &str) -> Result<&AliasPlan, AppError> {
        self.get(alias)
            .ok_or_else(|| AppError::InvalidArgument(format!("unknown alias '{}'", alias)))
    }

    fn select(&mut self, part: &str) -> Result<(), AppError> {
        let (alias, fields) = match partial_re().and_then(|re| re.captures(part)) {
            Some(c) => {
                let alias = c.get(1).map(|m| m.as_str()).unwrap_or_default();
                let fields: Vec<String> = c
                    .get(2)
                    .map(|m| m.as_str())
                    .unwrap_or_default()
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string)
                    .collect();
                (alias.to_string(), Some(fields))
            }
            None => (part.to_string(), None),
        };
        let entry = self
            .aliases
            .iter_mut()
            .find(|a| a.alias == alias)
            .ok_or_else(|| AppError::InvalidArgument(format!("unsupported select expression '{}'", part)))?;
        let mut columns = identifier_columns(&entry.class)?;
        let available = class_columns(&entry.class);
        match fields {
            None => {
                for c in available {
                    if !columns.iter().any(|existing| existing.field == c.field) {
                        columns.push(c);
                    }
                }
            }
            Some(fields) => {
                for field in fields {
                    if columns.iter().any(|c| c.field == field) {
                        continue;
                    }
                    let column = available.iter().find(|c| c.field == field).cloned().ok_or_else(|| {
                        AppError::InvalidArgument(format!("{} has no field '{}'", entry.class.name, field))
                    })?;
                    columns.push(column);
                }
            }
        }
        entry.selected = Some(columns);
        Ok(())
    }

    pub fn root(&self) -> Option<&AliasPlan> {
        self.aliases.first()
    }

    pub fn selected_children<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a AliasPlan> + 'a {
        self.aliases.iter().filter(move |a| {
            a.selected.is_some() && a.parent.as_ref().map(|(p, _)| p.as_str()) == Some(alias)
        })
    }

    fn has_to_many_join(&self) -> bool {
        self.aliases.iter().any(|a| a.to_many)
    }

    /// Column for `alias.field`: a mapped field or the foreign key of an owning to-one association.
    fn column(&self, alias: &str, field: &str) -> Option<Result<String, AppError>> {
        let entry = self.get(alias)?;
        let found = class_columns(&entry.class)
            .into_iter()
            .find(|c| c.field == field)
            .map(|c| format!("{}.{}", quoted(alias), quoted(&c.column)))
            .ok_or_else(|| AppError::InvalidArgument(format!("{} has no field '{}'", entry.class.name, field)));
        Some(found)
    }
}

/// Binds `:name` parameters from the builder once each, in order of first use.
struct Binder<'a> {
    qb: &'a QueryBuilder,
    numbers: HashMap<String, u32>,
    query: QueryBuf,
}

impl<'a> Binder<'a> {
    fn new(qb: &'a QueryBuilder) -> Self {
        Binder {
            qb,
            numbers: HashMap::new(),
            query: QueryBuf::new(),
        }
    }

    fn bind(&mut self, name: &str) -> Result<u32, AppError> {
        if let Some(n) = self.numbers.get(name) {
            return Ok(*n);
        }
        let value = self
            .qb
            .parameter(name)
            .cloned()
            .ok_or_else(|| AppError::InvalidArgument(format!("parameter '{}' is not set", name)))?;
        let n = self.query.push_param(value);
        self.numbers.insert(name.to_string(), n);
        Ok(n)
    }

    /// Rewrites one DQL expression. String literals are copied untouched.
    fn translate(&mut self, expr: &str, plan: &Plan) -> Result<String, AppError> {
        let Some(re) = token_re() else {
            return Err(AppError::Runtime("expression pattern failed to compile".into()));
        };
        let mut out = String::with_capacity(expr.len());
        let mut last = 0;
        for caps in re.captures_iter(expr) {
            let Some(whole) = caps.get(0) else { continue };
            out.push_str(&expr[last..whole.start()]);
            last = whole.end();
            if let Some(name) = caps.get(1) {
                if expr[..whole.start()].ends_with(':') {
                    out.push_str(whole.as_str());
                } else {
                    out.push_str(&format!("${}", self.bind(name.as_str())?));
                }
                continue;
            }
            if let (Some(alias), Some(field)) = (caps.get(2), caps.get(3)) {
                match plan.column(alias.as_str(), field.as_str()) {
                    Some(column) => out.push_str(&column?),
                    None => out.push_str(whole.as_str()),
                }
                continue;
            }
            out.push_str(whole.as_str());
        }
        out.push_str(&expr[last..]);
        Ok(out)
    }
}

fn keyword(join_type: JoinType) -> &'static str {
    match join_type {
        JoinType::Inner => "INNER JOIN",
        JoinType::Left => "LEFT JOIN",
    }
}

fn pairs(left_alias: &str, left: &str, right_alias: &str, right: &str) -> String {
    format!(
        "{}.{} = {}.{}",
        quoted(left_alias),
        quoted(left),
        quoted(right_alias),
        quoted(right)
    )
}

/// `IN (...)` on the discriminator for single-table subclasses; the hierarchy root needs none.
fn discriminator_condition(alias: &str, class: &ClassMetadata, registry: &ClassMetadataRegistry) -> Option<String> {
    if class.inheritance != InheritanceType::SingleTable || class.parent_classes.is_empty() {
        return None;
    }
    let column = class.discriminator_column.as_deref()?;
    let values: Vec<String> = std::iter::once(class)
        .filter_map(|c| c.discriminator_value.clone())
        .chain(
            class
                .sub_classes
                .iter()
                .filter_map(|s| registry.get(s))
                .filter_map(|c| c.discriminator_value.clone()),
        )
        .map(|v| format!("'{}'", v.replace('\'', "''")))
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(format!("{}.{} IN ({})", quoted(alias), quoted(column), values.join(", ")))
}

fn render_join(
    join: &Join,
    plan: &Plan,
    registry: &ClassMetadataRegistry,
    binder: &mut Binder<'_>,
) -> Result<String, AppError> {
    let kw = keyword(join.join_type);
    let target = plan.require(&join.alias)?;
    let table = table_ref(&target.class);
    let alias = &join.alias;
    let mut extra = Vec::new();
    if let Some(condition) = &join.condition {
        extra.push(format!("({})", binder.translate(condition, plan)?));
    }
    if let Some(d) = discriminator_condition(alias, &target.class, registry) {
        extra.push(d);
    }

    let (parent_alias, association) = match &join.target {
        JoinTarget::Entity(_) => {
            let on = if extra.is_empty() { "TRUE".to_string() } else { extra.join(" AND ") };
            return Ok(format!("{} {} AS {} ON {}", kw, table, quoted(alias), on));
        }
        JoinTarget::Association { parent_alias, association } => (parent_alias, association),
    };
    let parent = plan.require(parent_alias)?;
    let missing = || AppError::InvalidArgument(format!("association '{}' has no join columns", association));
    let mapping = parent.class.association(association).ok_or_else(missing)?;

    // Join table: (columns pointing at the left side, columns pointing at the right side).
    let (owning, left_is_owner) = match &mapping.mapped_by {
        Some(owner_field) => (target.class.association(owner_field).ok_or_else(missing)?, false),
        None => (mapping, true),
    };

    let mut sql = String::new();
    let mut on = Vec::new();
    if let Some(jt) = &owning.join_table {
        let (to_left, to_right) = if left_is_owner {
            (&jt.join_columns, &jt.inverse_join_columns)
        } else {
            (&jt.inverse_join_columns, &jt.join_columns)
        };
        if to_left.is_empty() || to_right.is_empty() {
            return Err(missing());
        }
        let jt_alias = format!("{}_jt", alias);
        let jt_table = match &jt.schema {
            Some(schema) => qualified_table(schema, &jt.name),
            None => quoted(&jt.name),
        };
        let jt_on: Vec<String> = to_left
            .iter()
            .map(|c| pairs(&jt_alias, &c.name, parent_alias, &c.referenced_column))
            .collect();
        sql.push_str(&format!("{} {} AS {} ON {} ", kw, jt_table, quoted(&jt_alias), jt_on.join(" AND ")));
        on.extend(
            to_right
                .iter()
                .map(|c| pairs(alias, &c.referenced_column, &jt_alias, &c.name)),
        );
    } else if owning.join_columns.is_empty() {
        return Err(missing());
    } else if left_is_owner {
        on.extend(
            owning
                .join_columns
                .iter()
                .map(|c| pairs(alias, &c.referenced_column, parent_alias, &c.name)),
        );
    } else {
        on.extend(
            owning
                .join_columns
                .iter()
                .map(|c| pairs(alias, &c.name, parent_alias, &c.referenced_column)),
        );
    }
    on.extend(extra);
    sql.push_str(&format!("{} {} AS {} ON {}", kw, table, quoted(alias), on.join(" AND ")));
    Ok(sql)
}

/// FROM clause; each root carries the joins hanging off it so ON clauses only see their own root.
fn from_clause(
    qb: &QueryBuilder,
    plan: &Plan,
    registry: &ClassMetadataRegistry,
    binder: &mut Binder<'_>,
) -> Result<String, AppError> {
    let mut items = Vec::new();
    for (i, root) in plan.aliases.iter().filter(|a| a.parent.is_none() && qb.join_by_alias(&a.alias).is_none()).enumerate() {
        let mut item = format!("{} AS {}", table_ref(&root.class), quoted(&root.alias));
        for join in qb.joins() {
            if plan.get(&join.alias).map(|a| a.root) == Some(i) {
                item.push(' ');
                item.push_str(&render_join(join, plan, registry, binder)?);
            }
        }
        items.push(item);
    }
    Ok(items.join(", "))
}

/// WHERE conditions including single-table discriminators of the roots.
fn where_conditions(qb: &QueryBuilder, plan: &Plan, registry: &ClassMetadataRegistry, binder: &mut Binder<'_>) -> Result<Vec<String>, AppError> {
    let mut out = Vec::new();
    for root in qb.roots() {
        if let Some(entry) = plan.get(&root.alias) {
            out.extend(discriminator_condition(&root.alias, &entry.class, registry));
        }
    }
    for part in qb.where_parts() {
        out.push(format!("({})", binder.translate(part, plan)?));
    }
    Ok(out)
}

fn root_identifier_sql(plan: &Plan) -> Result<Vec<String>, AppError> {
    let root = plan
        .root()
        .ok_or_else(|| AppError::InvalidArgument("query has no root".into()))?;
    Ok(identifier_columns(&root.class)?
        .iter()
        .map(|c| format!("{}.{}", quoted(&root.alias), quoted(&c.column)))
        .collect())
}

fn grouping(qb: &QueryBuilder, plan: &Plan, binder: &mut Binder<'_>) -> Result<(Vec<String>, Vec<String>), AppError> {
    let group_by = qb
        .group_by_parts()
        .iter()
        .map(|g| binder.translate(g, plan))
        .collect::<Result<Vec<_>, _>>()?;
    let having = qb
        .having_parts()
        .iter()
        .map(|h| binder.translate(h, plan).map(|h| format!("({})", h)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((group_by, having))
}

fn tail(
    sql: &mut String,
    conditions: &[String],
    group_by: &[String],
    having: &[String],
    order_by: &[String],
) {
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
    if !group_by.is_empty() {
        sql.push_str(" GROUP BY ");
        sql.push_str(&group_by.join(", "));
    }
    if !having.is_empty() {
        sql.push_str(" HAVING ");
        sql.push_str(&having.join(" AND "));
    }
    if !order_by.is_empty() {
        sql.push_str(" ORDER BY ");
        sql.push_str(&order_by.join(", "));
    }
}

fn limit(sql: &mut String, qb: &QueryBuilder) {
    if let Some(max) = qb.max_results() {
        sql.push_str(&format!(" LIMIT {}", max));
    }
    if let Some(first) = qb.first_result() {
        sql.push_str(&format!(" OFFSET {}", first));
    }
}

fn row_value(columns: &[String]) -> String {
    match columns {
        [single] => single.clone(),
        many => format!("({})", many.join(", ")),
    }
}

/// SELECT for a built query. With `fetch_join_collection`, a limited query that joins
/// collections pages over distinct root identifiers instead of joined rows.
pub fn render_select(
    qb: &QueryBuilder,
    registry: &ClassMetadataRegistry,
    fetch_join_collection: bool,
) -> Result<QueryBuf, AppError> {
    let plan = Plan::build(qb, registry)?;
    let mut binder = Binder::new(qb);

    let mut columns = Vec::new();
    for entry in &plan.aliases {
        let Some(selected) = &entry.selected else { continue };
        for c in selected {
            columns.push(format!(
                "{} AS {}",
                column_sql(Some(&entry.alias), &c.column, c.sql_type.as_deref()),
                quoted(&format!("{}.{}", entry.alias, c.field))
            ));
        }
    }
    if columns.is_empty() {
        return Err(AppError::InvalidArgument("query selects nothing".into()));
    }

    let from = from_clause(qb, &plan, registry, &mut binder)?;
    let mut conditions = where_conditions(qb, &plan, registry, &mut binder)?;
    let (group_by, having) = grouping(qb, &plan, &mut binder)?;
    let mut order_by = Vec::new();
    let mut aggregated_order = Vec::new();
    for o in qb.order_by_parts() {
        let expr = binder.translate(&o.expr, &plan)?;
        let direction = if o.direction.eq_ignore_ascii_case("DESC") { "DESC" } else { "ASC" };
        let aggregate = if direction == "DESC" { "MAX" } else { "MIN" };
        aggregated_order.push(format!("{}({}) {}", aggregate, expr, direction));
        order_by.push(format!("{} {}", expr, direction));
    }

    let limited = qb.max_results().is_some() || qb.first_result().is_some();
    let page_by_identifier = limited && fetch_join_collection && plan.has_to_many_join();
    if page_by_identifier {
        let ids = root_identifier_sql(&plan)?;
        let mut sub = format!("SELECT {} FROM {}", ids.join(", "), from);
        let mut sub_group = ids.clone();
        sub_group.extend(group_by.iter().filter(|g| !ids.contains(g)).cloned());
        tail(&mut sub, &conditions, &sub_group, &having, &aggregated_order);
        limit(&mut sub, qb);
        conditions.push(format!("{} IN ({})", row_value(&ids), sub));
    }

    let mut sql = String::from("SELECT ");
    if qb.is_distinct() {
        sql.push_str("DISTINCT ");
    }
    sql.push_str(&columns.join(", "));
    sql.push_str(" FROM ");
    sql.push_str(&from);
    tail(&mut sql, &conditions, &group_by, &having, &order_by);
    if !page_by_identifier {
        limit(&mut sql, qb);
    }

    let mut q = binder.query;
    q.sql = sql;
    Ok(q)
}

/// COUNT of distinct root rows, ignoring ordering and limits. `use_output_walkers` wraps a
/// distinct sub-select instead of counting distinct identifiers in place.
pub fn render_count(
    qb: &QueryBuilder,
    registry: &ClassMetadataRegistry,
    use_output_walkers: bool,
) -> Result<QueryBuf, AppError> {
    let plan = Plan::build(qb, registry)?;
    let mut binder = Binder::new(qb);
    let from = from_clause(qb, &plan, registry, &mut binder)?;
    let conditions = where_conditions(qb, &plan, registry, &mut binder)?;
    let (group_by, having) = grouping(qb, &plan, &mut binder)?;
    let ids = root_identifier_sql(&plan)?;

    let sql = if use_output_walkers || ids.len() > 1 || !group_by.is_empty() {
        let mut inner = format!("SELECT DISTINCT {} FROM {}", ids.join(", "), from);
        tail(&mut inner, &conditions, &group_by, &having, &[]);
        format!("SELECT COUNT(*) FROM ({}) AS {}", inner, quoted("count_source"))
    } else {
        let mut outer = format!("SELECT COUNT(DISTINCT {}) FROM {}", ids.join(", "), from);
        tail(&mut outer, &conditions, &[], &having, &[]);
        outer
    };
    let mut q = binder.query;
    q.sql = sql;
    Ok(q)
}
