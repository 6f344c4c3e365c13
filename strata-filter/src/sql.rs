//! SQL sink: filter tree → WHERE fragment, plus SELECT/COUNT assembly.
//!
//! Text columns filter through `tsquery` full-text predicates; keyword and
//! numeric columns compare with `=`, `>`, `<`. Field names are snake_cased
//! through the schema's precomputed column list; a nested field addresses
//! its outer column only.

use strata_core::error::{DriverError, DriverResult};
use strata_core::filter::Filter;
use strata_core::query::{SearchQuery, SortOrder};
use strata_core::schema::SchemaInfo;
use strata_core::shape::{ColumnCodec, ColumnDef};

/// Resolve a filter field name to its column. Nested names (`meta.note`)
/// address the outer column.
fn column<'a>(schema: &'a SchemaInfo, field: &str) -> DriverResult<&'a ColumnDef> {
    let outer = field.split('.').next().unwrap_or(field);
    schema
        .database
        .columns
        .iter()
        .find(|col| col.field == outer)
        .ok_or_else(|| {
            DriverError::Lookup(format!("unknown filter field '{field}' for {}", schema.sref))
        })
}

fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

/// Render a comparison literal for a column: bare for numeric/boolean
/// values, quoted otherwise.
fn literal(col: &ColumnDef, raw: &str) -> String {
    let cleaned = raw.trim_matches(|c| c == '"' || c == '\'');
    if col.codec == ColumnCodec::Identity {
        let parses = cleaned.parse::<f64>().is_ok() || cleaned.parse::<bool>().is_ok();
        if parses {
            return cleaned.to_string();
        }
    }
    format!("'{}'", escape(cleaned))
}

fn term_predicate(schema: &SchemaInfo, field: &str, value: &str) -> DriverResult<String> {
    let col = column(schema, field)?;
    if col.text_search {
        let tokens: Vec<String> = value
            .trim_matches(|c| c == '"' || c == '\'')
            .split_whitespace()
            .map(|token| escape(token.trim_matches('*')))
            .filter(|token| !token.is_empty())
            .collect();
        if tokens.is_empty() {
            return Err(DriverError::Lookup(format!("empty term for field '{field}'")));
        }
        return Ok(format!(
            "to_tsvector({}) @@ to_tsquery('{}')",
            col.name,
            tokens.join(" | ")
        ));
    }
    Ok(format!("{} = {}", col.name, literal(col, value)))
}

fn comparison(
    schema: &SchemaInfo,
    field: &str,
    op: &str,
    value: &str,
) -> DriverResult<String> {
    let col = column(schema, field)?;
    if col.text_search {
        return Err(DriverError::Lookup(format!(
            "range comparison is not supported on text field '{field}'"
        )));
    }
    Ok(format!("{} {} {}", col.name, op, literal(col, value)))
}

fn joined(
    schema: &SchemaInfo,
    items: &[Filter],
    connector: &str,
    in_field: Option<&str>,
) -> DriverResult<String> {
    if items.is_empty() {
        return Err(DriverError::Lookup("empty filter group".into()));
    }
    let parts: Vec<String> = items
        .iter()
        .map(|item| match in_field {
            Some(field) => translate_in_field(schema, field, item),
            None => where_clause(item, schema),
        })
        .collect::<DriverResult<_>>()?;
    Ok(format!("({})", parts.join(connector)))
}

fn translate_in_field(schema: &SchemaInfo, field: &str, node: &Filter) -> DriverResult<String> {
    match node {
        Filter::Term(value) => term_predicate(schema, field, value),
        other => where_clause(other, schema),
    }
}

/// Translate a filter tree into a SQL WHERE fragment.
pub fn where_clause(filter: &Filter, schema: &SchemaInfo) -> DriverResult<String> {
    match filter {
        Filter::Term(_) => Err(DriverError::Lookup(
            "a bare term cannot be translated for the database tier".into(),
        )),
        Filter::SearchField { field, value } => term_predicate(schema, field, value),
        Filter::Group(items) => joined(schema, items, " AND ", None),
        Filter::FieldGroup { field, items } => joined(schema, items, " OR ", Some(field)),
        Filter::Range {
            field,
            low,
            high,
            include_low,
            include_high,
        } => {
            let low_op = if *include_low { ">=" } else { ">" };
            let high_op = if *include_high { "<=" } else { "<" };
            Ok(format!(
                "({} AND {})",
                comparison(schema, field, low_op, low)?,
                comparison(schema, field, high_op, high)?
            ))
        }
        Filter::From { field, value, inclusive } => {
            comparison(schema, field, if *inclusive { ">=" } else { ">" }, value)
        }
        Filter::To { field, value, inclusive } => {
            comparison(schema, field, if *inclusive { "<=" } else { "<" }, value)
        }
        Filter::And(items) => joined(schema, items, " AND ", None),
        Filter::Or(items) => joined(schema, items, " OR ", None),
        Filter::Not(inner) => Ok(format!("NOT ({})", where_clause(inner, schema)?)),
        Filter::Unknown { op, items } => match op.trim().to_uppercase().as_str() {
            "AND" | "&" => joined(schema, items, " AND ", None),
            "OR" | "|" => joined(schema, items, " OR ", None),
            other => Err(DriverError::Lookup(format!(
                "unsupported filter operator '{other}'"
            ))),
        },
    }
}

fn projection(schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<String> {
    match &query.fields {
        None => Ok("*".to_string()),
        Some(fields) => {
            let mut cols = Vec::with_capacity(fields.len());
            for field in fields {
                let col = column(schema, field)?;
                if !cols.contains(&col.name) {
                    cols.push(col.name.clone());
                }
            }
            Ok(cols.join(", "))
        }
    }
}

fn suffix(schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<String> {
    let mut sql = String::new();
    if let Some(order_by) = &query.order_by {
        let col = column(schema, order_by)?;
        let direction = match query.order.unwrap_or(SortOrder::Asc) {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {} {}", col.name, direction));
    }
    if let Some(size) = query.size {
        sql.push_str(&format!(" LIMIT {size}"));
    }
    if let Some(skip) = query.skip {
        sql.push_str(&format!(" OFFSET {skip}"));
    }
    Ok(sql)
}

fn live_predicate(filter_sql: Option<String>) -> String {
    match filter_sql {
        Some(clause) => format!(" WHERE deleted = false AND {clause}"),
        None => " WHERE deleted = false".to_string(),
    }
}

/// Assemble the full SELECT statement for a query against live rows.
pub fn select_sql(schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<String> {
    let clause = query
        .filter
        .as_ref()
        .map(|filter| where_clause(filter, schema))
        .transpose()?;
    Ok(format!(
        "SELECT {} FROM {}{}{}",
        projection(schema, query)?,
        schema.dref,
        live_predicate(clause),
        suffix(schema, query)?
    ))
}

/// Assemble the COUNT statement for a query against live rows.
pub fn count_sql(schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<String> {
    let clause = query
        .filter
        .as_ref()
        .map(|filter| where_clause(filter, schema))
        .transpose()?;
    Ok(format!(
        "SELECT COUNT(*) FROM {}{}",
        schema.dref,
        live_predicate(clause)
    ))
}
