//! Search sink: filter tree → structured bool-query JSON.

use serde_json::{json, Value};

use strata_core::error::{DriverError, DriverResult};
use strata_core::filter::Filter;
use strata_core::query::{SearchQuery, SortOrder};

/// Strip quoting and wildcard noise from a raw term, then split it into
/// tokens.
fn clean_tokens(value: &str) -> Vec<String> {
    value
        .trim_matches(|c| c == '"' || c == '\'')
        .split_whitespace()
        .map(|token| token.trim_matches('*').to_string())
        .filter(|token| !token.is_empty())
        .collect()
}

fn field_match(field: &str, value: &str) -> DriverResult<Value> {
    let tokens = clean_tokens(value);
    match tokens.len() {
        0 => Err(DriverError::Lookup(format!(
            "empty term for field '{field}'"
        ))),
        1 => Ok(json!({ "match": { field: tokens[0] } })),
        _ => {
            let should: Vec<Value> = tokens
                .iter()
                .map(|token| json!({ "match": { field: token } }))
                .collect();
            Ok(json!({ "bool": { "should": should } }))
        }
    }
}

fn range_bound(field: &str, key: &str, value: &str) -> Value {
    json!({ "range": { field: { key: value } } })
}

/// Resolve an `Unknown` operator literal into AND/OR.
fn unknown_op(op: &str) -> DriverResult<bool> {
    match op.trim().to_uppercase().as_str() {
        "AND" | "&" => Ok(true),
        "OR" | "|" => Ok(false),
        other => Err(DriverError::Lookup(format!(
            "unsupported filter operator '{other}'"
        ))),
    }
}

/// Translate a filter node bound to an enclosing field (the members of a
/// field group).
fn translate_in_field(field: &str, node: &Filter) -> DriverResult<Value> {
    match node {
        Filter::Term(value) => field_match(field, value),
        Filter::SearchField { field: inner, value } => field_match(inner, value),
        Filter::Group(items) | Filter::And(items) => {
            let must = translate_members(items, |item| translate_in_field(field, item))?;
            Ok(json!({ "bool": { "must": must } }))
        }
        Filter::Or(items) => {
            let should = translate_members(items, |item| translate_in_field(field, item))?;
            Ok(json!({ "bool": { "should": should } }))
        }
        Filter::Not(inner) => {
            Ok(json!({ "bool": { "must_not": [translate_in_field(field, inner)?] } }))
        }
        other => translate(other),
    }
}

fn translate_members<F>(items: &[Filter], mut translate_one: F) -> DriverResult<Vec<Value>>
where
    F: FnMut(&Filter) -> DriverResult<Value>,
{
    items.iter().map(|item| translate_one(item)).collect()
}

/// Translate a filter tree into the search backend's structured query.
pub fn translate(filter: &Filter) -> DriverResult<Value> {
    match filter {
        Filter::Term(value) => {
            let tokens = clean_tokens(value);
            if tokens.is_empty() {
                return Err(DriverError::Lookup("empty search term".into()));
            }
            Ok(json!({ "query_string": { "query": tokens.join(" OR ") } }))
        }
        Filter::SearchField { field, value } => field_match(field, value),
        Filter::Group(items) => {
            let must = translate_members(items, translate)?;
            Ok(json!({ "bool": { "must": must } }))
        }
        Filter::FieldGroup { field, items } => {
            let should = translate_members(items, |item| translate_in_field(field, item))?;
            Ok(json!({ "bool": { "should": should } }))
        }
        Filter::Range {
            field,
            low,
            high,
            include_low,
            include_high,
        } => {
            let low_key = if *include_low { "gte" } else { "gt" };
            let high_key = if *include_high { "lte" } else { "lt" };
            Ok(json!({ "range": { field.as_str(): { low_key: low, high_key: high } } }))
        }
        Filter::From { field, value, inclusive } => {
            Ok(range_bound(field, if *inclusive { "gte" } else { "gt" }, value))
        }
        Filter::To { field, value, inclusive } => {
            Ok(range_bound(field, if *inclusive { "lte" } else { "lt" }, value))
        }
        Filter::And(items) => {
            let must = translate_members(items, translate)?;
            Ok(json!({ "bool": { "must": must } }))
        }
        Filter::Or(items) => {
            let should = translate_members(items, translate)?;
            Ok(json!({ "bool": { "should": should } }))
        }
        Filter::Not(inner) => Ok(json!({ "bool": { "must_not": [translate(inner)?] } })),
        Filter::Unknown { op, items } => {
            let conjunctive = unknown_op(op)?;
            let members = translate_members(items, translate)?;
            if conjunctive {
                Ok(json!({ "bool": { "must": members } }))
            } else {
                Ok(json!({ "bool": { "should": members } }))
            }
        }
    }
}

/// Assemble the full request body for a search query: query, sort, paging,
/// and source projection.
pub fn query_body(query: &SearchQuery) -> DriverResult<Value> {
    let mut body = serde_json::Map::new();
    let q = match &query.filter {
        Some(filter) => translate(filter)?,
        None => json!({ "match_all": {} }),
    };
    body.insert("query".to_string(), q);

    if let Some(order_by) = &query.order_by {
        let order = query.order.unwrap_or(SortOrder::Asc);
        body.insert(
            "sort".to_string(),
            json!([{ order_by.as_str(): { "order": order.as_str() } }]),
        );
    }
    if let Some(skip) = query.skip {
        body.insert("from".to_string(), json!(skip));
    }
    if let Some(size) = query.size {
        body.insert("size".to_string(), json!(size));
    }
    if let Some(fields) = &query.fields {
        body.insert("_source".to_string(), json!(fields));
    }
    Ok(Value::Object(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_single_term() {
        let q = translate(&Filter::eq("hostname", "gw-01")).unwrap();
        assert_eq!(q, json!({ "match": { "hostname": "gw-01" } }));
    }

    #[test]
    fn test_field_term_list_becomes_or() {
        let q = translate(&Filter::eq("title", "\"alpha beta\"")).unwrap();
        assert_eq!(
            q,
            json!({ "bool": { "should": [
                { "match": { "title": "alpha" } },
                { "match": { "title": "beta" } }
            ] } })
        );
    }

    #[test]
    fn test_range_bounds() {
        let q = translate(&Filter::Range {
            field: "port".into(),
            low: "10".into(),
            high: "20".into(),
            include_low: true,
            include_high: true,
        })
        .unwrap();
        assert_eq!(q, json!({ "range": { "port": { "gte": "10", "lte": "20" } } }));
    }

    #[test]
    fn test_and_or_not() {
        let q = translate(&Filter::And(vec![
            Filter::eq("a", "1"),
            Filter::Not(Box::new(Filter::eq("b", "2"))),
        ]))
        .unwrap();
        assert_eq!(q["bool"]["must"][0], json!({ "match": { "a": "1" } }));
        assert_eq!(
            q["bool"]["must"][1],
            json!({ "bool": { "must_not": [ { "match": { "b": "2" } } ] } })
        );

        let q = translate(&Filter::Or(vec![Filter::eq("a", "1"), Filter::eq("b", "2")])).unwrap();
        assert!(q["bool"]["should"].is_array());
    }

    #[test]
    fn test_field_group_binds_terms() {
        let q = translate(&Filter::FieldGroup {
            field: "labels".into(),
            items: vec![Filter::Term("edge".into()), Filter::Term("core".into())],
        })
        .unwrap();
        assert_eq!(
            q,
            json!({ "bool": { "should": [
                { "match": { "labels": "edge" } },
                { "match": { "labels": "core" } }
            ] } })
        );
    }

    #[test]
    fn test_unknown_op_fallback() {
        let and = translate(&Filter::Unknown {
            op: "&".into(),
            items: vec![Filter::eq("a", "1"), Filter::eq("b", "2")],
        })
        .unwrap();
        assert!(and["bool"]["must"].is_array());

        let or = translate(&Filter::Unknown {
            op: "or".into(),
            items: vec![Filter::eq("a", "1")],
        })
        .unwrap();
        assert!(or["bool"]["should"].is_array());
    }

    #[test]
    fn test_unknown_op_rejected() {
        let err = translate(&Filter::Unknown {
            op: "XOR".into(),
            items: vec![],
        })
        .unwrap_err();
        assert!(err.is_lookup());
    }

    #[test]
    fn test_query_body_assembly() {
        let query = SearchQuery {
            filter: Some(Filter::eq("org", "acme")),
            order_by: Some("tstamp".into()),
            order: Some(SortOrder::Desc),
            size: Some(10),
            skip: Some(20),
            ..SearchQuery::default()
        }
        .with_fields(vec!["hostname".into()]);

        let body = query_body(&query).unwrap();
        assert_eq!(body["query"], json!({ "match": { "org": "acme" } }));
        assert_eq!(body["sort"][0]["tstamp"]["order"], "desc");
        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert!(body["_source"].as_array().unwrap().iter().any(|f| f == "id"));
    }

    #[test]
    fn test_query_body_without_filter_matches_all() {
        let body = query_body(&SearchQuery::default()).unwrap();
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert!(body.get("sort").is_none());
    }
}
