//! Naive filter evaluation over JSON documents, enough for the in-memory
//! drivers to honor the queries the tests issue.

use serde_json::Value;

use strata_core::filter::Filter;
use strata_core::query::{SearchQuery, SortOrder};

fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare(field_value: &Value, bound: &str) -> Option<std::cmp::Ordering> {
    if let (Some(lhs), Ok(rhs)) = (field_value.as_f64(), bound.parse::<f64>()) {
        return lhs.partial_cmp(&rhs);
    }
    Some(as_text(field_value).as_str().cmp(bound))
}

pub fn matches(filter: &Filter, doc: &Value) -> bool {
    match filter {
        Filter::Term(term) => doc
            .as_object()
            .is_some_and(|map| map.values().any(|v| matches!(v, Value::String(s) if s.contains(term)))),
        Filter::SearchField { field, value } => {
            lookup(doc, field).is_some_and(|found| as_text(found) == *value)
        }
        Filter::Group(items) | Filter::And(items) => items.iter().all(|f| matches(f, doc)),
        Filter::Or(items) => items.iter().any(|f| matches(f, doc)),
        Filter::Not(inner) => !matches(inner, doc),
        Filter::FieldGroup { field, items } => items.iter().any(|item| match item {
            Filter::Term(term) => {
                lookup(doc, field).is_some_and(|found| as_text(found) == *term)
            }
            other => matches(other, doc),
        }),
        Filter::Range { field, low, high, include_low, include_high } => {
            let Some(found) = lookup(doc, field) else { return false };
            let low_ok = match compare(found, low) {
                Some(std::cmp::Ordering::Greater) => true,
                Some(std::cmp::Ordering::Equal) => *include_low,
                _ => false,
            };
            let high_ok = match compare(found, high) {
                Some(std::cmp::Ordering::Less) => true,
                Some(std::cmp::Ordering::Equal) => *include_high,
                _ => false,
            };
            low_ok && high_ok
        }
        Filter::From { field, value, inclusive } => lookup(doc, field)
            .and_then(|found| compare(found, value))
            .is_some_and(|ord| {
                ord == std::cmp::Ordering::Greater || (*inclusive && ord == std::cmp::Ordering::Equal)
            }),
        Filter::To { field, value, inclusive } => lookup(doc, field)
            .and_then(|found| compare(found, value))
            .is_some_and(|ord| {
                ord == std::cmp::Ordering::Less || (*inclusive && ord == std::cmp::Ordering::Equal)
            }),
        Filter::Unknown { op, items } => match op.trim().to_uppercase().as_str() {
            "AND" | "&" => items.iter().all(|f| matches(f, doc)),
            "OR" | "|" => items.iter().any(|f| matches(f, doc)),
            _ => false,
        },
    }
}

/// Apply a full query (filter, order, paging, projection) to a document
/// set. Soft-deleted documents must be excluded by the caller beforehand.
pub fn apply(query: &SearchQuery, mut docs: Vec<Value>) -> Vec<Value> {
    if let Some(filter) = &query.filter {
        docs.retain(|doc| matches(filter, doc));
    }
    if let Some(order_by) = &query.order_by {
        docs.sort_by(|a, b| {
            let left = lookup(a, order_by).map(as_text).unwrap_or_default();
            let right = lookup(b, order_by).map(as_text).unwrap_or_default();
            left.cmp(&right)
        });
        if query.order == Some(SortOrder::Desc) {
            docs.reverse();
        }
    }
    let skip = query.skip.unwrap_or(0) as usize;
    if skip > 0 {
        docs = docs.into_iter().skip(skip).collect();
    }
    if let Some(size) = query.size {
        docs.truncate(size as usize);
    }
    if let Some(fields) = &query.fields {
        docs = docs
            .into_iter()
            .map(|doc| match doc {
                Value::Object(map) => Value::Object(
                    map.into_iter()
                        .filter(|(key, _)| fields.iter().any(|f| f == key))
                        .collect(),
                ),
                other => other,
            })
            .collect();
    }
    docs
}
