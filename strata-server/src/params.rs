//! Reserved `$`-prefixed query parameters and their conversion into a
//! [`SearchQuery`].

use std::sync::Arc;

use strata_core::error::ApiError;
use strata_core::filter::{Filter, FilterParser};
use strata_core::query::{SearchQuery, SortOrder};

/// Parsed request query parameters.
///
/// Reserved parameters are `$`-prefixed; anything else becomes an equality
/// filter AND-combined with `$filter`.
#[derive(Debug, Default)]
pub struct SearchParams {
    pub fields: Vec<String>,
    pub filter: Option<String>,
    pub order_by: Option<String>,
    pub order: Option<SortOrder>,
    pub size: Option<u64>,
    pub skip: Option<u64>,
    pub archive: bool,
    pub force: bool,
    pub extra: Vec<(String, String)>,
}

/// `$archive` / `$force` accept `true`, `false`, or an empty value (which
/// reads as `true`).
fn flag(name: &str, value: &str) -> Result<bool, ApiError> {
    match value {
        "" | "true" => Ok(true),
        "false" => Ok(false),
        other => Err(ApiError::BadRequest(format!(
            "invalid value '{other}' for {name}"
        ))),
    }
}

fn number(name: &str, value: &str) -> Result<u64, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid value '{value}' for {name}")))
}

impl SearchParams {
    pub fn parse(raw: Option<&str>) -> Result<Self, ApiError> {
        let mut params = SearchParams::default();
        for (key, value) in form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
            match key.as_ref() {
                "$f" => params.fields.push(value.into_owned()),
                "$filter" => params.filter = Some(value.into_owned()),
                "$orderby" => params.order_by = Some(value.into_owned()),
                "$order" => {
                    params.order =
                        Some(value.parse::<SortOrder>().map_err(ApiError::BadRequest)?)
                }
                "$size" => params.size = Some(number("$size", &value)?),
                "$skip" => params.skip = Some(number("$skip", &value)?),
                "$archive" => params.archive = flag("$archive", &value)?,
                "$force" => params.force = flag("$force", &value)?,
                reserved if reserved.starts_with('$') => {
                    return Err(ApiError::BadRequest(format!(
                        "unknown reserved parameter '{reserved}'"
                    )))
                }
                _ => params.extra.push((key.into_owned(), value.into_owned())),
            }
        }
        Ok(params)
    }

    /// Build the driver-facing query. `$filter` needs a wired parser; the
    /// free-form equality parameters do not.
    pub fn to_query(&self, parser: Option<&Arc<dyn FilterParser>>) -> Result<SearchQuery, ApiError> {
        let mut clauses = Vec::new();
        if let Some(expression) = &self.filter {
            let parser = parser.ok_or_else(|| {
                ApiError::NotImplemented("no filter parser is wired for $filter".into())
            })?;
            clauses.push(parser.parse(expression).map_err(ApiError::from)?);
        }
        for (field, value) in &self.extra {
            clauses.push(Filter::eq(field.clone(), value.clone()));
        }

        let mut query = SearchQuery {
            filter: Filter::all(clauses),
            order_by: self.order_by.clone(),
            order: self.order,
            size: self.size,
            skip: self.skip,
            ..SearchQuery::default()
        };
        if !self.fields.is_empty() {
            query = query.with_fields(self.fields.clone());
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_test::TermParser;

    fn parser() -> Arc<dyn FilterParser> {
        Arc::new(TermParser)
    }

    #[test]
    fn test_parse_reserved_parameters() {
        let params = SearchParams::parse(Some(
            "$f=title&$f=port&$filter=org%3Aacme&$orderby=tstamp&$order=desc&$size=10&$skip=5&$archive=true",
        ))
        .unwrap();
        assert_eq!(params.fields, vec!["title", "port"]);
        assert_eq!(params.filter.as_deref(), Some("org:acme"));
        assert_eq!(params.order_by.as_deref(), Some("tstamp"));
        assert_eq!(params.order, Some(SortOrder::Desc));
        assert_eq!(params.size, Some(10));
        assert_eq!(params.skip, Some(5));
        assert!(params.archive);
    }

    #[test]
    fn test_empty_flag_means_true() {
        let params = SearchParams::parse(Some("$archive=&$force=")).unwrap();
        assert!(params.archive);
        assert!(params.force);
    }

    #[test]
    fn test_bad_flag_rejected() {
        assert!(SearchParams::parse(Some("$archive=maybe")).is_err());
        assert!(SearchParams::parse(Some("$size=ten")).is_err());
        assert!(SearchParams::parse(Some("$order=sideways")).is_err());
    }

    #[test]
    fn test_unknown_reserved_parameter_rejected() {
        assert!(SearchParams::parse(Some("$unknown=1")).is_err());
    }

    #[test]
    fn test_free_parameters_become_equality_clauses() {
        let params = SearchParams::parse(Some("hostname=gw-01&port=22")).unwrap();
        let query = params.to_query(None).unwrap();
        assert_eq!(
            query.filter,
            Some(Filter::And(vec![
                Filter::eq("hostname", "gw-01"),
                Filter::eq("port", "22"),
            ]))
        );
    }

    #[test]
    fn test_filter_and_free_parameters_combine() {
        let params = SearchParams::parse(Some("$filter=org%3Aacme&port=22")).unwrap();
        let parser = parser();
        let query = params.to_query(Some(&parser)).unwrap();
        assert_eq!(
            query.filter,
            Some(Filter::And(vec![
                Filter::eq("org", "acme"),
                Filter::eq("port", "22"),
            ]))
        );
    }

    #[test]
    fn test_filter_without_parser_is_not_implemented() {
        let params = SearchParams::parse(Some("$filter=org%3Aacme")).unwrap();
        let err = params.to_query(None).unwrap_err();
        assert!(matches!(err, ApiError::NotImplemented(_)));
    }

    #[test]
    fn test_projection_flows_into_query() {
        let params = SearchParams::parse(Some("$f=title")).unwrap();
        let query = params.to_query(None).unwrap();
        assert!(query.is_projected());
        assert!(query.fields.unwrap().contains(&"id".to_string()));
    }
}
