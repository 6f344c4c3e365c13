use strata_core::error::{DriverError, DriverResult};
use strata_core::filter::{Filter, FilterParser};

/// Minimal filter parser for tests: `field:value` clauses joined by
/// ` AND `, a bare word as a term. Real deployments wire a full parser.
#[derive(Default)]
pub struct TermParser;

impl TermParser {
    fn clause(input: &str) -> DriverResult<Filter> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(DriverError::Lookup("empty filter clause".into()));
        }
        match trimmed.split_once(':') {
            Some((field, value)) => {
                if field.is_empty() || value.is_empty() {
                    return Err(DriverError::Lookup(format!("bad clause '{trimmed}'")));
                }
                Ok(Filter::eq(field.trim(), value.trim()))
            }
            None => Ok(Filter::Term(trimmed.to_string())),
        }
    }
}

impl FilterParser for TermParser {
    fn parse(&self, input: &str) -> DriverResult<Filter> {
        let clauses: Vec<Filter> = input
            .split(" AND ")
            .map(TermParser::clause)
            .collect::<DriverResult<_>>()?;
        Filter::all(clauses).ok_or_else(|| DriverError::Lookup("empty filter".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_clause() {
        let parser = TermParser;
        assert_eq!(parser.parse("org:acme").unwrap(), Filter::eq("org", "acme"));
    }

    #[test]
    fn test_joined_clauses() {
        let parser = TermParser;
        let filter = parser.parse("org:acme AND port:22").unwrap();
        assert_eq!(
            filter,
            Filter::And(vec![Filter::eq("org", "acme"), Filter::eq("port", "22")])
        );
    }

    #[test]
    fn test_bare_term() {
        let parser = TermParser;
        assert_eq!(parser.parse("edge").unwrap(), Filter::Term("edge".into()));
    }

    #[test]
    fn test_bad_clause_rejected() {
        let parser = TermParser;
        assert!(parser.parse(":broken").unwrap_err().is_lookup());
    }
}
