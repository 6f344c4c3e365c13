//! Abstract filter tree.
//!
//! Query-language parsing happens outside this crate; a [`FilterParser`]
//! delivers the pre-parsed tree. The two translator sinks (search
//! structured query, SQL WHERE fragment) live in `strata-filter`.

use crate::error::DriverResult;

/// A node of the abstract filter tree (Lucene-shaped).
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// A bare term matched against the default text fields.
    Term(String),
    /// `field:value`.
    SearchField { field: String, value: String },
    /// A parenthesized sequence; members combine as AND.
    Group(Vec<Filter>),
    /// `field:(a b c)`: members apply to the named field.
    FieldGroup { field: String, items: Vec<Filter> },
    /// `field:[low TO high]` (inclusive flags per side).
    Range {
        field: String,
        low: String,
        high: String,
        include_low: bool,
        include_high: bool,
    },
    /// `field:>=value` / `field:>value`.
    From {
        field: String,
        value: String,
        inclusive: bool,
    },
    /// `field:<=value` / `field:<value`.
    To {
        field: String,
        value: String,
        inclusive: bool,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    /// A binary operation the parser could not classify. The operator
    /// literal decides whether it behaves as AND or OR.
    Unknown { op: String, items: Vec<Filter> },
}

impl Filter {
    /// Equality shorthand used for injected clauses (tenant scoping, free
    /// query parameters).
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Filter {
        Filter::SearchField {
            field: field.into(),
            value: value.into(),
        }
    }

    /// AND-combine a list of filters, collapsing the trivial cases.
    pub fn all(mut items: Vec<Filter>) -> Option<Filter> {
        match items.len() {
            0 => None,
            1 => Some(items.remove(0)),
            _ => Some(Filter::And(items)),
        }
    }
}

/// Seam through which a filter string arrives pre-parsed.
///
/// The framework never parses `$filter` itself; the embedder wires a parser
/// implementation (or none, in which case `$filter` is rejected).
pub trait FilterParser: Send + Sync {
    /// Parse the filter expression. Syntax errors surface as
    /// [`DriverError::Lookup`](crate::error::DriverError::Lookup) and reach
    /// the client as `400 Bad Request`.
    fn parse(&self, input: &str) -> DriverResult<Filter>;
}
