use crate::filter::Filter;

/// Sort direction for search results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid order '{other}', expected asc or desc")),
        }
    }
}

/// Query descriptor handed to the search and database drivers.
#[derive(Clone, Debug, Default)]
pub struct SearchQuery {
    /// Field projection. When present it always includes `id`, `sref`,
    /// and `uref`.
    pub fields: Option<Vec<String>>,
    pub filter: Option<Filter>,
    pub order_by: Option<String>,
    pub order: Option<SortOrder>,
    pub size: Option<u64>,
    pub skip: Option<u64>,
}

/// Fields every projection carries regardless of the caller's selection.
const MANDATORY_FIELDS: [&str; 3] = ["id", "sref", "uref"];

impl SearchQuery {
    /// Set a projection, forcing the mandatory identity fields in.
    pub fn with_fields(mut self, mut fields: Vec<String>) -> Self {
        for required in MANDATORY_FIELDS {
            if !fields.iter().any(|f| f == required) {
                fields.push(required.to_string());
            }
        }
        self.fields = Some(fields);
        self
    }

    /// Whether a projection is set. Projected queries never backfill the
    /// cache or search tiers.
    pub fn is_projected(&self) -> bool {
        self.fields.is_some()
    }

    /// AND an extra clause into the filter (tenant scoping, equality
    /// parameters).
    pub fn and_filter(&mut self, clause: Filter) {
        self.filter = match self.filter.take() {
            None => Some(clause),
            Some(Filter::And(mut items)) => {
                items.push(clause);
                Some(Filter::And(items))
            }
            Some(existing) => Some(Filter::And(vec![existing, clause])),
        };
    }
}
