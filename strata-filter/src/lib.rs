//! Filter-tree translators.
//!
//! The abstract filter tree ([`strata_core::filter::Filter`]) has two sinks:
//!
//! - [`search`]: the search backend's structured query object (a JSON
//!   bool-query tree).
//! - [`sql`]: a SQL `WHERE` fragment (and full SELECT/COUNT statements)
//!   for the database tier, using `tsquery` predicates for text columns.
//!
//! Both sinks reject nodes they cannot translate with a lookup error,
//! which reaches the client as `400 Bad Request`.

pub mod search;
pub mod sql;
