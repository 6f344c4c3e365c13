//! Core types for the Strata model-serving framework.
//!
//! Strata materializes REST endpoints for schemas registered at startup and
//! dispatches every request through a three-tier storage stack (cache,
//! search, durable database). This crate holds everything the other crates
//! agree on:
//!
//! - [`error`]: the HTTP-facing [`ApiError`] and the tagged [`DriverError`]
//!   whose variants carry routing meaning (bad request vs. failover).
//! - [`model`]: [`BaseFields`], the [`Model`] trait, and [`Reference`].
//! - [`schema`]: schema descriptors, [`SchemaInfo`], CRUD/tier/auth flags.
//! - [`shape`]: the schema → SQL-column / search-mapping builder.
//! - [`filter`]: the abstract filter tree delivered by a [`FilterParser`].
//! - [`query`]: the [`SearchQuery`] descriptor.
//! - [`driver`]: the four backend driver interfaces.
//! - [`auth`]: [`AuthInfo`] and the [`Policy`] system entity.
//! - [`registry`]: the global `sref → schema` map.
//! - [`config`]: YAML + profile + environment configuration.

pub mod auth;
pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod model;
pub mod query;
pub mod registry;
pub mod schema;
pub mod shape;

pub use auth::{AuthInfo, Policy};
pub use config::{ConfigError, Settings};
pub use driver::{AuthDriver, CacheDriver, DatabaseDriver, SearchDriver};
pub use error::{ApiError, DriverError, DriverResult, RegistryError};
pub use filter::{Filter, FilterParser};
pub use model::{now_ts, BaseFields, Model, Reference};
pub use query::{SearchQuery, SortOrder};
pub use registry::SchemaRegistry;
pub use schema::{
    AuthLevel, CacheOptions, Crud, CrudVerb, DatabaseOptions, FieldDef, FieldKind, Layers,
    RegisterOptions, SchemaDescriptor, SchemaInfo, SearchOptions,
};
