//! Backend driver interfaces.
//!
//! Concrete drivers (a Redis cache, an Elasticsearch index, a PostgreSQL
//! pool, a Keycloak client, ...) live outside this workspace; the tier
//! coordinator and the auth gate only ever see these traits. Entities cross
//! the boundary as JSON objects in their wire shape; the per-schema column
//! lists and index mappings a driver needs are precomputed into the
//! [`SchemaInfo`] option bags before `register_model` is called.
//!
//! Error contract: [`DriverError::Lookup`](crate::error::DriverError::Lookup) means the request is malformed
//! for this backend and must not be retried elsewhere; any other error is
//! eligible for tier failover.

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::auth::{AuthInfo, Policy};
use crate::error::DriverResult;
use crate::query::SearchQuery;
use crate::schema::SchemaInfo;

/// Key-value cache tier. One namespace per schema, keyed by entity id,
/// values JSON-encoded, expiring at the schema's cache TTL.
#[async_trait]
pub trait CacheDriver: Send + Sync {
    async fn connect(&self) -> DriverResult<()>;

    async fn disconnect(&self) -> DriverResult<()>;

    /// Provision the schema's namespace.
    async fn register_model(&self, schema: &SchemaInfo) -> DriverResult<()>;

    async fn read(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<Option<Value>>;

    /// Write entities. Re-writing the same entity is idempotent and resets
    /// its TTL.
    async fn create(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()>;

    async fn update(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()>;

    async fn delete(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<()>;
}

/// Search tier. One index per schema (name `dref`), mappings from the
/// schema's search options, rows carrying the internal retention field.
#[async_trait]
pub trait SearchDriver: Send + Sync {
    async fn connect(&self) -> DriverResult<()>;

    async fn disconnect(&self) -> DriverResult<()>;

    /// Provision the schema's index with its precomputed mapping.
    async fn register_model(&self, schema: &SchemaInfo) -> DriverResult<()>;

    /// Fetch one live document by id.
    async fn read(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<Option<Value>>;

    async fn search(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<Vec<Value>>;

    async fn count(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<u64>;

    async fn create(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()>;

    async fn update(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()>;

    async fn delete(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<()>;
}

/// Durable database tier. One table per schema (name `dref`), columns from
/// the schema's database options, primary key on `id`.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    async fn connect(&self) -> DriverResult<()>;

    async fn disconnect(&self) -> DriverResult<()>;

    /// Schedule a background reconnect of broken sessions. Concurrent
    /// triggers MUST coalesce into a single attempt (single-flight); other
    /// callers keep seeing the original error until it completes.
    async fn reconnect(&self) -> DriverResult<()>;

    /// Provision the schema's table.
    async fn register_model(&self, schema: &SchemaInfo) -> DriverResult<()>;

    /// Fetch one live row by id. Soft-deleted rows are not returned.
    async fn read(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<Option<Value>>;

    async fn search(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<Vec<Value>>;

    async fn count(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<u64>;

    /// Insert rows, returning them as stored. An existing id fails with
    /// [`DriverError::Conflict`](crate::error::DriverError::Conflict).
    async fn create(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<Vec<Value>>;

    /// Rewrite rows, returning them as stored. A missing or soft-deleted
    /// target fails with [`DriverError::Conflict`](crate::error::DriverError::Conflict).
    async fn update(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<Vec<Value>>;

    /// Physically remove a row. A missing target fails with
    /// [`DriverError::NotFound`](crate::error::DriverError::NotFound).
    async fn delete(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<()>;
}

/// Identity and policy backend. Wraps both the shared KV store used to
/// memoize token resolutions across processes and the external identity
/// provider consulted on a miss.
#[async_trait]
pub trait AuthDriver: Send + Sync {
    async fn connect(&self) -> DriverResult<()>;

    async fn disconnect(&self) -> DriverResult<()>;

    /// Resolve a bearer token into an [`AuthInfo`]: shared store first,
    /// identity provider on a miss, writing the result back. `Ok(None)`
    /// means the token is unknown or expired.
    async fn authenticate(&self, token: &str, realm: &str) -> DriverResult<Option<AuthInfo>>;

    /// Replace the policy snapshot. The new allow-set map takes effect
    /// atomically for subsequent resolutions.
    async fn refresh_rbacs(&self, policies: &[Policy]) -> DriverResult<()>;
}
