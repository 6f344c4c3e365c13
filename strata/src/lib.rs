//! Strata, a multi-tier model-serving framework.
//!
//! Register schemas at startup and get REST endpoints for them
//! (create/read/search/count/update/delete), with every request dispatched
//! through a cache / search / database storage stack: read-through with
//! asynchronous repair of the faster tiers, write-back behind a
//! database-first primary, archive routing, and failover on backend
//! errors. An optional authorization stage enforces per-schema auth levels
//! from a policy snapshot refreshed in the background.
//!
//! ```ignore
//! use strata::prelude::*;
//!
//! #[derive(Clone, Debug, Serialize, Deserialize)]
//! struct Device {
//!     #[serde(flatten)]
//!     base: BaseFields,
//!     hostname: String,
//!     port: i64,
//! }
//!
//! impl Model for Device {
//!     fn descriptor() -> SchemaDescriptor {
//!         SchemaDescriptor::new("inventory", "Device")
//!             .field("hostname", FieldKind::Keyword)
//!             .field("port", FieldKind::Integer)
//!     }
//!     fn base(&self) -> &BaseFields { &self.base }
//!     fn base_mut(&mut self) -> &mut BaseFields { &mut self.base }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::load("dev")?;
//!     ServiceBuilder::new(settings)
//!         .with_database_driver(postgres)
//!         .with_search_driver(elasticsearch)
//!         .with_cache_driver(redis)
//!         .with_auth_driver(keycloak)
//!         .register::<Device>(RegisterOptions::default())
//!         .build()
//!         .await?
//!         .serve()
//!         .await
//! }
//! ```

pub use strata_auth;
pub use strata_core;
pub use strata_filter;
pub use strata_server;
pub use strata_tier;

/// Import everything with `use strata::prelude::*`.
pub mod prelude {
    pub use strata_auth::{AuthGate, Credentials, PolicyRefresher};
    pub use strata_core::{
        now_ts, ApiError, AuthDriver, AuthInfo, AuthLevel, BaseFields, CacheDriver, Crud,
        CrudVerb, DatabaseDriver, DriverError, DriverResult, FieldDef, FieldKind, Filter,
        FilterParser, Layers, Model, Policy, Reference, RegisterOptions, SchemaDescriptor,
        SchemaInfo, SchemaRegistry, SearchDriver, SearchQuery, Settings, SortOrder,
    };
    pub use strata_server::{
        init_tracing, resolve, AppState, AuthHeaders, Drivers, RouteInfo, SearchParams, Service,
        ServiceBuilder,
    };
    pub use strata_tier::{BackfillQueue, TierCoordinator};
}
