//! HTTP surface for Strata.
//!
//! [`ServiceBuilder`] wires drivers and schema registrations into a ready
//! axum application: every registered schema gets its CRUD routes (gated
//! or free per its auth level), a health route is mounted at
//! `GET /<service>/health`, and the policy refresh loops run alongside the
//! listener until shutdown.

mod handlers;
mod health;
mod params;
mod resolver;
mod routes;
mod service;

pub use health::HealthState;
pub use params::SearchParams;
pub use resolver::{resolve, AuthHeaders};
pub use routes::RouteInfo;
pub use service::{AppState, Drivers, Service, ServiceBuilder};

/// Install the global `tracing` subscriber for a service binary.
///
/// `RUST_LOG` picks the filter when set; otherwise everything at info and
/// above is emitted. Call once, before the builder runs.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
