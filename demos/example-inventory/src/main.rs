//! Inventory demo: two schemas served from the in-memory drivers.
//!
//! ```sh
//! cargo run -p example-inventory
//! curl -s localhost:8080/strata/v1/inventory/device \
//!   -d '{"hostname": "gw-01", "port": 22}' -H 'content-type: application/json'
//! curl -s 'localhost:8080/strata/v1/inventory/device?hostname=gw-01'
//! ```

mod models;

use std::sync::Arc;

use strata::prelude::*;
use strata_test::{CallLog, MemoryAuth, MemoryCache, MemoryDatabase, MemorySearch, TermParser};

use models::{Device, Rack};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let settings = Settings::load("dev")?;
    let log = CallLog::new();

    ServiceBuilder::new(settings)
        .with_database_driver(Arc::new(MemoryDatabase::new(log.clone())))
        .with_search_driver(Arc::new(MemorySearch::new(log.clone())))
        .with_cache_driver(Arc::new(MemoryCache::new(log.clone())))
        .with_auth_driver(Arc::new(MemoryAuth::new(log)))
        .with_filter_parser(Arc::new(TermParser))
        .register::<Device>(RegisterOptions::default())
        .register::<Rack>(RegisterOptions {
            layer: Layers::DATABASE_ONLY,
            ..RegisterOptions::default()
        })
        .build()
        .await?
        .serve()
        .await
}
