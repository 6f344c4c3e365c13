//! Service assembly and lifecycle.
//!
//! [`ServiceBuilder`] collects drivers and schema registrations, then
//! `build()` runs the startup sequence: connect drivers, register the
//! policy schema, run user registrations (tier provisioning in database →
//! search → cache order, routes materialized per CRUD flags), mount the
//! health route, and start the policy refresh loops. [`Service::serve`]
//! runs until a shutdown signal, then tears everything down in reverse.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::get;
use axum::Router;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use strata_auth::{AuthGate, PolicyRefresher};
use strata_core::auth::Policy;
use strata_core::config::Settings;
use strata_core::driver::{AuthDriver, CacheDriver, DatabaseDriver, SearchDriver};
use strata_core::error::{ApiError, RegistryError};
use strata_core::filter::FilterParser;
use strata_core::model::Model;
use strata_core::registry::SchemaRegistry;
use strata_core::schema::{AuthLevel, RegisterOptions, SchemaInfo};
use strata_tier::{BackfillQueue, TierCoordinator};

use crate::health::{health_handler, HealthState};
use crate::routes::{materialize, RouteInfo};

/// The backend drivers a service runs on. Any subset may be wired; schemas
/// can only participate in tiers that have a driver.
#[derive(Clone, Default)]
pub struct Drivers {
    pub cache: Option<Arc<dyn CacheDriver>>,
    pub search: Option<Arc<dyn SearchDriver>>,
    pub database: Option<Arc<dyn DatabaseDriver>>,
    pub auth: Option<Arc<dyn AuthDriver>>,
}

struct AppInner {
    settings: Settings,
    registry: SchemaRegistry,
    coordinator: Arc<TierCoordinator>,
    gate: Option<Arc<AuthGate>>,
    parser: Option<Arc<dyn FilterParser>>,
    http: reqwest::Client,
    health: HealthState,
    routes: Vec<RouteInfo>,
}

/// Shared application state handed to every route handler.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

impl AppState {
    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    pub fn coordinator(&self) -> &TierCoordinator {
        &self.inner.coordinator
    }

    pub fn gate(&self) -> Result<&Arc<AuthGate>, ApiError> {
        self.inner
            .gate
            .as_ref()
            .ok_or_else(|| ApiError::NotImplemented("no auth driver is wired".into()))
    }

    pub fn parser(&self) -> Option<&Arc<dyn FilterParser>> {
        self.inner.parser.as_ref()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub fn health(&self) -> &HealthState {
        &self.inner.health
    }

    /// Metadata for every materialized route.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.inner.routes
    }

    /// Registry record for a model type.
    pub fn schema_of<M: Model>(&self) -> Result<Arc<SchemaInfo>, ApiError> {
        self.inner
            .registry
            .by_sref(&M::sref())
            .ok_or_else(|| ApiError::NotImplemented(format!("{} is not registered", M::sref())))
    }
}

#[derive(Clone)]
struct RegistrationCx {
    settings: Settings,
    registry: SchemaRegistry,
    drivers: Drivers,
}

type RegistrationFut =
    Pin<Box<dyn Future<Output = Result<(Router<AppState>, Vec<RouteInfo>), RegistryError>> + Send>>;
type Registration = Box<dyn FnOnce(RegistrationCx) -> RegistrationFut + Send>;

/// Attach one schema: derive its registry record, provision each
/// participating tier (database, then search, then cache), publish it in
/// the global map, and materialize its routes.
async fn register_schema<M: Model>(
    cx: RegistrationCx,
    opts: RegisterOptions,
) -> Result<(Router<AppState>, Vec<RouteInfo>), RegistryError> {
    let info = SchemaInfo::assemble(
        M::descriptor(),
        &cx.settings.service,
        cx.settings.major,
        cx.settings.minor,
        &opts,
    )?;

    if info.auth > AuthLevel::Free && cx.drivers.auth.is_none() {
        return Err(RegistryError::MissingDriver {
            sref: info.sref,
            driver: "auth",
        });
    }

    if info.layer.database {
        match &cx.drivers.database {
            Some(database) => database.register_model(&info).await?,
            None => {
                return Err(RegistryError::MissingDriver {
                    sref: info.sref,
                    driver: "database",
                })
            }
        }
    }
    if info.layer.search {
        match &cx.drivers.search {
            Some(search) => search.register_model(&info).await?,
            None => {
                return Err(RegistryError::MissingDriver {
                    sref: info.sref,
                    driver: "search",
                })
            }
        }
    }
    if info.layer.cache {
        match &cx.drivers.cache {
            Some(cache) => cache.register_model(&info).await?,
            None => {
                return Err(RegistryError::MissingDriver {
                    sref: info.sref,
                    driver: "cache",
                })
            }
        }
    }

    let info = cx.registry.insert(info)?;
    info!(sref = %info.sref, path = %info.path, dref = %info.dref, "schema registered");
    Ok(materialize::<M>(&info))
}

/// Builder for a Strata service.
pub struct ServiceBuilder {
    settings: Settings,
    drivers: Drivers,
    parser: Option<Arc<dyn FilterParser>>,
    registrations: Vec<Registration>,
}

impl ServiceBuilder {
    pub fn new(settings: Settings) -> Self {
        ServiceBuilder {
            settings,
            drivers: Drivers::default(),
            parser: None,
            registrations: Vec::new(),
        }
    }

    pub fn with_cache_driver(mut self, driver: Arc<dyn CacheDriver>) -> Self {
        self.drivers.cache = Some(driver);
        self
    }

    pub fn with_search_driver(mut self, driver: Arc<dyn SearchDriver>) -> Self {
        self.drivers.search = Some(driver);
        self
    }

    pub fn with_database_driver(mut self, driver: Arc<dyn DatabaseDriver>) -> Self {
        self.drivers.database = Some(driver);
        self
    }

    pub fn with_auth_driver(mut self, driver: Arc<dyn AuthDriver>) -> Self {
        self.drivers.auth = Some(driver);
        self
    }

    pub fn with_filter_parser(mut self, parser: Arc<dyn FilterParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Queue a schema registration. Registrations run during `build()` in
    /// the order they were added.
    pub fn register<M: Model>(mut self, opts: RegisterOptions) -> Self {
        self.registrations.push(Box::new(move |cx| {
            Box::pin(register_schema::<M>(cx, opts))
        }));
        self
    }

    /// The tiers that actually have drivers.
    fn available_layers(&self) -> strata_core::schema::Layers {
        strata_core::schema::Layers {
            cache: self.drivers.cache.is_some(),
            search: self.drivers.search.is_some(),
            database: self.drivers.database.is_some(),
        }
    }

    /// Run the startup sequence and produce a ready-to-serve service.
    pub async fn build(mut self) -> Result<Service, RegistryError> {
        // Drivers connect in tier order; failures abort startup.
        if let Some(database) = &self.drivers.database {
            database.connect().await?;
        }
        if let Some(search) = &self.drivers.search {
            search.connect().await?;
        }
        if let Some(cache) = &self.drivers.cache {
            cache.connect().await?;
        }
        if let Some(auth) = &self.drivers.auth {
            auth.connect().await?;
        }

        let registry = SchemaRegistry::new();
        let backfill = BackfillQueue::start(
            self.settings.backfill_workers,
            self.settings.backfill_capacity,
        );
        let coordinator = Arc::new(TierCoordinator::new(
            self.drivers.cache.clone(),
            self.drivers.search.clone(),
            self.drivers.database.clone(),
            backfill,
        ));
        let gate = self
            .drivers
            .auth
            .clone()
            .map(|driver| Arc::new(AuthGate::new(driver, Duration::from_secs(self.settings.token_ttl))));

        // The policy schema registers like any other entity so policies are
        // administered through the same REST surface the refresher reads.
        if self.drivers.auth.is_some() {
            let policy_opts = RegisterOptions {
                auth: AuthLevel::Acl,
                layer: self.available_layers(),
                cache_expire: self.settings.cache_expire,
                search_expire: self.settings.search_expire,
                shards: self.settings.search_shards,
                replicas: self.settings.search_replicas,
                ..RegisterOptions::default()
            };
            self.registrations.insert(
                0,
                Box::new(move |cx| Box::pin(register_schema::<Policy>(cx, policy_opts))),
            );
        }

        let cx = RegistrationCx {
            settings: self.settings.clone(),
            registry: registry.clone(),
            drivers: self.drivers.clone(),
        };

        let mut app_router: Router<AppState> = Router::new();
        let mut routes = Vec::new();
        for registration in self.registrations {
            let (router, mut infos) = registration(cx.clone()).await?;
            app_router = app_router.merge(router);
            routes.append(&mut infos);
        }

        let health_path = format!("/{}/health", self.settings.service);
        app_router = app_router.route(&health_path, get(health_handler));

        let mut tiers = Vec::new();
        if self.drivers.cache.is_some() {
            tiers.push("cache");
        }
        if self.drivers.search.is_some() {
            tiers.push("search");
        }
        if self.drivers.database.is_some() {
            tiers.push("database");
        }

        let health = HealthState::new(&self.settings.service, tiers);
        let state = AppState {
            inner: Arc::new(AppInner {
                settings: self.settings.clone(),
                registry: registry.clone(),
                coordinator: coordinator.clone(),
                gate: gate.clone(),
                parser: self.parser,
                http: reqwest::Client::new(),
                health,
                routes,
            }),
        };

        let router = app_router
            .with_state(state.clone())
            .layer(tower_http::trace::TraceLayer::new_for_http());

        // Background loops start once startup is complete.
        let cancel = CancellationToken::new();
        let mut loops = Vec::new();
        if let (Some(gate), Some(auth)) = (&gate, &self.drivers.auth) {
            if let Some(policy_schema) = registry.by_sref(&Policy::sref()) {
                let refresher = Arc::new(PolicyRefresher::new(
                    coordinator.clone(),
                    gate.clone(),
                    auth.clone(),
                    policy_schema,
                    Duration::from_secs(self.settings.refresh_rbac_interval),
                    Duration::from_secs(self.settings.refresh_info_interval),
                ));
                loops = refresher.spawn(cancel.clone());
            }
        }

        state.health().mark_ready(registry.len());
        info!(
            service = %self.settings.service,
            schemas = registry.len(),
            "startup complete"
        );

        Ok(Service {
            router,
            state,
            drivers: self.drivers,
            cancel,
            loops,
        })
    }
}

/// A built service, ready to serve or to hand its router to a test
/// harness.
pub struct Service {
    router: Router,
    state: AppState,
    drivers: Drivers,
    cancel: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

impl Service {
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Bind and serve until a shutdown signal arrives, then tear down.
    pub async fn serve(self) -> Result<(), Box<dyn std::error::Error>> {
        let addr = self.state.settings().address.clone();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(%addr, "strata service listening");
        axum::serve(listener, self.router.clone())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        self.shutdown().await;
        Ok(())
    }

    /// Stop the background loops, drain pending backfills, and disconnect
    /// the drivers in reverse connect order.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.loops {
            let _ = handle.await;
        }
        self.state.coordinator().backfill_queue().drain().await;

        if let Some(auth) = &self.drivers.auth {
            if let Err(e) = auth.disconnect().await {
                warn!(error = %e, "auth driver disconnect failed");
            }
        }
        if let Some(cache) = &self.drivers.cache {
            if let Err(e) = cache.disconnect().await {
                warn!(error = %e, "cache driver disconnect failed");
            }
        }
        if let Some(search) = &self.drivers.search {
            if let Err(e) = search.disconnect().await {
                warn!(error = %e, "search driver disconnect failed");
            }
        }
        if let Some(database) = &self.drivers.database {
            if let Err(e) = database.disconnect().await {
                warn!(error = %e, "database driver disconnect failed");
            }
        }
        info!("strata service stopped");
    }
}

/// Wait for a shutdown signal (Ctrl-C or SIGTERM on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to listen for SIGTERM"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, starting graceful shutdown");
}
