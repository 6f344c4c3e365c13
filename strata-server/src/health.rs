use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::service::AppState;

/// Liveness summary published at `GET /<service>/health`.
pub struct HealthState {
    title: String,
    healthy: AtomicBool,
    tiers: Vec<&'static str>,
    schemas: AtomicUsize,
}

#[derive(Serialize)]
pub(crate) struct HealthBody {
    title: String,
    status: &'static str,
    healthy: bool,
    detail: HealthDetail,
}

#[derive(Serialize)]
pub(crate) struct HealthDetail {
    tiers: Vec<&'static str>,
    schemas: usize,
}

impl HealthState {
    pub fn new(title: &str, tiers: Vec<&'static str>) -> Self {
        HealthState {
            title: title.to_string(),
            healthy: AtomicBool::new(false),
            tiers,
            schemas: AtomicUsize::new(0),
        }
    }

    /// Flip to healthy once startup completes.
    pub fn mark_ready(&self, schemas: usize) {
        self.schemas.store(schemas, Ordering::SeqCst);
        self.healthy.store(true, Ordering::SeqCst);
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }
}

pub(crate) async fn health_handler(State(app): State<AppState>) -> Json<HealthBody> {
    let health = app.health();
    let healthy = health.is_healthy();
    Json(HealthBody {
        title: health.title.clone(),
        status: if healthy { "OK" } else { "STARTING" },
        healthy,
        detail: HealthDetail {
            tiers: health.tiers.clone(),
            schemas: health.schemas.load(Ordering::SeqCst),
        },
    })
}
