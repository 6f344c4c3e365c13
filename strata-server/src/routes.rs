//! Endpoint materializer: one typed router fragment per registered schema.

use std::sync::Arc;

use axum::routing::{delete, get, post, put};
use axum::Router;
use serde::Serialize;

use strata_core::model::Model;
use strata_core::schema::{AuthLevel, SchemaInfo};

use crate::handlers;
use crate::service::AppState;

/// Metadata about one materialized route.
#[derive(Debug, Clone, Serialize)]
pub struct RouteInfo {
    /// `<Verb> <name>`, e.g. `"Create NetworkSwitch"`.
    pub name: String,
    pub method: &'static str,
    pub path: String,
    pub tags: Vec<String>,
    pub gated: bool,
}

impl RouteInfo {
    fn new(verb: &str, schema: &SchemaInfo, method: &'static str, path: &str, gated: bool) -> Self {
        RouteInfo {
            name: format!("{verb} {}", schema.name),
            method,
            path: path.to_string(),
            tags: schema.tags.clone(),
            gated,
        }
    }
}

/// Generate the routes permitted by the schema's CRUD flags, binding the
/// auth-gated handler variants when the schema requires a token.
pub fn materialize<M: Model>(schema: &Arc<SchemaInfo>) -> (Router<AppState>, Vec<RouteInfo>) {
    let gated = schema.auth >= AuthLevel::Token;
    let base = schema.path.clone();
    let item = format!("{base}/{{id}}");
    let count = format!("{base}/count");

    let mut router = Router::new();
    let mut routes = Vec::new();

    if schema.crud.create {
        router = if gated {
            router.route(&base, post(handlers::create_gated::<M>))
        } else {
            router.route(&base, post(handlers::create_free::<M>))
        };
        routes.push(RouteInfo::new("Create", schema, "POST", &base, gated));
    }

    if schema.crud.read {
        router = if gated {
            router
                .route(&base, get(handlers::search_gated::<M>))
                .route(&count, get(handlers::count_gated::<M>))
                .route(&item, get(handlers::read_gated::<M>))
        } else {
            router
                .route(&base, get(handlers::search_free::<M>))
                .route(&count, get(handlers::count_free::<M>))
                .route(&item, get(handlers::read_free::<M>))
        };
        routes.push(RouteInfo::new("Search", schema, "GET", &base, gated));
        routes.push(RouteInfo::new("Count", schema, "GET", &count, gated));
        routes.push(RouteInfo::new("Read", schema, "GET", &item, gated));
    }

    if schema.crud.update {
        router = if gated {
            router.route(&item, put(handlers::update_gated::<M>))
        } else {
            router.route(&item, put(handlers::update_free::<M>))
        };
        routes.push(RouteInfo::new("Update", schema, "PUT", &item, gated));
    }

    if schema.crud.delete {
        router = if gated {
            router.route(&item, delete(handlers::delete_gated::<M>))
        } else {
            router.route(&item, delete(handlers::delete_free::<M>))
        };
        routes.push(RouteInfo::new("Delete", schema, "DELETE", &item, gated));
    }

    (router, routes)
}
