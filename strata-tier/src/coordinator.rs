//! The tier coordinator: read-through chain, write fan-out, archive
//! routing, and failover.
//!
//! Tier probes within a request are strictly sequential; a hit
//! short-circuits the rest of the chain. Writes acknowledge at the primary
//! tier before any faster-tier side effect is scheduled, and those side
//! effects go through the [`BackfillQueue`] so the caller never waits on
//! them.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use strata_core::driver::{CacheDriver, DatabaseDriver, SearchDriver};
use strata_core::error::{ApiError, DriverError};
use strata_core::model::now_ts;
use strata_core::query::SearchQuery;
use strata_core::schema::SchemaInfo;
use strata_core::shape::strip_retention;

use crate::backfill::BackfillQueue;

/// Routes every operation through the cache / search / database stack.
///
/// Stateless per request; a single coordinator is shared by all route
/// handlers and the policy refresher.
#[derive(Clone)]
pub struct TierCoordinator {
    cache: Option<Arc<dyn CacheDriver>>,
    search: Option<Arc<dyn SearchDriver>>,
    database: Option<Arc<dyn DatabaseDriver>>,
    backfill: BackfillQueue,
}

/// Mark a row soft-deleted in place.
fn stamp_soft_delete(model: &mut Value, owner: &str) {
    if let Value::Object(map) = model {
        map.insert("deleted".to_string(), Value::Bool(true));
        map.insert("tstamp".to_string(), Value::from(now_ts()));
        map.insert("owner".to_string(), Value::from(owner));
    }
}

impl TierCoordinator {
    pub fn new(
        cache: Option<Arc<dyn CacheDriver>>,
        search: Option<Arc<dyn SearchDriver>>,
        database: Option<Arc<dyn DatabaseDriver>>,
        backfill: BackfillQueue,
    ) -> Self {
        TierCoordinator {
            cache,
            search,
            database,
            backfill,
        }
    }

    pub fn backfill_queue(&self) -> &BackfillQueue {
        &self.backfill
    }

    fn cache_for(&self, schema: &SchemaInfo) -> Option<&Arc<dyn CacheDriver>> {
        if schema.layer.cache {
            self.cache.as_ref()
        } else {
            None
        }
    }

    fn search_for(&self, schema: &SchemaInfo) -> Option<&Arc<dyn SearchDriver>> {
        if schema.layer.search {
            self.search.as_ref()
        } else {
            None
        }
    }

    fn database_for(&self, schema: &SchemaInfo) -> Option<&Arc<dyn DatabaseDriver>> {
        if schema.layer.database {
            self.database.as_ref()
        } else {
            None
        }
    }

    /// Schedule the database driver's single-flight reconnect after a
    /// backend failure. The current request still sees the original error.
    fn trigger_reconnect(&self) {
        if let Some(db) = self.database.clone() {
            self.backfill
                .enqueue("database.reconnect", async move { db.reconnect().await });
        }
    }

    /// Enqueue cache + search writes for models whose authoritative copy
    /// was just acknowledged.
    pub fn backfill_upsert(&self, schema: &Arc<SchemaInfo>, models: Vec<Value>) {
        if models.is_empty() {
            return;
        }
        if let Some(cache) = self.cache_for(schema).cloned() {
            let schema = schema.clone();
            let models = models.clone();
            self.backfill
                .enqueue("cache.create", async move { cache.create(&schema, &models).await });
        }
        if let Some(search) = self.search_for(schema).cloned() {
            let schema = schema.clone();
            self.backfill
                .enqueue("search.create", async move { search.create(&schema, &models).await });
        }
    }

    fn backfill_cache(&self, schema: &Arc<SchemaInfo>, models: Vec<Value>) {
        if models.is_empty() {
            return;
        }
        if let Some(cache) = self.cache_for(schema).cloned() {
            let schema = schema.clone();
            self.backfill
                .enqueue("cache.create", async move { cache.create(&schema, &models).await });
        }
    }

    fn backfill_search(&self, schema: &Arc<SchemaInfo>, models: Vec<Value>) {
        if models.is_empty() {
            return;
        }
        if let Some(search) = self.search_for(schema).cloned() {
            let schema = schema.clone();
            self.backfill
                .enqueue("search.create", async move { search.create(&schema, &models).await });
        }
    }

    fn backfill_delete(&self, schema: &Arc<SchemaInfo>, id: Uuid) {
        if let Some(cache) = self.cache_for(schema).cloned() {
            let schema = schema.clone();
            self.backfill
                .enqueue("cache.delete", async move { cache.delete(&schema, id).await });
        }
        if let Some(search) = self.search_for(schema).cloned() {
            let schema = schema.clone();
            self.backfill
                .enqueue("search.delete", async move { search.delete(&schema, id).await });
        }
    }

    /// Read one entity: cache, then search, then database. The first tier
    /// that yields ends the chain; lower-tier hits repair the tiers that
    /// missed.
    pub async fn read(&self, schema: &Arc<SchemaInfo>, id: Uuid) -> Result<Value, ApiError> {
        let mut consulted = 0u32;
        let mut missed = false;

        if let Some(cache) = self.cache_for(schema) {
            consulted += 1;
            match cache.read(schema, id).await {
                Ok(Some(model)) => return Ok(model),
                Ok(None) => missed = true,
                Err(e) if e.is_lookup() => return Err(e.into()),
                Err(e) => warn!(sref = %schema.sref, %id, error = %e, "cache read failed"),
            }
        }

        if let Some(search) = self.search_for(schema) {
            consulted += 1;
            match search.read(schema, id).await {
                Ok(Some(mut model)) => {
                    strip_retention(&mut model);
                    self.backfill_cache(schema, vec![model.clone()]);
                    return Ok(model);
                }
                Ok(None) => missed = true,
                Err(e) if e.is_lookup() => return Err(e.into()),
                Err(e) => warn!(sref = %schema.sref, %id, error = %e, "search read failed"),
            }
        }

        if let Some(db) = self.database_for(schema) {
            consulted += 1;
            match db.read(schema, id).await {
                Ok(Some(model)) => {
                    self.backfill_upsert(schema, vec![model.clone()]);
                    return Ok(model);
                }
                Ok(None) => missed = true,
                Err(e) if e.is_lookup() => return Err(e.into()),
                Err(e) => {
                    warn!(sref = %schema.sref, %id, error = %e, "database read failed");
                    self.trigger_reconnect();
                }
            }
        }

        if consulted == 0 {
            return Err(ApiError::NotImplemented(format!(
                "no tier is wired for {}",
                schema.sref
            )));
        }
        if missed {
            Err(ApiError::NotFound(format!("{}/{id}", schema.sref)))
        } else {
            Err(ApiError::ServiceUnavailable(format!(
                "all tiers failed reading {}/{id}",
                schema.sref
            )))
        }
    }

    /// Search entities. `archive=true` prefers the database as the
    /// authoritative source; otherwise the search tier leads and the
    /// database is the fallback. Projected queries never backfill.
    pub async fn search(
        &self,
        schema: &Arc<SchemaInfo>,
        query: &SearchQuery,
        archive: bool,
    ) -> Result<Vec<Value>, ApiError> {
        let projected = query.is_projected();

        if archive {
            if let Some(db) = self.database_for(schema) {
                return match db.search(schema, query).await {
                    Ok(models) => {
                        if !projected {
                            self.backfill_search(schema, models.clone());
                            self.backfill_cache(schema, models.clone());
                        }
                        Ok(models)
                    }
                    Err(e) if e.is_lookup() => Err(e.into()),
                    Err(e) => {
                        warn!(sref = %schema.sref, error = %e, "archive search failed at database");
                        self.trigger_reconnect();
                        match self.search_for(schema) {
                            Some(search) => match search.search(schema, query).await {
                                Ok(models) => {
                                    let models = Self::strip_all(models);
                                    if !projected {
                                        self.backfill_cache(schema, models.clone());
                                    }
                                    Ok(models)
                                }
                                Err(e2) if e2.is_lookup() => Err(e2.into()),
                                Err(e2) => {
                                    warn!(sref = %schema.sref, error = %e2, "archive fallback failed at search");
                                    Err(ApiError::NotImplemented(format!(
                                        "no tier could serve the archive search for {}",
                                        schema.sref
                                    )))
                                }
                            },
                            None => Err(ApiError::NotImplemented(format!(
                                "no tier could serve the archive search for {}",
                                schema.sref
                            ))),
                        }
                    }
                };
            }
        }

        if let Some(search) = self.search_for(schema) {
            return match search.search(schema, query).await {
                Ok(models) => {
                    let models = Self::strip_all(models);
                    if !projected {
                        self.backfill_cache(schema, models.clone());
                    }
                    Ok(models)
                }
                Err(e) if e.is_lookup() => Err(e.into()),
                Err(e) => {
                    warn!(sref = %schema.sref, error = %e, "search failed, falling back to database");
                    match self.database_for(schema) {
                        Some(db) => match db.search(schema, query).await {
                            Ok(models) => {
                                if !projected {
                                    self.backfill_search(schema, models.clone());
                                    self.backfill_cache(schema, models.clone());
                                }
                                Ok(models)
                            }
                            Err(e2) if e2.is_lookup() => Err(e2.into()),
                            Err(e2) => {
                                self.trigger_reconnect();
                                Err(DriverError::Backend(e2.to_string()).into())
                            }
                        },
                        None => Err(DriverError::Backend(e.to_string()).into()),
                    }
                }
            };
        }

        if let Some(db) = self.database_for(schema) {
            return match db.search(schema, query).await {
                Ok(models) => {
                    if !projected {
                        self.backfill_cache(schema, models.clone());
                    }
                    Ok(models)
                }
                Err(e) if e.is_lookup() => Err(e.into()),
                Err(e) => {
                    self.trigger_reconnect();
                    Err(DriverError::Backend(e.to_string()).into())
                }
            };
        }

        Err(ApiError::NotImplemented(format!(
            "no tier is wired for searching {}",
            schema.sref
        )))
    }

    /// Count entities. Mirrors the `search` routing, without backfills.
    pub async fn count(
        &self,
        schema: &Arc<SchemaInfo>,
        query: &SearchQuery,
        archive: bool,
    ) -> Result<u64, ApiError> {
        if archive {
            if let Some(db) = self.database_for(schema) {
                return match db.count(schema, query).await {
                    Ok(total) => Ok(total),
                    Err(e) if e.is_lookup() => Err(e.into()),
                    Err(e) => {
                        warn!(sref = %schema.sref, error = %e, "archive count failed at database");
                        self.trigger_reconnect();
                        match self.search_for(schema) {
                            Some(search) => match search.count(schema, query).await {
                                Ok(total) => Ok(total),
                                Err(e2) if e2.is_lookup() => Err(e2.into()),
                                Err(_) => Err(ApiError::NotImplemented(format!(
                                    "no tier could serve the archive count for {}",
                                    schema.sref
                                ))),
                            },
                            None => Err(ApiError::NotImplemented(format!(
                                "no tier could serve the archive count for {}",
                                schema.sref
                            ))),
                        }
                    }
                };
            }
        }

        if let Some(search) = self.search_for(schema) {
            return match search.count(schema, query).await {
                Ok(total) => Ok(total),
                Err(e) if e.is_lookup() => Err(e.into()),
                Err(e) => {
                    warn!(sref = %schema.sref, error = %e, "count failed, falling back to database");
                    match self.database_for(schema) {
                        Some(db) => match db.count(schema, query).await {
                            Ok(total) => Ok(total),
                            Err(e2) if e2.is_lookup() => Err(e2.into()),
                            Err(e2) => {
                                self.trigger_reconnect();
                                Err(DriverError::Backend(e2.to_string()).into())
                            }
                        },
                        None => Err(DriverError::Backend(e.to_string()).into()),
                    }
                }
            };
        }

        if let Some(db) = self.database_for(schema) {
            return match db.count(schema, query).await {
                Ok(total) => Ok(total),
                Err(e) if e.is_lookup() => Err(e.into()),
                Err(e) => {
                    self.trigger_reconnect();
                    Err(DriverError::Backend(e.to_string()).into())
                }
            };
        }

        Err(ApiError::NotImplemented(format!(
            "no tier is wired for counting {}",
            schema.sref
        )))
    }

    /// Create entities. The database is the primary when present; the
    /// faster tiers are written only after it acknowledges.
    pub async fn create(
        &self,
        schema: &Arc<SchemaInfo>,
        models: Vec<Value>,
    ) -> Result<Vec<Value>, ApiError> {
        if let Some(db) = self.database_for(schema) {
            return match db.create(schema, &models).await {
                Ok(stored) => {
                    self.backfill_upsert(schema, stored.clone());
                    Ok(stored)
                }
                Err(DriverError::Backend(msg)) => {
                    self.trigger_reconnect();
                    Err(DriverError::Backend(msg).into())
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some(search) = self.search_for(schema) {
            return match search.create(schema, &models).await {
                Ok(()) => {
                    self.backfill_cache(schema, models.clone());
                    Ok(models)
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some(cache) = self.cache_for(schema) {
            cache.create(schema, &models).await.map_err(ApiError::from)?;
            return Ok(models);
        }

        Err(ApiError::NotImplemented(format!(
            "no tier is wired for creating {}",
            schema.sref
        )))
    }

    /// Update entities. Same primary order as `create`; a missing or
    /// soft-deleted target at the primary surfaces as a conflict.
    pub async fn update(
        &self,
        schema: &Arc<SchemaInfo>,
        models: Vec<Value>,
    ) -> Result<Vec<Value>, ApiError> {
        if let Some(db) = self.database_for(schema) {
            return match db.update(schema, &models).await {
                Ok(stored) => {
                    self.backfill_upsert(schema, stored.clone());
                    Ok(stored)
                }
                Err(DriverError::Backend(msg)) => {
                    self.trigger_reconnect();
                    Err(DriverError::Backend(msg).into())
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some(search) = self.search_for(schema) {
            return match search.update(schema, &models).await {
                Ok(()) => {
                    self.backfill_cache(schema, models.clone());
                    Ok(models)
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some(cache) = self.cache_for(schema) {
            cache.update(schema, &models).await.map_err(ApiError::from)?;
            return Ok(models);
        }

        Err(ApiError::NotImplemented(format!(
            "no tier is wired for updating {}",
            schema.sref
        )))
    }

    /// Delete one entity. `force` removes the row physically; otherwise the
    /// row is re-written with the soft-delete stamp. Either way the faster
    /// tiers are evicted afterwards.
    pub async fn delete(
        &self,
        schema: &Arc<SchemaInfo>,
        id: Uuid,
        owner: &str,
        force: bool,
    ) -> Result<(), ApiError> {
        if let Some(db) = self.database_for(schema) {
            if force {
                return match db.delete(schema, id).await {
                    Ok(()) => {
                        self.backfill_delete(schema, id);
                        Ok(())
                    }
                    Err(DriverError::Backend(msg)) => {
                        self.trigger_reconnect();
                        Err(DriverError::Backend(msg).into())
                    }
                    Err(e) => Err(e.into()),
                };
            }
            return match db.read(schema, id).await {
                Ok(Some(mut row)) => {
                    stamp_soft_delete(&mut row, owner);
                    match db.update(schema, &[row]).await {
                        Ok(_) => {
                            self.backfill_delete(schema, id);
                            Ok(())
                        }
                        Err(DriverError::Backend(msg)) => {
                            self.trigger_reconnect();
                            Err(DriverError::Backend(msg).into())
                        }
                        Err(e) => Err(e.into()),
                    }
                }
                Ok(None) => Err(ApiError::NotFound(format!("{}/{id}", schema.sref))),
                Err(DriverError::Backend(msg)) => {
                    self.trigger_reconnect();
                    Err(DriverError::Backend(msg).into())
                }
                Err(e) => Err(e.into()),
            };
        }

        if let Some(search) = self.search_for(schema) {
            if force {
                return match search.delete(schema, id).await {
                    Ok(()) => {
                        self.evict_cache(schema, id);
                        Ok(())
                    }
                    Err(e) => Err(e.into()),
                };
            }
            return match search.read(schema, id).await {
                Ok(Some(mut row)) => {
                    stamp_soft_delete(&mut row, owner);
                    match search.update(schema, &[row]).await {
                        Ok(()) => {
                            self.evict_cache(schema, id);
                            Ok(())
                        }
                        Err(e) => Err(e.into()),
                    }
                }
                Ok(None) => Err(ApiError::NotFound(format!("{}/{id}", schema.sref))),
                Err(e) => Err(e.into()),
            };
        }

        if let Some(cache) = self.cache_for(schema) {
            // A cache-only schema has no durable row to stamp; eviction is
            // the delete.
            cache.delete(schema, id).await.map_err(ApiError::from)?;
            return Ok(());
        }

        Err(ApiError::NotImplemented(format!(
            "no tier is wired for deleting {}",
            schema.sref
        )))
    }

    fn evict_cache(&self, schema: &Arc<SchemaInfo>, id: Uuid) {
        if let Some(cache) = self.cache_for(schema).cloned() {
            let schema = schema.clone();
            self.backfill
                .enqueue("cache.delete", async move { cache.delete(&schema, id).await });
        }
    }

    fn strip_all(models: Vec<Value>) -> Vec<Value> {
        models
            .into_iter()
            .map(|mut model| {
                strip_retention(&mut model);
                model
            })
            .collect()
    }
}
