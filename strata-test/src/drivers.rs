//! In-memory implementations of the four driver interfaces.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use strata_core::auth::{AuthInfo, Policy};
use strata_core::driver::{AuthDriver, CacheDriver, DatabaseDriver, SearchDriver};
use strata_core::error::{DriverError, DriverResult};
use strata_core::model::now_ts;
use strata_core::query::SearchQuery;
use strata_core::schema::SchemaInfo;
use strata_core::shape::RETENTION_FIELD;

use crate::eval;
use crate::CallLog;

/// Per-operation failure injection shared by the mock drivers.
#[derive(Default)]
struct Failures {
    inner: Mutex<HashMap<String, DriverError>>,
}

impl Failures {
    fn set(&self, op: &str, err: DriverError) {
        self.inner.lock().unwrap().insert(op.to_string(), err);
    }

    fn clear(&self, op: &str) {
        self.inner.lock().unwrap().remove(op);
    }

    fn check(&self, op: &str) -> DriverResult<()> {
        match self.inner.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn model_id(model: &Value) -> DriverResult<Uuid> {
    model
        .get("id")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| DriverError::Lookup("entity is missing a valid id".into()))
}

fn is_deleted(model: &Value) -> bool {
    model.get("deleted").and_then(Value::as_bool).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

/// In-memory cache driver: one `(dref, id)` keyed map, JSON values.
#[derive(Default)]
pub struct MemoryCache {
    store: DashMap<(String, Uuid), Value>,
    failures: Failures,
    pub log: CallLog,
}

impl MemoryCache {
    pub fn new(log: CallLog) -> Self {
        MemoryCache {
            log,
            ..MemoryCache::default()
        }
    }

    /// Insert a value directly, bypassing the driver interface.
    pub fn seed(&self, schema: &SchemaInfo, model: Value) {
        let id = model_id(&model).expect("seeded model needs an id");
        self.store.insert((schema.dref.clone(), id), model);
    }

    pub fn get(&self, schema: &SchemaInfo, id: Uuid) -> Option<Value> {
        self.store
            .get(&(schema.dref.clone(), id))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn fail(&self, op: &str, err: DriverError) {
        self.failures.set(op, err);
    }

    pub fn heal(&self, op: &str) {
        self.failures.clear(op);
    }
}

#[async_trait]
impl CacheDriver for MemoryCache {
    async fn connect(&self) -> DriverResult<()> {
        self.log.record("cache.connect");
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.log.record("cache.disconnect");
        Ok(())
    }

    async fn register_model(&self, _schema: &SchemaInfo) -> DriverResult<()> {
        self.log.record("cache.register_model");
        self.failures.check("register_model")
    }

    async fn read(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<Option<Value>> {
        self.log.record("cache.read");
        self.failures.check("read")?;
        Ok(self.get(schema, id))
    }

    async fn create(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()> {
        self.log.record("cache.create");
        self.failures.check("create")?;
        for model in models {
            let id = model_id(model)?;
            self.store.insert((schema.dref.clone(), id), model.clone());
        }
        Ok(())
    }

    async fn update(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()> {
        self.log.record("cache.update");
        self.failures.check("update")?;
        for model in models {
            let id = model_id(model)?;
            self.store.insert((schema.dref.clone(), id), model.clone());
        }
        Ok(())
    }

    async fn delete(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<()> {
        self.log.record("cache.delete");
        self.failures.check("delete")?;
        self.store.remove(&(schema.dref.clone(), id));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// In-memory search driver. Documents carry the retention stamp the way a
/// real index would.
#[derive(Default)]
pub struct MemorySearch {
    store: DashMap<(String, Uuid), Value>,
    failures: Failures,
    pub log: CallLog,
}

impl MemorySearch {
    pub fn new(log: CallLog) -> Self {
        MemorySearch {
            log,
            ..MemorySearch::default()
        }
    }

    pub fn seed(&self, schema: &SchemaInfo, model: Value) {
        let id = model_id(&model).expect("seeded model needs an id");
        self.store.insert((schema.dref.clone(), id), model);
    }

    pub fn get(&self, schema: &SchemaInfo, id: Uuid) -> Option<Value> {
        self.store
            .get(&(schema.dref.clone(), id))
            .map(|entry| entry.value().clone())
    }

    pub fn fail(&self, op: &str, err: DriverError) {
        self.failures.set(op, err);
    }

    pub fn heal(&self, op: &str) {
        self.failures.clear(op);
    }

    fn stamped(&self, schema: &SchemaInfo, model: &Value) -> Value {
        let mut doc = model.clone();
        if let Value::Object(map) = &mut doc {
            map.insert(
                RETENTION_FIELD.to_string(),
                Value::from(now_ts() + schema.search.expire),
            );
        }
        doc
    }

    fn live_docs(&self, schema: &SchemaInfo) -> Vec<Value> {
        self.store
            .iter()
            .filter(|entry| entry.key().0 == schema.dref)
            .map(|entry| entry.value().clone())
            .filter(|doc| !is_deleted(doc))
            .collect()
    }
}

#[async_trait]
impl SearchDriver for MemorySearch {
    async fn connect(&self) -> DriverResult<()> {
        self.log.record("search.connect");
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.log.record("search.disconnect");
        Ok(())
    }

    async fn register_model(&self, _schema: &SchemaInfo) -> DriverResult<()> {
        self.log.record("search.register_model");
        self.failures.check("register_model")
    }

    async fn read(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<Option<Value>> {
        self.log.record("search.read");
        self.failures.check("read")?;
        Ok(self.get(schema, id).filter(|doc| !is_deleted(doc)))
    }

    async fn search(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<Vec<Value>> {
        self.log.record("search.search");
        self.failures.check("search")?;
        Ok(eval::apply(query, self.live_docs(schema)))
    }

    async fn count(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<u64> {
        self.log.record("search.count");
        self.failures.check("count")?;
        let unpaged = SearchQuery {
            filter: query.filter.clone(),
            ..SearchQuery::default()
        };
        Ok(eval::apply(&unpaged, self.live_docs(schema)).len() as u64)
    }

    async fn create(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()> {
        self.log.record("search.create");
        self.failures.check("create")?;
        for model in models {
            let id = model_id(model)?;
            self.store
                .insert((schema.dref.clone(), id), self.stamped(schema, model));
        }
        Ok(())
    }

    async fn update(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<()> {
        self.log.record("search.update");
        self.failures.check("update")?;
        for model in models {
            let id = model_id(model)?;
            self.store
                .insert((schema.dref.clone(), id), self.stamped(schema, model));
        }
        Ok(())
    }

    async fn delete(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<()> {
        self.log.record("search.delete");
        self.failures.check("delete")?;
        match self.store.remove(&(schema.dref.clone(), id)) {
            Some(_) => Ok(()),
            None => Err(DriverError::NotFound(format!("{id}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// In-memory database driver with the durable-tier contract: conflicts on
/// duplicate create, conflicts on updating missing/soft-deleted rows, and
/// soft-deleted rows invisible to live reads.
#[derive(Default)]
pub struct MemoryDatabase {
    rows: DashMap<(String, Uuid), Value>,
    failures: Failures,
    reconnects: AtomicUsize,
    pub log: CallLog,
}

impl MemoryDatabase {
    pub fn new(log: CallLog) -> Self {
        MemoryDatabase {
            log,
            ..MemoryDatabase::default()
        }
    }

    pub fn seed(&self, schema: &SchemaInfo, model: Value) {
        let id = model_id(&model).expect("seeded model needs an id");
        self.rows.insert((schema.dref.clone(), id), model);
    }

    /// The stored row, soft-deleted or not.
    pub fn raw(&self, schema: &SchemaInfo, id: Uuid) -> Option<Value> {
        self.rows
            .get(&(schema.dref.clone(), id))
            .map(|entry| entry.value().clone())
    }

    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    pub fn fail(&self, op: &str, err: DriverError) {
        self.failures.set(op, err);
    }

    pub fn heal(&self, op: &str) {
        self.failures.clear(op);
    }

    fn live_rows(&self, schema: &SchemaInfo) -> Vec<Value> {
        self.rows
            .iter()
            .filter(|entry| entry.key().0 == schema.dref)
            .map(|entry| entry.value().clone())
            .filter(|row| !is_deleted(row))
            .collect()
    }
}

#[async_trait]
impl DatabaseDriver for MemoryDatabase {
    async fn connect(&self) -> DriverResult<()> {
        self.log.record("database.connect");
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.log.record("database.disconnect");
        Ok(())
    }

    async fn reconnect(&self) -> DriverResult<()> {
        self.log.record("database.reconnect");
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn register_model(&self, _schema: &SchemaInfo) -> DriverResult<()> {
        self.log.record("database.register_model");
        self.failures.check("register_model")
    }

    async fn read(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<Option<Value>> {
        self.log.record("database.read");
        self.failures.check("read")?;
        Ok(self.raw(schema, id).filter(|row| !is_deleted(row)))
    }

    async fn search(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<Vec<Value>> {
        self.log.record("database.search");
        self.failures.check("search")?;
        Ok(eval::apply(query, self.live_rows(schema)))
    }

    async fn count(&self, schema: &SchemaInfo, query: &SearchQuery) -> DriverResult<u64> {
        self.log.record("database.count");
        self.failures.check("count")?;
        let unpaged = SearchQuery {
            filter: query.filter.clone(),
            ..SearchQuery::default()
        };
        Ok(eval::apply(&unpaged, self.live_rows(schema)).len() as u64)
    }

    async fn create(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<Vec<Value>> {
        self.log.record("database.create");
        self.failures.check("create")?;
        for model in models {
            let id = model_id(model)?;
            if self.rows.contains_key(&(schema.dref.clone(), id)) {
                return Err(DriverError::Conflict(format!("{id} already exists")));
            }
        }
        for model in models {
            let id = model_id(model)?;
            self.rows.insert((schema.dref.clone(), id), model.clone());
        }
        Ok(models.to_vec())
    }

    async fn update(&self, schema: &SchemaInfo, models: &[Value]) -> DriverResult<Vec<Value>> {
        self.log.record("database.update");
        self.failures.check("update")?;
        for model in models {
            let id = model_id(model)?;
            match self.raw(schema, id) {
                Some(stored) if !is_deleted(&stored) => {}
                _ => {
                    return Err(DriverError::Conflict(format!(
                        "{id} is missing or soft-deleted"
                    )))
                }
            }
        }
        for model in models {
            let id = model_id(model)?;
            self.rows.insert((schema.dref.clone(), id), model.clone());
        }
        Ok(models.to_vec())
    }

    async fn delete(&self, schema: &SchemaInfo, id: Uuid) -> DriverResult<()> {
        self.log.record("database.delete");
        self.failures.check("delete")?;
        match self.rows.remove(&(schema.dref.clone(), id)) {
            Some(_) => Ok(()),
            None => Err(DriverError::NotFound(format!("{id}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Auth
// ---------------------------------------------------------------------------

/// In-memory identity backend: a token table plus the policy snapshot.
#[derive(Default)]
pub struct MemoryAuth {
    tokens: DashMap<String, AuthInfo>,
    policies: Mutex<Vec<Policy>>,
    failures: Failures,
    pub log: CallLog,
}

impl MemoryAuth {
    pub fn new(log: CallLog) -> Self {
        MemoryAuth {
            log,
            ..MemoryAuth::default()
        }
    }

    /// Register a resolvable token.
    pub fn add_token(&self, token: &str, info: AuthInfo) {
        self.tokens.insert(token.to_string(), info);
    }

    pub fn snapshot(&self) -> Vec<Policy> {
        self.policies.lock().unwrap().clone()
    }

    pub fn fail(&self, op: &str, err: DriverError) {
        self.failures.set(op, err);
    }
}

#[async_trait]
impl AuthDriver for MemoryAuth {
    async fn connect(&self) -> DriverResult<()> {
        self.log.record("auth.connect");
        Ok(())
    }

    async fn disconnect(&self) -> DriverResult<()> {
        self.log.record("auth.disconnect");
        Ok(())
    }

    async fn authenticate(&self, token: &str, realm: &str) -> DriverResult<Option<AuthInfo>> {
        self.log.record("auth.authenticate");
        self.failures.check("authenticate")?;
        let Some(entry) = self.tokens.get(token) else {
            return Ok(None);
        };
        let mut info = entry.value().clone();
        if info.realm != realm {
            return Ok(None);
        }
        let policies = self.policies.lock().unwrap();
        info.apply_policies(&policies);
        Ok(Some(info))
    }

    async fn refresh_rbacs(&self, policies: &[Policy]) -> DriverResult<()> {
        self.log.record("auth.refresh_rbacs");
        self.failures.check("refresh_rbacs")?;
        *self.policies.lock().unwrap() = policies.to_vec();
        Ok(())
    }
}
