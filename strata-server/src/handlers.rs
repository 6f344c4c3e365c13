//! Route handlers bridging HTTP to the tier coordinator.
//!
//! Every materialized route binds one typed handler per schema: the free
//! variants skip the auth gate entirely, the gated variants authenticate,
//! enforce the schema's auth level, and scope what the caller touches.

use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};
use uuid::Uuid;

use strata_auth::Credentials;
use strata_core::auth::AuthInfo;
use strata_core::error::ApiError;
use strata_core::model::Model;
use strata_core::schema::{AuthLevel, CrudVerb, SchemaInfo};

use crate::params::SearchParams;
use crate::service::AppState;

async fn gate_check(
    app: &AppState,
    headers: &HeaderMap,
    verb: CrudVerb,
    schema: &SchemaInfo,
) -> Result<Arc<AuthInfo>, ApiError> {
    let gate = app.gate()?;
    let creds = Credentials::from_headers(headers, &app.settings().default_realm);
    let info = gate.authenticate(&creds).await?;
    gate.authorize(&info, verb, schema)?;
    Ok(info)
}

/// At the per-owner level, mutating an existing row requires owning it.
/// A row that does not exist yet has no owner; the primary write decides
/// its fate.
async fn owner_precheck(
    app: &AppState,
    info: &AuthInfo,
    schema: &Arc<SchemaInfo>,
    id: Uuid,
) -> Result<(), ApiError> {
    if schema.auth != AuthLevel::Owner || info.admin {
        return Ok(());
    }
    match app.coordinator().read(schema, id).await {
        Ok(row) => app.gate()?.scope_row(info, schema, &row),
        Err(ApiError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

fn first_stored(stored: Vec<Value>) -> Result<Json<Value>, ApiError> {
    stored
        .into_iter()
        .next()
        .map(Json)
        .ok_or_else(|| ApiError::ServiceUnavailable("primary returned no model".into()))
}

fn decode<M: Model>(body: Value) -> Result<M, ApiError> {
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(format!("bad payload: {e}")))
}

fn encode<M: Model>(model: &M) -> Result<Value, ApiError> {
    serde_json::to_value(model).map_err(|e| ApiError::BadRequest(format!("bad payload: {e}")))
}

fn deleted_body(schema: &SchemaInfo, id: Uuid) -> Value {
    json!({
        "id": id.to_string(),
        "sref": schema.sref,
        "uref": schema.uref_for(&id),
        "status": "deleted",
    })
}

// ---------------------------------------------------------------------------
// create
// ---------------------------------------------------------------------------

async fn do_create<M: Model>(
    app: &AppState,
    schema: &Arc<SchemaInfo>,
    body: Value,
    caller: Option<&AuthInfo>,
) -> Result<Json<Value>, ApiError> {
    let mut model: M = decode(body)?;
    let (org, owner) = match caller {
        Some(info) => (info.realm.as_str(), info.username.as_str()),
        None => (app.settings().default_realm.as_str(), ""),
    };
    model.base_mut().stamp_create(schema, org, owner);
    let stored = app.coordinator().create(schema, vec![encode(&model)?]).await?;
    first_stored(stored)
}

pub(crate) async fn create_free<M: Model>(
    State(app): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    do_create::<M>(&app, &schema, body, None).await
}

pub(crate) async fn create_gated<M: Model>(
    State(app): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let info = gate_check(&app, &headers, CrudVerb::Create, &schema).await?;
    do_create::<M>(&app, &schema, body, Some(&info)).await
}

// ---------------------------------------------------------------------------
// search / count
// ---------------------------------------------------------------------------

pub(crate) async fn search_free<M: Model>(
    State(app): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let params = SearchParams::parse(raw.as_deref())?;
    let query = params.to_query(app.parser())?;
    let rows = app.coordinator().search(&schema, &query, params.archive).await?;
    Ok(Json(Value::Array(rows)))
}

pub(crate) async fn search_gated<M: Model>(
    State(app): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let info = gate_check(&app, &headers, CrudVerb::Read, &schema).await?;
    let params = SearchParams::parse(raw.as_deref())?;
    let mut query = params.to_query(app.parser())?;
    app.gate()?.scope_query(&info, &schema, &mut query);
    let rows = app.coordinator().search(&schema, &query, params.archive).await?;
    Ok(Json(Value::Array(rows)))
}

fn count_body(schema: &SchemaInfo, raw: Option<String>, result: u64) -> Value {
    json!({
        "sref": schema.sref,
        "uref": schema.path,
        "query": raw.unwrap_or_default(),
        "result": result,
    })
}

pub(crate) async fn count_free<M: Model>(
    State(app): State<AppState>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let params = SearchParams::parse(raw.as_deref())?;
    let query = params.to_query(app.parser())?;
    let total = app.coordinator().count(&schema, &query, params.archive).await?;
    Ok(Json(count_body(&schema, raw, total)))
}

pub(crate) async fn count_gated<M: Model>(
    State(app): State<AppState>,
    headers: HeaderMap,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let info = gate_check(&app, &headers, CrudVerb::Read, &schema).await?;
    let params = SearchParams::parse(raw.as_deref())?;
    let mut query = params.to_query(app.parser())?;
    app.gate()?.scope_query(&info, &schema, &mut query);
    let total = app.coordinator().count(&schema, &query, params.archive).await?;
    Ok(Json(count_body(&schema, raw, total)))
}

// ---------------------------------------------------------------------------
// read
// ---------------------------------------------------------------------------

pub(crate) async fn read_free<M: Model>(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let row = app.coordinator().read(&schema, id).await?;
    Ok(Json(row))
}

pub(crate) async fn read_gated<M: Model>(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let info = gate_check(&app, &headers, CrudVerb::Read, &schema).await?;
    let row = app.coordinator().read(&schema, id).await?;
    app.gate()?.scope_row(&info, &schema, &row)?;
    Ok(Json(row))
}

// ---------------------------------------------------------------------------
// update
// ---------------------------------------------------------------------------

async fn do_update<M: Model>(
    app: &AppState,
    schema: &Arc<SchemaInfo>,
    id: Uuid,
    body: Value,
    caller: Option<&AuthInfo>,
) -> Result<Json<Value>, ApiError> {
    let mut model: M = decode(body)?;
    let (org, owner) = match caller {
        Some(info) => (info.realm.as_str(), info.username.as_str()),
        None => (app.settings().default_realm.as_str(), ""),
    };
    model.base_mut().stamp_update(schema, id, org, owner);
    let stored = app.coordinator().update(schema, vec![encode(&model)?]).await?;
    first_stored(stored)
}

pub(crate) async fn update_free<M: Model>(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    do_update::<M>(&app, &schema, id, body, None).await
}

pub(crate) async fn update_gated<M: Model>(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let info = gate_check(&app, &headers, CrudVerb::Update, &schema).await?;
    owner_precheck(&app, &info, &schema, id).await?;
    do_update::<M>(&app, &schema, id, body, Some(&info)).await
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

pub(crate) async fn delete_free<M: Model>(
    State(app): State<AppState>,
    Path(id): Path<Uuid>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let params = SearchParams::parse(raw.as_deref())?;
    app.coordinator().delete(&schema, id, "", params.force).await?;
    Ok(Json(deleted_body(&schema, id)))
}

pub(crate) async fn delete_gated<M: Model>(
    State(app): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    RawQuery(raw): RawQuery,
) -> Result<Json<Value>, ApiError> {
    let schema = app.schema_of::<M>()?;
    let info = gate_check(&app, &headers, CrudVerb::Delete, &schema).await?;
    owner_precheck(&app, &info, &schema, id).await?;
    let params = SearchParams::parse(raw.as_deref())?;
    app.coordinator()
        .delete(&schema, id, &info.username, params.force)
        .await?;
    Ok(Json(deleted_body(&schema, id)))
}
