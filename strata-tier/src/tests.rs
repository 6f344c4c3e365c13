use std::sync::Arc;

use serde_json::{json, Value};
use uuid::Uuid;

use strata_core::error::{ApiError, DriverError};
use strata_core::filter::Filter;
use strata_core::query::SearchQuery;
use strata_core::schema::{FieldKind, Layers, RegisterOptions, SchemaDescriptor, SchemaInfo};
use strata_core::shape::RETENTION_FIELD;
use strata_test::{CallLog, MemoryCache, MemoryDatabase, MemorySearch};

use crate::{BackfillQueue, TierCoordinator};

struct Fixture {
    cache: Arc<MemoryCache>,
    search: Arc<MemorySearch>,
    database: Arc<MemoryDatabase>,
    log: CallLog,
    coordinator: TierCoordinator,
    schema: Arc<SchemaInfo>,
}

fn fixture_with_layers(layer: Layers) -> Fixture {
    let log = CallLog::new();
    let cache = Arc::new(MemoryCache::new(log.clone()));
    let search = Arc::new(MemorySearch::new(log.clone()));
    let database = Arc::new(MemoryDatabase::new(log.clone()));
    let schema = Arc::new(
        SchemaInfo::assemble(
            SchemaDescriptor::new("mod", "X")
                .field("title", FieldKind::Text)
                .field("port", FieldKind::Integer),
            "svc",
            1,
            0,
            &RegisterOptions {
                layer,
                ..RegisterOptions::default()
            },
        )
        .unwrap(),
    );
    let coordinator = TierCoordinator::new(
        Some(cache.clone()),
        Some(search.clone()),
        Some(database.clone()),
        BackfillQueue::start(2, 64),
    );
    Fixture {
        cache,
        search,
        database,
        log,
        coordinator,
        schema,
    }
}

fn fixture() -> Fixture {
    fixture_with_layers(Layers::ALL)
}

fn model(schema: &SchemaInfo, id: Uuid, title: &str) -> Value {
    json!({
        "id": id.to_string(),
        "sref": schema.sref,
        "uref": schema.uref_for(&id),
        "org": "acme",
        "owner": "alice",
        "deleted": false,
        "tstamp": 100,
        "title": title,
        "port": 22,
    })
}

async fn drain(fx: &Fixture) {
    fx.coordinator.backfill_queue().drain().await;
}

// ---------------------------------------------------------------------------
// read
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_read_cache_hit_short_circuits() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.cache.seed(&fx.schema, model(&fx.schema, id, "cached"));

    let found = fx.coordinator.read(&fx.schema, id).await.unwrap();
    assert_eq!(found["title"], "cached");
    assert_eq!(fx.log.calls(), vec!["cache.read"]);
}

#[tokio::test]
async fn test_read_search_hit_backfills_cache_and_strips_retention() {
    let fx = fixture();
    let id = Uuid::new_v4();
    let mut doc = model(&fx.schema, id, "indexed");
    doc[RETENTION_FIELD] = json!(9999999999i64);
    fx.search.seed(&fx.schema, doc);

    let found = fx.coordinator.read(&fx.schema, id).await.unwrap();
    assert_eq!(found["title"], "indexed");
    assert!(found.get(RETENTION_FIELD).is_none());
    assert_eq!(fx.log.calls_for("cache.")[0], "cache.read");
    assert_eq!(fx.log.calls_for("search."), vec!["search.read"]);

    drain(&fx).await;
    let cached = fx.cache.get(&fx.schema, id).unwrap();
    assert_eq!(cached["title"], "indexed");
    assert!(cached.get(RETENTION_FIELD).is_none());
}

#[tokio::test]
async fn test_read_database_hit_backfills_cache_and_search() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "stored"));

    let found = fx.coordinator.read(&fx.schema, id).await.unwrap();
    assert_eq!(found["title"], "stored");
    assert_eq!(
        fx.log.calls(),
        vec!["cache.read", "search.read", "database.read"]
    );

    drain(&fx).await;
    assert!(fx.cache.get(&fx.schema, id).is_some());
    assert!(fx.search.get(&fx.schema, id).is_some());
}

#[tokio::test]
async fn test_read_exhaustion_is_not_found() {
    let fx = fixture();
    let err = fx.coordinator.read(&fx.schema, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_read_lookup_error_is_bad_request_without_failover() {
    let fx = fixture();
    fx.cache.fail("read", DriverError::Lookup("malformed key".into()));

    let err = fx.coordinator.read(&fx.schema, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    assert_eq!(fx.log.calls(), vec!["cache.read"]);
}

#[tokio::test]
async fn test_read_backend_error_falls_through_to_next_tier() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.cache.fail("read", DriverError::Backend("down".into()));
    fx.search.seed(&fx.schema, model(&fx.schema, id, "survivor"));

    let found = fx.coordinator.read(&fx.schema, id).await.unwrap();
    assert_eq!(found["title"], "survivor");
}

#[tokio::test]
async fn test_read_all_tiers_error_is_unavailable() {
    let fx = fixture();
    fx.cache.fail("read", DriverError::Backend("down".into()));
    fx.search.fail("read", DriverError::Backend("down".into()));
    fx.database.fail("read", DriverError::Backend("down".into()));

    let err = fx.coordinator.read(&fx.schema, Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, ApiError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_database_backend_error_triggers_reconnect() {
    let fx = fixture();
    fx.database.fail("read", DriverError::Backend("session broken".into()));

    let _ = fx.coordinator.read(&fx.schema, Uuid::new_v4()).await;
    drain(&fx).await;
    assert_eq!(fx.database.reconnect_count(), 1);
}

// ---------------------------------------------------------------------------
// search / count
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_search_live_path_backfills_cache() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.search.seed(&fx.schema, model(&fx.schema, id, "row"));

    let rows = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), false)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].get(RETENTION_FIELD).is_none());

    drain(&fx).await;
    assert!(fx.cache.get(&fx.schema, id).is_some());
}

#[tokio::test]
async fn test_projected_search_never_backfills() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.search.seed(&fx.schema, model(&fx.schema, id, "row"));

    let query = SearchQuery::default().with_fields(vec!["title".into()]);
    let rows = fx.coordinator.search(&fx.schema, &query, false).await.unwrap();
    assert_eq!(rows.len(), 1);

    drain(&fx).await;
    assert!(fx.cache.is_empty());
}

#[tokio::test]
async fn test_search_failover_to_database_repairs_search() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "durable"));
    fx.search.fail("search", DriverError::Backend("index red".into()));

    let rows = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), false)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    drain(&fx).await;
    assert!(fx.search.get(&fx.schema, id).is_some());
    assert!(fx.cache.get(&fx.schema, id).is_some());
}

#[tokio::test]
async fn test_search_lookup_error_does_not_fail_over() {
    let fx = fixture();
    fx.search.fail("search", DriverError::Lookup("bad filter".into()));

    let err = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
    assert!(fx.log.calls_for("database.").is_empty());
}

#[tokio::test]
async fn test_archive_search_prefers_database_and_repairs_both_tiers() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "archived"));

    let rows = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), true)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(fx.log.calls_for("database."), vec!["database.search"]);
    assert!(fx.log.calls_for("search.").is_empty());

    drain(&fx).await;
    assert!(fx.search.get(&fx.schema, id).is_some());
    assert!(fx.cache.get(&fx.schema, id).is_some());
}

#[tokio::test]
async fn test_archive_search_falls_back_to_search_tier() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.search.seed(&fx.schema, model(&fx.schema, id, "indexed"));
    fx.database.fail("search", DriverError::Backend("down".into()));

    let rows = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), true)
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn test_archive_search_with_no_working_tier_is_not_implemented() {
    let fx = fixture();
    fx.database.fail("search", DriverError::Backend("down".into()));
    fx.search.fail("search", DriverError::Backend("down".into()));

    let err = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), true)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotImplemented(_)));
}

#[tokio::test]
async fn test_search_filter_narrows_results() {
    let fx = fixture();
    fx.search.seed(&fx.schema, model(&fx.schema, Uuid::new_v4(), "alpha"));
    fx.search.seed(&fx.schema, model(&fx.schema, Uuid::new_v4(), "beta"));

    let query = SearchQuery {
        filter: Some(Filter::eq("title", "alpha")),
        ..SearchQuery::default()
    };
    let rows = fx.coordinator.search(&fx.schema, &query, false).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], "alpha");
}

#[tokio::test]
async fn test_count_routes_like_search_without_backfill() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.search.seed(&fx.schema, model(&fx.schema, id, "row"));

    let total = fx
        .coordinator
        .count(&fx.schema, &SearchQuery::default(), false)
        .await
        .unwrap();
    assert_eq!(total, 1);

    drain(&fx).await;
    assert!(fx.cache.is_empty());
}

#[tokio::test]
async fn test_count_falls_back_to_database() {
    let fx = fixture();
    fx.database.seed(&fx.schema, model(&fx.schema, Uuid::new_v4(), "row"));
    fx.search.fail("count", DriverError::Backend("down".into()));

    let total = fx
        .coordinator
        .count(&fx.schema, &SearchQuery::default(), false)
        .await
        .unwrap();
    assert_eq!(total, 1);
}

// ---------------------------------------------------------------------------
// create / update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_records_primary_before_fanout() {
    let fx = fixture();
    let id = Uuid::new_v4();

    let stored = fx
        .coordinator
        .create(&fx.schema, vec![model(&fx.schema, id, "new")])
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);

    drain(&fx).await;
    let calls = fx.log.calls();
    let primary = calls.iter().position(|c| c == "database.create").unwrap();
    for fanout in ["cache.create", "search.create"] {
        let pos = calls.iter().position(|c| c == fanout).unwrap();
        assert!(primary < pos, "{fanout} ran before the primary write");
    }
    assert!(fx.cache.get(&fx.schema, id).is_some());
    assert!(fx.search.get(&fx.schema, id).is_some());
}

#[tokio::test]
async fn test_create_duplicate_is_conflict() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "existing"));

    let err = fx
        .coordinator
        .create(&fx.schema, vec![model(&fx.schema, id, "again")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));

    drain(&fx).await;
    assert!(fx.cache.is_empty());
}

#[tokio::test]
async fn test_create_primary_failure_does_not_touch_faster_tiers() {
    let fx = fixture();
    fx.database.fail("create", DriverError::Backend("down".into()));

    let err = fx
        .coordinator
        .create(&fx.schema, vec![model(&fx.schema, Uuid::new_v4(), "new")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::ServiceUnavailable(_)));

    drain(&fx).await;
    assert!(fx.cache.is_empty());
    assert!(fx.log.calls_for("search.").is_empty());
}

#[tokio::test]
async fn test_create_without_database_uses_search_primary() {
    let fx = fixture_with_layers(Layers {
        cache: true,
        search: true,
        database: false,
    });
    let id = Uuid::new_v4();

    fx.coordinator
        .create(&fx.schema, vec![model(&fx.schema, id, "light")])
        .await
        .unwrap();
    assert!(fx.log.calls_for("database.").is_empty());
    assert_eq!(fx.log.calls_for("search."), vec!["search.create"]);

    drain(&fx).await;
    assert!(fx.cache.get(&fx.schema, id).is_some());
}

#[tokio::test]
async fn test_update_missing_row_is_conflict() {
    let fx = fixture();
    let err = fx
        .coordinator
        .update(&fx.schema, vec![model(&fx.schema, Uuid::new_v4(), "ghost")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn test_update_soft_deleted_row_is_conflict() {
    let fx = fixture();
    let id = Uuid::new_v4();
    let mut row = model(&fx.schema, id, "gone");
    row["deleted"] = json!(true);
    fx.database.seed(&fx.schema, row);

    let err = fx
        .coordinator
        .update(&fx.schema, vec![model(&fx.schema, id, "revived")])
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn test_update_fans_out_after_primary() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "old"));

    fx.coordinator
        .update(&fx.schema, vec![model(&fx.schema, id, "new")])
        .await
        .unwrap();

    drain(&fx).await;
    assert_eq!(fx.cache.get(&fx.schema, id).unwrap()["title"], "new");
    assert_eq!(fx.search.get(&fx.schema, id).unwrap()["title"], "new");
}

// ---------------------------------------------------------------------------
// delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_force_delete_removes_row_and_evicts() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "doomed"));
    fx.cache.seed(&fx.schema, model(&fx.schema, id, "doomed"));
    fx.search.seed(&fx.schema, model(&fx.schema, id, "doomed"));

    fx.coordinator.delete(&fx.schema, id, "alice", true).await.unwrap();

    drain(&fx).await;
    assert!(fx.database.raw(&fx.schema, id).is_none());
    assert!(fx.cache.get(&fx.schema, id).is_none());
    assert!(fx.search.get(&fx.schema, id).is_none());
}

#[tokio::test]
async fn test_force_delete_missing_is_not_found() {
    let fx = fixture();
    let err = fx
        .coordinator
        .delete(&fx.schema, Uuid::new_v4(), "alice", true)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_soft_delete_stamps_and_hides_row() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "fading"));
    fx.cache.seed(&fx.schema, model(&fx.schema, id, "fading"));

    fx.coordinator.delete(&fx.schema, id, "bob", false).await.unwrap();

    let raw = fx.database.raw(&fx.schema, id).unwrap();
    assert_eq!(raw["deleted"], json!(true));
    assert_eq!(raw["owner"], "bob");
    assert!(raw["tstamp"].as_i64().unwrap() > 100);

    drain(&fx).await;
    assert!(fx.cache.get(&fx.schema, id).is_none());

    // The live read path no longer sees the row.
    let err = fx.coordinator.read(&fx.schema, id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_soft_delete_twice_is_not_found() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "fading"));

    fx.coordinator.delete(&fx.schema, id, "alice", false).await.unwrap();
    let err = fx
        .coordinator
        .delete(&fx.schema, id, "alice", false)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn test_soft_deleted_rows_absent_from_search_and_count() {
    let fx = fixture();
    let id = Uuid::new_v4();
    fx.database.seed(&fx.schema, model(&fx.schema, id, "fading"));
    fx.coordinator.delete(&fx.schema, id, "alice", false).await.unwrap();
    drain(&fx).await;

    let rows = fx
        .coordinator
        .search(&fx.schema, &SearchQuery::default(), true)
        .await
        .unwrap();
    assert!(rows.is_empty());
    let total = fx
        .coordinator
        .count(&fx.schema, &SearchQuery::default(), true)
        .await
        .unwrap();
    assert_eq!(total, 0);
}

// ---------------------------------------------------------------------------
// cache idempotency
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cache_create_is_idempotent() {
    let fx = fixture();
    let id = Uuid::new_v4();
    let row = model(&fx.schema, id, "same");

    use strata_core::driver::CacheDriver;
    fx.cache.create(&fx.schema, &[row.clone()]).await.unwrap();
    fx.cache.create(&fx.schema, &[row.clone()]).await.unwrap();

    assert_eq!(fx.cache.len(), 1);
    assert_eq!(fx.cache.get(&fx.schema, id).unwrap(), row);
}
