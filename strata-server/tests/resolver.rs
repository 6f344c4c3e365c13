//! Reference resolution against a live provider service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use strata_core::config::Settings;
use strata_core::error::ApiError;
use strata_core::model::{BaseFields, Model, Reference};
use strata_core::schema::{Crud, FieldKind, RegisterOptions, SchemaDescriptor};
use strata_server::{resolve, AuthHeaders, Service, ServiceBuilder};
use strata_test::{CallLog, MemoryCache, MemoryDatabase, MemorySearch};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct X {
    #[serde(flatten)]
    base: BaseFields,
    title: String,
}

impl Model for X {
    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new("mod", "X").field("title", FieldKind::Text)
    }

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Secret {
    #[serde(flatten)]
    base: BaseFields,
    code: String,
}

impl Model for Secret {
    fn descriptor() -> SchemaDescriptor {
        SchemaDescriptor::new("mod", "Secret").field("code", FieldKind::Keyword)
    }

    fn base(&self) -> &BaseFields {
        &self.base
    }

    fn base_mut(&mut self) -> &mut BaseFields {
        &mut self.base
    }
}

async fn build_service(register: fn(ServiceBuilder) -> ServiceBuilder) -> (Service, Arc<MemoryDatabase>) {
    let log = CallLog::new();
    let database = Arc::new(MemoryDatabase::new(log.clone()));
    let builder = ServiceBuilder::new(Settings {
        service: "svc".into(),
        ..Settings::default()
    })
    .with_cache_driver(Arc::new(MemoryCache::new(log.clone())))
    .with_search_driver(Arc::new(MemorySearch::new(log.clone())))
    .with_database_driver(database.clone());
    let service = register(builder).build().await.unwrap();
    (service, database)
}

/// Serve a provider service on an ephemeral local port.
async fn spawn_provider(service: &Service) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let router = service.router();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_reference_round_trip() {
    let (provider, provider_db) = build_service(|builder| {
        builder.register::<X>(RegisterOptions::default())
    })
    .await;
    let provider_url = spawn_provider(&provider).await;

    let id = Uuid::new_v4();
    let schema = provider.state().schema_of::<X>().unwrap();
    let entity = json!({
        "id": id.to_string(),
        "sref": "mod.X",
        "uref": schema.uref_for(&id),
        "org": "default",
        "owner": "alice",
        "deleted": false,
        "tstamp": 7,
        "title": "remote row",
    });
    provider_db.seed(&schema, entity.clone());

    // The consumer knows mod.X as a remote schema owned by the provider.
    let log = CallLog::new();
    let consumer = ServiceBuilder::new(Settings {
        service: "svc".into(),
        ..Settings::default()
    })
    .with_cache_driver(Arc::new(MemoryCache::new(log.clone())))
    .with_search_driver(Arc::new(MemorySearch::new(log.clone())))
    .with_database_driver(Arc::new(MemoryDatabase::new(log.clone())))
    .register::<X>(RegisterOptions {
        provider: provider_url,
        ..RegisterOptions::default()
    })
    .build()
    .await
    .unwrap();

    let reference = Reference {
        id,
        sref: "mod.X".into(),
        uref: schema.uref_for(&id),
    };
    let resolved = resolve(&consumer.state(), &reference, &AuthHeaders::default())
        .await
        .unwrap();
    assert_eq!(resolved, entity);
}

#[tokio::test]
async fn test_unknown_sref_is_bad_request() {
    let (service, _) = build_service(|builder| builder.register::<X>(RegisterOptions::default())).await;
    let reference = Reference {
        id: Uuid::new_v4(),
        sref: "mod.Unknown".into(),
        uref: "/svc/v1/mod/unknown/0".into(),
    };
    let err = resolve(&service.state(), &reference, &AuthHeaders::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_local_schema_is_bad_request() {
    let (service, _) = build_service(|builder| builder.register::<X>(RegisterOptions::default())).await;
    let id = Uuid::new_v4();
    let schema = service.state().schema_of::<X>().unwrap();
    let reference = Reference {
        id,
        sref: "mod.X".into(),
        uref: schema.uref_for(&id),
    };
    let err = resolve(&service.state(), &reference, &AuthHeaders::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));
}

#[tokio::test]
async fn test_unreadable_schema_is_method_not_allowed() {
    let (service, _) = build_service(|builder| {
        builder.register::<Secret>(RegisterOptions {
            provider: "http://127.0.0.1:1".into(),
            crud: Crud {
                create: true,
                read: false,
                update: false,
                delete: false,
            },
            ..RegisterOptions::default()
        })
    })
    .await;
    let reference = Reference {
        id: Uuid::new_v4(),
        sref: "mod.Secret".into(),
        uref: "/svc/v1/mod/secret/0".into(),
    };
    let err = resolve(&service.state(), &reference, &AuthHeaders::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::MethodNotAllowed(_)));
}

#[tokio::test]
async fn test_missing_row_at_provider_is_not_found() {
    let (provider, _) = build_service(|builder| {
        builder.register::<X>(RegisterOptions::default())
    })
    .await;
    let provider_url = spawn_provider(&provider).await;

    let log = CallLog::new();
    let consumer = ServiceBuilder::new(Settings {
        service: "svc".into(),
        ..Settings::default()
    })
    .with_cache_driver(Arc::new(MemoryCache::new(log.clone())))
    .with_search_driver(Arc::new(MemorySearch::new(log.clone())))
    .with_database_driver(Arc::new(MemoryDatabase::new(log.clone())))
    .register::<X>(RegisterOptions {
        provider: provider_url,
        ..RegisterOptions::default()
    })
    .build()
    .await
    .unwrap();

    let id = Uuid::new_v4();
    let reference = Reference {
        id,
        sref: "mod.X".into(),
        uref: format!("/svc/v1/mod/x/{id}"),
    };
    let err = resolve(&consumer.state(), &reference, &AuthHeaders::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
