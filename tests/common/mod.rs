#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use inventory_service::{
    alerts::{AlertPipeline, PipelineConfig},
    config::AppConfig,
    db,
    entities::{product, stock_alert},
    errors::ServiceError,
    services::{inventory::CreateProductInput, InventoryService},
    store::{AlertSink, DatabaseStore, InMemoryStore, NewAlert, StockStore},
    AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tower::ServiceExt;

pub fn test_config() -> AppConfig {
    let mut cfg = AppConfig::new(
        "sqlite::memory:".to_string(),
        "127.0.0.1".to_string(),
        18_080,
        "development".to_string(),
    );
    cfg.auto_migrate = true;
    cfg.db_max_connections = 1;
    cfg.db_min_connections = 1;
    cfg
}

/// Migrated single-connection in-memory SQLite store. Units serialise on
/// the one pooled connection.
pub async fn sqlite_store() -> DatabaseStore {
    let cfg = test_config();
    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("failed to create test database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    DatabaseStore::new(Arc::new(pool))
}

/// Migrated file-backed SQLite store behind a pool of `max_connections`, so
/// concurrent units contend on the database lock rather than on one pooled
/// connection. The directory must outlive the store.
pub async fn file_sqlite_store(max_connections: u32) -> (DatabaseStore, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let mut cfg = test_config();
    cfg.database_url = format!(
        "sqlite://{}?mode=rwc",
        dir.path().join("inventory.db").display()
    );
    cfg.db_max_connections = max_connections;
    cfg.db_min_connections = 1;

    let pool = db::establish_connection_from_app_config(&cfg)
        .await
        .expect("failed to open file database");
    db::run_migrations(&pool)
        .await
        .expect("failed to run migrations in tests");
    (DatabaseStore::new(Arc::new(pool)), dir)
}

pub fn product_input(sku: &str, stock: i32, threshold: Option<i32>) -> CreateProductInput {
    CreateProductInput {
        name: format!("Product {}", sku),
        sku: sku.to_string(),
        description: None,
        price: Decimal::new(999, 2),
        stock,
        low_stock_threshold: threshold,
    }
}

/// Service plus running pipeline over the same store
pub struct Harness<S> {
    pub store: S,
    pub service: InventoryService,
    pub pipeline: Arc<AlertPipeline>,
    database_dir: Option<TempDir>,
}

impl<S> Harness<S>
where
    S: StockStore + AlertSink + Clone + 'static,
{
    pub fn start(store: S, config: PipelineConfig) -> Self {
        let pipeline = Arc::new(AlertPipeline::new(Arc::new(store.clone()), config));
        pipeline.start().expect("pipeline starts");
        let service = InventoryService::new(Arc::new(store.clone()), pipeline.queue());
        Self {
            store,
            service,
            pipeline,
            database_dir: None,
        }
    }

    pub async fn seed(&self, sku: &str, stock: i32, threshold: Option<i32>) -> product::Model {
        self.service
            .create_product(product_input(sku, stock, threshold))
            .await
            .expect("seed product")
    }

    pub async fn wait_for_persisted(&self, expected: u64) {
        let pipeline = Arc::clone(&self.pipeline);
        wait_until(move || pipeline.stats().persisted >= expected).await;
    }
}

pub async fn memory_harness() -> Harness<InMemoryStore> {
    Harness::start(InMemoryStore::new(), PipelineConfig::default())
}

pub async fn sqlite_harness() -> Harness<DatabaseStore> {
    Harness::start(sqlite_store().await, PipelineConfig::default())
}

/// File SQLite with 8 pooled connections
pub async fn file_sqlite_harness() -> Harness<DatabaseStore> {
    let (store, dir) = file_sqlite_store(8).await;
    let mut harness = Harness::start(store, PipelineConfig::default());
    harness.database_dir = Some(dir);
    harness
}

/// Polls `condition` until it holds, failing the test after five seconds.
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 5s");
}

/// Fails the test if `future` does not finish within `limit`.
pub async fn within<T>(limit: Duration, future: impl Future<Output = T>) -> T {
    tokio::time::timeout(limit, future)
        .await
        .expect("operation did not finish in time")
}

/// Sink that blocks every persist until a permit is released.
pub struct GatedSink {
    gate: Semaphore,
    next_id: AtomicI32,
    pub started: AtomicUsize,
    pub persisted: std::sync::Mutex<Vec<NewAlert>>,
}

impl GatedSink {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            next_id: AtomicI32::new(0),
            started: AtomicUsize::new(0),
            persisted: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn release(&self, permits: usize) {
        self.gate.add_permits(permits);
    }

    pub fn persisted_product_ids(&self) -> Vec<i32> {
        self.persisted
            .lock()
            .unwrap()
            .iter()
            .map(|alert| alert.product_id)
            .collect()
    }
}

#[async_trait]
impl AlertSink for GatedSink {
    async fn persist_alert(&self, alert: NewAlert) -> Result<stock_alert::Model, ServiceError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| ServiceError::InternalError("gate closed".into()))?;
        permit.forget();

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.persisted.lock().unwrap().push(alert.clone());
        Ok(stock_alert::Model {
            id,
            product_id: alert.product_id,
            stock: alert.stock,
            threshold: alert.threshold,
            resolved: false,
            created_at: Utc::now(),
        })
    }
}

/// Sink that always fails
pub struct FailingSink;

#[async_trait]
impl AlertSink for FailingSink {
    async fn persist_alert(&self, _alert: NewAlert) -> Result<stock_alert::Model, ServiceError> {
        Err(ServiceError::TransientStore("alert table unavailable".into()))
    }
}

/// HTTP harness over the full router with an in-memory store
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub store: InMemoryStore,
}

impl TestApp {
    pub async fn new() -> Self {
        let cfg = test_config();
        let store = InMemoryStore::new();
        let pipeline = Arc::new(AlertPipeline::new(
            Arc::new(store.clone()),
            PipelineConfig::from(&cfg),
        ));
        pipeline.start().expect("pipeline starts");

        let inventory = InventoryService::new(Arc::new(store.clone()), pipeline.queue())
            .with_default_threshold(cfg.default_low_stock_threshold);
        let state = AppState {
            config: cfg,
            inventory,
            alert_pipeline: pipeline,
        };

        Self {
            router: inventory_service::build_router(state.clone()),
            state,
            store,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value, axum::http::HeaderMap) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .router
            .clone()
            .oneshot(builder.body(body).expect("request builds"))
            .await
            .expect("router responds");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json, headers)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        let (status, body, _) = self.request(Method::GET, uri, None).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, body, _) = self.request(Method::POST, uri, Some(body)).await;
        (status, body)
    }

    pub async fn put(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let (status, body, _) = self.request(Method::PUT, uri, Some(body)).await;
        (status, body)
    }
}
