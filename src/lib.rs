//! Inventory Service Library
//!
//! Product stock tracking with transactional stock adjustments and
//! asynchronous low-stock alerts.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod alerts;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod middleware_helpers;
pub mod migrator;
pub mod services;
pub mod store;
pub mod tracing;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer};

use crate::alerts::AlertPipeline;
use crate::services::InventoryService;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: config::AppConfig,
    pub inventory: InventoryService,
    pub alert_pipeline: Arc<AlertPipeline>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, page: u64, limit: u64) -> Self {
        let total_pages = if limit == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// Routes mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route(
            "/products",
            get(handlers::products::list_products).post(handlers::products::create_product),
        )
        .route(
            "/products/:id",
            get(handlers::products::get_product).put(handlers::products::update_product),
        )
        .route("/stock/:id/add", post(handlers::stock::add_stock))
        .route("/stock/:id/deduct", post(handlers::stock::deduct_stock))
        .route("/stock/:id/history", get(handlers::stock::stock_history))
        .route("/alerts", get(handlers::alerts::list_alerts))
        .route("/alerts/:id/resolve", post(handlers::alerts::resolve_alert))
}

/// Full HTTP application: API routes plus request-id, tracing, timeout and
/// CORS layers.
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TimeoutLayer::new(timeout))
        .layer(crate::tracing::configure_http_tracing())
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id::request_id_middleware,
        ))
        .layer(cors)
        .with_state(state)
}

/// Permissive CORS in development, the configured origins otherwise
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any)
    } else if cfg.is_development() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<ApiResponse<Value>>) {
    let store_ok = state.inventory.check_store().await.is_ok();
    let pipeline_state = state.alert_pipeline.state();
    let healthy = store_ok && pipeline_state == alerts::PipelineState::Running;

    let health_data = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "service": "inventory-service",
        "checks": {
            "store": if store_ok { "healthy" } else { "unhealthy" },
            "alert_pipeline": pipeline_state,
        },
        "alerts": state.alert_pipeline.stats(),
        "timestamp": Utc::now().to_rfc3339(),
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(ApiResponse::success(health_data)))
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[tokio::test]
    async fn success_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-123"), async {
                ApiResponse::success("ok")
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-123"));
        DateTime::parse_from_rfc3339(&meta.timestamp).expect("timestamp should parse");
    }

    #[tokio::test]
    async fn error_response_includes_request_metadata() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("meta-err"), async {
                ApiResponse::<()>::error("oops".into())
            })
            .await;

        let meta = response.meta.expect("metadata expected");
        assert_eq!(meta.request_id.as_deref(), Some("meta-err"));
        assert!(!response.success);
    }

    #[test]
    fn total_pages_rounds_up() {
        let page = PaginatedResponse::new(vec![1, 2], 41, 1, 20);
        assert_eq!(page.total_pages, 3);
        assert_eq!(PaginatedResponse::<u8>::new(vec![], 0, 1, 20).total_pages, 0);
    }
}
