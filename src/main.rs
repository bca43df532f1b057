use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use inventory_service as api;
use inventory_service::{
    alerts::{AlertPipeline, PipelineConfig},
    services::InventoryService,
    store::DatabaseStore,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }

    let store = Arc::new(DatabaseStore::new(Arc::new(db_pool)).with_lock_timeout(cfg.lock_timeout()));

    let pipeline = Arc::new(AlertPipeline::new(
        store.clone(),
        PipelineConfig::from(&cfg),
    ));
    pipeline.start()?;

    let inventory = InventoryService::new(store, pipeline.queue())
        .with_default_threshold(cfg.default_low_stock_threshold);

    let state = api::AppState {
        config: cfg.clone(),
        inventory,
        alert_pipeline: Arc::clone(&pipeline),
    };
    let app = api::build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("inventory-service listening on http://{}", addr);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    // Stop accepting alerts only after in-flight requests have finished.
    pipeline.shutdown().await;
    info!(stats = ?pipeline.stats(), "shutdown complete");

    served?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
