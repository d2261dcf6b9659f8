use anyhow::{Context, Result};
use domain::services::{ExportStore, InMemoryExportStore};
use pdf_export_api::app::{create_app, AppState};
use pdf_export_api::config::{Config, StorageBackend};
use pdf_export_api::middleware;
use persistence::repositories::PdfExportRepository;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    middleware::logging::init_logging(&config.logging);
    middleware::init_metrics().context("Failed to install Prometheus recorder")?;

    info!("Starting PDF export API v{}", env!("CARGO_PKG_VERSION"));

    let state = match config.storage.backend {
        StorageBackend::Postgres => {
            let db_config: persistence::db::DatabaseConfig = (&config.database).into();
            let pool = persistence::db::create_pool(&db_config).await?;

            info!("Running database migrations...");
            persistence::db::run_migrations(&pool).await?;
            info!("Migrations completed");

            let store: Arc<dyn ExportStore> = Arc::new(PdfExportRepository::new(pool.clone()));
            AppState::from_config(config.clone(), store)?.with_pool(pool)
        }
        StorageBackend::Memory => {
            warn!("Using in-memory export store; exports are lost on restart");
            let store: Arc<dyn ExportStore> = Arc::new(InMemoryExportStore::new());
            AppState::from_config(config.clone(), store)?
        }
    };

    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
