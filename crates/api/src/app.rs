use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use domain::services::{DispatchError, ExportLifecycleService, ExportStore, JobDispatcher};
use shared::clock::SystemClock;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{Config, DispatcherMode};
use crate::middleware::{metrics_handler, metrics_middleware, security_headers_middleware, trace_id};
use crate::routes::{download, exports, health, webhooks};
use crate::services::dispatcher::{ExportJobProcessor, LocalDispatcher, WebhookDispatcher};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lifecycle: Arc<ExportLifecycleService>,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub processor: Arc<ExportJobProcessor>,
    /// Client for fetching artifacts in proxy download mode.
    pub http_client: reqwest::Client,
    /// Set when exports live in PostgreSQL; used for pool gauges.
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Assemble state around an existing lifecycle service and dispatcher.
    pub fn new(
        config: Config,
        lifecycle: Arc<ExportLifecycleService>,
        dispatcher: Arc<dyn JobDispatcher>,
    ) -> Self {
        let processor = Arc::new(job_processor(&config, Arc::clone(&lifecycle)));
        Self {
            config: Arc::new(config),
            lifecycle,
            dispatcher,
            processor,
            http_client: reqwest::Client::new(),
            pool: None,
        }
    }

    /// Build production state: system clock, configured expiry and the
    /// dispatcher selected by `dispatcher.mode`.
    pub fn from_config(config: Config, store: Arc<dyn ExportStore>) -> Result<Self, DispatchError> {
        let lifecycle = Arc::new(ExportLifecycleService::new(
            store,
            Arc::new(SystemClock),
            chrono::Duration::seconds(config.export.expiration_secs),
        ));
        let processor = Arc::new(job_processor(&config, Arc::clone(&lifecycle)));

        let dispatcher: Arc<dyn JobDispatcher> = match config.dispatcher.mode {
            DispatcherMode::Local => Arc::new(LocalDispatcher::new(
                Arc::clone(&processor),
                Duration::from_millis(config.dispatcher.simulated_delay_ms),
            )),
            DispatcherMode::Webhook => Arc::new(WebhookDispatcher::new(
                config.dispatcher.callback_url.clone(),
                config.dispatcher.secret().map(str::to_string),
                Duration::from_secs(config.dispatcher.timeout_secs),
            )?),
        };

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.dispatcher.timeout_secs))
            .build()
            .map_err(|e| DispatchError::Prepare(e.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            lifecycle,
            dispatcher,
            processor,
            http_client,
            pool: None,
        })
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }
}

fn job_processor(config: &Config, lifecycle: Arc<ExportLifecycleService>) -> ExportJobProcessor {
    ExportJobProcessor::new(
        lifecycle,
        config.public_base_url(),
        Duration::from_millis(config.dispatcher.simulated_delay_ms),
    )
}

pub fn create_app(state: AppState) -> Router {
    let config = Arc::clone(&state.config);

    // Build CORS layer based on configuration
    let cors = if config.security.cors_origins.is_empty() {
        // Default: allow any origin (for development)
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        use tower_http::cors::AllowOrigin;
        let origins: Vec<_> = config
            .security
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let export_routes = Router::new()
        .route("/api/v1/export", post(exports::create_export))
        .route("/api/v1/export/latest", get(exports::get_latest_export))
        .route(
            "/api/v1/export/:id",
            get(exports::get_export).patch(exports::update_export),
        );

    // Static explanation pages win over the `:id` capture.
    let download_routes = Router::new()
        .route("/api/v1/download/not-found", get(download::not_found))
        .route("/api/v1/download/not-ready", get(download::not_ready))
        .route("/api/v1/download/expired", get(download::expired))
        .route("/api/v1/download/:id", get(download::download_export));

    let webhook_routes = Router::new().route(
        "/api/v1/webhooks/export-job",
        post(webhooks::export_job_webhook),
    );

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(export_routes)
        .merge(download_routes)
        .merge(webhook_routes)
        // Global middleware (order matters: bottom layers run first)
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors)
        .with_state(state)
}
