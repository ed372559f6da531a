//! # Server Configuration
//!
//! Router and state wiring for the lotsync HTTP surface, plus the
//! background stale-job watchdog that keeps the single-flight guard from
//! wedging on a crashed invocation.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::handlers;
use crate::repositories::SyncJobRepository;
use crate::sync::supervisor::{Clock, SystemClock};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/sync", post(handlers::sync::trigger_sync))
        .route("/sync/jobs/latest", get(handlers::sync::latest_job))
        .route("/sync/jobs/{id}", get(handlers::sync::job_by_id))
        .route("/listings", get(handlers::listings::list_visible))
        .route(
            "/listings/{external_id}",
            get(handlers::listings::get_listing),
        )
        .route(
            "/admin/listings/bulk-delete",
            post(handlers::listings::bulk_delete),
        )
        .route(
            "/admin/listings/immediate-removal",
            post(handlers::listings::immediate_removal),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Periodically fail `running` sync jobs whose heartbeat went stale, so a
/// crashed invocation cannot hold the single-flight guard forever.
pub fn spawn_watchdog(
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let jobs = SyncJobRepository::new(db);
        let tick = std::time::Duration::from_secs(config.sync.watchdog_tick_secs);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Watchdog shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(tick) => {
                    if let Err(e) = jobs
                        .fail_stale_running(chrono::Utc::now(), config.sync.stale_job_secs)
                        .await
                    {
                        error!(error = %e, "Watchdog tick failed");
                    }
                }
            }
        }
    })
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();
    let watchdog = spawn_watchdog(db.clone(), config.clone(), shutdown.clone());

    let state = AppState {
        db,
        config: config.clone(),
        clock: Arc::new(SystemClock),
    };
    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %config.profile, "Server listening");

    axum::serve(listener, app).await?;

    shutdown.cancel();
    watchdog.await.ok();

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::sync::trigger_sync,
        crate::handlers::sync::latest_job,
        crate::handlers::sync::job_by_id,
        crate::handlers::listings::list_visible,
        crate::handlers::listings::get_listing,
        crate::handlers::listings::bulk_delete,
        crate::handlers::listings::immediate_removal,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ApiError,
            crate::sync::SyncRequest,
            crate::sync::SyncReport,
            crate::handlers::sync::SyncJobStatus,
            crate::handlers::listings::ListingSummary,
            crate::handlers::listings::BulkDeleteRequest,
            crate::handlers::listings::ImmediateRemovalRequest,
            crate::handlers::listings::RemovalResponse,
        )
    ),
    info(
        title = "Lotsync Inventory Sync API",
        description = "Synchronizes an external car-auction inventory feed into a local cache",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
