//! Sweep trigger and status endpoints.
//!
//! `POST /sync` runs one supervisor invocation inline and returns its
//! report; a concurrently running sweep yields 409. The job-status reads
//! expose the checkpoint row that resumed invocations continue from.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::ApiError;
use crate::feed::{FeedClient, FeedError};
use crate::repositories::SyncJobRepository;
use crate::server::AppState;
use crate::sync::supervisor::{ShutdownReason, emit_shutdown};
use crate::sync::{Supervisor, SyncFatal, SyncReport, SyncRequest};

/// Status view over one sync job row.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SyncJobStatus {
    pub id: Uuid,
    pub sync_type: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current_page: i32,
    pub total_pages: Option<i32>,
    pub records_processed: i32,
    pub cars_processed: i32,
    pub archived_lots_processed: i32,
    pub errors_count: usize,
    pub error_message: Option<String>,
    pub sweep_complete: bool,
    pub last_activity_at: DateTime<Utc>,
}

impl From<crate::models::sync_job::Model> for SyncJobStatus {
    fn from(job: crate::models::sync_job::Model) -> Self {
        let errors_count = job
            .errors
            .as_ref()
            .and_then(|e| e.as_array())
            .map(|a| a.len())
            .unwrap_or(0);
        Self {
            id: job.id,
            sync_type: job.sync_type,
            status: job.status,
            started_at: job.started_at.with_timezone(&Utc),
            completed_at: job.completed_at.map(|t| t.with_timezone(&Utc)),
            current_page: job.current_page,
            total_pages: job.total_pages,
            records_processed: job.records_processed,
            cars_processed: job.cars_processed,
            archived_lots_processed: job.archived_lots_processed,
            errors_count,
            error_message: job.error_message,
            sweep_complete: job.sweep_complete,
            last_activity_at: job.last_activity_at.with_timezone(&Utc),
        }
    }
}

/// Trigger one sweep invocation
#[utoipa::path(
    post,
    path = "/sync",
    request_body = SyncRequest,
    responses(
        (status = 200, description = "Sweep invocation finished", body = SyncReport),
        (status = 409, description = "A sweep is already running", body = ApiError),
        (status = 500, description = "Sweep aborted", body = ApiError),
        (status = 503, description = "Storage layer unreachable", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncReport>, ApiError> {
    // The feed client is rebuilt per invocation so credential changes take
    // effect without a restart; a missing key is sweep-fatal configuration.
    let feed = match FeedClient::new(state.config.feed.clone()) {
        Ok(client) => Arc::new(client),
        Err(FeedError::Configuration { details }) => {
            emit_shutdown(ShutdownReason::MissingEnvironmentVariables, 0, 0, 0);
            return Err(ApiError::new(
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "MISSING_ENVIRONMENT",
                &format!("Missing required configuration: {}", details),
            ));
        }
        Err(e) => return Err(anyhow::anyhow!(e).into()),
    };

    let supervisor = Supervisor::new(
        state.db.clone(),
        feed,
        state.config.sync.clone(),
        state.config.feed.page_size,
        state.clock.clone(),
    );

    let report = supervisor.run(request).await.map_err(map_fatal)?;
    Ok(Json(report))
}

fn map_fatal(fatal: SyncFatal) -> ApiError {
    match fatal {
        SyncFatal::AlreadyRunning { running_job_id } => {
            crate::error::sync_already_running(running_job_id)
        }
        SyncFatal::MissingEnvironment { details } => ApiError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "MISSING_ENVIRONMENT",
            &format!("Missing required configuration: {}", details),
        ),
        SyncFatal::DependencyInit { details } => ApiError::new(
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "SERVICE_UNAVAILABLE",
            &format!("Dependency initialization failed: {}", details),
        ),
        SyncFatal::Aborted { sync_id, details } => ApiError::new(
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "SYNC_FAILED",
            &format!("Sweep aborted: {}", details),
        )
        .with_details(serde_json::json!({ "sync_id": sync_id })),
    }
}

/// Read the most recent sync job
#[utoipa::path(
    get,
    path = "/sync/jobs/latest",
    responses(
        (status = 200, description = "Most recent sync job", body = SyncJobStatus),
        (status = 404, description = "No sync job recorded yet", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn latest_job(State(state): State<AppState>) -> Result<Json<SyncJobStatus>, ApiError> {
    let jobs = SyncJobRepository::new(state.db.clone());
    let job = jobs
        .find_latest()
        .await?
        .ok_or_else(|| -> ApiError { crate::error::ErrorType::NotFound.into() })?;
    Ok(Json(job.into()))
}

/// Read one sync job by id
#[utoipa::path(
    get,
    path = "/sync/jobs/{id}",
    params(("id" = Uuid, Path, description = "Sync job id")),
    responses(
        (status = 200, description = "Sync job", body = SyncJobStatus),
        (status = 404, description = "Unknown sync job", body = ApiError)
    ),
    tag = "sync"
)]
pub async fn job_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SyncJobStatus>, ApiError> {
    let jobs = SyncJobRepository::new(state.db.clone());
    let job = jobs
        .find_by_id(id)
        .await?
        .ok_or_else(|| -> ApiError { crate::error::ErrorType::NotFound.into() })?;
    Ok(Json(job.into()))
}
