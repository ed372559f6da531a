//! # API Handlers
//!
//! This module contains all the HTTP endpoint handlers for the lotsync service.

use axum::extract::State;
use axum::response::Json;

use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

pub mod listings;
pub mod sync;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo::default())
}

/// Database reachability probe
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Storage layer unreachable", body = ApiError)
    ),
    tag = "health"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    crate::db::health_check(&state.db)
        .await
        .map_err(|e| -> ApiError {
            tracing::error!(error = %e, "Health check failed");
            crate::error::ErrorType::ServiceUnavailable.into()
        })?;
    Ok(Json(serde_json::json!({ "status": "ok" })))
}
