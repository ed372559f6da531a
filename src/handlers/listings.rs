//! Listing surfaces: the visibility-filtered catalog read and the
//! administrative removal paths.

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::repositories::ListingRepository;
use crate::server::AppState;
use crate::sync::supervisor::Clock;
use crate::sync::LifecycleManager;

/// Thin catalog view over one visible listing.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ListingSummary {
    pub external_id: i64,
    pub make: String,
    pub model: String,
    pub year: i32,
    pub price: i64,
    pub mileage: i32,
    pub title: String,
    pub condition: String,
    pub status: String,
    pub image_url: Option<String>,
}

impl From<crate::models::listing::Model> for ListingSummary {
    fn from(listing: crate::models::listing::Model) -> Self {
        Self {
            external_id: listing.external_id,
            make: listing.make,
            model: listing.model,
            year: listing.year,
            price: listing.price,
            mileage: listing.mileage,
            title: listing.title,
            condition: listing.condition,
            status: listing.status,
            image_url: listing.image_url,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListingsQuery {
    #[serde(default = "default_limit")]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn default_limit() -> u64 {
    50
}

/// List currently-visible listings
///
/// Applies the archival manager's visibility predicate; catalog readers
/// must use this rather than re-deriving the filter.
#[utoipa::path(
    get,
    path = "/listings",
    params(
        ("limit" = u64, Query, description = "Page size, default 50"),
        ("offset" = u64, Query, description = "Offset, default 0")
    ),
    responses(
        (status = 200, description = "Visible listings", body = [ListingSummary])
    ),
    tag = "listings"
)]
pub async fn list_visible(
    State(state): State<AppState>,
    Query(query): Query<ListingsQuery>,
) -> Result<Json<Vec<ListingSummary>>, ApiError> {
    let listings = ListingRepository::new(state.db.clone());
    let rows = listings
        .list_visible(
            state.clock.now(),
            state.config.sync.grace_period_hours,
            query.limit.min(200),
            query.offset,
        )
        .await?;
    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Read one listing by external id, without the visibility filter.
#[utoipa::path(
    get,
    path = "/listings/{external_id}",
    params(("external_id" = i64, Path, description = "Feed-assigned listing id")),
    responses(
        (status = 200, description = "Listing", body = ListingSummary),
        (status = 404, description = "Unknown listing", body = ApiError)
    ),
    tag = "listings"
)]
pub async fn get_listing(
    State(state): State<AppState>,
    Path(external_id): Path<i64>,
) -> Result<Json<ListingSummary>, ApiError> {
    let listings = ListingRepository::new(state.db.clone());
    let listing = listings
        .find_by_external_id(external_id)
        .await?
        .ok_or_else(|| -> ApiError { crate::error::ErrorType::NotFound.into() })?;
    Ok(Json(listing.into()))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    /// External ids to deactivate
    pub ids: Vec<i64>,
    /// Reason tag recorded for the removal
    #[serde(default = "default_bulk_delete_reason")]
    pub reason: String,
}

fn default_bulk_delete_reason() -> String {
    "admin_bulk_delete".to_string()
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RemovalResponse {
    /// Listings deactivated by this call; already-inactive ids not counted
    pub deactivated: u64,
}

/// Administrative bulk removal
///
/// Deactivates only currently-active listings among the given ids; repeat
/// calls with overlapping id sets never double count.
#[utoipa::path(
    post,
    path = "/admin/listings/bulk-delete",
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Removal outcome", body = RemovalResponse),
        (status = 400, description = "Empty id list", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn bulk_delete(
    State(state): State<AppState>,
    Json(request): Json<BulkDeleteRequest>,
) -> Result<Json<RemovalResponse>, ApiError> {
    if request.ids.is_empty() {
        return Err(crate::error::validation_error(
            "ids must not be empty",
            serde_json::json!({ "ids": "at least one external id required" }),
        ));
    }

    let lifecycle = LifecycleManager::new(state.db.clone(), state.config.sync.grace_period_hours);
    let deactivated = lifecycle
        .bulk_delete(&request.ids, &request.reason, state.clock.now())
        .await?;
    Ok(Json(RemovalResponse { deactivated }))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ImmediateRemovalRequest {
    /// External ids to remove without waiting out the grace window
    pub ids: Vec<i64>,
}

/// Immediate removal, bypassing the 24h grace window
#[utoipa::path(
    post,
    path = "/admin/listings/immediate-removal",
    request_body = ImmediateRemovalRequest,
    responses(
        (status = 200, description = "Removal outcome", body = RemovalResponse),
        (status = 400, description = "Empty id list", body = ApiError)
    ),
    tag = "admin"
)]
pub async fn immediate_removal(
    State(state): State<AppState>,
    Json(request): Json<ImmediateRemovalRequest>,
) -> Result<Json<RemovalResponse>, ApiError> {
    if request.ids.is_empty() {
        return Err(crate::error::validation_error(
            "ids must not be empty",
            serde_json::json!({ "ids": "at least one external id required" }),
        ));
    }

    let lifecycle = LifecycleManager::new(state.db.clone(), state.config.sync.grace_period_hours);
    let deactivated = lifecycle
        .immediate_removal(&request.ids, state.clock.now())
        .await?;
    Ok(Json(RemovalResponse { deactivated }))
}
