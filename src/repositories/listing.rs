//! # Listing Repository
//!
//! Repository operations for the listings table: idempotent batch upserts
//! keyed by external id, archival-state updates, and the visibility
//! condition catalog readers must apply.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    Set,
};
use serde_json::json;

use crate::feed::transform::CanonicalListing;
use crate::feed::hash::content_hash;
use crate::models::listing::{ActiveModel, Column, Entity, ListingStatus, Model};
use crate::repositories::RepositoryError;

/// Repository for listing database operations
pub struct ListingRepository {
    db: DatabaseConnection,
}

impl ListingRepository {
    /// Create a new ListingRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Upsert a batch of canonical listings keyed by external id.
    ///
    /// Re-writing identical content is a no-op in effect; changed content
    /// replaces every tracked field wholesale, including the archival
    /// fields: a listing observed by the feed again is live inventory, so
    /// any previous sold-archival is reset.
    pub async fn upsert_batch(
        &self,
        listings: &[CanonicalListing],
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if listings.is_empty() {
            return Ok(0);
        }

        let now = now.fixed_offset();
        let models: Vec<ActiveModel> = listings
            .iter()
            .map(|listing| ActiveModel {
                external_id: Set(listing.external_id),
                make: Set(listing.make.clone()),
                model: Set(listing.model.clone()),
                year: Set(listing.year),
                price: Set(listing.price),
                mileage: Set(listing.mileage),
                title: Set(listing.title.clone()),
                vin: Set(listing.vin.clone()),
                color: Set(listing.color.clone()),
                fuel: Set(listing.fuel.clone()),
                transmission: Set(listing.transmission.clone()),
                lot_number: Set(listing.lot_number.clone()),
                image_url: Set(listing.image_url.clone()),
                images: Set(Some(json!(listing.images))),
                condition: Set(listing.condition.as_str().to_string()),
                is_live: Set(listing.is_live),
                keys_available: Set(listing.keys_available),
                status: Set(listing.status.as_str().to_string()),
                is_active: Set(true),
                is_archived: Set(false),
                archived_at: Set(None),
                archive_reason: Set(None),
                content_hash: Set(content_hash(listing)),
                last_synced_at: Set(now),
                created_at: Set(now),
                updated_at: Set(now),
            })
            .collect();

        let written = Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(Column::ExternalId)
                    .update_columns([
                        Column::Make,
                        Column::Model,
                        Column::Year,
                        Column::Price,
                        Column::Mileage,
                        Column::Title,
                        Column::Vin,
                        Column::Color,
                        Column::Fuel,
                        Column::Transmission,
                        Column::LotNumber,
                        Column::ImageUrl,
                        Column::Images,
                        Column::Condition,
                        Column::IsLive,
                        Column::KeysAvailable,
                        Column::Status,
                        Column::IsActive,
                        Column::IsArchived,
                        Column::ArchivedAt,
                        Column::ArchiveReason,
                        Column::ContentHash,
                        Column::LastSyncedAt,
                        Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(written)
    }

    /// Find a listing by its external id.
    pub async fn find_by_external_id(
        &self,
        external_id: i64,
    ) -> Result<Option<Model>, RepositoryError> {
        Ok(Entity::find_by_id(external_id).one(&self.db).await?)
    }

    /// External ids of all listings still considered active inventory.
    pub async fn active_external_ids(&self) -> Result<Vec<i64>, RepositoryError> {
        let ids = Entity::find()
            .select_only()
            .column(Column::ExternalId)
            .filter(Column::IsActive.eq(true))
            .filter(Column::IsArchived.eq(false))
            .into_tuple::<i64>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }

    /// Mark the given listings as archived with reason "sold". They stay
    /// active (visible) until the grace window lapses.
    pub async fn archive_as_sold(
        &self,
        external_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if external_ids.is_empty() {
            return Ok(0);
        }

        let result = Entity::update_many()
            .col_expr(Column::IsArchived, Expr::value(true))
            .col_expr(Column::ArchivedAt, Expr::value(Some(now.fixed_offset())))
            .col_expr(
                Column::ArchiveReason,
                Expr::value(Some("sold".to_string())),
            )
            .col_expr(
                Column::Status,
                Expr::value(ListingStatus::Sold.as_str().to_string()),
            )
            .col_expr(Column::UpdatedAt, Expr::value(now.fixed_offset()))
            .filter(Column::ExternalId.is_in(external_ids.to_vec()))
            .filter(Column::IsActive.eq(true))
            .filter(Column::IsArchived.eq(false))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Listings archived as sold whose grace window expired at `cutoff`.
    pub async fn find_grace_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Model>, RepositoryError> {
        let rows = Entity::find()
            .filter(Column::IsActive.eq(true))
            .filter(Column::ArchiveReason.eq("sold"))
            .filter(Column::ArchivedAt.lte(cutoff.fixed_offset()))
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Currently-active rows among the given external ids. Used by removal
    /// paths to count each listing once and to capture image URLs for the
    /// cleanup queue before deactivation.
    pub async fn find_active_among(
        &self,
        external_ids: &[i64],
    ) -> Result<Vec<Model>, RepositoryError> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = Entity::find()
            .filter(Column::ExternalId.is_in(external_ids.to_vec()))
            .filter(Column::IsActive.eq(true))
            .all(&self.db)
            .await?;
        Ok(rows)
    }

    /// Deactivate the given listings with a removed status. Already-inactive
    /// rows are untouched (idempotent).
    pub async fn deactivate(
        &self,
        external_ids: &[i64],
        status: ListingStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if external_ids.is_empty() {
            return Ok(0);
        }

        let result = Entity::update_many()
            .col_expr(Column::IsActive, Expr::value(false))
            .col_expr(Column::Status, Expr::value(status.as_str().to_string()))
            .col_expr(Column::UpdatedAt, Expr::value(now.fixed_offset()))
            .filter(Column::ExternalId.is_in(external_ids.to_vec()))
            .filter(Column::IsActive.eq(true))
            .exec(&self.db)
            .await?;

        Ok(result.rows_affected)
    }

    /// Archive every still-active listing whose `last_synced_at` predates
    /// `cutoff`, returning the affected external ids. Supports
    /// reconciliation after a full sweep resumed across invocations, where
    /// the in-memory seen-set of earlier invocations is gone.
    pub async fn stale_active_ids(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<i64>, RepositoryError> {
        let ids = Entity::find()
            .select_only()
            .column(Column::ExternalId)
            .filter(Column::IsActive.eq(true))
            .filter(Column::IsArchived.eq(false))
            .filter(Column::LastSyncedAt.lt(cutoff.fixed_offset()))
            .into_tuple::<i64>()
            .all(&self.db)
            .await?;
        Ok(ids)
    }

    /// The visibility condition catalog readers must apply: active, not in
    /// a removed status, and either unarchived or still inside the sold
    /// grace window.
    pub fn visibility_condition(now: DateTime<Utc>, grace_hours: i64) -> Condition {
        let grace_start = (now - Duration::hours(grace_hours)).fixed_offset();
        let removed: Vec<&str> = crate::models::listing::REMOVED_STATUSES
            .iter()
            .map(|s| s.as_str())
            .collect();

        Condition::all()
            .add(Column::IsActive.eq(true))
            .add(Column::Status.is_not_in(removed))
            .add(
                Condition::any()
                    .add(Column::IsArchived.eq(false))
                    .add(Column::ArchivedAt.is_null())
                    .add(
                        Condition::all()
                            .add(Column::ArchiveReason.eq("sold"))
                            .add(Column::ArchivedAt.gt(grace_start)),
                    ),
            )
    }

    /// List currently-visible listings, newest first.
    pub async fn list_visible(
        &self,
        now: DateTime<Utc>,
        grace_hours: i64,
        limit: u64,
        offset: u64,
    ) -> Result<Vec<Model>, RepositoryError> {
        let rows = Entity::find()
            .filter(Self::visibility_condition(now, grace_hours))
            .order_by_desc(Column::LastSyncedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await?;
        Ok(rows)
    }
}
