//! Listing lifecycle and archival management.
//!
//! State machine per listing: active -> archived-with-grace (sold, still
//! visible) -> removed (invisible). Reconciliation archives listings that
//! disappeared from a full sweep; grace promotion removes them once the
//! 24h window lapses; immediate removal and administrative bulk delete
//! skip the window. Every transition into a removed status enqueues a
//! cleanup entry for the listing's images.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use sea_orm::DatabaseConnection;
use tracing::info;

use crate::models::listing::{ListingStatus, Model as Listing};
use crate::repositories::{CleanupQueueRepository, ListingRepository, RepositoryError};

/// Manages archival transitions and the visibility contract.
pub struct LifecycleManager {
    listings: ListingRepository,
    cleanup: CleanupQueueRepository,
    grace_hours: i64,
}

impl LifecycleManager {
    pub fn new(db: DatabaseConnection, grace_hours: i64) -> Self {
        Self {
            listings: ListingRepository::new(db.clone()),
            cleanup: CleanupQueueRepository::new(db),
            grace_hours,
        }
    }

    /// Archive previously-active listings absent from the current full
    /// sweep, with reason "sold". They remain visible until the grace
    /// window lapses. Must only be called for sweeps that enumerated the
    /// entire feed; incremental sweeps never reconcile.
    pub async fn reconcile_sweep(
        &self,
        seen_external_ids: &HashSet<i64>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let active = self.listings.active_external_ids().await?;
        let unseen: Vec<i64> = active
            .into_iter()
            .filter(|id| !seen_external_ids.contains(id))
            .collect();

        let archived = self.listings.archive_as_sold(&unseen, now).await?;
        if archived > 0 {
            info!(archived, "Reconciliation archived listings missing from sweep");
        }
        Ok(archived)
    }

    /// Reconciliation variant for sweeps resumed across invocations: the
    /// earlier invocations' seen-sets are gone, but every record they
    /// observed had its `last_synced_at` refreshed, so any still-active
    /// listing last synced before the sweep epoch was not observed at all.
    pub async fn reconcile_unseen_since(
        &self,
        sweep_started_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let stale = self.listings.stale_active_ids(sweep_started_at).await?;
        let archived = self.listings.archive_as_sold(&stale, now).await?;
        if archived > 0 {
            info!(archived, "Cutoff reconciliation archived stale listings");
        }
        Ok(archived)
    }

    /// Remove listings whose sold grace window has lapsed. The boundary is
    /// exclusive: a listing archived exactly 24h ago is removed.
    pub async fn promote_grace_to_removed(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let cutoff = now - Duration::hours(self.grace_hours);
        let expired = self.listings.find_grace_expired(cutoff).await?;
        self.remove(&expired, ListingStatus::RemovedAfterSold, now)
            .await
    }

    /// Remove the given listings immediately, bypassing the grace window.
    pub async fn immediate_removal(
        &self,
        external_ids: &[i64],
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let candidates = self.listings.find_active_among(external_ids).await?;
        self.remove(
            &candidates,
            ListingStatus::ImmediatelyRemovedAfterSold,
            now,
        )
        .await
    }

    /// Administrative bulk removal. Only currently-active listings among
    /// the given ids are deactivated and counted; already-inactive ids are
    /// ignored, making repeated calls idempotent.
    pub async fn bulk_delete(
        &self,
        external_ids: &[i64],
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let candidates = self.listings.find_active_among(external_ids).await?;
        let deleted = self
            .remove(&candidates, ListingStatus::AdminBulkDelete, now)
            .await?;
        if deleted > 0 {
            info!(deleted, reason, "Bulk delete deactivated listings");
        }
        Ok(deleted)
    }

    async fn remove(
        &self,
        candidates: &[Listing],
        status: ListingStatus,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if candidates.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = candidates.iter().map(|l| l.external_id).collect();
        let removed = self.listings.deactivate(&ids, status, now).await?;

        let cleanup_entries = candidates
            .iter()
            .map(|l| (l.external_id, l.images.clone()))
            .collect();
        self.cleanup.enqueue(cleanup_entries, now).await?;

        Ok(removed)
    }

    /// The visibility predicate catalog collaborators must apply instead of
    /// re-deriving it: active, not removed, and either unarchived or still
    /// inside the sold grace window.
    pub fn is_visible(listing: &Listing, now: DateTime<Utc>, grace_hours: i64) -> bool {
        if !listing.is_active {
            return false;
        }

        let removed = crate::models::listing::REMOVED_STATUSES
            .iter()
            .any(|s| s.as_str() == listing.status);
        if removed {
            return false;
        }

        if !listing.is_archived {
            return true;
        }
        let Some(archived_at) = listing.archived_at else {
            return true;
        };

        listing.archive_reason.as_deref() == Some("sold")
            && now.signed_duration_since(archived_at.with_timezone(&Utc))
                < Duration::hours(grace_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn listing() -> Listing {
        let now = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        Listing {
            external_id: 1,
            make: "Tesla".into(),
            model: "Model 3".into(),
            year: 2022,
            price: 20000,
            mileage: 30000,
            title: "2022 Tesla Model 3".into(),
            vin: None,
            color: None,
            fuel: None,
            transmission: None,
            lot_number: None,
            image_url: None,
            images: None,
            condition: "good".into(),
            is_live: false,
            keys_available: false,
            status: "active".into(),
            is_active: true,
            is_archived: false,
            archived_at: None,
            archive_reason: None,
            content_hash: "h".into(),
            last_synced_at: now.fixed_offset(),
            created_at: now.fixed_offset(),
            updated_at: now.fixed_offset(),
        }
    }

    #[test]
    fn active_listing_is_visible() {
        let now = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
        assert!(LifecycleManager::is_visible(&listing(), now, 24));
    }

    #[test]
    fn inactive_listing_is_never_visible() {
        let now = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
        let mut l = listing();
        l.is_active = false;
        assert!(!LifecycleManager::is_visible(&l, now, 24));
    }

    #[test]
    fn removed_status_hides_listing_regardless_of_archival() {
        let now = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
        for status in ["removed_after_sold", "immediately_removed_after_sold", "admin_bulk_delete"]
        {
            let mut l = listing();
            l.status = status.into();
            assert!(!LifecycleManager::is_visible(&l, now, 24), "{status}");
        }
    }

    #[test]
    fn sold_listing_visible_inside_grace_window() {
        let archived = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let mut l = listing();
        l.is_archived = true;
        l.archived_at = Some(archived.fixed_offset());
        l.archive_reason = Some("sold".into());
        l.status = "sold".into();

        // 23 hours later: still visible.
        let now = archived + Duration::hours(23);
        assert!(LifecycleManager::is_visible(&l, now, 24));

        // Exactly 24 hours: the boundary is exclusive, no longer visible.
        let now = archived + Duration::hours(24);
        assert!(!LifecycleManager::is_visible(&l, now, 24));

        // 25 hours later: not visible.
        let now = archived + Duration::hours(25);
        assert!(!LifecycleManager::is_visible(&l, now, 24));
    }

    #[test]
    fn archived_without_timestamp_stays_visible() {
        let now = Utc.with_ymd_and_hms(2026, 8, 2, 12, 0, 0).unwrap();
        let mut l = listing();
        l.is_archived = true;
        l.archived_at = None;
        assert!(LifecycleManager::is_visible(&l, now, 24));
    }

    #[test]
    fn non_sold_archive_reason_is_not_grace_eligible() {
        let archived = Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap();
        let mut l = listing();
        l.is_archived = true;
        l.archived_at = Some(archived.fixed_offset());
        l.archive_reason = Some("manual".into());

        let now = archived + Duration::hours(1);
        assert!(!LifecycleManager::is_visible(&l, now, 24));
    }
}
