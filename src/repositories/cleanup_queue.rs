//! # CleanupQueue Repository
//!
//! Produces cleanup_queue entries when listings transition into a removed
//! status. The entries are consumed by an external asset-cleanup worker.

use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::models::cleanup_queue::{ActiveModel, Column, Entity, Model};
use crate::repositories::RepositoryError;

/// Repository for cleanup queue database operations
pub struct CleanupQueueRepository {
    db: DatabaseConnection,
}

impl CleanupQueueRepository {
    /// Create a new CleanupQueueRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueue cleanup entries for removed listings. Each tuple carries the
    /// listing's external id and its image URL list.
    pub async fn enqueue(
        &self,
        removals: Vec<(i64, Option<JsonValue>)>,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        if removals.is_empty() {
            return Ok(0);
        }

        let now_fixed = now.fixed_offset();
        let entries: Vec<ActiveModel> = removals
            .into_iter()
            .map(|(listing_id, image_urls)| ActiveModel {
                id: Set(Uuid::new_v4()),
                listing_id: Set(listing_id),
                image_urls: Set(image_urls),
                status: Set("pending".to_string()),
                queued_at: Set(now_fixed),
            })
            .collect();

        let count = entries.len() as u64;
        Entity::insert_many(entries)
            .exec_without_returning(&self.db)
            .await?;
        Ok(count)
    }

    /// Pending entries, oldest first; read by the external cleanup worker.
    pub async fn pending(&self) -> Result<Vec<Model>, RepositoryError> {
        let rows = Entity::find()
            .filter(Column::Status.eq("pending"))
            .all(&self.db)
            .await?;
        Ok(rows)
    }
}
