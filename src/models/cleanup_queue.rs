//! CleanupQueueEntry entity model
//!
//! SeaORM entity for the cleanup_queue table. One row is produced whenever
//! a listing transitions into any removed status, carrying the image URLs
//! an external asset-cleanup worker should delete.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cleanup_queue")]
pub struct Model {
    /// Unique identifier for the queue entry (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// External id of the removed listing
    pub listing_id: i64,

    /// Image URLs to delete
    #[sea_orm(column_type = "JsonBinary")]
    pub image_urls: Option<JsonValue>,

    /// Processing status, owned by the external cleanup worker
    pub status: String,

    /// Timestamp the entry was enqueued
    pub queued_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
