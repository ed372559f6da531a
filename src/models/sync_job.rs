//! SyncJob entity model
//!
//! SeaORM entity for the sync_jobs table. One row per sweep invocation;
//! the row doubles as the resume checkpoint. A partial unique index on
//! `status = 'running'` enforces the single-flight invariant.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use std::fmt;
use uuid::Uuid;

/// SyncJob entity representing one sweep invocation
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "sync_jobs")]
pub struct Model {
    /// Unique identifier for the sync job (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Type of sweep (full | incremental)
    pub sync_type: String,

    /// Current status (running | completed | completed_with_errors | failed)
    pub status: String,

    /// Timestamp when this invocation started
    pub started_at: DateTimeWithTimeZone,

    /// Logical sweep epoch, inherited from the resumed job when `resume=true`
    pub sweep_started_at: DateTimeWithTimeZone,

    /// Timestamp when this invocation finished
    pub completed_at: Option<DateTimeWithTimeZone>,

    /// Highest feed page fully processed; resume continues from the next one
    pub current_page: i32,

    /// Estimated total page count, learned from the first page response
    pub total_pages: Option<i32>,

    /// Raw feed records seen, including rejected ones
    pub records_processed: i32,

    /// Listings written to the cache
    pub cars_processed: i32,

    /// Listings archived or removed by the lifecycle pass
    pub archived_lots_processed: i32,

    /// Aggregated non-fatal error strings
    #[sea_orm(column_type = "JsonBinary")]
    pub errors: Option<JsonValue>,

    /// Fatal error description when status = failed
    pub error_message: Option<String>,

    /// True once the sweep has enumerated the entire feed
    pub sweep_complete: bool,

    /// Watchdog heartbeat; stale running jobs are failed after one hour
    pub last_activity_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Canonical registry of sweep types.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
    utoipa::ToSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SyncType {
    #[default]
    Full,
    Incremental,
}

impl SyncType {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncType::Full => "full",
            SyncType::Incremental => "incremental",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Some(SyncType::Full),
            "incremental" => Some(SyncType::Incremental),
            _ => None,
        }
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical registry of job statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Running,
    Completed,
    CompletedWithErrors,
    Failed,
}

impl JobStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
