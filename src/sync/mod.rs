//! Inventory synchronization engine.
//!
//! [`supervisor::Supervisor`] drives one sweep end to end: paginated fetch
//! through a [`crate::feed::FeedSource`], validation and batched upserts
//! ([`batch`]), and the archival pass ([`lifecycle`]). [`retry`] is the
//! caller-side coordinator that wraps supervisor invocations over HTTP.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::sync_job::SyncType;

pub mod batch;
pub mod lifecycle;
pub mod retry;
pub mod supervisor;

pub use batch::{BatchOutcome, BatchUpserter};
pub use lifecycle::LifecycleManager;
pub use retry::{FailureCategory, RetryError, SyncClient};
pub use supervisor::{Clock, ShutdownReason, Supervisor, SyncFatal, SystemClock};

/// Invocation parameters for one sweep, as sent by a scheduler or trigger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncRequest {
    /// Sweep type (full | incremental)
    #[serde(default)]
    pub sync_type: SyncType,
    /// Incremental window: only records updated within this many minutes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u32>,
    /// Continue from the latest checkpoint of an unfinished sweep
    #[serde(default)]
    pub resume: bool,
    /// Explicit page to continue from, overriding the checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_page: Option<u32>,
}

impl Default for SyncRequest {
    fn default() -> Self {
        Self {
            sync_type: SyncType::Full,
            minutes: None,
            resume: false,
            from_page: None,
        }
    }
}

/// Result of one sweep invocation, returned to the trigger.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SyncReport {
    /// Whether the invocation finished without a fatal error
    pub success: bool,
    /// Id of the sync job row backing this invocation
    pub sync_id: Uuid,
    /// Raw feed records seen, including rejected ones
    pub records_processed: i32,
    /// Listings written to the cache
    pub cars_processed: i32,
    /// Listings archived or removed by the lifecycle pass
    pub archived_lots_processed: i32,
    /// Count of aggregated non-fatal errors
    pub errors_count: i32,
    /// Fraction of seen records that were written
    pub success_rate: f64,
    /// Why this invocation stopped
    pub shutdown_reason: ShutdownReason,
    /// True when the sweep enumerated the entire feed
    pub sweep_complete: bool,
    /// Highest page fully processed; resume continues after it
    pub current_page: i32,
    /// Page-count estimate learned from the feed
    pub total_pages: Option<i32>,
    /// When the invocation finished
    pub completed_at: DateTime<Utc>,
}
