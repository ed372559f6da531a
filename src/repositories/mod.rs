//! # Repositories
//!
//! Repository structs encapsulating SeaORM operations per table. Handlers
//! and the sync engine go through these instead of touching entities
//! directly.

use thiserror::Error;

pub mod cleanup_queue;
pub mod listing;
pub mod sync_job;

pub use cleanup_queue::CleanupQueueRepository;
pub use listing::ListingRepository;
pub use sync_job::SyncJobRepository;

/// Errors surfaced by repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("sync job {0} not found")]
    JobNotFound(uuid::Uuid),

    /// The single-flight guard rejected a second running sync job.
    #[error("a sync job is already running")]
    AlreadyRunning,
}

impl From<RepositoryError> for crate::error::ApiError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(db_err) => db_err.into(),
            RepositoryError::JobNotFound(id) => crate::error::ApiError::new(
                axum::http::StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Sync job not found: {}", id),
            ),
            RepositoryError::AlreadyRunning => crate::error::ApiError::new(
                axum::http::StatusCode::CONFLICT,
                "SYNC_ALREADY_RUNNING",
                "A sync job is already running",
            ),
        }
    }
}
