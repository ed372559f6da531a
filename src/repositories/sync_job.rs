//! # SyncJob Repository
//!
//! Repository operations for the sync_jobs table: the single-flight guard,
//! the stale-job watchdog, and the checkpoint updates that make sweeps
//! resumable.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::is_unique_violation;
use crate::models::sync_job::{ActiveModel, Column, Entity, JobStatus, Model, SyncType};
use crate::repositories::RepositoryError;

/// Repository for sync job database operations
pub struct SyncJobRepository {
    db: DatabaseConnection,
}

impl SyncJobRepository {
    /// Create a new SyncJobRepository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Watchdog: fail `running` jobs with no activity for `stale_secs`.
    /// Returns the number of jobs transitioned.
    pub async fn fail_stale_running(
        &self,
        now: DateTime<Utc>,
        stale_secs: i64,
    ) -> Result<u64, RepositoryError> {
        let cutoff = (now - Duration::seconds(stale_secs)).fixed_offset();

        let result = Entity::update_many()
            .col_expr(
                Column::Status,
                Expr::value(JobStatus::Failed.as_str().to_string()),
            )
            .col_expr(
                Column::ErrorMessage,
                Expr::value(Some(
                    "Marked failed by watchdog: no activity for over an hour".to_string(),
                )),
            )
            .col_expr(Column::CompletedAt, Expr::value(Some(now.fixed_offset())))
            .filter(Column::Status.eq(JobStatus::Running.as_str()))
            .filter(Column::LastActivityAt.lt(cutoff))
            .exec(&self.db)
            .await?;

        if result.rows_affected > 0 {
            warn!(
                count = result.rows_affected,
                "Watchdog failed stale running sync jobs"
            );
        }

        Ok(result.rows_affected)
    }

    /// Find the currently running job, if any.
    pub async fn find_running(&self) -> Result<Option<Model>, RepositoryError> {
        let job = Entity::find()
            .filter(Column::Status.eq(JobStatus::Running.as_str()))
            .one(&self.db)
            .await?;
        Ok(job)
    }

    /// Create a new running job.
    ///
    /// `resumed_from` carries the checkpointed job being continued; its
    /// `sweep_started_at` is inherited so reconciliation can tell which
    /// listings the logical sweep observed. A unique-violation on the
    /// partial `running` index maps to [`RepositoryError::AlreadyRunning`].
    pub async fn create(
        &self,
        sync_type: SyncType,
        now: DateTime<Utc>,
        resumed_from: Option<&Model>,
    ) -> Result<Model, RepositoryError> {
        let now_fixed = now.fixed_offset();
        let sweep_started_at = resumed_from
            .map(|job| job.sweep_started_at)
            .unwrap_or(now_fixed);
        let current_page = resumed_from.map(|job| job.current_page).unwrap_or(0);

        let job = ActiveModel {
            id: Set(Uuid::new_v4()),
            sync_type: Set(sync_type.as_str().to_string()),
            status: Set(JobStatus::Running.as_str().to_string()),
            started_at: Set(now_fixed),
            sweep_started_at: Set(sweep_started_at),
            completed_at: Set(None),
            current_page: Set(current_page),
            total_pages: Set(resumed_from.and_then(|job| job.total_pages)),
            records_processed: Set(0),
            cars_processed: Set(0),
            archived_lots_processed: Set(0),
            errors: Set(None),
            error_message: Set(None),
            sweep_complete: Set(false),
            last_activity_at: Set(now_fixed),
        };

        let result = job.insert(&self.db).await.map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::AlreadyRunning
            } else {
                RepositoryError::Database(e)
            }
        })?;

        info!(
            job_id = %result.id,
            sync_type = %result.sync_type,
            resumed = resumed_from.is_some(),
            "Sync job created"
        );

        Ok(result)
    }

    /// Persist sweep progress. This row is the checkpoint a resumed
    /// invocation continues from.
    pub async fn checkpoint(
        &self,
        job_id: Uuid,
        current_page: i32,
        records_processed: i32,
        cars_processed: i32,
        errors: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let result = Entity::update_many()
            .col_expr(Column::CurrentPage, Expr::value(current_page))
            .col_expr(Column::RecordsProcessed, Expr::value(records_processed))
            .col_expr(Column::CarsProcessed, Expr::value(cars_processed))
            .col_expr(Column::Errors, Expr::value(Some(json!(errors))))
            .col_expr(Column::LastActivityAt, Expr::value(now.fixed_offset()))
            .filter(Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::JobNotFound(job_id));
        }
        Ok(())
    }

    /// Record the page-count estimate learned from the first page.
    pub async fn set_total_pages(
        &self,
        job_id: Uuid,
        total_pages: i32,
    ) -> Result<(), RepositoryError> {
        Entity::update_many()
            .col_expr(Column::TotalPages, Expr::value(Some(total_pages)))
            .filter(Column::Id.eq(job_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Finalize a job exactly once with its terminal status and aggregate
    /// counts.
    pub async fn finalize(
        &self,
        job_id: Uuid,
        status: JobStatus,
        error_message: Option<String>,
        archived_lots_processed: i32,
        sweep_complete: bool,
        now: DateTime<Utc>,
    ) -> Result<Model, RepositoryError> {
        let job = Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(RepositoryError::JobNotFound(job_id))?;

        let mut active: ActiveModel = job.into();
        active.status = Set(status.as_str().to_string());
        active.error_message = Set(error_message);
        active.archived_lots_processed = Set(archived_lots_processed);
        active.sweep_complete = Set(sweep_complete);
        active.completed_at = Set(Some(now.fixed_offset()));
        active.last_activity_at = Set(now.fixed_offset());

        Ok(active.update(&self.db).await?)
    }

    /// Find a job by id.
    pub async fn find_by_id(&self, job_id: Uuid) -> Result<Option<Model>, RepositoryError> {
        Ok(Entity::find_by_id(job_id).one(&self.db).await?)
    }

    /// Most recently started job, running or not.
    pub async fn find_latest(&self) -> Result<Option<Model>, RepositoryError> {
        let job = Entity::find()
            .order_by_desc(Column::StartedAt)
            .one(&self.db)
            .await?;
        Ok(job)
    }

    /// Most recent terminal job of the given type, used to locate the
    /// checkpoint when `resume=true`.
    pub async fn find_latest_resumable(
        &self,
        sync_type: SyncType,
    ) -> Result<Option<Model>, RepositoryError> {
        let job = Entity::find()
            .filter(Column::SyncType.eq(sync_type.as_str()))
            .filter(Column::Status.ne(JobStatus::Running.as_str()))
            .filter(Column::SweepComplete.eq(false))
            .order_by_desc(Column::StartedAt)
            .one(&self.db)
            .await?;
        Ok(job)
    }
}
