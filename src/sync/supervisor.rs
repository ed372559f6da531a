//! Sweep execution supervisor.
//!
//! Drives one sync job end to end within the wall-clock budget of a single
//! invocation: stale-job watchdog, single-flight guard, bounded-concurrency
//! page fan-out, per-group checkpointing, and the archival pass for
//! completed full sweeps. Exceeding the budget is not an error; progress is
//! checkpointed and the caller re-invokes with `resume=true` to continue.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::feed::{FeedError, FeedPage, FeedSource};
use crate::models::sync_job::{JobStatus, Model as SyncJob, SyncType};
use crate::repositories::{ListingRepository, RepositoryError, SyncJobRepository};
use crate::sync::batch::BatchUpserter;
use crate::sync::lifecycle::LifecycleManager;
use crate::sync::{SyncReport, SyncRequest};

/// Pause between concurrent page groups, on top of the client-side
/// inter-request interval.
const GROUP_PAUSE: Duration = Duration::from_millis(100);

/// Cap on error strings carried in memory and persisted on the job row.
/// The total count is tracked separately and is never capped.
const MAX_TRACKED_ERRORS: usize = 100;

/// Injectable time source so budget and staleness checks are deterministic
/// in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading system time.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Why a sweep invocation stopped. Emitted as a structured event for
/// observability; not used for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownReason {
    /// The sweep enumerated every page it set out to cover
    NaturalCompletion,
    /// The wall-clock budget lapsed; progress was checkpointed
    ExecutionTimeLimit,
    /// The per-invocation page cap was reached; progress was checkpointed
    BatchComplete,
    /// Required configuration is absent
    MissingEnvironmentVariables,
    /// The storage layer was unreachable at startup
    DependencyInitFailed,
    /// An unexpected error aborted the sweep
    TopLevelException,
}

impl ShutdownReason {
    pub const fn as_str(self) -> &'static str {
        match self {
            ShutdownReason::NaturalCompletion => "natural_completion",
            ShutdownReason::ExecutionTimeLimit => "execution_time_limit",
            ShutdownReason::BatchComplete => "batch_complete",
            ShutdownReason::MissingEnvironmentVariables => "missing_environment_variables",
            ShutdownReason::DependencyInitFailed => "dependency_init_failed",
            ShutdownReason::TopLevelException => "top_level_exception",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sweep-fatal failures surfaced to the trigger.
#[derive(Debug, Error)]
pub enum SyncFatal {
    /// The single-flight guard refused a second concurrent sweep.
    #[error("a sync job is already running (id {running_job_id})")]
    AlreadyRunning { running_job_id: Uuid },

    #[error("missing required configuration: {details}")]
    MissingEnvironment { details: String },

    #[error("dependency initialization failed: {details}")]
    DependencyInit { details: String },

    #[error("sweep {sync_id} aborted: {details}")]
    Aborted { sync_id: Uuid, details: String },
}

/// Emit the structured shutdown/completion event for one invocation.
pub fn emit_shutdown(
    reason: ShutdownReason,
    elapsed_secs: i64,
    records_processed: i32,
    errors_count: i32,
) {
    counter!("sync_shutdowns_total", "reason" => reason.as_str()).increment(1);
    histogram!("sync_invocation_seconds").record(elapsed_secs as f64);
    info!(
        reason = reason.as_str(),
        elapsed_secs,
        records_processed,
        errors_count,
        "Sweep invocation finished"
    );
}

/// Internal abort carrying the reason to finalize and emit with.
struct SweepAbort {
    reason: ShutdownReason,
    message: String,
}

impl From<RepositoryError> for SweepAbort {
    fn from(error: RepositoryError) -> Self {
        SweepAbort {
            reason: ShutdownReason::TopLevelException,
            message: format!("storage error: {}", error),
        }
    }
}

/// Mutable state accumulated over one invocation.
#[derive(Default)]
struct SweepState {
    records_processed: i32,
    cars_processed: i32,
    errors: Vec<String>,
    errors_total: usize,
    seen: HashSet<i64>,
    page_failures: usize,
    current_page: i32,
    pages_this_invocation: u32,
}

impl SweepState {
    fn push_error(&mut self, error: String) {
        self.errors_total += 1;
        if self.errors.len() < MAX_TRACKED_ERRORS {
            self.errors.push(error);
        }
    }

    fn absorb_page(&mut self, outcome: crate::sync::batch::BatchOutcome) {
        self.records_processed += outcome.attempted as i32;
        self.cars_processed += outcome.written as i32;
        self.errors_total += outcome.errors.len();
        for error in outcome.errors {
            if self.errors.len() < MAX_TRACKED_ERRORS {
                self.errors.push(error);
            }
        }
        self.seen.extend(outcome.external_ids);
    }
}

/// Orchestrates one sweep per invocation.
pub struct Supervisor {
    db: DatabaseConnection,
    feed: Arc<dyn FeedSource>,
    jobs: SyncJobRepository,
    batcher: BatchUpserter,
    lifecycle: LifecycleManager,
    config: SyncConfig,
    page_size: u32,
    clock: Arc<dyn Clock>,
}

impl Supervisor {
    pub fn new(
        db: DatabaseConnection,
        feed: Arc<dyn FeedSource>,
        config: SyncConfig,
        page_size: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let batcher = BatchUpserter::new(
            ListingRepository::new(db.clone()),
            config.batch_size,
            config.batch_validity_threshold,
        );
        let lifecycle = LifecycleManager::new(db.clone(), config.grace_period_hours);
        Self {
            jobs: SyncJobRepository::new(db.clone()),
            db,
            feed,
            batcher,
            lifecycle,
            config,
            page_size,
            clock,
        }
    }

    /// Run one sweep invocation.
    #[instrument(skip_all, fields(sync_type = %request.sync_type, resume = request.resume))]
    pub async fn run(&self, request: SyncRequest) -> Result<SyncReport, SyncFatal> {
        let started = self.clock.now();

        if let Err(e) = crate::db::health_check(&self.db).await {
            emit_shutdown(ShutdownReason::DependencyInitFailed, 0, 0, 0);
            return Err(SyncFatal::DependencyInit {
                details: e.to_string(),
            });
        }

        self.jobs
            .fail_stale_running(started, self.config.stale_job_secs)
            .await
            .map_err(|e| SyncFatal::DependencyInit {
                details: e.to_string(),
            })?;

        if let Some(running) = self
            .jobs
            .find_running()
            .await
            .map_err(|e| SyncFatal::DependencyInit {
                details: e.to_string(),
            })?
        {
            return Err(SyncFatal::AlreadyRunning {
                running_job_id: running.id,
            });
        }

        let resumed_from = if request.resume {
            self.jobs
                .find_latest_resumable(request.sync_type)
                .await
                .map_err(|e| SyncFatal::DependencyInit {
                    details: e.to_string(),
                })?
        } else {
            None
        };

        let job = match self
            .jobs
            .create(request.sync_type, started, resumed_from.as_ref())
            .await
        {
            Ok(job) => job,
            Err(RepositoryError::AlreadyRunning) => {
                // Lost the insert race; report the winner's id.
                let running_job_id = self
                    .jobs
                    .find_running()
                    .await
                    .ok()
                    .flatten()
                    .map(|j| j.id)
                    .unwrap_or_else(Uuid::nil);
                return Err(SyncFatal::AlreadyRunning { running_job_id });
            }
            Err(e) => {
                return Err(SyncFatal::DependencyInit {
                    details: e.to_string(),
                });
            }
        };

        match self
            .run_sweep(&request, &job, resumed_from.as_ref(), started)
            .await
        {
            Ok(report) => Ok(report),
            Err(abort) => {
                let now = self.clock.now();
                let elapsed = (now - started).num_seconds();
                if let Err(e) = self
                    .jobs
                    .finalize(
                        job.id,
                        JobStatus::Failed,
                        Some(abort.message.clone()),
                        0,
                        false,
                        now,
                    )
                    .await
                {
                    warn!(error = %e, job_id = %job.id, "Failed to finalize aborted job");
                }
                emit_shutdown(abort.reason, elapsed, 0, 1);
                Err(match abort.reason {
                    ShutdownReason::MissingEnvironmentVariables => SyncFatal::MissingEnvironment {
                        details: abort.message,
                    },
                    _ => SyncFatal::Aborted {
                        sync_id: job.id,
                        details: abort.message,
                    },
                })
            }
        }
    }

    async fn run_sweep(
        &self,
        request: &SyncRequest,
        job: &SyncJob,
        resumed_from: Option<&SyncJob>,
        started: DateTime<Utc>,
    ) -> Result<SyncReport, SweepAbort> {
        let start_page = request
            .from_page
            .or_else(|| resumed_from.map(|j| j.current_page.max(1) as u32))
            .unwrap_or(1)
            .max(1);

        let mut state = SweepState {
            current_page: start_page as i32 - 1,
            ..SweepState::default()
        };

        // Page 1 (or the resume page) sizes the sweep; the sweep cannot be
        // planned without it, so its failure aborts rather than isolates.
        let first = self
            .feed
            .fetch_page(start_page, self.page_size, request.minutes)
            .await
            .map_err(|e| self.page_abort(e))?;

        let total_pages = first
            .total_estimate
            .map(|total| total.div_ceil(self.page_size as u64).max(1) as u32);
        if let Some(total) = total_pages {
            self.jobs.set_total_pages(job.id, total as i32).await?;
        }

        let mut has_more = first.has_more;
        state.absorb_page(self.batcher.upsert_raw(&first.records, self.clock.now()).await);
        state.current_page = start_page as i32;
        state.pages_this_invocation = 1;
        self.checkpoint(job, &state).await?;

        let mut next_page = start_page + 1;
        let mut reason = ShutdownReason::NaturalCompletion;

        loop {
            let done = match total_pages {
                Some(total) => next_page > total,
                None => !has_more,
            };
            if done {
                break;
            }

            let elapsed = (self.clock.now() - started).num_seconds();
            if elapsed >= self.config.max_execution_secs as i64 {
                reason = ShutdownReason::ExecutionTimeLimit;
                break;
            }
            if let Some(cap) = self.config.max_pages_per_invocation {
                if state.pages_this_invocation >= cap {
                    reason = ShutdownReason::BatchComplete;
                    break;
                }
            }

            // Fan out the next group; without a page-count estimate the feed
            // is probed sequentially until it reports no further pages.
            let group: Vec<u32> = match total_pages {
                Some(total) => {
                    let end = (next_page + self.config.page_concurrency as u32 - 1).min(total);
                    (next_page..=end).collect()
                }
                None => vec![next_page],
            };

            let mut tasks = JoinSet::new();
            for page in group.iter().copied() {
                let feed = Arc::clone(&self.feed);
                let page_size = self.page_size;
                let minutes = request.minutes;
                tasks.spawn(async move { (page, feed.fetch_page(page, page_size, minutes).await) });
            }

            let mut results: Vec<(u32, Result<FeedPage, FeedError>)> = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(pair) => results.push(pair),
                    Err(join_error) => {
                        state.page_failures += 1;
                        state.push_error(format!("Page task failed: {}", join_error));
                    }
                }
            }
            // Keep feed order within the group; cross-group order is free.
            results.sort_by_key(|(page, _)| *page);

            for (page, result) in results {
                match result {
                    Ok(feed_page) => {
                        if total_pages.is_none() {
                            has_more = feed_page.has_more;
                        }
                        let outcome = self
                            .batcher
                            .upsert_raw(&feed_page.records, self.clock.now())
                            .await;
                        state.absorb_page(outcome);
                    }
                    Err(e) if e.is_sweep_fatal() => return Err(self.page_abort(e)),
                    Err(e) => {
                        counter!("sync_page_failures_total").increment(1);
                        warn!(page, error = %e, "Page failed, continuing sweep");
                        state.page_failures += 1;
                        state.push_error(e.to_string());
                    }
                }
            }

            let last_in_group = *group.last().expect("group is never empty");
            state.current_page = last_in_group as i32;
            state.pages_this_invocation += group.len() as u32;
            next_page = last_in_group + 1;

            self.checkpoint(job, &state).await?;

            if state.page_failures >= self.config.page_error_cap {
                return Err(SweepAbort {
                    reason: ShutdownReason::TopLevelException,
                    message: format!(
                        "aborted after {} page failures (cap {})",
                        state.page_failures, self.config.page_error_cap
                    ),
                });
            }

            sleep(GROUP_PAUSE).await;
        }

        let sweep_complete = reason == ShutdownReason::NaturalCompletion;

        // Reconciliation only runs once the sweep has enumerated the whole
        // feed, and only for full sweeps: an incremental window says nothing
        // about records outside it.
        let mut archived_lots: u64 = 0;
        if sweep_complete && request.sync_type == SyncType::Full {
            let now = self.clock.now();
            let reconciled = if start_page <= 1 {
                self.lifecycle.reconcile_sweep(&state.seen, now).await?
            } else {
                let sweep_epoch = job.sweep_started_at.with_timezone(&Utc);
                self.lifecycle.reconcile_unseen_since(sweep_epoch, now).await?
            };
            let promoted = self.lifecycle.promote_grace_to_removed(now).await?;
            archived_lots = reconciled + promoted;
        }

        let completed_at = self.clock.now();
        let elapsed = (completed_at - started).num_seconds();
        let error_rate = state.errors_total as f64 / state.records_processed.max(1) as f64;
        let status = if state.errors_total == 0 || error_rate < self.config.error_rate_threshold {
            JobStatus::Completed
        } else {
            JobStatus::CompletedWithErrors
        };

        self.checkpoint(job, &state).await?;
        let finalized = self
            .jobs
            .finalize(
                job.id,
                status,
                None,
                archived_lots as i32,
                sweep_complete,
                completed_at,
            )
            .await?;

        emit_shutdown(
            reason,
            elapsed,
            state.records_processed,
            state.errors_total as i32,
        );

        let success_rate = if state.records_processed > 0 {
            state.cars_processed as f64 / state.records_processed as f64
        } else {
            1.0
        };

        Ok(SyncReport {
            success: true,
            sync_id: finalized.id,
            records_processed: state.records_processed,
            cars_processed: state.cars_processed,
            archived_lots_processed: archived_lots as i32,
            errors_count: state.errors_total as i32,
            success_rate,
            shutdown_reason: reason,
            sweep_complete,
            current_page: state.current_page,
            total_pages: total_pages.map(|t| t as i32),
            completed_at,
        })
    }

    async fn checkpoint(&self, job: &SyncJob, state: &SweepState) -> Result<(), SweepAbort> {
        self.jobs
            .checkpoint(
                job.id,
                state.current_page,
                state.records_processed,
                state.cars_processed,
                &state.errors,
                self.clock.now(),
            )
            .await?;
        Ok(())
    }

    fn page_abort(&self, error: FeedError) -> SweepAbort {
        let reason = if error.is_sweep_fatal() {
            ShutdownReason::MissingEnvironmentVariables
        } else {
            ShutdownReason::TopLevelException
        };
        SweepAbort {
            reason,
            message: error.to_string(),
        }
    }
}
