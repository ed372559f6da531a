//! Adds a partial unique index preventing two concurrently running sync jobs.
//!
//! The single-flight invariant is enforced at the storage layer so that a
//! race between two sweep triggers surfaces as a unique violation on the
//! second insert rather than two `running` rows.

use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::{DatabaseBackend, Statement};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();
        match backend {
            DatabaseBackend::Postgres => {
                manager
                    .get_connection()
                    .execute(Statement::from_string(
                        backend,
                        "DO $$\nBEGIN\n    IF NOT EXISTS (\n        SELECT 1 FROM pg_indexes\n        WHERE schemaname = current_schema()\n          AND indexname = 'idx_sync_jobs_single_running'\n    ) THEN\n        CREATE UNIQUE INDEX idx_sync_jobs_single_running\n            ON sync_jobs (status)\n            WHERE status = 'running';\n    END IF;\nEND\n$$;"
                            .to_string(),
                    ))
                    .await
                    .map(|_| ())
            }
            _ => manager
                .get_connection()
                .execute(Statement::from_string(
                    backend,
                    "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_jobs_single_running \
                     ON sync_jobs (status) \
                     WHERE status = 'running'"
                        .to_string(),
                ))
                .await
                .map(|_| ()),
        }
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute(Statement::from_string(
                manager.get_database_backend(),
                "DROP INDEX IF EXISTS idx_sync_jobs_single_running",
            ))
            .await
            .map(|_| ())
    }
}
