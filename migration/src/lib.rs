//! Database migrations for the lotsync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_12_01_100000_create_listings;
mod m2025_12_01_100100_create_sync_jobs;
mod m2025_12_01_100200_create_cleanup_queue;
mod m2025_12_01_100300_add_sync_job_running_guard;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_12_01_100000_create_listings::Migration),
            Box::new(m2025_12_01_100100_create_sync_jobs::Migration),
            Box::new(m2025_12_01_100200_create_cleanup_queue::Migration),
            Box::new(m2025_12_01_100300_add_sync_job_running_guard::Migration),
        ]
    }
}
