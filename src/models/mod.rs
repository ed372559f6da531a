//! # Data Models
//!
//! This module contains all the data models used throughout the lotsync service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod cleanup_queue;
pub mod listing;
pub mod sync_job;

pub use cleanup_queue::Entity as CleanupQueue;
pub use listing::Entity as Listing;
pub use sync_job::Entity as SyncJob;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "lotsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
