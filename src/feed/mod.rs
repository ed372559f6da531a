//! External inventory feed access.
//!
//! The [`FeedSource`] trait is the seam between the sweep supervisor and the
//! upstream auction API: the HTTP [`client::FeedClient`] implements it in
//! production, and tests drive the supervisor through scripted sources.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

pub mod client;
pub mod extract;
pub mod hash;
pub mod transform;

pub use client::FeedClient;
pub use transform::{CanonicalListing, transform};

/// One page of raw feed records plus pagination metadata.
#[derive(Debug, Clone)]
pub struct FeedPage {
    /// Page number this response corresponds to
    pub page: u32,
    /// Raw records as delivered by the feed
    pub records: Vec<JsonValue>,
    /// Whether more pages follow
    pub has_more: bool,
    /// Feed-reported total record count, when available
    pub total_estimate: Option<u64>,
}

/// Feed access error taxonomy.
///
/// `RateLimitExceeded`, `Timeout`, `Network` and `Upstream` are page-fatal:
/// the sweep records them and continues with the next page. `Configuration`
/// is sweep-fatal.
#[derive(Debug, Clone, Error)]
pub enum FeedError {
    #[error("Rate limit exceeded for page {page} after {attempts} attempts")]
    RateLimitExceeded { page: u32, attempts: u32 },

    #[error("Request for page {page} timed out after {timeout_secs}s")]
    Timeout { page: u32, timeout_secs: u64 },

    #[error("Network error fetching page {page}: {details}")]
    Network { page: u32, details: String },

    #[error("Feed returned status {status} for page {page}: {body}")]
    Upstream { page: u32, status: u16, body: String },

    #[error("Malformed feed response for page {page}: {details}")]
    MalformedResponse { page: u32, details: String },

    #[error("Feed configuration error: {details}")]
    Configuration { details: String },
}

impl FeedError {
    /// Sweep-fatal errors abort the whole invocation rather than a single page.
    pub fn is_sweep_fatal(&self) -> bool {
        matches!(self, FeedError::Configuration { .. })
    }
}

/// Paginated access to the external inventory feed.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch one page of raw records.
    ///
    /// `since_minutes` restricts the response to records updated within the
    /// given window (incremental sweeps). Page numbers start at 1.
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        since_minutes: Option<u32>,
    ) -> Result<FeedPage, FeedError>;
}
