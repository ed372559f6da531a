//! Caller-side retry coordinator.
//!
//! [`SyncClient`] wraps the HTTP invocation of the sweep supervisor from a
//! scheduler or UI action. Each failed attempt is classified into a
//! category with a recoverability verdict and a base backoff; retries run
//! in an explicit bounded loop with jitter, never recursion, so the
//! attempt ceiling is trivially testable. The coordinator refuses to start
//! while a previous invocation is still in flight.

use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::config::RetryPolicyConfig;
use crate::sync::{SyncReport, SyncRequest};

/// Failure categories for sweep invocation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    Network,
    Timeout,
    Auth,
    Server,
    Config,
    Deployment,
}

/// Retry policy for one failure category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CategoryPolicy {
    pub recoverable: bool,
    pub base_delay_ms: u64,
}

impl FailureCategory {
    /// Classify an invocation failure by its message.
    ///
    /// Non-recoverable categories are matched first: retrying an
    /// unreachable deployment or a credential failure cannot succeed.
    pub fn classify(message: &str) -> Self {
        let msg = message.to_ascii_lowercase();

        if msg.contains("edge function not accessible")
            || (msg.contains("not accessible") && msg.contains("connection"))
            || msg.contains("function not found")
        {
            return FailureCategory::Deployment;
        }
        if msg.contains("unauthorized")
            || msg.contains("invalid api key")
            || msg.contains("401")
            || msg.contains("403")
        {
            return FailureCategory::Auth;
        }
        if msg.contains("environment variable")
            || msg.contains("configuration")
            || msg.contains("missing required")
        {
            return FailureCategory::Config;
        }
        if msg.contains("timed out") || msg.contains("timeout") {
            return FailureCategory::Timeout;
        }
        if msg.contains("500")
            || msg.contains("502")
            || msg.contains("503")
            || msg.contains("internal server error")
            || msg.contains("conflict")
        {
            return FailureCategory::Server;
        }
        // "fetch failed", refused connections, DNS errors and anything else
        // unrecognized get the network treatment: recoverable with backoff.
        FailureCategory::Network
    }

    pub const fn policy(self) -> CategoryPolicy {
        match self {
            FailureCategory::Network => CategoryPolicy {
                recoverable: true,
                base_delay_ms: 3000,
            },
            FailureCategory::Timeout => CategoryPolicy {
                recoverable: true,
                base_delay_ms: 5000,
            },
            FailureCategory::Server => CategoryPolicy {
                recoverable: true,
                base_delay_ms: 2000,
            },
            FailureCategory::Auth
            | FailureCategory::Config
            | FailureCategory::Deployment => CategoryPolicy {
                recoverable: false,
                base_delay_ms: 0,
            },
        }
    }
}

/// Terminal outcomes of a coordinated invocation.
#[derive(Debug, Error)]
pub enum RetryError {
    #[error("a sync invocation is already in flight")]
    AlreadyInFlight,

    #[error("non-recoverable {category:?} failure: {message}")]
    NonRecoverable {
        category: FailureCategory,
        message: String,
    },

    #[error("gave up after {attempts} attempts ({category:?}): {message}")]
    Exhausted {
        attempts: u32,
        category: FailureCategory,
        message: String,
    },
}

/// HTTP client invoking the sweep supervisor with classified retries.
pub struct SyncClient {
    http: reqwest::Client,
    base_url: String,
    config: RetryPolicyConfig,
    in_flight: Mutex<()>,
}

impl SyncClient {
    pub fn new(base_url: impl Into<String>, config: RetryPolicyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            config,
            in_flight: Mutex::new(()),
        }
    }

    /// Trigger a sweep, retrying recoverable failures with jittered backoff.
    pub async fn start_sync(&self, request: &SyncRequest) -> Result<SyncReport, RetryError> {
        let _guard = self
            .in_flight
            .try_lock()
            .map_err(|_| RetryError::AlreadyInFlight)?;

        if self.config.preflight {
            // Advisory only: a failed probe is logged but never blocks the
            // first real attempt.
            if let Err(probe_error) = self.probe().await {
                warn!(error = %probe_error, "Connectivity preflight failed");
            }
        }

        let mut last_category = FailureCategory::Network;
        let mut last_message = String::new();

        for attempt in 0..self.config.max_attempts {
            match self.invoke(request).await {
                Ok(report) => {
                    info!(attempt, sync_id = %report.sync_id, "Sync invocation succeeded");
                    return Ok(report);
                }
                Err(message) => {
                    let category = FailureCategory::classify(&message);
                    let policy = category.policy();
                    warn!(attempt, ?category, error = %message, "Sync invocation failed");

                    if !policy.recoverable {
                        return Err(RetryError::NonRecoverable { category, message });
                    }

                    last_category = category;
                    last_message = message;

                    if attempt + 1 < self.config.max_attempts {
                        sleep(backoff_delay(policy.base_delay_ms, attempt)).await;
                    }
                }
            }
        }

        Err(RetryError::Exhausted {
            attempts: self.config.max_attempts,
            category: last_category,
            message: last_message,
        })
    }

    async fn invoke(&self, request: &SyncRequest) -> Result<SyncReport, String> {
        let response = self
            .http
            .post(format!("{}/sync", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    format!("request timed out: {}", e)
                } else {
                    format!("fetch failed: {}", e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            response
                .json::<SyncReport>()
                .await
                .map_err(|e| format!("malformed supervisor response: {}", e))
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(format!("supervisor returned {}: {}", status, body))
        }
    }

    async fn probe(&self) -> Result<(), String> {
        let response = self
            .http
            .get(format!("{}/healthz", self.base_url))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(format!("health probe returned {}", response.status()))
        }
    }
}

/// Backoff with linear attempt growth and random jitter:
/// `base + attempt * 1000ms + random(0..1000ms)`.
fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..1000);
    Duration::from_millis(base_delay_ms + u64::from(attempt) * 1000 + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_failures_are_non_recoverable() {
        let category =
            FailureCategory::classify("Edge Function not accessible: Connection refused");
        assert_eq!(category, FailureCategory::Deployment);
        assert!(!category.policy().recoverable);
    }

    #[test]
    fn fetch_failed_is_recoverable_network() {
        let category = FailureCategory::classify("fetch failed");
        assert_eq!(category, FailureCategory::Network);
        let policy = category.policy();
        assert!(policy.recoverable);
        assert_eq!(policy.base_delay_ms, 3000);
    }

    #[test]
    fn auth_and_config_abort_immediately() {
        assert_eq!(
            FailureCategory::classify("401 unauthorized"),
            FailureCategory::Auth
        );
        assert_eq!(
            FailureCategory::classify("missing required environment variable FEED_API_KEY"),
            FailureCategory::Config
        );
        assert!(!FailureCategory::Auth.policy().recoverable);
        assert!(!FailureCategory::Config.policy().recoverable);
    }

    #[test]
    fn timeouts_classify_distinctly_from_rate_limits() {
        assert_eq!(
            FailureCategory::classify("request timed out after 60s"),
            FailureCategory::Timeout
        );
        assert_eq!(
            FailureCategory::classify("supervisor returned 503: overloaded"),
            FailureCategory::Server
        );
    }

    #[test]
    fn backoff_grows_with_attempts_and_jitters() {
        for attempt in 0..3 {
            let delay = backoff_delay(3000, attempt).as_millis() as u64;
            let floor = 3000 + u64::from(attempt) * 1000;
            assert!(delay >= floor && delay < floor + 1000, "attempt {attempt}: {delay}");
        }
    }
}
