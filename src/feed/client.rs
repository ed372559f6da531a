//! HTTP client for the external inventory feed.
//!
//! Owns request-level rate limiting (a minimum inter-request interval shared
//! across all concurrent callers of one client) and HTTP-level retry with
//! exponential backoff on throttling. Classification matters to callers:
//! exhausting the retry ceiling on 429s is a rate-limit failure, a request
//! that never completes is a timeout failure, and the two are reported as
//! distinct [`FeedError`] variants.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::counter;
use serde_json::Value as JsonValue;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::FeedConfig;
use crate::feed::{FeedError, FeedPage, FeedSource};

/// Header carrying the feed API key credential.
const API_KEY_HEADER: &str = "x-api-key";

/// Client for the paginated inventory feed API.
pub struct FeedClient {
    http: reqwest::Client,
    config: FeedConfig,
    /// Reserved send slot of the most recent request; concurrent callers
    /// serialize on this to keep the minimum inter-request interval.
    last_request: Mutex<Option<Instant>>,
}

impl FeedClient {
    /// Create a new feed client from configuration.
    ///
    /// Fails with a configuration error when the API key is absent; the
    /// supervisor treats that as a sweep-fatal missing-environment failure.
    pub fn new(config: FeedConfig) -> Result<Self, FeedError> {
        if config.api_key.as_deref().unwrap_or("").is_empty() {
            return Err(FeedError::Configuration {
                details: "feed API key is not configured".to_string(),
            });
        }
        url::Url::parse(&config.base_url).map_err(|e| FeedError::Configuration {
            details: format!("invalid feed base URL '{}': {}", config.base_url, e),
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| FeedError::Configuration {
                details: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            config,
            last_request: Mutex::new(None),
        })
    }

    /// Reserve the next send slot and sleep until it is due. Each caller
    /// advances the shared slot by the minimum interval before releasing the
    /// lock, so concurrent page fetches stay spaced out.
    async fn throttle(&self) {
        let interval = Duration::from_millis(self.config.min_request_interval_ms);
        let slot = {
            let mut last = self.last_request.lock().await;
            let now = Instant::now();
            let slot = match *last {
                Some(previous) => (previous + interval).max(now),
                None => now,
            };
            *last = Some(slot);
            slot
        };

        let now = Instant::now();
        if slot > now {
            sleep(slot - now).await;
        }
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let millis =
            self.config.backoff_base_ms as f64 * self.config.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }

    fn page_url(&self, page: u32, page_size: u32, since_minutes: Option<u32>) -> String {
        let mut url = format!(
            "{}/listings?page={}&per_page={}",
            self.config.base_url.trim_end_matches('/'),
            page,
            page_size
        );
        if let Some(minutes) = since_minutes {
            url.push_str(&format!("&minutes={}", minutes));
        }
        url
    }

    fn parse_page(&self, page: u32, body: JsonValue) -> Result<FeedPage, FeedError> {
        let records = body
            .get("data")
            .or_else(|| body.get("listings"))
            .and_then(JsonValue::as_array)
            .cloned()
            .ok_or_else(|| FeedError::MalformedResponse {
                page,
                details: "response carries no record array".to_string(),
            })?;

        let meta = body.get("meta").unwrap_or(&JsonValue::Null);
        let total_estimate = meta
            .get("total")
            .or_else(|| meta.get("total_count"))
            .and_then(JsonValue::as_u64);
        let last_page = meta
            .get("last_page")
            .or_else(|| meta.get("total_pages"))
            .and_then(JsonValue::as_u64);

        let has_more = match last_page {
            Some(last) => u64::from(page) < last,
            None => !records.is_empty(),
        };

        Ok(FeedPage {
            page,
            records,
            has_more,
            total_estimate,
        })
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_page(
        &self,
        page: u32,
        page_size: u32,
        since_minutes: Option<u32>,
    ) -> Result<FeedPage, FeedError> {
        let url = self.page_url(page, page_size, since_minutes);
        let api_key = self.config.api_key.as_deref().unwrap_or("");

        for attempt in 0..=self.config.max_retries {
            self.throttle().await;
            counter!("feed_requests_total").increment(1);

            let response = self
                .http
                .get(&url)
                .header(API_KEY_HEADER, api_key)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.as_u16() == 429 {
                        counter!("feed_rate_limited_total").increment(1);
                        if attempt == self.config.max_retries {
                            return Err(FeedError::RateLimitExceeded {
                                page,
                                attempts: attempt + 1,
                            });
                        }
                        let delay = self.backoff_delay(attempt);
                        warn!(page, attempt, delay_ms = delay.as_millis() as u64, "Feed throttled request, backing off");
                        sleep(delay).await;
                        continue;
                    }

                    if status.is_server_error() {
                        if attempt == self.config.max_retries {
                            let body = resp.text().await.unwrap_or_default();
                            return Err(FeedError::Upstream {
                                page,
                                status: status.as_u16(),
                                body: truncate(&body, 200),
                            });
                        }
                        let delay = self.backoff_delay(attempt);
                        warn!(page, attempt, status = status.as_u16(), "Feed server error, retrying");
                        sleep(delay).await;
                        continue;
                    }

                    if !status.is_success() {
                        let body = resp.text().await.unwrap_or_default();
                        return Err(FeedError::Upstream {
                            page,
                            status: status.as_u16(),
                            body: truncate(&body, 200),
                        });
                    }

                    let body: JsonValue =
                        resp.json().await.map_err(|e| FeedError::MalformedResponse {
                            page,
                            details: e.to_string(),
                        })?;
                    let feed_page = self.parse_page(page, body)?;
                    debug!(
                        page,
                        records = feed_page.records.len(),
                        has_more = feed_page.has_more,
                        "Fetched feed page"
                    );
                    return Ok(feed_page);
                }
                Err(e) if e.is_timeout() => {
                    counter!("feed_timeouts_total").increment(1);
                    if attempt == self.config.max_retries {
                        return Err(FeedError::Timeout {
                            page,
                            timeout_secs: self.config.request_timeout_secs,
                        });
                    }
                    warn!(page, attempt, "Feed request timed out, retrying");
                    sleep(self.backoff_delay(attempt)).await;
                }
                Err(e) => {
                    if attempt == self.config.max_retries {
                        return Err(FeedError::Network {
                            page,
                            details: e.to_string(),
                        });
                    }
                    warn!(page, attempt, error = %e, "Feed request failed, retrying");
                    sleep(self.backoff_delay(attempt)).await;
                }
            }
        }

        // The loop always returns on its final attempt.
        Err(FeedError::Network {
            page,
            details: "retry loop exhausted".to_string(),
        })
    }
}

fn truncate(body: &str, max_chars: usize) -> String {
    if body.chars().count() > max_chars {
        let truncated: String = body.chars().take(max_chars).collect();
        format!("{}...", truncated)
    } else {
        body.to_string()
    }
}
