//! Feed client behavior against a mock upstream: pagination, throttling
//! retries, and failure classification.

use std::time::Duration;

use lotsync::config::FeedConfig;
use lotsync::feed::{FeedClient, FeedError, FeedSource};
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

mod test_utils;
use test_utils::{feed_page_body, raw_record};

fn config(base_url: String) -> FeedConfig {
    FeedConfig {
        base_url,
        api_key: Some("test-key".to_string()),
        page_size: 2,
        request_timeout_secs: 2,
        min_request_interval_ms: 1,
        max_retries: 2,
        backoff_base_ms: 10,
        backoff_multiplier: 2.0,
    }
}

#[tokio::test]
async fn fetch_page_parses_records_and_pagination() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .and(query_param("page", "1"))
        .and(query_param("per_page", "2"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page_body(
            vec![raw_record(1), raw_record(2)],
            5,
            3,
        )))
        .mount(&mock_server)
        .await;

    let client = FeedClient::new(config(mock_server.uri())).unwrap();
    let page = client.fetch_page(1, 2, None).await.unwrap();

    assert_eq!(page.records.len(), 2);
    assert_eq!(page.total_estimate, Some(5));
    assert!(page.has_more);
}

#[tokio::test]
async fn incremental_window_is_forwarded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .and(query_param("minutes", "90"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(feed_page_body(vec![raw_record(1)], 1, 1)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = FeedClient::new(config(mock_server.uri())).unwrap();
    let page = client.fetch_page(1, 2, Some(90)).await.unwrap();
    assert!(!page.has_more);
}

#[tokio::test]
async fn throttled_page_is_retried_then_succeeds() {
    let mock_server = MockServer::start().await;

    // First two hits are throttled, the third succeeds.
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(feed_page_body(vec![raw_record(1)], 1, 1)),
        )
        .mount(&mock_server)
        .await;

    let client = FeedClient::new(config(mock_server.uri())).unwrap();
    let page = client.fetch_page(1, 2, None).await.unwrap();
    assert_eq!(page.records.len(), 1);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn exceeding_the_retry_ceiling_is_a_rate_limit_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&mock_server)
        .await;

    let client = FeedClient::new(config(mock_server.uri())).unwrap();
    let error = client.fetch_page(7, 2, None).await.unwrap_err();

    match error {
        FeedError::RateLimitExceeded { page, attempts } => {
            assert_eq!(page, 7);
            assert_eq!(attempts, 3); // initial try + max_retries
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_is_distinct_from_rate_limit() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": []}))
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let mut cfg = config(mock_server.uri());
    cfg.request_timeout_secs = 1;
    cfg.max_retries = 0;
    let client = FeedClient::new(cfg).unwrap();

    let error = client.fetch_page(1, 2, None).await.unwrap_err();
    assert!(matches!(error, FeedError::Timeout { page: 1, .. }));
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = FeedClient::new(config(mock_server.uri())).unwrap();
    let error = client.fetch_page(1, 2, None).await.unwrap_err();
    assert!(matches!(
        error,
        FeedError::Upstream { status: 403, .. }
    ));
}

#[tokio::test]
async fn concurrent_callers_respect_the_shared_interval() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(feed_page_body(vec![], 0, 1)),
        )
        .mount(&mock_server)
        .await;

    let mut cfg = config(mock_server.uri());
    cfg.min_request_interval_ms = 50;
    let client = std::sync::Arc::new(FeedClient::new(cfg).unwrap());

    let started = std::time::Instant::now();
    let mut handles = Vec::new();
    for page in 1..=4u32 {
        let client = client.clone();
        handles.push(tokio::spawn(async move {
            client.fetch_page(page, 2, None).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    // Four requests spaced by at least 50ms leave three full gaps.
    assert!(started.elapsed() >= Duration::from_millis(150));

    let requests: Vec<Request> = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 4);
}
