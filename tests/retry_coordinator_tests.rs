//! Retry coordinator tests against a mocked supervisor endpoint: bounded
//! retries for recoverable failures, immediate aborts for non-recoverable
//! ones, and the advisory preflight.

use lotsync::config::RetryPolicyConfig;
use lotsync::sync::retry::{RetryError, SyncClient};
use lotsync::sync::SyncRequest;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn report_body() -> serde_json::Value {
    json!({
        "success": true,
        "sync_id": "3fa85f64-5717-4562-b3fc-2c963f66afa6",
        "records_processed": 10,
        "cars_processed": 10,
        "archived_lots_processed": 0,
        "errors_count": 0,
        "success_rate": 1.0,
        "shutdown_reason": "natural_completion",
        "sweep_complete": true,
        "current_page": 1,
        "total_pages": 1,
        "completed_at": "2026-08-02T12:00:00Z"
    })
}

fn client(base_url: String, max_attempts: u32, preflight: bool) -> SyncClient {
    SyncClient::new(
        base_url,
        RetryPolicyConfig {
            max_attempts,
            preflight,
        },
    )
}

#[tokio::test]
async fn successful_invocation_returns_the_report() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(report_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(mock_server.uri(), 3, false);
    let report = client.start_sync(&SyncRequest::default()).await.unwrap();

    assert!(report.success);
    assert_eq!(report.cars_processed, 10);
}

#[tokio::test]
async fn server_errors_are_retried_until_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal server error"))
        .up_to_n_times(2)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(report_body()))
        .mount(&mock_server)
        .await;

    let client = client(mock_server.uri(), 3, false);
    let report = client.start_sync(&SyncRequest::default()).await.unwrap();
    assert!(report.success);

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
}

#[tokio::test]
async fn auth_failures_abort_without_retrying() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(mock_server.uri(), 5, false);
    let error = client.start_sync(&SyncRequest::default()).await.unwrap_err();

    assert!(matches!(error, RetryError::NonRecoverable { .. }));
}

#[tokio::test]
async fn attempts_are_bounded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(503).set_body_string("service unavailable"))
        .mount(&mock_server)
        .await;

    let client = client(mock_server.uri(), 2, false);
    let error = client.start_sync(&SyncRequest::default()).await.unwrap_err();

    match error {
        RetryError::Exhausted { attempts, .. } => assert_eq!(attempts, 2),
        other => panic!("expected Exhausted, got {other:?}"),
    }

    let requests = mock_server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn failed_preflight_does_not_block_the_first_attempt() {
    let mock_server = MockServer::start().await;

    // No /healthz mock: the probe fails, the real attempt still runs.
    Mock::given(method("POST"))
        .and(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(report_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = client(mock_server.uri(), 1, true);
    let report = client.start_sync(&SyncRequest::default()).await.unwrap();
    assert!(report.success);
}
