//! HTTP surface tests: the sweep trigger end to end against a mocked feed,
//! the 409 single-flight response, and the admin removal endpoints.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use lotsync::config::AppConfig;
use lotsync::models::sync_job::SyncType;
use lotsync::repositories::SyncJobRepository;
use lotsync::server::{AppState, create_app};
use lotsync::sync::supervisor::SystemClock;
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod test_utils;
use test_utils::{feed_page_body, insert_listing, raw_record, setup_test_db};

fn app_config(feed_base_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.feed.base_url = feed_base_url.to_string();
    config.feed.api_key = Some("test-key".to_string());
    config.feed.page_size = 2;
    config.feed.min_request_interval_ms = 1;
    config
}

async fn state_with(feed_base_url: &str) -> AppState {
    AppState {
        db: setup_test_db().await.unwrap(),
        config: Arc::new(app_config(feed_base_url)),
        clock: Arc::new(SystemClock),
    }
}

async fn body_json(response: axum::response::Response) -> JsonValue {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: JsonValue) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn root_reports_service_info() {
    let state = state_with("http://unused").await;
    let app = create_app(state);

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["service"], "lotsync");
}

#[tokio::test]
async fn sync_trigger_runs_a_sweep_and_listings_become_visible() {
    let mock_feed = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page_body(
            vec![raw_record(1), raw_record(2)],
            2,
            1,
        )))
        .mount(&mock_feed)
        .await;

    let state = state_with(&mock_feed.uri()).await;
    let app = create_app(state.clone());

    let response = app
        .clone()
        .oneshot(post_json("/sync", json!({"sync_type": "full"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let report = body_json(response).await;
    assert_eq!(report["success"], true);
    assert_eq!(report["cars_processed"], 2);
    assert_eq!(report["sweep_complete"], true);
    assert_eq!(report["shutdown_reason"], "natural_completion");

    let response = app
        .oneshot(Request::get("/listings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let listings = body_json(response).await;
    assert_eq!(listings.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn concurrent_sweep_trigger_returns_409() {
    let state = state_with("http://unused").await;
    let jobs = SyncJobRepository::new(state.db.clone());
    let running = jobs.create(SyncType::Full, Utc::now(), None).await.unwrap();

    let app = create_app(state);
    let response = app
        .oneshot(post_json("/sync", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "SYNC_ALREADY_RUNNING");
    assert_eq!(
        body["details"]["running_job_id"],
        running.id.to_string()
    );
}

#[tokio::test]
async fn missing_feed_credentials_fail_the_trigger() {
    let mut state = state_with("http://unused").await;
    let mut config = (*state.config).clone();
    config.feed.api_key = None;
    state.config = Arc::new(config);

    let app = create_app(state);
    let response = app
        .oneshot(post_json("/sync", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["code"], "MISSING_ENVIRONMENT");
}

#[tokio::test]
async fn bulk_delete_endpoint_is_idempotent() {
    let state = state_with("http://unused").await;
    let now = Utc::now();
    insert_listing(&state.db, 1, now).await.unwrap();
    insert_listing(&state.db, 2, now).await.unwrap();

    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/listings/bulk-delete",
            json!({"ids": [1, 2]}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["deactivated"], 2);

    let response = app
        .clone()
        .oneshot(post_json(
            "/admin/listings/bulk-delete",
            json!({"ids": [1, 2]}),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["deactivated"], 0);

    // Deactivated listings no longer appear in the catalog surface.
    let response = app
        .oneshot(Request::get("/listings").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let listings = body_json(response).await;
    assert!(listings.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn job_status_is_readable_after_a_sweep() {
    let mock_feed = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(feed_page_body(
            vec![raw_record(7)],
            1,
            1,
        )))
        .mount(&mock_feed)
        .await;

    let state = state_with(&mock_feed.uri()).await;
    let app = create_app(state);

    let response = app
        .clone()
        .oneshot(post_json("/sync", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::get("/sync/jobs/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let job = body_json(response).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["sweep_complete"], true);
    assert_eq!(job["cars_processed"], 1);
}
