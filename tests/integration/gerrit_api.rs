//! Gerrit fetcher against a mock server
//!
//! Response bodies carry Gerrit's `)]}'` prefix the way the real server sends them.

use chrono::{TimeZone, Utc};
use gerrit_changes_downloader::downloader::RetryPolicy;
use gerrit_changes_downloader::fetcher::gerrit_http::GerritHttpClient;
use gerrit_changes_downloader::fetcher::{ArtifactOutcome, ChangeSource, GerritFetcher};
use gerrit_changes_downloader::TimeFrame;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gerrit_body(value: &Value) -> String {
    format!(")]}}'\n{value}")
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_max_attempts(3)
        .with_backoff(Duration::from_millis(1), Duration::from_millis(5))
}

fn fetcher(server: &MockServer) -> GerritFetcher {
    GerritFetcher::with_client(GerritHttpClient::new(
        Arc::new(reqwest::Client::new()),
        server.uri(),
    ))
    .with_retry_policy(fast_policy())
}

fn june_first() -> TimeFrame {
    TimeFrame::new(
        Utc.with_ymd_and_hms(2018, 6, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2018, 6, 2, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

fn summary(change_id: &str, number: u64) -> Value {
    json!({
        "id": format!("gerrit~master~{change_id}"),
        "project": "gerrit",
        "branch": "master",
        "change_id": change_id,
        "status": "MERGED",
        "_number": number
    })
}

#[tokio::test]
async fn test_frame_listing_sends_bounded_query_and_strips_prefix() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param(
            "q",
            "after:\"2018-06-01 00:00:00.000\" before:\"2018-06-02 00:00:00.000\"",
        ))
        .and(query_param("S", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!([
            summary("Ib051dd347eaea2c77ae6c403ebf76bed4b9b4b9c", 181990),
            summary("Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c", 109611),
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let changes = fetcher(&server).get_frame_changes(&june_first()).await;

    assert_eq!(changes.len(), 2);
    assert_eq!(changes[0].change_id, "Ib051dd347eaea2c77ae6c403ebf76bed4b9b4b9c");
    assert_eq!(changes[1].number, 109611);
    assert_eq!(changes[0].raw["status"], "MERGED");
}

#[tokio::test]
async fn test_listing_follows_more_changes_continuation() {
    let server = MockServer::start().await;

    let mut last_of_first_page = summary("I0000000000000000000000000000000000000002", 2);
    last_of_first_page["_more_changes"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("n", "2"))
        .and(query_param("S", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!([
            summary("I0000000000000000000000000000000000000001", 1),
            last_of_first_page,
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("n", "2"))
        .and(query_param("S", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!([
            summary("I0000000000000000000000000000000000000003", 3),
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    let changes = fetcher(&server)
        .with_page_size(2)
        .get_changes(june_first().start(), None)
        .await;

    let numbers: Vec<u64> = changes.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_failed_later_page_returns_changes_gathered_so_far() {
    let server = MockServer::start().await;

    let mut last_of_first_page = summary("I0000000000000000000000000000000000000002", 2);
    last_of_first_page["_more_changes"] = json!(true);

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("S", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!([
            summary("I0000000000000000000000000000000000000001", 1),
            last_of_first_page,
        ]))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .and(query_param("S", "2"))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(3)
        .mount(&server)
        .await;

    let changes = fetcher(&server)
        .with_page_size(2)
        .get_frame_changes(&june_first())
        .await;

    let numbers: Vec<u64> = changes.iter().map(|c| c.number).collect();
    assert_eq!(numbers, vec![1, 2]);
}

#[tokio::test]
async fn test_empty_window_returns_no_changes() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(")]}'\n[]"))
        .expect(1)
        .mount(&server)
        .await;

    let changes = fetcher(&server).get_frame_changes(&june_first()).await;
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_get_change_writes_artifact_named_by_number() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/changes/109611/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!({
            "change_id": "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c",
            "_number": 109611,
            "project": "gerrit",
            "messages": [{"message": "Patch Set 1: Code-Review+2"}]
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server);
    let outcome = fetcher.get_change(109611, temp.path()).await;

    let expected = temp.path().join("109611.json");
    assert_eq!(outcome, ArtifactOutcome::Written(expected.clone()));

    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&expected).unwrap()).unwrap();
    assert_eq!(stored["change_id"], "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c");
    assert_eq!(stored["_number"], 109611);
    assert_eq!(stored["messages"][0]["message"], "Patch Set 1: Code-Review+2");

    // Second call finds the file and makes no request (expect(1) above)
    let again = fetcher.get_change(109611, temp.path()).await;
    assert_eq!(again, ArtifactOutcome::AlreadyExists(expected));
}

#[tokio::test]
async fn test_detail_body_is_stored_as_served() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    // Server answers with a different _number than requested
    Mock::given(method("GET"))
        .and(path("/changes/109611/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!({
            "change_id": "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c",
            "_number": 109612,
            "project": "gerrit"
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher(&server).get_change(109611, temp.path()).await;
    let expected = temp.path().join("109611.json");
    assert_eq!(outcome, ArtifactOutcome::Written(expected.clone()));

    let stored: Value = serde_json::from_str(&std::fs::read_to_string(&expected).unwrap()).unwrap();
    assert_eq!(
        stored,
        json!({
            "change_id": "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c",
            "_number": 109612,
            "project": "gerrit"
        })
    );
}

#[tokio::test]
async fn test_rate_limited_detail_backs_off_then_succeeds() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/changes/42/detail"))
        .respond_with(ResponseTemplate::new(429).set_body_string("Too Many Requests"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/changes/42/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(gerrit_body(&json!({
            "change_id": "I4242424242424242424242424242424242424242",
            "_number": 42
        }))))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher(&server).get_change(42, temp.path()).await;
    assert!(matches!(outcome, ArtifactOutcome::Written(_)));
}

#[tokio::test]
async fn test_server_errors_exhaust_attempt_bound() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let changes = fetcher(&server).get_frame_changes(&june_first()).await;
    assert!(changes.is_empty());
}

#[tokio::test]
async fn test_not_found_detail_is_abandoned_without_retry() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/changes/7/detail"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not found: 7"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher(&server).get_change(7, temp.path()).await;
    assert_eq!(outcome, ArtifactOutcome::Failed);
    assert!(!temp.path().join("7.json").exists());
}

#[tokio::test]
async fn test_undecodable_detail_is_not_written() {
    let server = MockServer::start().await;
    let temp = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/changes/8/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = fetcher(&server).get_change(8, temp.path()).await;
    assert_eq!(outcome, ArtifactOutcome::Failed);
    assert!(!temp.path().join("8.json").exists());
}

#[tokio::test]
async fn test_unreachable_server_gives_up_after_bounded_retries() {
    // Nothing listens on port 1
    let fetcher = GerritFetcher::with_client(GerritHttpClient::new(
        Arc::new(reqwest::Client::new()),
        "http://127.0.0.1:1",
    ))
    .with_retry_policy(fast_policy().with_max_no_response_retries(1));

    let changes = tokio::time::timeout(
        Duration::from_secs(10),
        fetcher.get_frame_changes(&june_first()),
    )
    .await
    .unwrap();
    assert!(changes.is_empty());
}
