//! Binary-level tests

use assert_cmd::Command;
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn bin() -> Command {
    Command::cargo_bin("gerrit-changes-downloader").unwrap()
}

#[test]
fn test_frames_prints_partition_as_json() {
    let output = bin()
        .args([
            "--output-format",
            "json",
            "frames",
            "--start",
            "2018-06-01",
            "--end",
            "2018-06-02",
            "--frame-hours",
            "6",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let frames: Value = serde_json::from_slice(&output).unwrap();
    let frames = frames.as_array().unwrap();
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0]["key"], "2018-06-01");
    assert_eq!(frames[1]["key"], "2018-06-01T06-00-00");
}

#[test]
fn test_frames_human_output_counts_frames() {
    let output = bin()
        .args(["frames", "--start", "2018-06-01", "--end", "2018-06-08"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(output).unwrap();
    assert!(text.contains("2018-06-07"));
    assert!(text.contains("7 frame(s)"));
}

#[test]
fn test_invalid_date_fails() {
    bin()
        .args(["frames", "--start", "June first", "--end", "2018-06-02"])
        .assert()
        .failure();
}

#[test]
fn test_concurrency_out_of_range_is_rejected() {
    bin()
        .args([
            "--concurrency",
            "64",
            "frames",
            "--start",
            "2018-06-01",
            "--end",
            "2018-06-02",
        ])
        .assert()
        .failure();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_downloads_into_named_source_directory() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/changes/"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            ")]}}'\n{}",
            json!([{
                "change_id": "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c",
                "_number": 109611
            }])
        )))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/changes/109611/detail"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            ")]}}'\n{}",
            json!({
                "change_id": "Ic7bc5ad2e57eef27b0d2e13523be78e8a2d0a65c",
                "_number": 109611,
                "subject": "Fix NPE in ChangeJson"
            })
        )))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let uri = server.uri();
    let output = bin()
        .args([
            "--output-format",
            "json",
            "run",
            "--name",
            "gerrit",
            "--url",
            uri.as_str(),
            "--start",
            "2018-06-01",
            "--end",
            "2018-06-02",
            "--directory",
            temp.path().to_str().unwrap(),
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report: Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(report["success"], true);
    assert_eq!(report["summary"]["written"], 1);

    let artifact = temp
        .path()
        .join("gerrit")
        .join("changes")
        .join("2018-06-01")
        .join("109611.json");
    assert!(artifact.exists());
}
