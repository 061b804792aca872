//! Concurrent batch submit + poll.

mod helpers;

use helpers::*;
use imggo_client::services::batch::{self, ItemOutcome};
use imggo_client::{ImageSource, OutputFormat, PollOptions};
use serde_json::json;
use std::time::Duration;

fn image(name: &str) -> ImageSource {
    ImageSource::Bytes {
        data: png_bytes(),
        filename: name.to_string(),
        mime: Some("image/png".to_string()),
    }
}

#[tokio::test]
async fn test_batch_isolates_each_outcome() {
    let api = FakeApi::start().await;
    api.push_ingest(Scripted::ok(json!({"job_id": "B1"})));
    api.push_ingest(Scripted::ok(json!({"job_id": "B2"})));
    api.push_ingest(Scripted::ok(json!({"job_id": "B3"})));
    api.push_ingest(Scripted::error(422, "Unsupported image"));

    api.push_job("B1", Scripted::ok(json!({"status": "succeeded", "manifest": {"plate": "ABC123"}})));
    api.push_job("B2", Scripted::ok(json!({"status": "failed", "error": "No plate visible"})));
    api.push_job("B3", Scripted::job("processing"));

    let (client, _) = test_client(test_config(&api.base_url));
    let poll = PollOptions {
        max_attempts: 2,
        interval: Duration::from_secs(1),
        format: OutputFormat::Json,
    };

    let report = batch::run(
        &client,
        vec![image("a.png"), image("b.png"), image("c.png"), image("d.png")],
        "pat_parking",
        &poll,
    )
    .await;

    assert_eq!(report.items.len(), 4);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.timed_out, 1);
    assert_eq!(report.errored, 1);

    let errored = report
        .items
        .iter()
        .find(|item| matches!(item.outcome, ItemOutcome::Error { .. }))
        .unwrap();
    assert!(matches!(&errored.outcome, ItemOutcome::Error { job_id: None, error } if error.contains("Unsupported image")));

    assert_eq!(api.requests_ending("/ingest").len(), 4);
}

#[tokio::test]
async fn test_report_serializes_with_status_tag() {
    let api = FakeApi::start().await;
    api.push_ingest(Scripted::ok(json!({"job_id": "S1"})));
    api.push_job("S1", Scripted::ok(json!({"status": "succeeded", "manifest": "a,b\n1,2"})));

    let (client, _) = test_client(test_config(&api.base_url));
    let poll = PollOptions {
        max_attempts: 1,
        interval: Duration::from_secs(1),
        format: OutputFormat::Csv,
    };

    let report = batch::run(&client, vec![image("sheet.png")], "pat_csv", &poll).await;
    let value = serde_json::to_value(&report).unwrap();

    assert_eq!(value["succeeded"], 1);
    assert_eq!(value["items"][0]["image"], "sheet.png");
    assert_eq!(value["items"][0]["status"], "succeeded");
    assert_eq!(value["items"][0]["job_id"], "S1");
    assert_eq!(value["items"][0]["result"], "a,b\n1,2");
}
