//! End-to-end tests against the live ImgGo API
//!
//! These tests require:
//! 1. IMGGO_API_KEY (and optionally IMGGO_BASE_URL)
//! 2. IMGGO_TEST_PATTERN_ID: an existing JSON pattern
//! 3. IMGGO_TEST_IMAGE_URL: a publicly reachable image
//!
//! Run with: cargo test --test e2e_test -- --ignored --nocapture

use imggo_client::{
    ClientConfig, ClientError, ImageSource, ImgGoClient, OutputFormat, ProcessOptions,
    ProcessOutcome,
};

fn live_client() -> ImgGoClient {
    let config = ClientConfig::from_env().expect("Failed to load config");
    ImgGoClient::new(config).expect("Failed to initialize client")
}

fn env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set"))
}

#[tokio::test]
#[ignore] // Requires live API credentials
async fn test_e2e_url_processing() {
    let client = live_client();
    let source = ImageSource::Url(env("IMGGO_TEST_IMAGE_URL"));
    let options = ProcessOptions {
        poll: Some(client.poll_options(OutputFormat::Json)),
        ..ProcessOptions::default()
    };

    let outcome = client
        .process(&source, &env("IMGGO_TEST_PATTERN_ID"), &options)
        .await;

    match outcome {
        Ok(ProcessOutcome::Completed(payload)) => {
            println!("✓ Extracted:\n{}", payload.render());
            assert!(payload.as_structured().is_some());
        }
        Ok(ProcessOutcome::Submitted(job_id)) => panic!("polling was requested, got job {job_id}"),
        Err(e @ ClientError::Timeout { .. }) => println!("Job still running: {e}"),
        Err(e) => panic!("Processing failed: {e}"),
    }
}

#[tokio::test]
#[ignore] // Requires live API credentials
async fn test_e2e_submit_then_status() {
    let client = live_client();
    let options = ProcessOptions {
        poll: None,
        ..ProcessOptions::default()
    };

    let outcome = client
        .process(
            &ImageSource::Url(env("IMGGO_TEST_IMAGE_URL")),
            &env("IMGGO_TEST_PATTERN_ID"),
            &options,
        )
        .await
        .expect("Submit failed");

    let ProcessOutcome::Submitted(job_id) = outcome else {
        panic!("expected a job id");
    };
    let snapshot = client.get_status(&job_id).await.expect("Status failed");
    println!("✓ Job {} is {}", job_id, snapshot.status);
}
