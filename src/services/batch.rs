//! Concurrent batch processing.
//!
//! Jobs are independent, so a batch is two fan-out phases over the same
//! client: submit every image, then poll every job id that came back.

use futures::future::join_all;
use serde::Serialize;

use crate::models::job::Payload;
use crate::services::client::{
    ClientError, FailureKind, ImageSource, ImgGoClient, PollOptions, SubmitOptions,
};

/// Result of the submit phase for one image.
#[derive(Debug)]
pub struct Submission {
    pub source: ImageSource,
    pub job_id: Result<String, ClientError>,
}

/// Final state of one image in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded { job_id: String, result: Payload },
    Failed { job_id: String, error: String },
    /// Still running server-side when polling stopped.
    TimedOut { job_id: String },
    /// Never produced a result (submit or poll request error).
    Error { job_id: Option<String>, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub image: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub items: Vec<BatchItem>,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errored: usize,
}

impl BatchReport {
    fn from_items(items: Vec<BatchItem>) -> Self {
        let mut report = BatchReport::default();
        for item in &items {
            match item.outcome {
                ItemOutcome::Succeeded { .. } => report.succeeded += 1,
                ItemOutcome::Failed { .. } => report.failed += 1,
                ItemOutcome::TimedOut { .. } => report.timed_out += 1,
                ItemOutcome::Error { .. } => report.errored += 1,
            }
        }
        report.items = items;
        report
    }
}

/// Submit all images concurrently. Order of the output matches `sources`.
pub async fn submit_all(
    client: &ImgGoClient,
    sources: Vec<ImageSource>,
    pattern_id: &str,
) -> Vec<Submission> {
    let options = SubmitOptions::default();
    let futures = sources.into_iter().map(|source| {
        let options = &options;
        async move {
            let job_id = client.submit(&source, pattern_id, options).await;
            if let Err(e) = &job_id {
                tracing::warn!(image = %source.describe(), error = %e, "Batch submit failed");
            }
            Submission { source, job_id }
        }
    });
    join_all(futures).await
}

/// Poll every submitted job concurrently.
pub async fn poll_all(
    client: &ImgGoClient,
    submissions: Vec<Submission>,
    options: &PollOptions,
) -> Vec<BatchItem> {
    let futures = submissions.into_iter().map(|submission| async move {
        let image = submission.source.describe();
        let outcome = match submission.job_id {
            Ok(job_id) => match client.wait_for_completion(&job_id, options, None).await {
                Ok(result) => ItemOutcome::Succeeded { job_id, result },
                Err(e) => {
                    let error = match &e {
                        ClientError::JobFailed { message, .. } => message.clone(),
                        other => other.to_string(),
                    };
                    match e.outcome() {
                        FailureKind::JobFailed => ItemOutcome::Failed { job_id, error },
                        FailureKind::TimedOut => ItemOutcome::TimedOut { job_id },
                        FailureKind::Request => ItemOutcome::Error {
                            job_id: Some(job_id),
                            error,
                        },
                    }
                }
            },
            Err(e) => ItemOutcome::Error {
                job_id: None,
                error: e.to_string(),
            },
        };
        BatchItem { image, outcome }
    });
    join_all(futures).await
}

/// Submit and poll a whole batch.
pub async fn run(
    client: &ImgGoClient,
    sources: Vec<ImageSource>,
    pattern_id: &str,
    options: &PollOptions,
) -> BatchReport {
    let total = sources.len();
    tracing::info!(pattern_id, images = total, "Starting batch");

    let submissions = submit_all(client, sources, pattern_id).await;
    let items = poll_all(client, submissions, options).await;
    let report = BatchReport::from_items(items);

    tracing::info!(
        pattern_id,
        images = total,
        succeeded = report.succeeded,
        failed = report.failed,
        timed_out = report.timed_out,
        errored = report.errored,
        "Batch finished"
    );
    report
}
