use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use garde::Validate;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;
use crate::models::job::{JobSnapshot, JobStatus, Payload};
use crate::models::pattern::{OutputFormat, Pattern, PatternSpec};
use crate::models::webhook::{WebhookEventKind, WebhookRegistration, WebhookRegistrationRequest};
use crate::services::idempotency;
use crate::services::retry::{
    self, run_with_retry, Backoff, Disposition, RetryPolicy, Sleeper, TokioSleeper, Wait,
};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

const DEFAULT_MIME: &str = "image/jpeg";

/// Longest error body echoed into an error message.
const MAX_ERROR_BODY: usize = 512;

/// An image to submit for extraction.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Local file, read when the request is built.
    File(PathBuf),
    /// In-memory content with a filename and optional MIME hint.
    Bytes {
        data: Vec<u8>,
        filename: String,
        mime: Option<String>,
    },
    /// Publicly resolvable URL fetched by the server.
    Url(String),
}

impl ImageSource {
    /// Short label for logs.
    pub fn describe(&self) -> String {
        match self {
            ImageSource::File(path) => path.display().to_string(),
            ImageSource::Bytes { filename, .. } => filename.clone(),
            ImageSource::Url(url) => url.clone(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    /// Generated from the source when absent.
    pub idempotency_key: Option<String>,
    /// Server notifies this URL instead of (or in addition to) polling.
    pub webhook_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    /// Status polls before giving up; zero is treated as one.
    pub max_attempts: u32,
    pub interval: Duration,
    /// Output format of the pattern, used to decode the payload.
    pub format: OutputFormat,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            interval: Duration::from_secs(2),
            format: OutputFormat::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub submit: SubmitOptions,
    pub poll: Option<PollOptions>,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            submit: SubmitOptions::default(),
            poll: Some(PollOptions::default()),
        }
    }
}

/// Result of [`ImgGoClient::process`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    Completed(Payload),
    /// Polling was disabled; the caller tracks the job.
    Submitted(String),
}

/// Progress callback: current status and one-based attempt index.
pub type ProgressFn<'a> = &'a (dyn Fn(&JobStatus, u32) + Send + Sync);

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct IngestData {
    job_id: String,
}

#[derive(Serialize)]
struct UrlIngestRequest<'a> {
    image_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    webhook_url: Option<&'a str>,
}

/// Request body resolved once per submit and reused across retries.
enum IngestBody<'a> {
    Upload(Upload),
    Url(&'a str),
}

struct Upload {
    data: Vec<u8>,
    filename: String,
    mime: String,
}

/// Client for the ImgGo REST API.
///
/// Holds only immutable settings and a pooled HTTP client, so one instance
/// can serve any number of concurrent calls.
pub struct ImgGoClient {
    http: Client,
    api_key: String,
    base_url: Url,
    submit_policy: RetryPolicy,
    status_policy: RetryPolicy,
    default_poll: PollOptions,
    sleeper: Arc<dyn Sleeper>,
}

impl ImgGoClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.api_key.trim().is_empty() {
            return Err(ClientError::Config(
                "API key required; set IMGGO_API_KEY or pass it in ClientConfig".to_string(),
            ));
        }
        config
            .validate()
            .map_err(|report| ClientError::Config(report.to_string()))?;
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| ClientError::Config(format!("base URL {}: {e}", config.base_url)))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::Config(format!(
                "base URL {} cannot carry a path",
                config.base_url
            )));
        }

        let http = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("imggo-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(format!("HTTP client: {e}")))?;

        let submit_policy = RetryPolicy {
            max_retries: config.max_retries,
            backoff: Backoff::Exponential {
                base: Duration::from_millis(config.backoff_base_ms),
                max: Duration::from_millis(config.backoff_max_ms),
            },
            rate_limit_wait: Duration::from_secs(config.rate_limit_wait_secs),
        };
        let status_policy = RetryPolicy {
            max_retries: config.not_found_retries,
            backoff: Backoff::Fixed(Duration::from_millis(config.not_found_wait_ms)),
            rate_limit_wait: Duration::from_secs(config.rate_limit_wait_secs),
        };
        let default_poll = PollOptions {
            max_attempts: config.poll_max_attempts,
            interval: config.poll_interval(),
            format: OutputFormat::Json,
        };

        Ok(Self {
            http,
            api_key: config.api_key,
            base_url,
            submit_policy,
            status_policy,
            default_poll,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the timer used between attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Poll options derived from the client configuration.
    pub fn poll_options(&self, format: OutputFormat) -> PollOptions {
        PollOptions {
            format,
            ..self.default_poll.clone()
        }
    }

    /// Submit an image against `pattern_id` and return the server job id.
    pub async fn submit(
        &self,
        source: &ImageSource,
        pattern_id: &str,
        options: &SubmitOptions,
    ) -> Result<String, ClientError> {
        let key = options
            .idempotency_key
            .clone()
            .unwrap_or_else(|| idempotency::generate(source, chrono::Utc::now()));
        let url = self.endpoint(&["patterns", pattern_id, "ingest"])?;
        let webhook_url = options.webhook_url.as_deref();

        let body = match source {
            ImageSource::File(path) => IngestBody::Upload(read_upload(path).await?),
            ImageSource::Bytes {
                data,
                filename,
                mime,
            } => IngestBody::Upload(Upload {
                mime: resolve_mime(mime.as_deref(), Path::new(filename), data),
                data: data.clone(),
                filename: filename.clone(),
            }),
            ImageSource::Url(image_url) => IngestBody::Url(image_url),
        };

        tracing::info!(
            pattern_id,
            source = %source.describe(),
            idempotency_key = %key,
            "Submitting image"
        );
        metrics::counter!("imggo_submissions_total").increment(1);

        let ingest: IngestData = run_with_retry(
            "submit",
            &self.submit_policy,
            self.sleeper.as_ref(),
            retry::classify,
            |_| {
                let request = self.http.post(url.clone()).header(IDEMPOTENCY_HEADER, &key);
                let request = match &body {
                    IngestBody::Upload(upload) => {
                        request.multipart(upload_form(upload, webhook_url))
                    }
                    IngestBody::Url(image_url) => request.json(&UrlIngestRequest {
                        image_url,
                        webhook_url,
                    }),
                };
                self.send(request)
            },
        )
        .await?;

        tracing::info!(pattern_id, job_id = %ingest.job_id, "Job created");
        Ok(ingest.job_id)
    }

    /// Fetch the current snapshot of a job.
    ///
    /// A 404 is retried briefly because new jobs can take a moment to become
    /// visible; other failures are returned as is.
    pub async fn get_status(&self, job_id: &str) -> Result<JobSnapshot, ClientError> {
        let url = self.endpoint(&["jobs", job_id])?;
        run_with_retry(
            "get_status",
            &self.status_policy,
            self.sleeper.as_ref(),
            retry::classify_not_found,
            |_| self.send(self.http.get(url.clone())),
        )
        .await
    }

    /// Poll a job until it succeeds, fails, or `options.max_attempts` polls
    /// pass without a terminal status.
    ///
    /// A rate-limited poll waits at least as long as the server asked before
    /// the next one.
    pub async fn wait_for_completion(
        &self,
        job_id: &str,
        options: &PollOptions,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Payload, ClientError> {
        let max_attempts = options.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let delay = match self.get_status(job_id).await {
                Ok(snapshot) => {
                    tracing::debug!(
                        job_id,
                        status = %snapshot.status,
                        attempt,
                        max_attempts,
                        "Polled job"
                    );
                    if let Some(report) = progress {
                        report(&snapshot.status, attempt);
                    }
                    if snapshot.status.is_terminal() {
                        return finish(job_id, snapshot, options.format);
                    }
                    options.interval
                }
                Err(e) => match retry::classify(&e) {
                    Disposition::Retryable(wait) => {
                        let delay = match wait {
                            Wait::Backoff => options.interval,
                            Wait::RateLimit(hint) => options
                                .interval
                                .max(hint.unwrap_or(self.status_policy.rate_limit_wait)),
                        };
                        tracing::warn!(
                            job_id,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Status poll failed, will poll again"
                        );
                        delay
                    }
                    Disposition::Terminal => return Err(e),
                },
            };

            if attempt < max_attempts {
                self.sleeper.sleep(delay).await;
            }
        }

        metrics::counter!("imggo_jobs_finished_total", "outcome" => "timeout").increment(1);
        tracing::warn!(job_id, attempts = max_attempts, "Gave up waiting for job");
        Err(ClientError::Timeout {
            job_id: job_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// Submit, then wait for the result unless polling is disabled.
    pub async fn process(
        &self,
        source: &ImageSource,
        pattern_id: &str,
        options: &ProcessOptions,
    ) -> Result<ProcessOutcome, ClientError> {
        let job_id = self.submit(source, pattern_id, &options.submit).await?;
        match &options.poll {
            Some(poll) => self
                .wait_for_completion(&job_id, poll, None)
                .await
                .map(ProcessOutcome::Completed),
            None => Ok(ProcessOutcome::Submitted(job_id)),
        }
    }

    /// Create a pattern and return its server-assigned id.
    pub async fn create_pattern(&self, spec: &PatternSpec) -> Result<Pattern, ClientError> {
        spec.validate()?;
        let url = self.endpoint(&["patterns"])?;

        let pattern: Pattern = run_with_retry(
            "create_pattern",
            &self.submit_policy,
            self.sleeper.as_ref(),
            retry::classify,
            |_| self.send(self.http.post(url.clone()).json(spec)),
        )
        .await?;

        tracing::info!(
            pattern_id = %pattern.id,
            name = %spec.name,
            format = %spec.format,
            "Pattern created"
        );
        Ok(pattern)
    }

    /// Register a webhook endpoint; deliveries are signed with `secret`.
    pub async fn register_webhook(
        &self,
        url: &str,
        events: &[WebhookEventKind],
        secret: &str,
    ) -> Result<WebhookRegistration, ClientError> {
        let endpoint = self.endpoint(&["webhooks"])?;
        let body = WebhookRegistrationRequest {
            url: url.to_string(),
            events: events.to_vec(),
            secret: secret.to_string(),
        };

        run_with_retry(
            "register_webhook",
            &self.submit_policy,
            self.sleeper.as_ref(),
            retry::classify,
            |_| self.send(self.http.post(endpoint.clone()).json(&body)),
        )
        .await
    }

    /// API URL with `segments` appended to the base path. Ids are
    /// percent-encoded, so `/`, `?` and `#` stay inside their segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ClientError::Config(format!("base URL {} cannot carry a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Authorize, send, and unwrap the `data` envelope of a response.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ClientError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = parse_retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Http {
                status,
                message: error_message(&body),
                retry_after,
            });
        }

        let body = response.bytes().await.map_err(ClientError::Transport)?;
        let envelope: Envelope<T> = serde_json::from_slice(&body)
            .map_err(|e| ClientError::Decode(format!("unexpected response body: {e}")))?;
        Ok(envelope.data)
    }
}

async fn read_upload(path: &Path) -> Result<Upload, ClientError> {
    let data = tokio::fs::read(path).await.map_err(|source| ClientError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime = resolve_mime(None, path, &data);
    Ok(Upload {
        data,
        filename,
        mime,
    })
}

fn upload_form(upload: &Upload, webhook_url: Option<&str>) -> Form {
    let part = Part::bytes(upload.data.clone()).file_name(upload.filename.clone());
    // Fall back to an untyped part if the resolved MIME string is rejected.
    let part = match part.mime_str(&upload.mime) {
        Ok(part) => part,
        Err(_) => Part::bytes(upload.data.clone()).file_name(upload.filename.clone()),
    };

    let form = Form::new().part("image", part);
    match webhook_url {
        Some(url) => form.text("webhook_url", url.to_string()),
        None => form,
    }
}

/// MIME type for an upload: explicit hint, then extension, then magic bytes.
pub fn resolve_mime(hint: Option<&str>, path: &Path, data: &[u8]) -> String {
    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        return hint.to_string();
    }
    if let Ok(format) = image::ImageFormat::from_path(path) {
        return format.to_mime_type().to_string();
    }
    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
    {
        return "application/pdf".to_string();
    }
    image::guess_format(data)
        .map(|format| format.to_mime_type().to_string())
        .unwrap_or_else(|_| DEFAULT_MIME.to_string())
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Pull a message out of `{"error": {"message": ..}}`, `{"error": ".."}`,
/// `{"message": ..}`, or fall back to the (truncated) body text.
fn error_message(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let message = value
            .pointer("/error/message")
            .or_else(|| value.get("error").filter(|e| e.is_string()))
            .or_else(|| value.get("message"))
            .and_then(|m| m.as_str());
        if let Some(message) = message {
            return message.to_string();
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

/// Turn a terminal snapshot into the wait result.
fn finish(job_id: &str, snapshot: JobSnapshot, format: OutputFormat) -> Result<Payload, ClientError> {
    if snapshot.status == JobStatus::Succeeded {
        metrics::counter!("imggo_jobs_finished_total", "outcome" => "succeeded").increment(1);
        return decode_payload(job_id, &snapshot, format);
    }

    metrics::counter!("imggo_jobs_finished_total", "outcome" => "failed").increment(1);
    let message = snapshot
        .error
        .unwrap_or_else(|| "Unknown error".to_string());
    tracing::warn!(job_id, error = %message, "Job failed");
    Err(ClientError::JobFailed {
        job_id: job_id.to_string(),
        message,
    })
}

fn decode_payload(
    job_id: &str,
    snapshot: &JobSnapshot,
    format: OutputFormat,
) -> Result<Payload, ClientError> {
    let value = snapshot.payload_value().cloned().ok_or_else(|| {
        ClientError::Decode(format!("job {job_id} succeeded without a manifest or result"))
    })?;

    tracing::info!(job_id, format = %format, "Job succeeded");
    Payload::decode(value, format).map_err(|e| ClientError::Decode(format!("job {job_id}: {e}")))
}

/// How a finished wait ended, for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Server processed the job and reported failure.
    JobFailed,
    /// We stopped polling; the job's outcome is unknown.
    TimedOut,
    /// Request or configuration problem.
    Request,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("ImgGo API returned HTTP {status}: {message}")]
    Http {
        status: StatusCode,
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode ImgGo response: {0}")]
    Decode(String),

    #[error("Failed to read image {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pattern definition: {0}")]
    InvalidPattern(#[from] garde::Report),

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: &'static str,
        attempts: u32,
        #[source]
        source: Box<ClientError>,
    },

    #[error("Job {job_id} failed: {message}")]
    JobFailed { job_id: String, message: String },

    #[error("Job {job_id} did not finish within {attempts} status polls")]
    Timeout { job_id: String, attempts: u32 },
}

impl ClientError {
    /// Innermost error behind any retry exhaustion wrappers.
    pub fn root(&self) -> &ClientError {
        match self {
            ClientError::RetriesExhausted { source, .. } => source.root(),
            other => other,
        }
    }

    /// HTTP status of the underlying response error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self.root() {
            ClientError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether a wait ended in job failure, timeout, or a request problem.
    pub fn outcome(&self) -> FailureKind {
        match self {
            ClientError::JobFailed { .. } => FailureKind::JobFailed,
            ClientError::Timeout { .. } => FailureKind::TimedOut,
            _ => FailureKind::Request,
        }
    }
}
