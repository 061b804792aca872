use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event types a webhook can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventKind {
    #[serde(rename = "job.succeeded")]
    JobSucceeded,
    #[serde(rename = "job.failed")]
    JobFailed,
    #[serde(other)]
    Unknown,
}

impl WebhookEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookEventKind::JobSucceeded => "job.succeeded",
            WebhookEventKind::JobFailed => "job.failed",
            WebhookEventKind::Unknown => "unknown",
        }
    }
}

/// Body delivered to a registered webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: WebhookEventKind,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEventData {
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /webhooks`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookRegistrationRequest {
    pub url: String,
    pub events: Vec<WebhookEventKind>,
    pub secret: String,
}

/// Registration as returned by `POST /webhooks`.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookRegistration {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
    #[serde(default)]
    pub events: Vec<WebhookEventKind>,
}
