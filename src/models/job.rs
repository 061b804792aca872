use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::pattern::OutputFormat;

/// Status of an ImgGo job as reported by `GET /jobs/{job_id}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[serde(alias = "pending")]
    Queued,
    Processing,
    /// Older API revisions report `completed`.
    #[serde(alias = "completed")]
    Succeeded,
    Failed,
    #[serde(other)]
    Unknown,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a job. Only the server mutates jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    #[serde(default)]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub manifest: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl JobSnapshot {
    /// Raw success payload, preferring `manifest` over the legacy `result` field.
    pub fn payload_value(&self) -> Option<&Value> {
        self.manifest
            .as_ref()
            .filter(|v| !v.is_null())
            .or_else(|| self.result.as_ref().filter(|v| !v.is_null()))
    }
}

/// Extracted data of a succeeded job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    /// JSON patterns.
    Structured(Map<String, Value>),
    /// CSV, XML, YAML and plain-text patterns.
    Raw(String),
}

impl Payload {
    /// Interpret a payload according to the pattern's declared output format.
    pub fn decode(value: Value, format: OutputFormat) -> Result<Self, PayloadError> {
        match format {
            OutputFormat::Json => match value {
                Value::Object(map) => Ok(Payload::Structured(map)),
                Value::String(text) => match serde_json::from_str::<Value>(&text) {
                    Ok(Value::Object(map)) => Ok(Payload::Structured(map)),
                    Ok(other) => Err(PayloadError::NotAnObject(json_kind(&other))),
                    Err(e) => Err(PayloadError::InvalidJson(e)),
                },
                other => Err(PayloadError::NotAnObject(json_kind(&other))),
            },
            OutputFormat::Csv | OutputFormat::Xml | OutputFormat::Yaml | OutputFormat::Text => {
                match value {
                    Value::String(text) => Ok(Payload::Raw(text)),
                    other => Ok(Payload::Raw(other.to_string())),
                }
            }
        }
    }

    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Payload::Structured(map) => Some(map),
            Payload::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&str> {
        match self {
            Payload::Raw(text) => Some(text),
            Payload::Structured(_) => None,
        }
    }

    /// Human-readable rendering: pretty JSON or the raw text.
    pub fn render(&self) -> String {
        match self {
            Payload::Structured(map) => serde_json::to_string_pretty(map)
                .unwrap_or_else(|_| Value::Object(map.clone()).to_string()),
            Payload::Raw(text) => text.clone(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("JSON pattern returned a {0} instead of an object")]
    NotAnObject(&'static str),

    #[error("JSON pattern returned unparseable text: {0}")]
    InvalidJson(#[from] serde_json::Error),
}
