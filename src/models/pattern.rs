use garde::Validate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Output format a pattern is configured to produce.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Xml,
    Yaml,
    #[serde(alias = "plaintext")]
    #[strum(to_string = "text", serialize = "plaintext")]
    Text,
}

/// Body of `POST /patterns`.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct PatternSpec {
    #[garde(length(min = 1, max = 200))]
    pub name: String,

    #[garde(length(min = 1, max = 4000))]
    pub instructions: String,

    #[garde(skip)]
    pub format: OutputFormat,

    /// JSON Schema the extracted object must satisfy (JSON patterns only).
    #[serde(skip_serializing_if = "Option::is_none")]
    #[garde(skip)]
    pub json_schema: Option<Map<String, Value>>,
}

/// Pattern as returned by the API after creation.
#[derive(Debug, Clone, Deserialize)]
pub struct Pattern {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub format: Option<OutputFormat>,
}
