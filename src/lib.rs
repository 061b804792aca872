//! ImgGo API client
//!
//! Async client for the ImgGo pattern-based image extraction service:
//! submit images or URLs, poll jobs to completion with bounded retries,
//! and receive signed webhook notifications.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;

pub use config::ClientConfig;
pub use models::job::{JobSnapshot, JobStatus, Payload};
pub use models::pattern::OutputFormat;
pub use services::client::{
    ClientError, ImageSource, ImgGoClient, PollOptions, ProcessOptions, ProcessOutcome,
    SubmitOptions,
};
