//! Submit a set of images against one pattern and wait for all results.
//!
//! Usage: `batch <pattern_id> [--format <format>] <image>...`
//!
//! Images starting with `http://` or `https://` are submitted by URL.
//! Prints a JSON report on stdout; exits non-zero if any image did not succeed.

use clap::Parser;
use imggo_client::{
    config::ClientConfig,
    services::batch,
    ImageSource, ImgGoClient, OutputFormat,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "batch")]
#[command(about = "Submit images against an ImgGo pattern and wait for every result")]
struct Args {
    /// Pattern every image is processed with.
    pattern_id: String,

    /// Output format the pattern produces (json, csv, xml, yaml, text).
    #[arg(long, default_value = "json")]
    format: OutputFormat,

    /// Local image paths or http(s) URLs.
    #[arg(required = true)]
    images: Vec<String>,
}

impl Args {
    fn sources(&self) -> Vec<ImageSource> {
        self.images
            .iter()
            .map(|image| {
                if image.starts_with("http://") || image.starts_with("https://") {
                    ImageSource::Url(image.clone())
                } else {
                    ImageSource::File(PathBuf::from(image))
                }
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .with_writer(std::io::stderr)
        .init();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let client = match ImgGoClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize ImgGo client");
            return ExitCode::FAILURE;
        }
    };

    let poll = client.poll_options(args.format);
    let report = batch::run(&client, args.sources(), &args.pattern_id, &poll).await;

    match serde_json::to_string_pretty(&report) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize report");
            return ExitCode::FAILURE;
        }
    }

    if report.succeeded == report.items.len() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
