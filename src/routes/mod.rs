pub mod health;
pub mod metrics;
pub mod webhook;

use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;

/// Webhook bodies are small JSON documents.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Routes of the webhook receiver. `/metrics` is mounted only when a
/// Prometheus recorder is installed.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/webhook", post(webhook::receive_event))
        .with_state(state);

    let app = match prometheus {
        Some(handle) => app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state(handle),
        ),
        None => app,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}
