use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use crate::app_state::AppState;
use crate::models::webhook::{WebhookEvent, WebhookEventKind};
use crate::services::signature::SIGNATURE_HEADER;

/// POST /webhook — receive a signed job notification from ImgGo.
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if let Err(e) = state.signer.verify(&body, signature) {
        tracing::warn!(error = %e, "Rejected webhook with invalid signature");
        metrics::counter!("imggo_webhooks_rejected_total").increment(1);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": "Invalid signature"})),
        );
    }

    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "Webhook body is not a job event");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "Malformed event"})),
            );
        }
    };

    metrics::counter!("imggo_webhooks_received_total", "event" => event.event.as_str())
        .increment(1);

    match event.event {
        WebhookEventKind::JobSucceeded => {
            tracing::info!(job_id = %event.data.job_id, "Job succeeded");
        }
        WebhookEventKind::JobFailed => {
            tracing::warn!(
                job_id = %event.data.job_id,
                error = event.data.error.as_deref().unwrap_or("Unknown error"),
                "Job failed"
            );
        }
        WebhookEventKind::Unknown => {
            tracing::debug!(job_id = %event.data.job_id, "Ignoring unrecognized webhook event");
        }
    }

    // No subscribers is fine; the event has already been logged.
    let _ = state.events.send(event);

    (StatusCode::OK, Json(json!({"status": "received"})))
}
