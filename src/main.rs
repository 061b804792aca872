use imggo_client::{
    app_state::AppState, config::WebhookServerConfig, routes, services::signature::WebhookSigner,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config =
        WebhookServerConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing ImgGo webhook receiver");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!(
        "imggo_webhooks_received_total",
        "Verified webhook deliveries by event type"
    );
    metrics::describe_counter!(
        "imggo_webhooks_rejected_total",
        "Webhook deliveries rejected for a bad signature"
    );

    let signer =
        WebhookSigner::new(&config.webhook_secret).expect("Failed to initialize webhook signer");
    let state = AppState::new(signer);

    // Downstream hand-off point for verified events.
    let mut events = state.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::debug!(
                    event = event.event.as_str(),
                    job_id = %event.data.job_id,
                    "Event dispatched"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event consumer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let app = routes::router(state, Some(prometheus_handle));

    tracing::info!("Starting webhook receiver on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Webhook endpoint: http://{}/webhook", config.bind_addr);

    axum::serve(listener, app).await.expect("Server error");
}
