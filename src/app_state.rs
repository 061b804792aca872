use std::sync::Arc;

use tokio::sync::broadcast;

use crate::models::webhook::WebhookEvent;
use crate::services::signature::WebhookSigner;

/// Buffered webhook events per subscriber before the slowest one lags.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub signer: Arc<WebhookSigner>,
    pub events: broadcast::Sender<WebhookEvent>,
}

impl AppState {
    pub fn new(signer: WebhookSigner) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            signer: Arc::new(signer),
            events,
        }
    }

    /// Receive every verified event delivered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<WebhookEvent> {
        self.events.subscribe()
    }
}
