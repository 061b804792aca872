//! Test helpers: a scripted in-process ImgGo API and a sleeper that records
//! delays instead of waiting.

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use futures::future::BoxFuture;
use imggo_client::services::retry::Sleeper;
use imggo_client::{ClientConfig, ImgGoClient};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One canned response.
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub body: Value,
    pub headers: Vec<(String, String)>,
}

impl Scripted {
    /// 200 with `{"data": data}`.
    pub fn ok(data: Value) -> Self {
        Self {
            status: 200,
            body: json!({ "data": data }),
            headers: Vec::new(),
        }
    }

    pub fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": { "message": message } }),
            headers: Vec::new(),
        }
    }

    pub fn job(status: &str) -> Self {
        Self::ok(json!({ "status": status }))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).expect("valid status");
        let mut response = (status, Json(self.body)).into_response();
        for (name, value) in self.headers {
            response.headers_mut().insert(
                HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
                HeaderValue::from_str(&value).expect("valid header value"),
            );
        }
        response
    }
}

/// A request the fake API received.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("JSON request body")
    }
}

#[derive(Default)]
struct FakeState {
    ingest: Mutex<VecDeque<Scripted>>,
    patterns: Mutex<VecDeque<Scripted>>,
    webhooks: Mutex<VecDeque<Scripted>>,
    /// Per job id; the last entry repeats once the queue is down to one.
    jobs: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// ImgGo API double served on an ephemeral local port.
pub struct FakeApi {
    pub base_url: String,
    state: Arc<FakeState>,
}

impl FakeApi {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let addr = serve(app).await;
        Self {
            base_url: format!("http://{}/api", addr),
            state,
        }
    }

    pub fn push_ingest(&self, response: Scripted) {
        self.state.ingest.lock().unwrap().push_back(response);
    }

    pub fn push_job(&self, job_id: &str, response: Scripted) {
        self.state
            .jobs
            .lock()
            .unwrap()
            .entry(job_id.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn push_pattern(&self, response: Scripted) {
        self.state.patterns.lock().unwrap().push_back(response);
    }

    pub fn push_webhook(&self, response: Scripted) {
        self.state.webhooks.lock().unwrap().push_back(response);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests whose path ends with `suffix` (e.g. "/ingest").
    pub fn requests_ending(&self, suffix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.ends_with(suffix))
            .collect()
    }

    /// Requests whose path starts with `prefix` (e.g. "/api/jobs/").
    pub fn requests_starting(&self, prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path.starts_with(prefix))
            .collect()
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    state.requests.lock().unwrap().push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        headers,
        body,
    });

    let scripted = if method == Method::POST && path.ends_with("/ingest") {
        state.ingest.lock().unwrap().pop_front()
    } else if method == Method::GET && path.starts_with("/api/jobs/") {
        let job_id = path.trim_start_matches("/api/jobs/");
        let mut jobs = state.jobs.lock().unwrap();
        match jobs.get_mut(job_id) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => Some(Scripted::error(404, "Job not found")),
        }
    } else if method == Method::POST && path == "/api/patterns" {
        state.patterns.lock().unwrap().pop_front()
    } else if method == Method::POST && path == "/api/webhooks" {
        state.webhooks.lock().unwrap().pop_front()
    } else {
        None
    };

    scripted
        .unwrap_or_else(|| Scripted::error(500, "unscripted request"))
        .into_response()
}

/// Serve `app` on 127.0.0.1 with an OS-assigned port.
pub async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server");
    });
    addr
}

/// Records every requested delay and returns immediately.
#[derive(Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        self.slept.lock().unwrap().push(duration);
        Box::pin(async {})
    }
}

pub fn test_config(base_url: &str) -> ClientConfig {
    let mut config = ClientConfig::new("test_key").with_base_url(base_url);
    config.timeout_secs = 5;
    config
}

/// Client pointed at `base_url` whose waits are recorded, not slept.
pub fn test_client(config: ClientConfig) -> (ImgGoClient, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let client = ImgGoClient::new(config)
        .expect("test client")
        .with_sleeper(sleeper.clone());
    (client, sleeper)
}

/// A tiny PNG header, enough for MIME sniffing.
pub fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D]
}
