use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use parking_lot::Mutex;
use tally_protocol::{MetricReport, SEND_METRICS_PATH};
use url::Url;

/// A report received by the [`MockCollector`].
#[derive(Clone, Debug)]
pub struct ReceivedReport {
    /// Request headers as sent by the client.
    pub headers: HeaderMap,
    /// The decoded body.
    pub report: MetricReport,
}

#[derive(Debug)]
struct CollectorState {
    status: StatusCode,
    body: String,
    delay: Duration,
    started: usize,
    reports: Vec<ReceivedReport>,
}

impl Default for CollectorState {
    fn default() -> Self {
        Self {
            status: StatusCode::ACCEPTED,
            body: r#"{"message":"ok"}"#.to_owned(),
            delay: Duration::ZERO,
            started: 0,
            reports: Vec::new(),
        }
    }
}

/// A collector recording all submitted metric reports.
///
/// By default, every report is accepted immediately with `202 Accepted`.
#[derive(Debug)]
pub struct MockCollector {
    server: crate::MockServer,
    state: Arc<Mutex<CollectorState>>,
}

impl MockCollector {
    /// Starts serving on an ephemeral local port.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(CollectorState::default()));

        let router = Router::new()
            .route(SEND_METRICS_PATH, post(send_metrics))
            .with_state(Arc::clone(&state));

        let server = crate::MockServer::start(router).await;
        Self { server, state }
    }

    /// The base URL to configure as collector.
    pub fn url(&self) -> Url {
        self.server.url()
    }

    /// Responds to all further reports with the given status and body.
    pub fn respond_with(&self, status: u16, body: impl Into<String>) {
        let mut state = self.state.lock();
        state.status = StatusCode::from_u16(status).expect("invalid status code");
        state.body = body.into();
    }

    /// Delays all further responses.
    pub fn delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    /// The number of requests that reached the collector, including those still in flight.
    pub fn requests_started(&self) -> usize {
        self.state.lock().started
    }

    /// All reports received and answered so far, in order of completion.
    pub fn reports(&self) -> Vec<ReceivedReport> {
        self.state.lock().reports.clone()
    }

    /// Waits until at least `count` reports were received, or panics after `timeout`.
    pub async fn wait_for_reports(&self, count: usize, timeout: Duration) -> Vec<ReceivedReport> {
        let result = tokio::time::timeout(timeout, async {
            loop {
                if self.state.lock().reports.len() >= count {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await;

        assert!(result.is_ok(), "timed out while waiting for {count} reports");
        self.reports()
    }
}

async fn send_metrics(
    State(state): State<Arc<Mutex<CollectorState>>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let delay = {
        let mut state = state.lock();
        state.started += 1;
        state.delay
    };

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let report = serde_json::from_slice(&body).unwrap_or_default();

    let mut state = state.lock();
    state.reports.push(ReceivedReport { headers, report });
    (state.status, state.body.clone())
}
