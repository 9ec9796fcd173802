use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use parking_lot::Mutex;
use tally_protocol::{AllowedMetricsResponse, ManifestResponse};
use url::Url;

use crate::MockServer;

#[derive(Debug, Default)]
struct UpstreamState {
    apps: BTreeMap<String, Vec<String>>,
    failing_apps: HashSet<String>,
    failing_manifest: bool,
    malformed_manifest: bool,
    unlisted_apps: HashSet<String>,
    manifest_requests: usize,
    app_requests: BTreeMap<String, usize>,
}

/// A configuration endpoint serving the manifest and per-app allow-lists.
///
/// The manifest lists every app registered with [`set_app`](Self::set_app) except those hidden
/// with [`unlist_app`](Self::unlist_app). Failures can be injected per endpoint and are returned
/// as `500 Internal Server Error`.
#[derive(Debug)]
pub struct MockUpstream {
    server: MockServer,
    state: Arc<Mutex<UpstreamState>>,
}

impl MockUpstream {
    /// Starts serving on an ephemeral local port.
    pub async fn start() -> Self {
        let state = Arc::new(Mutex::new(UpstreamState::default()));

        let router = Router::new()
            .route("/manifest.json", get(manifest))
            .route("/{app_id}/metrics.json", get(app_metrics))
            .with_state(Arc::clone(&state));

        let server = MockServer::start(router).await;
        Self { server, state }
    }

    /// The base URL to configure as upstream.
    pub fn url(&self) -> Url {
        self.server.url()
    }

    /// Registers an app with its allowed metrics, replacing a previous registration.
    pub fn set_app<I, S>(&self, app_id: &str, metrics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let metrics = metrics.into_iter().map(Into::into).collect();
        self.state.lock().apps.insert(app_id.to_owned(), metrics);
    }

    /// Removes an app from the manifest and stops serving its allow-list.
    pub fn remove_app(&self, app_id: &str) {
        self.state.lock().apps.remove(app_id);
    }

    /// Keeps serving an app's allow-list but omits it from the manifest.
    pub fn unlist_app(&self, app_id: &str) {
        self.state.lock().unlisted_apps.insert(app_id.to_owned());
    }

    /// Makes the allow-list of an app fail.
    pub fn fail_app(&self, app_id: &str, fail: bool) {
        let mut state = self.state.lock();
        if fail {
            state.failing_apps.insert(app_id.to_owned());
        } else {
            state.failing_apps.remove(app_id);
        }
    }

    /// Makes the manifest fail.
    pub fn fail_manifest(&self, fail: bool) {
        self.state.lock().failing_manifest = fail;
    }

    /// Makes the manifest respond with a body that is not valid JSON.
    pub fn malform_manifest(&self, malformed: bool) {
        self.state.lock().malformed_manifest = malformed;
    }

    /// The number of manifest requests received so far.
    pub fn manifest_requests(&self) -> usize {
        self.state.lock().manifest_requests
    }

    /// The number of allow-list requests received for an app so far.
    pub fn app_requests(&self, app_id: &str) -> usize {
        self.state.lock().app_requests.get(app_id).copied().unwrap_or(0)
    }
}

async fn manifest(State(state): State<Arc<Mutex<UpstreamState>>>) -> Response {
    let mut state = state.lock();
    state.manifest_requests += 1;

    if state.failing_manifest {
        return (StatusCode::INTERNAL_SERVER_ERROR, "manifest unavailable").into_response();
    }

    if state.malformed_manifest {
        return (StatusCode::OK, "{\"metricsApps\": [").into_response();
    }

    let metrics_apps = state
        .apps
        .keys()
        .filter(|app_id| !state.unlisted_apps.contains(*app_id))
        .cloned()
        .collect();

    Json(ManifestResponse { metrics_apps }).into_response()
}

async fn app_metrics(
    State(state): State<Arc<Mutex<UpstreamState>>>,
    Path(app_id): Path<String>,
) -> Response {
    let mut state = state.lock();
    *state.app_requests.entry(app_id.clone()).or_default() += 1;

    if state.failing_apps.contains(&app_id) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "allow-list unavailable").into_response();
    }

    match state.apps.get(&app_id) {
        Some(metrics) => Json(AllowedMetricsResponse {
            metrics: metrics.clone(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
