//! Health check endpoints for the collector.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::service::ServiceState;

#[derive(Serialize)]
struct Status {
    is_healthy: bool,
}

impl Status {
    fn response(is_healthy: bool) -> impl IntoResponse {
        let status = if is_healthy {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        };

        (status, Json(Status { is_healthy }))
    }
}

/// Responds as long as the server accepts requests.
pub async fn handle_live() -> impl IntoResponse {
    Status::response(true)
}

/// Responds successfully once the allow-lists have been loaded.
pub async fn handle_ready(State(state): State<ServiceState>) -> impl IntoResponse {
    Status::response(state.allow_lists().is_ready())
}
