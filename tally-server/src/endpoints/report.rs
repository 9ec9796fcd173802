//! Ingestion of metric reports from the client library.

use std::error::Error;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tally_protocol::MetricReport;

use crate::constants::METRIC_LOG_TARGET;
use crate::extractors::ReportJson;
use crate::service::ServiceState;
use crate::services::allow_list::LookupError;
use crate::utils::ApiErrorResponse;

#[derive(Serialize)]
struct Accepted {
    message: &'static str,
}

impl IntoResponse for LookupError {
    fn into_response(self) -> Response {
        tally_log::warn!(error = &self as &dyn Error, "rejected metric report");
        (StatusCode::NOT_FOUND, ApiErrorResponse::from_error(&self)).into_response()
    }
}

/// Logs every allowed metric of a report.
///
/// Metrics that are not on the allow-list of the app are skipped. They are counted in a single
/// warning that does not include their names.
pub async fn handle(
    State(state): State<ServiceState>,
    ReportJson(report): ReportJson<MetricReport>,
) -> Result<impl IntoResponse, LookupError> {
    let allow_list = state.allow_lists().get_allowed_metrics(&report.app_id)?;

    let mut rejected = 0usize;
    for (name, count) in &report.metrics {
        if !allow_list.is_allowed(name) {
            rejected += 1;
            continue;
        }

        tally_log::info!(
            target: METRIC_LOG_TARGET,
            app_id = %report.app_id,
            app_version = %report.app_version,
            install_id = %report.install_id,
            metric = %name,
            count = *count,
            "metric reported",
        );
    }

    if rejected > 0 {
        tally_log::warn!(
            app_id = %report.app_id,
            rejected,
            "skipped metrics missing from the allow-list",
        );
    }

    Ok((StatusCode::ACCEPTED, Json(Accepted { message: "ok" })))
}
