//! Web server endpoints.
//!
//! This module contains the report ingestion endpoint and the health checks used by the
//! deployment environment.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tally_config::Config;
use tally_protocol::SEND_METRICS_PATH;

use crate::service::ServiceState;
use crate::utils::ApiErrorResponse;

mod health_check;
mod report;

/// Builds the router with all endpoints of the collector.
#[rustfmt::skip]
pub fn routes(config: &Config) -> Router<ServiceState> {
    Router::new()
        .route("/healthz/live", get(health_check::handle_live))
        .route("/healthz/ready", get(health_check::handle_ready))
        .route(SEND_METRICS_PATH, post(report::handle).route_layer(DefaultBodyLimit::max(config.max_report_size())))
        .fallback(not_found)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        ApiErrorResponse::with_detail("not found"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, header};
    use serde_json::{Value, json};
    use tally_test::MockUpstream;
    use tower::ServiceExt;

    use super::*;
    use crate::constants::METRIC_LOG_TARGET;
    use crate::services::allow_list::{AllowListCache, UpstreamSource};
    use crate::services::server::make_app;

    async fn state(apps: &[(&str, &[&str])]) -> ServiceState {
        let config = Config::from_json_value(json!({
            "upstream": {"url": "http://127.0.0.1:1/"}
        }))
        .unwrap();

        let cache = Arc::new(AllowListCache::new(4));
        if !apps.is_empty() {
            let upstream = MockUpstream::start().await;
            for (app_id, metrics) in apps {
                upstream.set_app(app_id, metrics.iter().copied());
            }

            let source =
                UpstreamSource::with_client(reqwest::Client::new(), upstream.url(), 1 << 20);
            cache.update(&source).await.unwrap();
        }

        ServiceState::new(Arc::new(config), cache)
    }

    fn report_request(body: impl Into<Body>) -> Request<Body> {
        Request::post("/sendMetrics")
            .header(header::CONTENT_TYPE, "application/json")
            .body(body.into())
            .unwrap()
    }

    async fn send(state: &ServiceState, request: Request<Body>) -> (StatusCode, Value) {
        let response = make_app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_report_accepted() {
        let state = state(&[("app1", &["a", "b"])]).await;
        let (capture, _guard) = tally_log::capture();

        let body = json!({
            "appId": "app1",
            "appVersion": "1.0.0",
            "installId": "abc",
            "metrics": {"a": 1, "z": 9}
        });
        let (status, response) = send(&state, report_request(body.to_string())).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(response, json!({"message": "ok"}));

        let metrics: Vec<_> = capture
            .events()
            .into_iter()
            .filter(|event| event.target == METRIC_LOG_TARGET)
            .collect();
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].field("app_id"), Some("app1"));
        assert_eq!(metrics[0].field("app_version"), Some("1.0.0"));
        assert_eq!(metrics[0].field("install_id"), Some("abc"));
        assert_eq!(metrics[0].field("metric"), Some("a"));
        assert_eq!(metrics[0].field("count"), Some("1"));

        let skipped = capture.with_message("skipped metrics missing from the allow-list");
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].field("app_id"), Some("app1"));
        assert_eq!(skipped[0].field("rejected"), Some("1"));
        assert!(skipped[0].fields.values().all(|value| value != "z"));
    }

    #[tokio::test]
    async fn test_report_all_rejected_still_accepted() {
        let state = state(&[("app1", &["a"])]).await;

        let body = json!({"appId": "app1", "metrics": {"x": 1, "y": 2}});
        let (status, _) = send(&state, report_request(body.to_string())).await;

        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_report_unknown_app() {
        let state = state(&[("app1", &["a"])]).await;
        let (capture, _guard) = tally_log::capture();

        let body = json!({"appId": "app2", "metrics": {"a": 1}});
        let (status, response) = send(&state, report_request(body.to_string())).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            response,
            json!({"detail": "no metric definition found for app app2"})
        );
        assert_eq!(capture.with_message("rejected metric report").len(), 1);
        assert!(capture.events().iter().all(|e| e.target != METRIC_LOG_TARGET));
    }

    #[tokio::test]
    async fn test_report_empty_cache() {
        let state = state(&[]).await;

        for app_id in ["app1", "", "anything"] {
            let body = json!({"appId": app_id, "metrics": {"a": 1}});
            let (status, _) = send(&state, report_request(body.to_string())).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
    }

    #[tokio::test]
    async fn test_report_too_large() {
        let state = state(&[("app1", &["a"])]).await;
        let (capture, _guard) = tally_log::capture();

        let padding = "x".repeat(2 * 1024 * 1024);
        let body = json!({"appId": "app1", "metrics": {"a": 1}, "padding": padding});
        let (status, response) = send(&state, report_request(body.to_string())).await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response["detail"], "request body too large");
        assert!(capture.events().iter().all(|e| e.target != METRIC_LOG_TARGET));
    }

    #[tokio::test]
    async fn test_report_content_type() {
        let state = state(&[("app1", &["a"])]).await;

        let request = Request::post("/sendMetrics")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from(r#"{"appId":"app1"}"#))
            .unwrap();
        let (status, response) = send(&state, request).await;

        assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            response["detail"],
            r#"invalid content type: content-type "text/plain" is not "application/json""#
        );

        let request = Request::post("/sendMetrics")
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .body(Body::from(r#"{"appId":"app1"}"#))
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_report_bad_request() {
        let state = state(&[("app1", &["a"])]).await;

        let cases = [
            ("", "body must not be empty"),
            (r#"{"appId":"app1","#, "malformed json"),
            (r#"{"appId":"app1"} {"appId":"app1"}"#, "body contained more than one json object"),
        ];

        for (body, detail) in cases {
            let (status, response) = send(&state, report_request(body)).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(response["detail"], detail, "body: {body}");
        }

        let body = r#"{"appId":"app1","metrics":{"a":"many"}}"#;
        let (status, response) = send(&state, report_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = response["detail"].as_str().unwrap();
        assert!(detail.starts_with(r#"invalid value for "metrics.a""#), "{detail}");
    }

    #[tokio::test]
    async fn test_health_checks() {
        let empty = state(&[]).await;
        let loaded = state(&[("app1", &["a"])]).await;

        let live = || Request::get("/healthz/live").body(Body::empty()).unwrap();
        let ready = || Request::get("/healthz/ready").body(Body::empty()).unwrap();

        let (status, response) = send(&empty, live()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response, json!({"is_healthy": true}));

        let (status, response) = send(&empty, ready()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response, json!({"is_healthy": false}));

        let (status, _) = send(&loaded, ready()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_not_found() {
        let state = state(&[]).await;

        let request = Request::get("/unknown").body(Body::empty()).unwrap();
        let response = make_app(state).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let server = response.headers().get(header::SERVER).unwrap();
        assert!(server.to_str().unwrap().starts_with("tally/"));
    }
}
