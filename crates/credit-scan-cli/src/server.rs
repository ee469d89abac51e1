//! HTTP surface for the compliance scan.
//!
//! - `POST /api/ai-scan` runs the pipeline on a credit-report JSON body
//! - `GET /health` and `GET /api/health` for liveness probes

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use credit_scan_core::{ReportScanner, ScanError, ScanResponse};
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::ApiError;

const SERVICE_NAME: &str = "credit-scan";
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

pub struct AppState {
    pub scanner: Arc<dyn ReportScanner>,
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/health", get(api_health))
        .route("/api/ai-scan", post(ai_scan))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(addr: &str, scanner: Arc<dyn ReportScanner>) -> Result<()> {
    let app = router(Arc::new(AppState { scanner }));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Starting credit scan API on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2026-10-19T08:30:00.123Z`.
fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "timestamp": timestamp(),
    }))
}

async fn api_health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "API running",
        "timestamp": timestamp(),
    }))
}

async fn ai_scan(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ScanResponse>, ApiError> {
    let body = body?;
    info!(bytes = body.len(), "received scan request");
    let report: Value = serde_json::from_slice(&body).map_err(ScanError::from)?;
    let response = state.scanner.scan(&report).await?;
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use credit_scan_core::{ComplianceScanner, ScanConfig};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// Fails every scan with a quota error.
    struct QuotaScanner;

    #[async_trait]
    impl ReportScanner for QuotaScanner {
        async fn scan(&self, _report: &Value) -> Result<ScanResponse, ScanError> {
            Err(ScanError::QuotaExceeded("insufficient_quota".into()))
        }
    }

    fn app(scanner: Arc<dyn ReportScanner>) -> Router {
        router(Arc::new(AppState { scanner }))
    }

    fn offline_app(config: ScanConfig) -> Router {
        app(Arc::new(ComplianceScanner::with_config(None, config)))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn scan_request(body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/ai-scan")
            .header("content-type", "application/json")
            .body(body.into())
            .unwrap()
    }

    const REPORT: &str = r#"{"CREDIT_RESPONSE": {"CREDIT_LIABILITY": [{"@_DerogatoryDataIndicator": "Y"}]}}"#;

    #[tokio::test]
    async fn health_endpoints() {
        let get = |uri: &str| Request::builder().uri(uri).body(Body::empty()).unwrap();

        let (status, body) = send(offline_app(ScanConfig::default()), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
        let stamp = body["timestamp"].as_str().unwrap();
        assert!(stamp.ends_with('Z'), "{stamp}");
        assert_eq!(stamp.len(), "2026-10-19T08:30:00.123Z".len());
        assert!(chrono::DateTime::parse_from_rfc3339(stamp).is_ok());

        let (status, body) = send(offline_app(ScanConfig::default()), get("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["message"], "API running");
    }

    #[tokio::test]
    async fn scan_succeeds_offline() {
        let (status, body) = send(offline_app(ScanConfig::default()), scan_request(REPORT)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["totalViolations"], 9);
        assert_eq!(body["tokenInfo"]["fallbackUsed"], true);
        assert_eq!(body["breakdown"]["accounts"], 3);
    }

    #[tokio::test]
    async fn oversized_report_is_413() {
        let config = ScanConfig {
            max_input_tokens: 4,
            ..ScanConfig::default()
        };
        let (status, body) = send(offline_app(config), scan_request(REPORT)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INPUT_TOO_LARGE");
        assert_eq!(body["fallbackUsed"], true);
    }

    #[tokio::test]
    async fn body_over_size_limit_is_413_json() {
        let oversized = vec![b' '; MAX_BODY_BYTES + 1024 * 1024];
        let (status, body) = send(offline_app(ScanConfig::default()), scan_request(oversized)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "INPUT_TOO_LARGE");
        assert_eq!(
            body["message"],
            "Credit data is too large for AI analysis. Using static violations instead."
        );
        assert_eq!(body["fallbackUsed"], true);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_429() {
        let (status, body) = send(app(Arc::new(QuotaScanner)), scan_request(REPORT)).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], "QUOTA_EXCEEDED");
        assert_eq!(
            body["message"],
            "OpenAI API quota exceeded. Using static violations instead."
        );
    }

    #[tokio::test]
    async fn unparseable_body_is_500() {
        let (status, body) = send(
            offline_app(ScanConfig::default()),
            scan_request("{not json"),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "AI_SCAN_FAILED");
        assert_eq!(body["fallbackUsed"], true);
    }
}
