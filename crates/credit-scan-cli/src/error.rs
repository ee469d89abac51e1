//! HTTP mapping for scan failures.

use axum::{
    extract::rejection::BytesRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use credit_scan_core::ScanError;
use serde_json::json;
use thiserror::Error;

const INPUT_TOO_LARGE: &str = "INPUT_TOO_LARGE";
const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";
const AI_SCAN_FAILED: &str = "AI_SCAN_FAILED";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    /// The request body could not be read, including bodies over the size limit.
    #[error("request body rejected: {0}")]
    Body(#[from] BytesRejection),
}

impl ApiError {
    fn code(&self) -> &'static str {
        match self {
            ApiError::Scan(err) => err.code(),
            ApiError::Body(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                INPUT_TOO_LARGE
            }
            ApiError::Body(_) => AI_SCAN_FAILED,
        }
    }

    fn status(&self) -> StatusCode {
        match self.code() {
            INPUT_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            QUOTA_EXCEEDED => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match self.code() {
            INPUT_TOO_LARGE => {
                "Credit data is too large for AI analysis. Using static violations instead."
            }
            QUOTA_EXCEEDED => "OpenAI API quota exceeded. Using static violations instead.",
            _ => "AI scan failed. Using static violations instead.",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "scan request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "scan request rejected");
        }

        let body = Json(json!({
            "success": false,
            "error": self.code(),
            "message": self.message(),
            "fallbackUsed": true,
        }));

        (status, body).into_response()
    }
}
