//! Error handling for the DoorGuardian engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Why a capture request against a reachable device did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CaptureFailure {
    /// Device answered with a non-2xx status
    Status(u16),
    /// No answer within the capture timeout
    Timeout,
    /// Connection refused, reset, DNS failure...
    Transport(String),
}

impl std::fmt::Display for CaptureFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureFailure::Status(code) => write!(f, "device returned HTTP {}", code),
            CaptureFailure::Timeout => write!(f, "device did not answer in time"),
            CaptureFailure::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Capture attempted while disconnected (never sent over the network)
    #[error("Device unreachable")]
    CaptureRejected,

    /// Device is reachable but the capture endpoint failed
    #[error("Capture failed: {reason}")]
    CaptureFailed { reason: CaptureFailure },

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Stable machine-readable code used in API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::CaptureRejected => "DEVICE_UNREACHABLE",
            Error::CaptureFailed { .. } => "CAPTURE_FAILED",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Http(_) => "HTTP_ERROR",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::CaptureRejected => StatusCode::SERVICE_UNAVAILABLE,
            Error::CaptureFailed { .. } | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();
        let message = self.to_string();

        tracing::error!(
            status = %status,
            error_code = %error_code,
            message = %message,
            "Request error"
        );

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejected_maps_to_service_unavailable() {
        let err = Error::CaptureRejected;
        assert_eq!(err.error_code(), "DEVICE_UNREACHABLE");
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "Device unreachable");
    }

    #[test]
    fn test_capture_failure_message_carries_cause() {
        let err = Error::CaptureFailed {
            reason: CaptureFailure::Status(500),
        };
        assert_eq!(err.error_code(), "CAPTURE_FAILED");
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.to_string(), "Capture failed: device returned HTTP 500");
    }

    #[test]
    fn test_config_error_maps_to_internal() {
        let err = Error::Config("PORT is not a valid port".to_string());
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
