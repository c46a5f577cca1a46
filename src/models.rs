//! Shared API models

use serde::{Deserialize, Serialize};

/// Standard API response wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_sec: u64,
    pub device_connected: bool,
}

/// Manual refresh result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// New session generation, absent when there was no session to refresh
    pub session: Option<u64>,
}

/// Stream error report sent by the display surface
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamErrorReport {
    #[serde(default)]
    pub reason: Option<String>,
}
