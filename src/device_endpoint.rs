//! Device endpoint
//!
//! Resource locators of the camera firmware (`/status`, `/stream`, `/capture`).
//! Locators are derived on every call, nothing is cached.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Immutable base address of one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    base_address: String,
}

impl DeviceEndpoint {
    /// Build from `host[:port]` or a full base URL
    ///
    /// A bare host gets `http://` prepended; trailing slashes are dropped.
    pub fn new(address: &str) -> Result<Self> {
        let trimmed = address.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(Error::Config("device address must not be empty".to_string()));
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "device address contains whitespace: {:?}",
                address
            )));
        }

        let base_address = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("http://{}", trimmed)
        };

        Ok(Self { base_address })
    }

    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    /// Liveness endpoint (JSON `{"status":"connected","ip":...}`)
    pub fn status_path(&self) -> String {
        format!("{}/status", self.base_address)
    }

    /// MJPEG stream consumed by the display surface
    pub fn stream_path(&self) -> String {
        format!("{}/stream", self.base_address)
    }

    /// Still capture (`image/jpeg`)
    pub fn capture_path(&self) -> String {
        format!("{}/capture", self.base_address)
    }
}

impl std::fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.base_address)
    }
}

/// Stream locator for a session generation and a surface refresh slot
///
/// Consumers render only the locator of the latest generation; the slot acts
/// as a cache buster so the displayed image is re-fetched every period.
pub fn resource_locator_for(endpoint: &DeviceEndpoint, generation: u64, slot: u64) -> String {
    format!("{}?session={}&t={}", endpoint.stream_path(), generation, slot)
}

/// Capture locator with a millisecond timestamp cache buster
pub fn capture_locator_for(endpoint: &DeviceEndpoint, unix_millis: i64) -> String {
    format!("{}?t={}", endpoint.capture_path(), unix_millis)
}
