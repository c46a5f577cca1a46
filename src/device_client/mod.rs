//! DeviceClient - HTTP transport to the camera firmware
//!
//! ## Responsibilities
//!
//! - Single GET primitive used by the prober and the capture action
//! - Per-request timeout
//! - Collapsing reqwest errors into timeout / connection failures
//!
//! The engine only talks to the device through [`DeviceClient`], so tests and
//! alternative transports can stand in for [`HttpDeviceClient`].

#[cfg(test)]
pub(crate) mod scripted;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Connect timeout for the HTTP client (per-request timeouts are set by callers)
const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Response received from the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl DeviceResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request never produced a response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection error: {0}")]
    Connection(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Connection(e.to_string())
        }
    }
}

/// Transport seam between the engine and the device
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Issue a GET and read the whole body
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<DeviceResponse, TransportError>;
}

/// reqwest-backed client
pub struct HttpDeviceClient {
    client: reqwest::Client,
}

impl HttpDeviceClient {
    /// Create new HttpDeviceClient
    ///
    /// The camera sits on the local network, so proxy settings from the
    /// environment (`HTTP_PROXY`, `ALL_PROXY`) are ignored.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }

    /// Wrap an existing reqwest client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DeviceClient for HttpDeviceClient {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> std::result::Result<DeviceResponse, TransportError> {
        let resp = self.client.get(url).timeout(timeout).send().await?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await?;

        tracing::trace!(url = %url, status = status, size = body.len(), "Device response");

        Ok(DeviceResponse::new(status, body.to_vec()))
    }
}
