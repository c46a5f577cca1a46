//! Scripted in-memory device used by unit tests

use super::{DeviceClient, DeviceResponse, TransportError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// What the fake device does for one route
#[derive(Debug, Clone)]
pub(crate) enum Behavior {
    /// Answer immediately with this status
    Status(u16),
    /// Answer with this status after a delay
    Delayed(Duration, u16),
    /// Never answer (caller's timeout fires)
    Hang,
    /// Connection refused
    Refuse,
}

/// Routes are matched by path segment: `status`, `capture`, `stream`
pub(crate) struct ScriptedDevice {
    behaviors: Mutex<HashMap<&'static str, Behavior>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedDevice {
    /// Every route answers 200
    pub(crate) fn online() -> Self {
        let device = Self {
            behaviors: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
        };
        device.set("status", Behavior::Status(200));
        device.set("capture", Behavior::Status(200));
        device
    }

    /// Every route refuses connections
    pub(crate) fn offline() -> Self {
        let device = Self::online();
        device.set("status", Behavior::Refuse);
        device.set("capture", Behavior::Refuse);
        device
    }

    pub(crate) fn set(&self, route: &'static str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(route, behavior);
    }

    pub(crate) fn calls(&self, route: &'static str) -> usize {
        self.calls.lock().unwrap().get(route).copied().unwrap_or(0)
    }

    fn route_of(url: &str) -> &'static str {
        let path = url.split('?').next().unwrap_or(url);
        if path.ends_with("/status") {
            "status"
        } else if path.ends_with("/capture") {
            "capture"
        } else if path.ends_with("/stream") {
            "stream"
        } else {
            "other"
        }
    }
}

#[async_trait]
impl DeviceClient for ScriptedDevice {
    async fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<DeviceResponse, TransportError> {
        let route = Self::route_of(url);
        *self.calls.lock().unwrap().entry(route).or_insert(0) += 1;

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(route)
            .cloned()
            .unwrap_or(Behavior::Status(404));

        match behavior {
            Behavior::Status(code) => Ok(DeviceResponse::new(code, b"{}".to_vec())),
            Behavior::Delayed(delay, code) => {
                if delay >= timeout {
                    tokio::time::sleep(timeout).await;
                    return Err(TransportError::Timeout);
                }
                tokio::time::sleep(delay).await;
                Ok(DeviceResponse::new(code, b"{}".to_vec()))
            }
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Err(TransportError::Timeout)
            }
            Behavior::Refuse => Err(TransportError::Connection("connection refused".to_string())),
        }
    }
}
