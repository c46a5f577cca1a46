//! Session types

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Generation id of the rendered stream surface
///
/// Monotonic for the lifetime of an engine. Installing a new handle is what
/// restarts the session; the old one is simply no longer rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub const FIRST: SessionHandle = SessionHandle(0);

    pub fn generation(self) -> u64 {
        self.0
    }

    pub(crate) fn next(self) -> Self {
        SessionHandle(self.0 + 1)
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Supervisor phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    NoSession,
    Active,
    /// Transient, between discarding a handle and installing the next
    Restarting,
}

/// Forced restarts used in the current connected period, capped at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBudget {
    used: u32,
    max: u32,
}

impl RetryBudget {
    pub fn new(max: u32) -> Self {
        Self { used: 0, max }
    }

    pub fn used(&self) -> u32 {
        self.used
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.max
    }

    /// Take one restart; false when none are left
    pub fn try_consume(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.used += 1;
        true
    }

    pub fn reset(&mut self) {
        self.used = 0;
    }
}

/// Installed session
#[derive(Debug, Clone, Copy)]
pub(crate) struct Session {
    pub handle: SessionHandle,
    pub installed_at: Instant,
}

impl Session {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            installed_at: Instant::now(),
        }
    }

    /// Whole surface-refresh periods elapsed since installation
    pub fn refresh_slot(&self, period_ms: u64) -> u64 {
        let elapsed_ms = self.installed_at.elapsed().as_millis() as u64;
        elapsed_ms / period_ms.max(1)
    }
}

/// Locator the display surface should currently render
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamLocator {
    pub handle: SessionHandle,
    pub slot: u64,
    pub url: String,
}
