//! LivenessProber types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Binary device reachability
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// Initial state, and after any failed probe
    #[default]
    Disconnected,
    /// Last probe got a 2xx
    Connected,
}

impl ConnectivityState {
    pub fn is_connected(self) -> bool {
        self == ConnectivityState::Connected
    }
}

/// Why a probe counted as unreachable
///
/// Kept for diagnostics only; every variant means the same thing to the
/// state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProbeFailure {
    /// Non-2xx status
    Status(u16),
    /// No answer within the probe timeout
    Timeout,
    /// Connection-level failure
    Transport(String),
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProbeFailure::Status(code) => write!(f, "HTTP {}", code),
            ProbeFailure::Timeout => write!(f, "timeout"),
            ProbeFailure::Transport(msg) => write!(f, "{}", msg),
        }
    }
}

/// Result of one probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Reachable {
        status: u16,
        /// IP the firmware reports in its status JSON, if any
        reported_ip: Option<String>,
    },
    Unreachable(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable { .. })
    }

    pub fn state(&self) -> ConnectivityState {
        if self.is_reachable() {
            ConnectivityState::Connected
        } else {
            ConnectivityState::Disconnected
        }
    }
}

/// Status body served by the camera firmware
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct DeviceStatusReport {
    pub ip: Option<String>,
}

/// Point-in-time view of a prober
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSnapshot {
    pub state: ConnectivityState,
    pub probes_sent: u64,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_failure: Option<ProbeFailure>,
    pub reported_ip: Option<String>,
}
