//! DoorGuardian Engine
//!
//! Device connectivity & stream supervision for a LAN camera (ESP32-CAM
//! firmware exposing `/status`, `/stream`, `/capture`).
//!
//! ## Architecture
//!
//! 1. LivenessProber - Periodic reachability check, edge-triggered
//! 2. StreamSupervisor - Session lifecycle, forced restarts, capture
//! 3. DeviceClient - HTTP transport seam (reqwest)
//! 4. EventHub - Outbound signals (connectivity, session, capture)
//! 5. WebAPI - HTTP façade for UI collaborators
//!
//! ## Design Principles
//!
//! - One engine per device, no global state
//! - Timers are owned handles; dropping the engine cancels them
//! - Connectivity changes only through probe outcomes

pub mod config;
pub mod device_client;
pub mod device_endpoint;
pub mod error;
pub mod event_hub;
pub mod liveness_prober;
pub mod models;
pub mod state;
pub mod stream_supervisor;
pub mod web_api;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use state::AppState;
pub use stream_supervisor::StreamSupervisor;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a std mutex, recovering the data if a holder panicked
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
