//! Application state
//!
//! Holds the engine shared across HTTP handlers

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::stream_supervisor::StreamSupervisor;
use std::sync::Arc;
use std::time::Instant;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Engine settings
    pub engine: EngineConfig,
}

impl AppConfig {
    /// Load from process environment
    pub fn from_env() -> Result<Self> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| Error::Config(format!("PORT is not a valid port: {:?}", raw)))?,
            Err(_) => 8080,
        };

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            engine: EngineConfig::from_env()?,
        })
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Engine for the configured device
    pub supervisor: Arc<StreamSupervisor>,
    /// Process start, for uptime
    pub started_at: Instant,
}

impl AppState {
    pub fn new(supervisor: Arc<StreamSupervisor>) -> Self {
        Self {
            supervisor,
            started_at: Instant::now(),
        }
    }
}
