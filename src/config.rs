//! Engine configuration
//!
//! Defaults mirror the mobile client: probe every 10s, force a stream restart
//! every 30s (at most 3 times per connected period), re-fetch the displayed
//! image every 5s.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DEVICE_ADDRESS: &str = "192.168.0.8";
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 30_000;
pub const DEFAULT_MAX_FORCED_RESTARTS: u32 = 3;
pub const DEFAULT_SURFACE_REFRESH_MS: u64 = 5_000;
pub const DEFAULT_CAPTURE_TIMEOUT_MS: u64 = 15_000;

/// Engine configuration (one device per engine)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Device address, `host[:port]` or a full `http://` base URL
    pub device_address: String,
    /// Liveness probe period
    pub probe_interval_ms: u64,
    /// Per-probe timeout (clamped to the probe period)
    pub probe_timeout_ms: u64,
    /// Forced stream restart period while connected
    pub refresh_interval_ms: u64,
    /// Forced restarts allowed per connected period
    pub max_forced_restarts: u32,
    /// Cache-buster period for the displayed stream image
    pub surface_refresh_ms: u64,
    /// Capture request timeout
    pub capture_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            device_address: DEFAULT_DEVICE_ADDRESS.to_string(),
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            max_forced_restarts: DEFAULT_MAX_FORCED_RESTARTS,
            surface_refresh_ms: DEFAULT_SURFACE_REFRESH_MS,
            capture_timeout_ms: DEFAULT_CAPTURE_TIMEOUT_MS,
        }
    }
}

impl EngineConfig {
    /// Create config for a device address with default timings
    pub fn for_device(device_address: impl Into<String>) -> Self {
        Self {
            device_address: device_address.into(),
            ..Self::default()
        }
    }

    /// Load from process environment, falling back to defaults
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    ///
    /// Unset keys take the default; set but unparsable keys are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            device_address: lookup("DEVICE_ADDRESS").unwrap_or(defaults.device_address),
            probe_interval_ms: parse_var(&lookup, "PROBE_INTERVAL_MS", defaults.probe_interval_ms)?,
            probe_timeout_ms: parse_var(&lookup, "PROBE_TIMEOUT_MS", defaults.probe_timeout_ms)?,
            refresh_interval_ms: parse_var(
                &lookup,
                "REFRESH_INTERVAL_MS",
                defaults.refresh_interval_ms,
            )?,
            max_forced_restarts: parse_var(
                &lookup,
                "MAX_FORCED_RESTARTS",
                defaults.max_forced_restarts,
            )?,
            surface_refresh_ms: parse_var(&lookup, "SURFACE_REFRESH_MS", defaults.surface_refresh_ms)?,
            capture_timeout_ms: parse_var(&lookup, "CAPTURE_TIMEOUT_MS", defaults.capture_timeout_ms)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let address = self.device_address.trim();
        if address.is_empty() {
            return Err(Error::Config("device_address must not be empty".to_string()));
        }
        if address.chars().any(char::is_whitespace) {
            return Err(Error::Config(format!(
                "device_address contains whitespace: {:?}",
                self.device_address
            )));
        }

        let intervals = [
            ("probe_interval_ms", self.probe_interval_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("surface_refresh_ms", self.surface_refresh_ms),
            ("capture_timeout_ms", self.capture_timeout_ms),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(Error::Config(format!("{} must be greater than zero", name)));
            }
        }

        Ok(())
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }

    /// Probe timeout, never longer than the probe period
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.min(self.probe_interval_ms))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{} is not a valid number: {:?}", key, raw))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.probe_interval_ms, 10_000);
        assert_eq!(config.refresh_interval_ms, 30_000);
        assert_eq!(config.max_forced_restarts, 3);
        assert_eq!(config.surface_refresh_ms, 5_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = EngineConfig::from_lookup(lookup_from(&[
            ("DEVICE_ADDRESS", "10.0.0.5:8080"),
            ("PROBE_INTERVAL_MS", "2000"),
            ("MAX_FORCED_RESTARTS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.device_address, "10.0.0.5:8080");
        assert_eq!(config.probe_interval_ms, 2000);
        assert_eq!(config.max_forced_restarts, 5);
        assert_eq!(config.refresh_interval_ms, DEFAULT_REFRESH_INTERVAL_MS);
    }

    #[test]
    fn test_from_lookup_rejects_garbage_number() {
        let result = EngineConfig::from_lookup(lookup_from(&[("PROBE_INTERVAL_MS", "soon")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_address() {
        let config = EngineConfig::for_device("   ");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let config = EngineConfig {
            refresh_interval_ms: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_probe_timeout_clamped_to_interval() {
        let config = EngineConfig {
            probe_interval_ms: 1_000,
            probe_timeout_ms: 5_000,
            ..EngineConfig::default()
        };
        assert_eq!(config.probe_timeout(), Duration::from_millis(1_000));
    }
}
