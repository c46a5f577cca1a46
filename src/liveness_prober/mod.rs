//! LivenessProber - Periodic device reachability check
//!
//! ## Responsibilities
//!
//! - Probe `GET /status` immediately, then every probe interval
//! - Collapse status/timeout/transport failures into "unreachable"
//! - Edge-triggered change notification (one callback per transition)
//!
//! ## Scheduling
//!
//! The probe runs inline in the prober's own task, so at most one probe is in
//! flight. A tick that elapses while a probe is still running is skipped
//! (`MissedTickBehavior::Skip`). The probe timeout never exceeds the interval.
//!
//! ## Stop guarantee
//!
//! The change callback runs while holding the prober gate. [`ProbeHandle::stop`]
//! takes the same gate before flagging the prober stopped, so once it returns
//! no callback is running and none will start. The callback must therefore not
//! call back into its own [`ProbeHandle`].

mod types;

pub use types::{ConnectivityState, ProbeFailure, ProbeOutcome, ProbeSnapshot};

use crate::device_client::{DeviceClient, TransportError};
use crate::device_endpoint::DeviceEndpoint;
use crate::lock_unpoisoned;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use types::DeviceStatusReport;

/// Run one probe against a status URL
pub async fn probe_once(client: &dyn DeviceClient, url: &str, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, client.get(url, timeout)).await {
        Ok(Ok(resp)) if resp.is_success() => {
            let reported_ip = serde_json::from_slice::<DeviceStatusReport>(&resp.body)
                .ok()
                .and_then(|report| report.ip);
            ProbeOutcome::Reachable {
                status: resp.status,
                reported_ip,
            }
        }
        Ok(Ok(resp)) => ProbeOutcome::Unreachable(ProbeFailure::Status(resp.status)),
        Ok(Err(TransportError::Timeout)) | Err(_) => ProbeOutcome::Unreachable(ProbeFailure::Timeout),
        Ok(Err(TransportError::Connection(msg))) => {
            ProbeOutcome::Unreachable(ProbeFailure::Transport(msg))
        }
    }
}

/// Prober configuration, consumed by [`LivenessProber::start`]
pub struct LivenessProber {
    client: Arc<dyn DeviceClient>,
    endpoint: DeviceEndpoint,
    interval: Duration,
    timeout: Duration,
}

impl LivenessProber {
    /// Create new LivenessProber (timeout defaults to the interval)
    pub fn new(client: Arc<dyn DeviceClient>, endpoint: DeviceEndpoint, interval: Duration) -> Self {
        Self {
            client,
            endpoint,
            interval,
            timeout: interval,
        }
    }

    /// Set the per-probe timeout (clamped to the interval)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(self.interval);
        self
    }

    /// Start probing; the first probe is issued immediately
    ///
    /// `on_change` is called exactly once per connectivity transition, from
    /// the prober task. The initial state is `Disconnected`, so a device that
    /// is down from the start produces no callback.
    pub fn start<F>(self, on_change: F) -> ProbeHandle
    where
        F: Fn(ConnectivityState) + Send + Sync + 'static,
    {
        let shared = Arc::new(ProbeShared {
            gate: Mutex::new(ProbeGate::default()),
            wake: Notify::new(),
        });

        tracing::info!(
            device = %self.endpoint,
            interval_ms = self.interval.as_millis() as u64,
            timeout_ms = self.timeout.as_millis() as u64,
            "Liveness prober started"
        );

        let task = tokio::spawn(run_probe_loop(self, shared.clone(), on_change));

        ProbeHandle { shared, task }
    }
}

#[derive(Debug, Default)]
struct ProbeGate {
    state: ConnectivityState,
    stopped: bool,
    probes_sent: u64,
    last_probe_at: Option<DateTime<Utc>>,
    last_failure: Option<ProbeFailure>,
    reported_ip: Option<String>,
}

struct ProbeShared {
    gate: Mutex<ProbeGate>,
    /// Manual probe request
    wake: Notify,
}

impl ProbeShared {
    /// Record an outcome and fire the callback on a transition
    ///
    /// Returns false once the prober has been stopped.
    fn apply<F>(&self, device: &DeviceEndpoint, outcome: ProbeOutcome, on_change: &F) -> bool
    where
        F: Fn(ConnectivityState),
    {
        let mut gate = lock_unpoisoned(&self.gate);
        if gate.stopped {
            return false;
        }

        gate.probes_sent += 1;
        gate.last_probe_at = Some(Utc::now());

        let next = outcome.state();
        match outcome {
            ProbeOutcome::Reachable { reported_ip, .. } => {
                gate.last_failure = None;
                if reported_ip.is_some() {
                    gate.reported_ip = reported_ip;
                }
            }
            ProbeOutcome::Unreachable(failure) => {
                tracing::debug!(device = %device, failure = %failure, "Probe failed");
                gate.last_failure = Some(failure);
            }
        }

        if next != gate.state {
            gate.state = next;
            match next {
                ConnectivityState::Connected => {
                    tracing::info!(device = %device, "Device connection recovered")
                }
                ConnectivityState::Disconnected => tracing::warn!(
                    device = %device,
                    failure = ?gate.last_failure,
                    "Device connection lost"
                ),
            }
            on_change(next);
        }

        true
    }
}

async fn run_probe_loop<F>(prober: LivenessProber, shared: Arc<ProbeShared>, on_change: F)
where
    F: Fn(ConnectivityState) + Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(prober.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shared.wake.notified() => {
                // Manual probe: the schedule restarts from here
                ticker.reset();
            }
        }

        let outcome = probe_once(
            prober.client.as_ref(),
            &prober.endpoint.status_path(),
            prober.timeout,
        )
        .await;

        if !shared.apply(&prober.endpoint, outcome, &on_change) {
            break;
        }
    }

    tracing::debug!(device = %prober.endpoint, "Liveness prober loop exited");
}

/// Owned handle of a running prober; dropping it stops the prober
pub struct ProbeHandle {
    shared: Arc<ProbeShared>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Current connectivity
    pub fn state(&self) -> ConnectivityState {
        lock_unpoisoned(&self.shared.gate).state
    }

    pub fn snapshot(&self) -> ProbeSnapshot {
        let gate = lock_unpoisoned(&self.shared.gate);
        ProbeSnapshot {
            state: gate.state,
            probes_sent: gate.probes_sent,
            last_probe_at: gate.last_probe_at,
            last_failure: gate.last_failure.clone(),
            reported_ip: gate.reported_ip.clone(),
        }
    }

    /// Request a probe now instead of waiting for the next tick
    ///
    /// Coalesces with a pending request; never runs concurrently with a
    /// scheduled probe.
    pub fn probe_now(&self) {
        self.shared.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        lock_unpoisoned(&self.shared.gate).stopped
    }

    /// Cancel the schedule (idempotent)
    ///
    /// No `on_change` call is running or will start after this returns,
    /// whatever the state of an in-flight probe.
    pub fn stop(&self) {
        let first = {
            let mut gate = lock_unpoisoned(&self.shared.gate);
            let first = !gate.stopped;
            gate.stopped = true;
            first
        };
        self.task.abort();

        if first {
            tracing::info!("Liveness prober stopped");
        }
    }
}

impl Drop for ProbeHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_client::scripted::{Behavior, ScriptedDevice};

    const INTERVAL: Duration = Duration::from_secs(10);

    fn recorder() -> (
        Arc<Mutex<Vec<ConnectivityState>>>,
        impl Fn(ConnectivityState) + Send + Sync + 'static,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |state| sink.lock().unwrap().push(state))
    }

    fn start(device: &Arc<ScriptedDevice>) -> (ProbeHandle, Arc<Mutex<Vec<ConnectivityState>>>) {
        let endpoint = DeviceEndpoint::new("cam.local").unwrap();
        let (seen, on_change) = recorder();
        let handle = LivenessProber::new(device.clone(), endpoint, INTERVAL)
            .with_timeout(Duration::from_secs(5))
            .start(on_change);
        (handle, seen)
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_is_immediate() {
        let device = Arc::new(ScriptedDevice::online());
        let (handle, seen) = start(&device);

        advance(1).await;

        assert_eq!(device.calls("status"), 1);
        assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Connected]);
        assert_eq!(handle.state(), ConnectivityState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_state_fires_once() {
        let device = Arc::new(ScriptedDevice::online());
        let (_handle, seen) = start(&device);

        advance(35_000).await;

        // Probes at 0, 10, 20, 30s
        assert_eq!(device.calls("status"), 4);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initially_unreachable_no_callback() {
        let device = Arc::new(ScriptedDevice::offline());
        let (handle, seen) = start(&device);

        advance(25_000).await;

        assert_eq!(device.calls("status"), 3);
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(handle.state(), ConnectivityState::Disconnected);
        assert!(matches!(
            handle.snapshot().last_failure,
            Some(ProbeFailure::Transport(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_callback_per_transition() {
        let device = Arc::new(ScriptedDevice::online());
        let (_handle, seen) = start(&device);

        advance(5_000).await; // t=5: connected
        device.set("status", Behavior::Status(503));
        advance(20_000).await; // t=25: probes at 10, 20 failed
        device.set("status", Behavior::Refuse);
        advance(10_000).await; // t=35: still down, different cause
        device.set("status", Behavior::Status(200));
        advance(10_000).await; // t=45: back

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                ConnectivityState::Connected,
                ConnectivityState::Disconnected,
                ConnectivityState::Connected,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_callbacks_match_transitions_for_every_sequence() {
        for len in 0..=6u32 {
            for mask in 0..(1u32 << len) {
                let sequence: Vec<bool> = (0..len).map(|i| mask & (1 << i) != 0).collect();
                let device = Arc::new(ScriptedDevice::online());
                let outcome_for = |i: usize, up: bool| {
                    if up {
                        Behavior::Status(200)
                    } else {
                        match i % 3 {
                            0 => Behavior::Status(503),
                            1 => Behavior::Refuse,
                            _ => Behavior::Hang,
                        }
                    }
                };

                let mut expected = Vec::new();
                let mut previous = ConnectivityState::Disconnected;
                for &up in &sequence {
                    let state = if up {
                        ConnectivityState::Connected
                    } else {
                        ConnectivityState::Disconnected
                    };
                    if state != previous {
                        expected.push(state);
                        previous = state;
                    }
                }

                let Some(&first) = sequence.first() else {
                    let (handle, seen) = start(&device);
                    handle.stop();
                    assert!(seen.lock().unwrap().is_empty());
                    continue;
                };

                device.set("status", outcome_for(0, first));
                let (handle, seen) = start(&device);
                advance(1).await;
                for (i, &up) in sequence.iter().enumerate().skip(1) {
                    device.set("status", outcome_for(i, up));
                    // Next scheduled probe at i * 10s
                    advance(10_000).await;
                }
                // Let a hanging last probe time out
                advance(6_000).await;
                handle.stop();

                assert_eq!(device.calls("status"), sequence.len(), "sequence {:?}", sequence);
                assert_eq!(*seen.lock().unwrap(), expected, "sequence {:?}", sequence);
                assert_eq!(handle.state(), previous, "sequence {:?}", sequence);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_unreachable() {
        let device = Arc::new(ScriptedDevice::online());
        let (handle, seen) = start(&device);

        advance(1).await;
        device.set("status", Behavior::Hang);

        // Probe at t=10 hangs, times out at t=15
        advance(14_000).await;
        assert_eq!(handle.state(), ConnectivityState::Connected);
        advance(2_000).await;

        assert_eq!(handle.state(), ConnectivityState::Disconnected);
        assert_eq!(handle.snapshot().last_failure, Some(ProbeFailure::Timeout));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ConnectivityState::Connected, ConnectivityState::Disconnected]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_keeps_cadence() {
        let device = Arc::new(ScriptedDevice::online());
        device.set("status", Behavior::Delayed(Duration::from_millis(4_900), 200));
        let (handle, _seen) = start(&device);

        advance(21_000).await;

        // Never more than one probe per tick, never overlapping
        assert_eq!(device.calls("status"), 3);
        assert_eq!(handle.state(), ConnectivityState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe_now_runs_off_schedule() {
        let device = Arc::new(ScriptedDevice::offline());
        let (handle, seen) = start(&device);

        advance(3_000).await;
        device.set("status", Behavior::Status(200));
        handle.probe_now();
        advance(1).await;

        assert_eq!(device.calls("status"), 2);
        assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Connected]);

        // Schedule restarted from t=3: next probe at t=13, not t=10
        advance(8_000).await;
        assert_eq!(device.calls("status"), 2);
        advance(3_000).await;
        assert_eq!(device.calls("status"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_final_and_idempotent() {
        let device = Arc::new(ScriptedDevice::online());
        let (handle, seen) = start(&device);

        advance(1).await;
        handle.stop();
        handle.stop();
        assert!(handle.is_stopped());

        device.set("status", Behavior::Refuse);
        advance(60_000).await;

        assert_eq!(device.calls("status"), 1);
        assert_eq!(*seen.lock().unwrap(), vec![ConnectivityState::Connected]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_inflight_probe_suppresses_callback() {
        let device = Arc::new(ScriptedDevice::offline());
        device.set("status", Behavior::Delayed(Duration::from_secs(3), 200));
        let (handle, seen) = start(&device);

        advance(1_000).await;
        assert_eq!(device.calls("status"), 1);
        handle.stop();

        advance(10_000).await;

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(handle.state(), ConnectivityState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_probing() {
        let device = Arc::new(ScriptedDevice::online());
        let (handle, _seen) = start(&device);

        advance(1).await;
        drop(handle);
        advance(30_000).await;

        assert_eq!(device.calls("status"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reported_ip_recorded() {
        struct StatusJson;

        #[async_trait::async_trait]
        impl DeviceClient for StatusJson {
            async fn get(
                &self,
                _url: &str,
                _timeout: Duration,
            ) -> Result<crate::device_client::DeviceResponse, TransportError> {
                Ok(crate::device_client::DeviceResponse::new(
                    200,
                    br#"{"status":"connected","ip":"192.168.0.8"}"#.to_vec(),
                ))
            }
        }

        let endpoint = DeviceEndpoint::new("cam.local").unwrap();
        let handle = LivenessProber::new(Arc::new(StatusJson), endpoint, INTERVAL).start(|_| {});

        advance(1).await;

        let snapshot = handle.snapshot();
        assert_eq!(snapshot.reported_ip.as_deref(), Some("192.168.0.8"));
        assert_eq!(snapshot.probes_sent, 1);
        assert!(snapshot.last_probe_at.is_some());
    }
}
