//! StreamSupervisor - Live stream session lifecycle
//!
//! ## Responsibilities
//!
//! - Own the liveness prober (started by `start`, stopped by `stop`)
//! - Exactly one session while connected, none while disconnected
//! - Forced session restart every refresh interval, capped by the retry budget
//! - Capture gated on connectivity
//!
//! ## State machine
//!
//! ```text
//! NO_SESSION --probe: connected--> ACTIVE        (new handle, budget = 0)
//! ACTIVE --probe: disconnected--> NO_SESSION     (handle discarded, timer cancelled)
//! ACTIVE --refresh tick, budget left--> RESTARTING --> ACTIVE (handle + 1, budget + 1)
//! ACTIVE --refresh tick, budget exhausted--> ACTIVE (restart suppressed)
//! ```
//!
//! The budget only resets on a probe-driven transition into ACTIVE, so a
//! device that stays connected keeps its last session once the budget is used.
//!
//! ## Timers
//!
//! Two owned timers per engine: the prober task ([`ProbeHandle`]) and the
//! refresh task ([`RefreshTimer`]). Both abort on drop. The refresh task
//! also carries an epoch checked under the session lock, so a tick racing a
//! disconnect or a stop is discarded.

mod session;

pub use session::{RetryBudget, SessionHandle, SessionPhase, StreamLocator};

use crate::config::EngineConfig;
use crate::device_client::{DeviceClient, HttpDeviceClient, TransportError};
use crate::device_endpoint::{capture_locator_for, resource_locator_for, DeviceEndpoint};
use crate::error::{CaptureFailure, Error, Result};
use crate::event_hub::{EngineEvent, EventHub};
use crate::liveness_prober::{ConnectivityState, LivenessProber, ProbeHandle, ProbeSnapshot};
use crate::lock_unpoisoned;
use chrono::{DateTime, Utc};
use serde::Serialize;
use session::Session;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

/// Still image returned by a successful capture
#[derive(Debug, Clone)]
pub struct CapturedPhoto {
    /// Cache-busted locator the image was fetched from
    pub locator: String,
    pub captured_at: DateTime<Utc>,
    /// JPEG bytes
    pub image: Vec<u8>,
}

/// Supervisor status (API view)
#[derive(Debug, Clone, Serialize)]
pub struct SupervisorStatus {
    pub engine_id: Uuid,
    pub device: String,
    pub running: bool,
    pub connected: bool,
    pub phase: SessionPhase,
    pub session: Option<SessionHandle>,
    pub retry_budget: RetryBudget,
    pub stream: Option<StreamLocator>,
    pub probe: Option<ProbeSnapshot>,
}

/// Refresh timer task; aborted on drop
struct RefreshTimer {
    task: JoinHandle<()>,
}

impl RefreshTimer {
    fn spawn(shared: Weak<Shared>, epoch: u64, period: Duration) -> Self {
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let Some(shared) = shared.upgrade() else {
                    break;
                };
                if !Shared::on_refresh_tick(&shared, epoch) {
                    break;
                }
            }
        });

        Self { task }
    }
}

impl Drop for RefreshTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Mutable session state, guarded by `Shared::core`
struct SessionCore {
    running: bool,
    phase: SessionPhase,
    session: Option<Session>,
    /// Next unused handle
    next_handle: SessionHandle,
    budget: RetryBudget,
    refresh_timer: Option<RefreshTimer>,
    timer_epoch: u64,
}

impl SessionCore {
    /// Discard the current session (if any) and install the next handle
    fn install_next_session(&mut self) -> SessionHandle {
        let handle = self.next_handle;
        self.next_handle = handle.next();
        self.session = Some(Session::new(handle));
        handle
    }

    fn cancel_refresh_timer(&mut self) {
        self.refresh_timer = None;
        self.timer_epoch += 1;
    }
}

/// State shared with the prober callback and the refresh task
struct Shared {
    engine_id: Uuid,
    endpoint: DeviceEndpoint,
    refresh_interval: Duration,
    core: Mutex<SessionCore>,
    events: EventHub,
}

impl Shared {
    /// Prober callback; runs on the prober task before its next tick
    fn on_connectivity_change(shared: &Arc<Shared>, state: ConnectivityState) {
        let mut core = lock_unpoisoned(&shared.core);
        if !core.running {
            return;
        }

        match state {
            ConnectivityState::Connected => {
                core.budget.reset();
                let handle = core.install_next_session();
                core.phase = SessionPhase::Active;

                core.timer_epoch += 1;
                core.refresh_timer = Some(RefreshTimer::spawn(
                    Arc::downgrade(shared),
                    core.timer_epoch,
                    shared.refresh_interval,
                ));

                tracing::info!(
                    engine_id = %shared.engine_id,
                    device = %shared.endpoint,
                    session = %handle,
                    "Stream session started"
                );

                shared
                    .events
                    .publish(EngineEvent::ConnectivityChanged { connected: true });
                shared.events.publish(EngineEvent::SessionStarted {
                    handle: handle.generation(),
                });
            }
            ConnectivityState::Disconnected => {
                core.cancel_refresh_timer();
                let ended = core.session.take();
                core.phase = SessionPhase::NoSession;

                tracing::info!(
                    engine_id = %shared.engine_id,
                    device = %shared.endpoint,
                    session = ?ended.map(|s| s.handle.generation()),
                    retry_budget = core.budget.used(),
                    "Stream session torn down"
                );

                shared
                    .events
                    .publish(EngineEvent::ConnectivityChanged { connected: false });
                if let Some(session) = ended {
                    shared.events.publish(EngineEvent::SessionEnded {
                        handle: session.handle.generation(),
                    });
                }
            }
        }
    }

    /// Refresh tick; returns false when the timer should exit
    fn on_refresh_tick(shared: &Arc<Shared>, epoch: u64) -> bool {
        let mut core = lock_unpoisoned(&shared.core);
        if !core.running || core.timer_epoch != epoch || core.session.is_none() {
            return false;
        }

        if !core.budget.try_consume() {
            tracing::debug!(
                engine_id = %shared.engine_id,
                retry_budget = core.budget.used(),
                "Forced restart suppressed (retry budget exhausted)"
            );
            return true;
        }

        core.phase = SessionPhase::Restarting;
        let handle = core.install_next_session();
        core.phase = SessionPhase::Active;

        tracing::info!(
            engine_id = %shared.engine_id,
            session = %handle,
            retry_budget = core.budget.used(),
            max_forced_restarts = core.budget.max(),
            "Forced stream restart"
        );

        shared.events.publish(EngineEvent::SessionRestarted {
            handle: handle.generation(),
            retry_budget: core.budget.used(),
        });

        true
    }

    /// Publish unless the supervisor has been stopped
    fn publish_if_running(&self, event: EngineEvent) {
        let core = lock_unpoisoned(&self.core);
        if core.running {
            self.events.publish(event);
        }
    }
}

/// Connectivity & stream supervision engine for one device
pub struct StreamSupervisor {
    config: EngineConfig,
    client: Arc<dyn DeviceClient>,
    shared: Arc<Shared>,
    prober: Mutex<Option<ProbeHandle>>,
}

impl StreamSupervisor {
    /// Create new StreamSupervisor (nothing runs until `start`)
    pub fn new(config: EngineConfig, client: Arc<dyn DeviceClient>) -> Result<Self> {
        config.validate()?;
        let endpoint = DeviceEndpoint::new(&config.device_address)?;

        let shared = Arc::new(Shared {
            engine_id: Uuid::new_v4(),
            endpoint,
            refresh_interval: config.refresh_interval(),
            core: Mutex::new(SessionCore {
                running: false,
                phase: SessionPhase::NoSession,
                session: None,
                next_handle: SessionHandle::FIRST,
                budget: RetryBudget::new(config.max_forced_restarts),
                refresh_timer: None,
                timer_epoch: 0,
            }),
            events: EventHub::new(),
        });

        Ok(Self {
            config,
            client,
            shared,
            prober: Mutex::new(None),
        })
    }

    /// Create with the reqwest transport
    pub fn with_http(config: EngineConfig) -> Result<Self> {
        let client = Arc::new(HttpDeviceClient::new()?);
        Self::new(config, client)
    }

    pub fn engine_id(&self) -> Uuid {
        self.shared.engine_id
    }

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.shared.endpoint
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Start probing (idempotent while running)
    pub fn start(&self) {
        let mut slot = lock_unpoisoned(&self.prober);
        if slot.is_some() {
            tracing::warn!(engine_id = %self.shared.engine_id, "Supervisor already running");
            return;
        }

        lock_unpoisoned(&self.shared.core).running = true;

        let shared = self.shared.clone();
        let handle = LivenessProber::new(
            self.client.clone(),
            self.shared.endpoint.clone(),
            self.config.probe_interval(),
        )
        .with_timeout(self.config.probe_timeout())
        .start(move |state| Shared::on_connectivity_change(&shared, state));

        *slot = Some(handle);

        tracing::info!(
            engine_id = %self.shared.engine_id,
            device = %self.shared.endpoint,
            refresh_interval_ms = self.config.refresh_interval_ms,
            max_forced_restarts = self.config.max_forced_restarts,
            "Stream supervisor started"
        );
    }

    /// Stop both timers and drop the session (idempotent)
    ///
    /// No event is published after this returns.
    pub fn stop(&self) {
        let prober = lock_unpoisoned(&self.prober).take();
        if let Some(prober) = prober {
            prober.stop();
        }

        let mut core = lock_unpoisoned(&self.shared.core);
        let was_running = core.running;
        core.running = false;
        core.cancel_refresh_timer();
        core.session = None;
        core.phase = SessionPhase::NoSession;

        if was_running {
            tracing::info!(engine_id = %self.shared.engine_id, "Stream supervisor stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock_unpoisoned(&self.shared.core).running
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.shared.events.subscribe()
    }

    /// Live event subscriptions (WebSocket clients included)
    pub fn subscriber_count(&self) -> usize {
        self.shared.events.subscriber_count()
    }

    /// Current connectivity (`Disconnected` when not running)
    pub fn connectivity(&self) -> ConnectivityState {
        lock_unpoisoned(&self.prober)
            .as_ref()
            .map(|prober| prober.state())
            .unwrap_or_default()
    }

    pub fn is_connected(&self) -> bool {
        self.connectivity().is_connected()
    }

    pub fn phase(&self) -> SessionPhase {
        lock_unpoisoned(&self.shared.core).phase
    }

    pub fn session_handle(&self) -> Option<SessionHandle> {
        lock_unpoisoned(&self.shared.core)
            .session
            .map(|session| session.handle)
    }

    pub fn retry_budget(&self) -> RetryBudget {
        lock_unpoisoned(&self.shared.core).budget
    }

    /// Locator the display surface should render right now
    ///
    /// Changes when the session is replaced and every surface refresh period.
    pub fn stream_locator(&self) -> Option<StreamLocator> {
        let core = lock_unpoisoned(&self.shared.core);
        core.session.map(|session| self.locator_for(&session))
    }

    fn locator_for(&self, session: &Session) -> StreamLocator {
        let slot = session.refresh_slot(self.config.surface_refresh_ms);
        StreamLocator {
            handle: session.handle,
            slot,
            url: resource_locator_for(&self.shared.endpoint, session.handle.generation(), slot),
        }
    }

    /// Full status snapshot
    pub fn status(&self) -> SupervisorStatus {
        let probe = lock_unpoisoned(&self.prober)
            .as_ref()
            .map(|prober| prober.snapshot());
        let core = lock_unpoisoned(&self.shared.core);

        SupervisorStatus {
            engine_id: self.shared.engine_id,
            device: self.shared.endpoint.to_string(),
            running: core.running,
            connected: probe.as_ref().map(|p| p.state.is_connected()).unwrap_or(false),
            phase: core.phase,
            session: core.session.map(|session| session.handle),
            retry_budget: core.budget,
            stream: core.session.map(|session| self.locator_for(&session)),
            probe,
        }
    }

    /// Ask the prober for an immediate probe
    pub fn probe_now(&self) {
        if let Some(prober) = lock_unpoisoned(&self.prober).as_ref() {
            prober.probe_now();
        }
    }

    /// Manual restart requested by the consumer
    ///
    /// Replaces the session without touching the retry budget and requests an
    /// immediate probe. Returns the new handle, or `None` without a session.
    pub fn force_refresh(&self) -> Option<SessionHandle> {
        let handle = {
            let mut core = lock_unpoisoned(&self.shared.core);
            if !core.running || core.session.is_none() {
                None
            } else {
                core.phase = SessionPhase::Restarting;
                let handle = core.install_next_session();
                core.phase = SessionPhase::Active;

                tracing::info!(
                    engine_id = %self.shared.engine_id,
                    session = %handle,
                    "Manual stream refresh"
                );

                self.shared.events.publish(EngineEvent::SessionRestarted {
                    handle: handle.generation(),
                    retry_budget: core.budget.used(),
                });
                Some(handle)
            }
        };

        self.probe_now();
        handle
    }

    /// The display surface failed to load the stream
    ///
    /// Connectivity only changes through probes, so this just re-probes now.
    pub fn report_stream_error(&self, reason: &str) {
        tracing::warn!(
            engine_id = %self.shared.engine_id,
            session = ?self.session_handle().map(|h| h.generation()),
            reason = %reason,
            "Stream surface error reported"
        );
        self.probe_now();
    }

    /// Capture a still image
    ///
    /// Rejected without any network call unless connected. Never affects the
    /// session, the retry budget or the timers.
    pub async fn capture_photo(&self) -> Result<CapturedPhoto> {
        if !self.is_connected() {
            tracing::warn!(
                engine_id = %self.shared.engine_id,
                "Capture rejected: device unreachable"
            );
            self.shared.publish_if_running(EngineEvent::CaptureResult {
                ok: false,
                error: Some(Error::CaptureRejected.to_string()),
            });
            return Err(Error::CaptureRejected);
        }

        let captured_at = Utc::now();
        let locator = capture_locator_for(&self.shared.endpoint, captured_at.timestamp_millis());
        let timeout = self.config.capture_timeout();

        let outcome = match tokio::time::timeout(timeout, self.client.get(&locator, timeout)).await {
            Ok(Ok(resp)) if resp.is_success() => Ok(resp.body),
            Ok(Ok(resp)) => Err(CaptureFailure::Status(resp.status)),
            Ok(Err(TransportError::Timeout)) | Err(_) => Err(CaptureFailure::Timeout),
            Ok(Err(TransportError::Connection(msg))) => Err(CaptureFailure::Transport(msg)),
        };

        match outcome {
            Ok(image) => {
                tracing::info!(
                    engine_id = %self.shared.engine_id,
                    size = image.len(),
                    "Photo captured"
                );
                self.shared.publish_if_running(EngineEvent::CaptureResult {
                    ok: true,
                    error: None,
                });
                Ok(CapturedPhoto {
                    locator,
                    captured_at,
                    image,
                })
            }
            Err(reason) => {
                let err = Error::CaptureFailed { reason };
                tracing::error!(
                    engine_id = %self.shared.engine_id,
                    error = %err,
                    "Capture failed"
                );
                self.shared.publish_if_running(EngineEvent::CaptureResult {
                    ok: false,
                    error: Some(err.to_string()),
                });
                Err(err)
            }
        }
    }
}

impl Drop for StreamSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}
