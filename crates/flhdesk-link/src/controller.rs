//! Desk link manager: connection state machine, handshake, and the public
//! command surface.
//!
//! Architecture:
//! - `DeskController` owns one logical link to one desk. All outbound writes
//!   and the notification subscription share that link; the async mutex
//!   around the link handle serializes connects, disconnects, and writes.
//! - Inbound notifications are decoded and applied to the state store on the
//!   transport's execution context; that path never blocks.
//! - Unsolicited link loss spawns at most one reconnection cycle, driven by
//!   [`crate::reconnect::ReconnectCycle`].
//!
//! ```text
//! Idle → Connecting → Connected → Reconnecting → Connected
//!                                      └────────→ Failed   (terminal)
//! ```
//!
//! `Failed` is terminal until an external [`DeskController::connect`] call
//! starts a fresh cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use flhdesk_core::protocol::command::{DeskCommand, MemorySlot, INIT_FRAME};
use flhdesk_core::protocol::notification::decode_notification;
use flhdesk_core::{DeskState, DeskStateStore, ListenerHandle, ObserverHub};

use crate::reconnect::{ReconnectConfig, ReconnectCycle};
use crate::transport::{DeskTransport, DisconnectHandler, TransportLink};
use crate::TransportError;

/// Post-connect wake-up settle time before the init frame.
///
/// The vendor app sends Stop, waits a full second, then inits; desks ignore
/// the init frame without this pause. Not configurable.
const HANDSHAKE_WAKE_DELAY: Duration = Duration::from_secs(1);

/// Settle time after the init frame, before the handshake is considered done.
const HANDSHAKE_INIT_DELAY: Duration = Duration::from_millis(500);

/// Default outer bound on one connect + handshake sequence.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No link and no activity.
    Idle,
    /// An explicit connect (with handshake) is in progress.
    Connecting,
    /// Link up, handshake done, commands accepted.
    Connected,
    /// Link lost; a bounded retry cycle is running.
    Reconnecting,
    /// Retry cycle exhausted; waiting for an external reconnect request.
    Failed,
}

/// Errors surfaced by the link manager.
#[derive(Debug, Error)]
pub enum LinkError {
    /// A command was issued while the link is down. Commands are never
    /// queued; the caller decides whether to retry after reconnection.
    #[error("not connected to desk")]
    NotConnected,

    /// Connect or handshake failed; retryable by calling connect again.
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] TransportError),

    /// The connect + handshake sequence exceeded the configured bound.
    #[error("connect and handshake timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// A command write failed on an established link.
    #[error("command write failed: {0}")]
    Write(#[source] TransportError),

    /// The reconnection cycle ran out of attempts; the link stays down
    /// until an external connect request.
    #[error("reconnect exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },
}

/// Link manager configuration.
#[derive(Debug, Clone)]
pub struct DeskLinkConfig {
    /// Bluetooth address of the desk, e.g. `"E7:8A:12:0D:5F:31"`.
    pub address: String,
    /// Reconnection policy applied on unsolicited link loss.
    pub reconnect: ReconnectConfig,
    /// Outer bound on each connect + handshake sequence.
    pub connect_timeout: Duration,
}

impl DeskLinkConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// State store plus observer hub behind short-lived sync locks.
///
/// Listeners run outside the store lock but inside the hub lock, so they
/// must not re-enter the hub (they are required to be non-blocking anyway).
struct SharedState {
    store: Mutex<DeskStateStore>,
    hub: Mutex<ObserverHub>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            store: Mutex::new(DeskStateStore::new()),
            hub: Mutex::new(ObserverHub::new()),
        }
    }

    fn snapshot(&self) -> DeskState {
        self.store.lock().expect("lock poisoned").snapshot()
    }

    fn apply_event(&self, event: flhdesk_core::DeskEvent) {
        let (changed, snapshot) = {
            let mut store = self.store.lock().expect("lock poisoned");
            (store.apply(event), store.snapshot())
        };
        if changed {
            self.hub.lock().expect("lock poisoned").notify(&snapshot);
        }
    }

    fn set_connected(&self, connected: bool) {
        let (changed, snapshot) = {
            let mut store = self.store.lock().expect("lock poisoned");
            (store.set_connected(connected), store.snapshot())
        };
        if changed {
            self.hub.lock().expect("lock poisoned").notify(&snapshot);
        }
    }
}

struct ControllerInner {
    config: DeskLinkConfig,
    transport: Arc<dyn DeskTransport>,
    shared: SharedState,
    /// The one live link, also the mutual-exclusion guard serializing
    /// connect/disconnect/write against each other.
    link: AsyncMutex<Option<Arc<dyn TransportLink>>>,
    state: Mutex<ConnectionState>,
    should_reconnect: AtomicBool,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
}

impl ControllerInner {
    fn set_state(&self, state: ConnectionState) {
        *self.state.lock().expect("lock poisoned") = state;
        debug!(?state, "connection state");
    }

    /// Runs connect + subscribe + handshake under the configured timeout,
    /// tearing down any partial link on failure.
    async fn establish(
        inner: &Arc<Self>,
        guard: &mut Option<Arc<dyn TransportLink>>,
    ) -> Result<(), LinkError> {
        match timeout(inner.config.connect_timeout, Self::establish_steps(inner, guard)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                Self::teardown(inner, guard).await;
                Err(e)
            }
            Err(_) => {
                Self::teardown(inner, guard).await;
                Err(LinkError::ConnectTimeout(inner.config.connect_timeout))
            }
        }
    }

    async fn establish_steps(
        inner: &Arc<Self>,
        guard: &mut Option<Arc<dyn TransportLink>>,
    ) -> Result<(), LinkError> {
        debug!(address = %inner.config.address, "connecting to desk");

        let weak = Arc::downgrade(inner);
        let on_disconnect: DisconnectHandler = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Self::handle_link_lost(&inner);
            }
        });

        let link = inner
            .transport
            .connect(&inner.config.address, on_disconnect)
            .await
            .map_err(LinkError::ConnectFailed)?;

        let weak = Arc::downgrade(inner);
        link.subscribe(Arc::new(move |payload: &[u8]| {
            let Some(inner) = weak.upgrade() else { return };
            match decode_notification(payload) {
                Ok(event) => inner.shared.apply_event(event),
                Err(e) => warn!(error = %e, "dropping invalid notification frame"),
            }
        }))
        .await
        .map_err(LinkError::ConnectFailed)?;

        *guard = Some(Arc::clone(&link));
        inner.shared.set_connected(true);
        info!(address = %inner.config.address, "connected to desk");

        // Handshake: a Stop command wakes the controller box, then the raw
        // init frame requests the limit report. Ordering and both delays
        // are protocol requirements; the desk stays silent without them.
        let sensitivity = inner.shared.snapshot().sensitivity;
        let stop = DeskCommand::Stop { sensitivity }.encode(false, false);
        link.write(stop.as_bytes(), false)
            .await
            .map_err(LinkError::ConnectFailed)?;
        sleep(HANDSHAKE_WAKE_DELAY).await;
        link.write(&INIT_FRAME, false)
            .await
            .map_err(LinkError::ConnectFailed)?;
        sleep(HANDSHAKE_INIT_DELAY).await;

        debug!("handshake complete");
        Ok(())
    }

    async fn teardown(inner: &Arc<Self>, guard: &mut Option<Arc<dyn TransportLink>>) {
        if let Some(link) = guard.take() {
            let _ = link.disconnect().await;
        }
        inner.shared.set_connected(false);
    }

    /// Transport reported unsolicited link loss.
    ///
    /// Runs on the transport's context: flips the connected flag (observers
    /// fire), then spawns a reconnection cycle unless one is already running
    /// or reconnection has been disabled by shutdown.
    fn handle_link_lost(inner: &Arc<Self>) {
        warn!(address = %inner.config.address, "desk link lost");
        inner.shared.set_connected(false);

        if !inner.should_reconnect.load(Ordering::SeqCst) {
            return;
        }

        let mut task = inner.reconnect_task.lock().expect("lock poisoned");
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        inner.set_state(ConnectionState::Reconnecting);
        let cycle_inner = Arc::clone(inner);
        *task = Some(tokio::spawn(async move {
            Self::run_reconnect_cycle(cycle_inner).await;
        }));
    }

    /// One bounded reconnection cycle. Each attempt re-resolves the
    /// transport handle, since the old one may have gone stale.
    async fn run_reconnect_cycle(inner: Arc<Self>) {
        let mut cycle = ReconnectCycle::new(inner.config.reconnect.clone());
        while let Some(attempt) = cycle.begin_attempt() {
            info!(
                attempt,
                max = cycle.max_attempts(),
                delay = ?cycle.delay(),
                "scheduling reconnection attempt"
            );
            sleep(cycle.delay()).await;
            if !inner.should_reconnect.load(Ordering::SeqCst) {
                debug!("reconnection disabled, abandoning cycle");
                return;
            }

            let mut guard = inner.link.lock().await;
            if inner.shared.snapshot().is_connected {
                debug!("link already restored, ending cycle");
                return;
            }
            match Self::establish(&inner, &mut guard).await {
                Ok(()) => {
                    drop(guard);
                    inner.set_state(ConnectionState::Connected);
                    info!(attempt, "reconnected to desk");
                    return;
                }
                Err(e) => warn!(attempt, error = %e, "reconnection attempt failed"),
            }
        }

        inner.set_state(ConnectionState::Failed);
        let exhausted = LinkError::ReconnectExhausted {
            attempts: cycle.attempts_used(),
        };
        error!(error = %exhausted, "giving up on reconnection");
    }
}

/// The system entry point: one controller per desk.
///
/// Cloneable like a handle; clones share the same link and state.
#[derive(Clone)]
pub struct DeskController {
    inner: Arc<ControllerInner>,
}

impl DeskController {
    pub fn new(transport: Arc<dyn DeskTransport>, config: DeskLinkConfig) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                config,
                transport,
                shared: SharedState::new(),
                link: AsyncMutex::new(None),
                state: Mutex::new(ConnectionState::Idle),
                should_reconnect: AtomicBool::new(true),
                reconnect_task: Mutex::new(None),
            }),
        }
    }

    /// Connects and runs the handshake. Also the explicit recovery path out
    /// of the terminal `Failed` state.
    ///
    /// # Errors
    ///
    /// Returns [`LinkError::ConnectFailed`] or [`LinkError::ConnectTimeout`];
    /// both are retryable startup failures.
    pub async fn connect(&self) -> Result<(), LinkError> {
        self.inner.should_reconnect.store(true, Ordering::SeqCst);
        let mut guard = self.inner.link.lock().await;
        self.inner.set_state(ConnectionState::Connecting);
        match ControllerInner::establish(&self.inner, &mut guard).await {
            Ok(()) => {
                self.inner.set_state(ConnectionState::Connected);
                Ok(())
            }
            Err(e) => {
                self.inner.set_state(ConnectionState::Idle);
                Err(e)
            }
        }
    }

    /// Explicit disconnect, serialized against concurrent connects by the
    /// link guard. The connected flag is cleared regardless of how the
    /// transport close goes.
    pub async fn disconnect(&self) {
        let mut guard = self.inner.link.lock().await;
        if let Some(link) = guard.take() {
            if link.is_connected().await {
                debug!(address = %self.inner.config.address, "disconnecting");
                if let Err(e) = link.disconnect().await {
                    warn!(error = %e, "transport close failed");
                }
            }
        }
        self.inner.shared.set_connected(false);
        self.inner.set_state(ConnectionState::Idle);
    }

    /// Disables reconnection, awaits the termination of any in-flight
    /// reconnection cycle, then disconnects.
    pub async fn shutdown(&self) {
        debug!("shutting down desk link");
        self.inner.should_reconnect.store(false, Ordering::SeqCst);

        let task = self
            .inner
            .reconnect_task
            .lock()
            .expect("lock poisoned")
            .take();
        if let Some(task) = task {
            task.abort();
            // Only termination matters; the cancellation outcome is
            // deliberately swallowed.
            let _ = task.await;
        }

        self.disconnect().await;
    }

    // ── Desk operations ───────────────────────────────────────────────────────

    pub async fn move_up(&self) -> Result<(), LinkError> {
        self.send(DeskCommand::MoveUp {
            sensitivity: self.sensitivity(),
        })
        .await
    }

    pub async fn move_down(&self) -> Result<(), LinkError> {
        self.send(DeskCommand::MoveDown {
            sensitivity: self.sensitivity(),
        })
        .await
    }

    pub async fn stop(&self) -> Result<(), LinkError> {
        self.send(DeskCommand::Stop {
            sensitivity: self.sensitivity(),
        })
        .await
    }

    /// Starts an automatic move to the given height. The request is clamped
    /// to the desk's reported limits before encoding.
    pub async fn move_to_height(&self, cm: f64) -> Result<(), LinkError> {
        let (height_mm, sensitivity) = {
            let store = self.inner.shared.store.lock().expect("lock poisoned");
            (store.clamp_height_cm(cm), store.snapshot().sensitivity)
        };
        debug!(cm, height_mm, "move to height");
        self.send(DeskCommand::MoveToHeight {
            height_mm,
            sensitivity,
        })
        .await
    }

    /// Cancels an in-progress automatic move.
    pub async fn stop_auto_move(&self) -> Result<(), LinkError> {
        self.send(DeskCommand::StopAutoMove).await
    }

    /// Moves to one of the hand controller's memory presets.
    pub async fn move_to_memory(&self, slot: MemorySlot) -> Result<(), LinkError> {
        self.send(DeskCommand::MoveToMemory {
            slot,
            sensitivity: self.sensitivity(),
        })
        .await
    }

    /// Saves the current height into a memory preset.
    pub async fn save_memory(&self, slot: MemorySlot) -> Result<(), LinkError> {
        self.send(DeskCommand::SaveMemory {
            slot,
            sensitivity: self.sensitivity(),
        })
        .await
    }

    /// Sets movement sensitivity, clamped to 0–8; returns the stored value.
    pub fn set_sensitivity(&self, level: i16) -> u8 {
        self.inner
            .shared
            .store
            .lock()
            .expect("lock poisoned")
            .set_sensitivity(level)
    }

    async fn send(&self, command: DeskCommand) -> Result<(), LinkError> {
        let guard = self.inner.link.lock().await;
        let link = guard.as_ref().ok_or(LinkError::NotConnected)?;
        if !self.inner.shared.snapshot().is_connected {
            return Err(LinkError::NotConnected);
        }
        // The shipped commands never carry limit flags.
        let frame = command.encode(false, false);
        debug!(frame = ?frame.as_bytes(), "sending command");
        link.write(frame.as_bytes(), false)
            .await
            .map_err(LinkError::Write)
    }

    // ── State access ──────────────────────────────────────────────────────────

    /// Current desk state snapshot.
    pub fn desk_state(&self) -> DeskState {
        self.inner.shared.snapshot()
    }

    pub fn height_cm(&self) -> f64 {
        self.desk_state().height_cm()
    }

    pub fn min_height_cm(&self) -> f64 {
        self.desk_state().min_height_cm()
    }

    pub fn max_height_cm(&self) -> f64 {
        self.desk_state().max_height_cm()
    }

    pub fn sensitivity(&self) -> u8 {
        self.desk_state().sensitivity
    }

    pub fn is_moving(&self) -> bool {
        self.desk_state().is_moving
    }

    pub fn is_connected(&self) -> bool {
        self.desk_state().is_connected
    }

    /// Current lifecycle state of the connection machine.
    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.state.lock().expect("lock poisoned")
    }

    /// Registers a state-change listener; it fires synchronously on every
    /// state change and must not block.
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(&DeskState) + Send + Sync + 'static,
    {
        self.inner
            .shared
            .hub
            .lock()
            .expect("lock poisoned")
            .subscribe(listener)
    }

    /// Removes a previously registered listener.
    pub fn unsubscribe(&self, handle: ListenerHandle) -> bool {
        self.inner
            .shared
            .hub
            .lock()
            .expect("lock poisoned")
            .unsubscribe(handle)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    fn make_controller() -> (DeskController, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new());
        let controller = DeskController::new(
            Arc::clone(&transport) as Arc<dyn DeskTransport>,
            DeskLinkConfig::new("E7:8A:12:0D:5F:31"),
        );
        (controller, transport)
    }

    #[tokio::test]
    async fn test_initial_state_is_idle_and_disconnected() {
        let (controller, _transport) = make_controller();
        assert_eq!(controller.connection_state(), ConnectionState::Idle);
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn test_commands_fail_immediately_while_disconnected() {
        let (controller, _transport) = make_controller();

        assert!(matches!(
            controller.move_up().await,
            Err(LinkError::NotConnected)
        ));
        assert!(matches!(
            controller.move_to_height(100.0).await,
            Err(LinkError::NotConnected)
        ));
        assert!(matches!(
            controller.stop_auto_move().await,
            Err(LinkError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_set_sensitivity_clamps() {
        let (controller, _transport) = make_controller();
        assert_eq!(controller.set_sensitivity(-3), 0);
        assert_eq!(controller.set_sensitivity(20), 8);
        assert_eq!(controller.desk_state().sensitivity, 8);
    }

    #[tokio::test]
    async fn test_subscribe_and_unsubscribe_round_trip() {
        let (controller, _transport) = make_controller();
        let handle = controller.subscribe(|_| {});
        assert!(controller.unsubscribe(handle));
        assert!(!controller.unsubscribe(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_runs_wake_then_init_handshake() {
        let (controller, transport) = make_controller();

        controller.connect().await.expect("connect");

        let link = transport.current_link().expect("link");
        let frames = link.written_frames();
        assert_eq!(frames.len(), 2, "handshake writes exactly two frames");
        // Stop with default sensitivity 0: DD 00 40 20 00 00 00 60.
        assert_eq!(frames[0], vec![0xDD, 0x00, 0x40, 0x20, 0x00, 0x00, 0x00, 0x60]);
        assert_eq!(frames[1], INIT_FRAME.to_vec());
        assert_eq!(controller.connection_state(), ConnectionState::Connected);
        assert!(controller.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_failure_surfaces_and_returns_to_idle() {
        let (controller, transport) = make_controller();
        transport.fail_next_connects(1);

        let result = controller.connect().await;

        assert!(matches!(result, Err(LinkError::ConnectFailed(_))));
        assert_eq!(controller.connection_state(), ConnectionState::Idle);
        assert!(!controller.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_commands_write_expected_frames() {
        let (controller, transport) = make_controller();
        controller.connect().await.expect("connect");
        let link = transport.current_link().expect("link");
        let handshake_frames = link.written_frames().len();

        controller.move_up().await.expect("move up");
        controller.move_down().await.expect("move down");

        let frames = link.written_frames();
        assert_eq!(
            frames[handshake_frames],
            vec![0xDD, 0x00, 0x41, 0x20, 0x00, 0x00, 0x00, 0x61]
        );
        assert_eq!(
            frames[handshake_frames + 1],
            vec![0xDD, 0x00, 0x42, 0x20, 0x00, 0x00, 0x00, 0x62]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_to_height_clamps_to_limits_before_encoding() {
        let (controller, transport) = make_controller();
        controller.connect().await.expect("connect");
        let link = transport.current_link().expect("link");
        let handshake_frames = link.written_frames().len();

        // Default limits are 720–1220 mm; 150 cm clamps to 1220 = 0x04C4.
        controller.move_to_height(150.0).await.expect("move");

        let frame = &link.written_frames()[handshake_frames];
        assert_eq!(&frame[2..7], &[0x40, 0x28, 0x04, 0xC4, 0x00]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_update_state_and_fire_listeners() {
        use std::sync::atomic::AtomicUsize;

        let (controller, transport) = make_controller();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        controller.subscribe(move |_| {
            f.fetch_add(1, Ordering::SeqCst);
        });

        controller.connect().await.expect("connect");
        let link = transport.current_link().expect("link");
        let after_connect = fired.load(Ordering::SeqCst);

        link.push_notification(&[0x9D, 0x01, 0, 0, 0, 0, 0x01, 0x2C, 0, 0, 0]);

        assert_eq!(controller.height_cm(), 30.0);
        assert_eq!(fired.load(Ordering::SeqCst), after_connect + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_frames_are_dropped_without_state_change() {
        let (controller, transport) = make_controller();
        controller.connect().await.expect("connect");
        let link = transport.current_link().expect("link");
        let before = controller.desk_state();

        link.push_notification(&[0x00, 0x01, 0x02]);
        link.push_notification(&[0x11; 11]);

        assert_eq!(controller.desk_state(), before);
        assert!(controller.is_connected(), "decode errors never drop the link");
    }
}
