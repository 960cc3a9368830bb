//! Mock transport for unit and integration testing.
//!
//! Allows tests to script connect outcomes, capture written frames, inject
//! notification payloads, and simulate unsolicited link loss without any
//! BLE hardware.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{
    DeskTransport, DisconnectHandler, NotificationHandler, TransportError, TransportLink,
};

/// A scriptable [`DeskTransport`] implementation.
///
/// Each successful `connect` produces a fresh [`MockLink`]; the most recent
/// one is reachable through [`MockTransport::current_link`] so tests can
/// inspect writes and drive the link from the outside.
#[derive(Default)]
pub struct MockTransport {
    fail_next: AtomicU32,
    attempts: AtomicU32,
    links: Mutex<Vec<Arc<MockLink>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` connect calls fail. Pass `u32::MAX` to fail every
    /// future attempt.
    pub fn fail_next_connects(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Total number of connect calls observed, successful or not.
    pub fn connect_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The link produced by the most recent successful connect.
    pub fn current_link(&self) -> Option<Arc<MockLink>> {
        self.links.lock().expect("lock poisoned").last().cloned()
    }
}

#[async_trait]
impl DeskTransport for MockTransport {
    async fn connect(
        &self,
        address: &str,
        on_disconnect: DisconnectHandler,
    ) -> Result<Arc<dyn TransportLink>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            if remaining != u32::MAX {
                self.fail_next.store(remaining - 1, Ordering::SeqCst);
            }
            return Err(TransportError::ConnectFailed {
                address: address.to_string(),
                reason: "scripted failure".to_string(),
            });
        }

        let link = Arc::new(MockLink {
            connected: AtomicBool::new(true),
            written: Mutex::new(Vec::new()),
            handler: Mutex::new(None),
            on_disconnect,
        });
        self.links.lock().expect("lock poisoned").push(Arc::clone(&link));
        Ok(link)
    }
}

/// A fake GATT link whose behaviour is driven entirely by the test.
pub struct MockLink {
    connected: AtomicBool,
    written: Mutex<Vec<Vec<u8>>>,
    handler: Mutex<Option<NotificationHandler>>,
    on_disconnect: DisconnectHandler,
}

impl MockLink {
    /// Every frame written to this link so far, in write order.
    pub fn written_frames(&self) -> Vec<Vec<u8>> {
        self.written.lock().expect("lock poisoned").clone()
    }

    /// Delivers a notification payload to the subscribed handler, as if the
    /// desk had pushed it.
    ///
    /// Panics if `subscribe` has not been called – a test ordering bug.
    pub fn push_notification(&self, payload: &[u8]) {
        let guard = self.handler.lock().expect("lock poisoned");
        let handler = guard
            .as_ref()
            .expect("push_notification called before subscribe");
        handler(payload);
    }

    /// Simulates unsolicited link loss: the link goes down and the
    /// transport-level disconnect callback fires, exactly as when a real
    /// peripheral walks out of radio range.
    pub fn drop_link(&self) {
        self.connected.store(false, Ordering::SeqCst);
        (self.on_disconnect)();
    }
}

#[async_trait]
impl TransportLink for MockLink {
    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        *self.handler.lock().expect("lock poisoned") = Some(handler);
        Ok(())
    }

    async fn write(&self, payload: &[u8], _requires_ack: bool) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        self.written
            .lock()
            .expect("lock poisoned")
            .push(payload.to_vec());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        // Solicited close: no on_disconnect callback, matching the contract.
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
