//! Transport seam between the link manager and the BLE stack.
//!
//! The controller consumes two narrow traits: [`DeskTransport`] resolves a
//! device address to a connected [`TransportLink`], and the link exposes
//! subscribe/write/disconnect on the one GATT connection it represents.
//! A fresh link is resolved for every connect attempt because the underlying
//! peripheral handle can go stale between disconnect and reconnect.
//!
//! Unsolicited link loss is reported through the `on_disconnect` callback
//! handed to [`DeskTransport::connect`]. Adapters must invoke both the
//! notification handler and the disconnect callback from within a Tokio
//! runtime context, and neither callback may block.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub mod ble;
pub mod mock;

pub use ble::BleTransport;
pub use mock::MockTransport;

/// Callback receiving raw notification payloads from the desk.
pub type NotificationHandler = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Callback invoked once when the transport reports unsolicited link loss.
pub type DisconnectHandler = Arc<dyn Fn() + Send + Sync>;

/// Errors surfaced by transport implementations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No peripheral with the given address could be resolved.
    #[error("desk {address} not found: {reason}")]
    DeviceNotFound { address: String, reason: String },

    /// The connection attempt itself failed.
    #[error("connect to {address} failed: {reason}")]
    ConnectFailed { address: String, reason: String },

    /// Subscribing to the notification characteristic failed.
    #[error("notification subscribe failed: {0}")]
    SubscribeFailed(String),

    /// A command write failed on an established link.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// An operation was attempted on a link that is no longer connected.
    #[error("link is not connected")]
    NotConnected,
}

/// Resolves a desk address to a live, connected link.
///
/// Implemented by [`ble::BleTransport`] for real hardware and by
/// [`mock::MockTransport`] for tests.
#[async_trait]
pub trait DeskTransport: Send + Sync {
    /// Resolves the address and establishes a connection.
    ///
    /// `on_disconnect` fires exactly once if the link is lost without a
    /// prior [`TransportLink::disconnect`] call.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the device cannot be found or the
    /// connection fails.
    async fn connect(
        &self,
        address: &str,
        on_disconnect: DisconnectHandler,
    ) -> Result<Arc<dyn TransportLink>, TransportError>;
}

/// One connected period on one desk; owned by a single connection session
/// and replaced wholesale on reconnect.
#[async_trait]
pub trait TransportLink: Send + Sync {
    /// Subscribes to the desk's notification channel, routing every inbound
    /// payload to `handler`.
    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError>;

    /// Writes one command frame. `requires_ack` selects an acknowledged
    /// write; desk commands use unacknowledged writes.
    async fn write(&self, payload: &[u8], requires_ack: bool) -> Result<(), TransportError>;

    /// Closes the link. Never triggers the `on_disconnect` callback.
    async fn disconnect(&self) -> Result<(), TransportError>;

    /// Whether the transport still considers the link up.
    async fn is_connected(&self) -> bool;
}
