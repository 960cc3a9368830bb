//! btleplug-backed transport for real FLH desk hardware.
//!
//! The desk exposes a Nordic-UART-style GATT service: commands are written to
//! the RX characteristic and the desk pushes state frames on the TX
//! characteristic. Peripheral handles go stale across disconnects, so the
//! transport re-resolves the peripheral from the adapter on every connect,
//! running a short scan when the address is not already cached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    DeskTransport, DisconnectHandler, NotificationHandler, TransportError, TransportLink,
};

/// GATT service advertised by the desk controller box.
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x6e400001_b5a3_f393_e0a9_e50e24dcca9e);

/// Characteristic the host writes command frames to.
pub const COMMAND_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400002_b5a3_f393_e0a9_e50e24dcca9e);

/// Characteristic the desk pushes notification frames on.
pub const NOTIFY_CHAR_UUID: Uuid = Uuid::from_u128(0x6e400003_b5a3_f393_e0a9_e50e24dcca9e);

/// How long to scan when the target address is not already known to the
/// adapter.
const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(5);

/// [`DeskTransport`] implementation over a system Bluetooth adapter.
pub struct BleTransport {
    adapter: Adapter,
    scan_window: Duration,
}

impl BleTransport {
    /// Creates a transport on the first Bluetooth adapter in the system.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectFailed`] when no adapter is present.
    pub async fn new() -> Result<Self, TransportError> {
        let manager = Manager::new().await.map_err(|e| TransportError::ConnectFailed {
            address: String::new(),
            reason: format!("bluetooth manager unavailable: {e}"),
        })?;
        let adapter = manager
            .adapters()
            .await
            .map_err(|e| TransportError::ConnectFailed {
                address: String::new(),
                reason: format!("adapter enumeration failed: {e}"),
            })?
            .into_iter()
            .next()
            .ok_or_else(|| TransportError::ConnectFailed {
                address: String::new(),
                reason: "no bluetooth adapter found".to_string(),
            })?;
        Ok(Self {
            adapter,
            scan_window: DEFAULT_SCAN_WINDOW,
        })
    }

    /// Overrides the scan window used when resolving unknown addresses.
    pub fn with_scan_window(mut self, window: Duration) -> Self {
        self.scan_window = window;
        self
    }

    async fn find_cached(&self, address: &str) -> Result<Option<Peripheral>, btleplug::Error> {
        for peripheral in self.adapter.peripherals().await? {
            if peripheral.address().to_string().eq_ignore_ascii_case(address) {
                return Ok(Some(peripheral));
            }
        }
        Ok(None)
    }

    /// Resolves the peripheral for `address`, scanning if necessary.
    async fn resolve(&self, address: &str) -> Result<Peripheral, TransportError> {
        let lookup = |e: btleplug::Error| TransportError::DeviceNotFound {
            address: address.to_string(),
            reason: e.to_string(),
        };

        if let Some(peripheral) = self.find_cached(address).await.map_err(lookup)? {
            return Ok(peripheral);
        }

        debug!(address, window = ?self.scan_window, "peripheral not cached, scanning");
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(lookup)?;
        tokio::time::sleep(self.scan_window).await;
        let _ = self.adapter.stop_scan().await;

        self.find_cached(address)
            .await
            .map_err(lookup)?
            .ok_or_else(|| TransportError::DeviceNotFound {
                address: address.to_string(),
                reason: "not seen during scan".to_string(),
            })
    }
}

#[async_trait]
impl DeskTransport for BleTransport {
    async fn connect(
        &self,
        address: &str,
        on_disconnect: DisconnectHandler,
    ) -> Result<Arc<dyn TransportLink>, TransportError> {
        let peripheral = self.resolve(address).await?;

        let connect_err = |e: btleplug::Error| TransportError::ConnectFailed {
            address: address.to_string(),
            reason: e.to_string(),
        };

        peripheral.connect().await.map_err(connect_err)?;
        peripheral.discover_services().await.map_err(connect_err)?;

        let characteristics = peripheral.characteristics();
        let command_char = characteristics
            .iter()
            .find(|c| c.uuid == COMMAND_CHAR_UUID)
            .cloned()
            .ok_or_else(|| TransportError::ConnectFailed {
                address: address.to_string(),
                reason: "command characteristic missing".to_string(),
            })?;
        let notify_char = characteristics
            .iter()
            .find(|c| c.uuid == NOTIFY_CHAR_UUID)
            .cloned()
            .ok_or_else(|| TransportError::ConnectFailed {
                address: address.to_string(),
                reason: "notify characteristic missing".to_string(),
            })?;

        let closing = Arc::new(AtomicBool::new(false));

        // Watch adapter events for unsolicited loss of this peripheral.
        // A solicited BleLink::disconnect sets `closing` first so the
        // callback stays silent, per the TransportLink contract.
        let mut events = self
            .adapter
            .events()
            .await
            .map_err(connect_err)?;
        let watched_id = peripheral.id();
        let watch_closing = Arc::clone(&closing);
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == watched_id {
                        if !watch_closing.load(Ordering::SeqCst) {
                            warn!("desk link lost");
                            on_disconnect();
                        }
                        break;
                    }
                }
            }
        });

        debug!(address, "BLE link established");
        Ok(Arc::new(BleLink {
            peripheral,
            command_char,
            notify_char,
            closing,
        }))
    }
}

/// One live GATT connection to a desk.
struct BleLink {
    peripheral: Peripheral,
    command_char: Characteristic,
    notify_char: Characteristic,
    closing: Arc<AtomicBool>,
}

#[async_trait]
impl TransportLink for BleLink {
    async fn subscribe(&self, handler: NotificationHandler) -> Result<(), TransportError> {
        self.peripheral
            .subscribe(&self.notify_char)
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| TransportError::SubscribeFailed(e.to_string()))?;

        tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid == NOTIFY_CHAR_UUID {
                    handler(&notification.value);
                }
            }
            debug!("notification stream ended");
        });

        Ok(())
    }

    async fn write(&self, payload: &[u8], requires_ack: bool) -> Result<(), TransportError> {
        let write_type = if requires_ack {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };
        self.peripheral
            .write(&self.command_char, payload, write_type)
            .await
            .map_err(|e| TransportError::WriteFailed(e.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closing.store(true, Ordering::SeqCst);
        self.peripheral
            .disconnect()
            .await
            .map_err(|e| TransportError::ConnectFailed {
                address: self.peripheral.address().to_string(),
                reason: e.to_string(),
            })
    }

    async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }
}
