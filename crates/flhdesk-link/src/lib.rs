//! # flhdesk-link
//!
//! Async link management for FLH desks on top of `flhdesk-core`'s pure
//! protocol logic.
//!
//! The layering mirrors the physical setup:
//!
//! ```text
//! DeskController            -- connection state machine, handshake, commands
//!  ├─ DeskTransport         -- trait: resolves an address to a live link
//!  │   ├─ BleTransport      -- btleplug adapter (real hardware)
//!  │   └─ MockTransport     -- scriptable fake for tests
//!  ├─ ReconnectCycle        -- bounded fixed-interval retry policy
//!  └─ flhdesk-core          -- codec, decoder, state store, observer hub
//! ```
//!
//! The controller never touches the BLE stack directly; everything it needs
//! from the outside world passes through the [`transport::DeskTransport`]
//! seam, so the whole state machine is exercised in tests against
//! [`transport::mock::MockTransport`] without radio hardware.

pub mod controller;
pub mod reconnect;
pub mod transport;

pub use controller::{ConnectionState, DeskController, DeskLinkConfig, LinkError};
pub use reconnect::{ReconnectConfig, ReconnectCycle};
pub use transport::{DeskTransport, TransportError, TransportLink};
