//! # flhdesk-core
//!
//! Shared library for the FLH desk controller containing the byte-level
//! command codec, the notification decoder, and the desk domain state.
//!
//! This crate is used by the link layer and the CLI binary. It has zero
//! dependencies on the BLE stack, the async runtime, or any OS API: every
//! function here is pure and synchronous, so the whole protocol can be
//! exercised in tests without hardware.
//!
//! # Architecture overview
//!
//! An FLH height-adjustable desk speaks a small proprietary protocol over a
//! Nordic-UART-style GATT link:
//!
//! - **`protocol::command`** – How outbound bytes are built. Every command is
//!   `DD 00` + an opcode body (optionally adjusted by limit flags) + a 7-bit
//!   additive checksum.
//!
//! - **`protocol::notification`** – How inbound bytes are read. The desk
//!   pushes frames starting with `0x9D`; byte 1 selects the event type and
//!   heights travel as 12-bit big-endian values at fixed offsets.
//!
//! - **`domain`** – The desk's authoritative state (`DeskState`), the store
//!   that applies decoded events to it, and the observer hub that fans state
//!   changes out to registered listeners.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `flhdesk_core::DeskCommand` instead of the full module path.
pub use domain::observer::{ListenerHandle, ObserverHub};
pub use domain::state::{DeskState, DeskStateStore};
pub use protocol::command::{build_command, CommandFrame, DeskCommand, MemorySlot};
pub use protocol::notification::{decode_notification, DeskEvent, FrameError};
