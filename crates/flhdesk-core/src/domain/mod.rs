//! Domain module: the desk's authoritative state and the observer hub.

pub mod observer;
pub mod state;

pub use observer::{ListenerHandle, ObserverHub};
pub use state::{DeskState, DeskStateStore};
