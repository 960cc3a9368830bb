//! Listener registry fanning desk state changes out to subscribers.
//!
//! Listeners are keyed by an opaque [`ListenerHandle`] so removal is
//! deterministic and never relies on comparing callback identities. On each
//! state change every registered listener is invoked once, in registration
//! order, synchronously with respect to the triggering event – listeners must
//! therefore be non-blocking. The hub performs no error isolation; a
//! panicking listener is the subscriber's bug, not the hub's to contain.

use crate::domain::state::DeskState;

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

type Listener = Box<dyn Fn(&DeskState) + Send + Sync>;

/// Fan-out hub for desk state change notifications.
#[derive(Default)]
pub struct ObserverHub {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

impl ObserverHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener and returns the handle that removes it.
    pub fn subscribe<F>(&mut self, listener: F) -> ListenerHandle
    where
        F: Fn(&DeskState) + Send + Sync + 'static,
    {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        ListenerHandle(id)
    }

    /// Removes a listener; returns `false` when the handle is unknown
    /// (e.g. already removed).
    pub fn unsubscribe(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != handle.0);
        self.listeners.len() != before
    }

    /// Invokes every registered listener with the given snapshot, in
    /// registration order.
    pub fn notify(&self, state: &DeskState) {
        for (_, listener) in &self.listeners {
            listener(state);
        }
    }

    /// Number of currently registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl std::fmt::Debug for ObserverHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverHub")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
