//! The desk's authoritative state and the store that mutates it.
//!
//! All state mutation funnels through [`DeskStateStore`]: decoded protocol
//! events via [`DeskStateStore::apply`], connection transitions and setters
//! via the dedicated methods. Transport and presentation code only ever see
//! immutable [`DeskState`] snapshots.

use tracing::debug;

use crate::protocol::notification::DeskEvent;

/// Default minimum desk height before limits are received, in millimetres.
pub const DEFAULT_MIN_HEIGHT_MM: u16 = 720;

/// Default maximum desk height before limits are received, in millimetres.
pub const DEFAULT_MAX_HEIGHT_MM: u16 = 1220;

/// Default movement sensitivity level.
pub const DEFAULT_SENSITIVITY: u8 = 0;

/// Highest accepted sensitivity level.
pub const MAX_SENSITIVITY: u8 = 8;

/// Immutable snapshot of the desk state.
///
/// Heights are stored in the device's native unit, millimetres; the `_cm`
/// accessors convert for presentation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeskState {
    pub current_height_mm: u16,
    pub min_height_mm: u16,
    pub max_height_mm: u16,
    /// No notification byte has been identified that carries motion status;
    /// this stays `false` until the status bit is found in further protocol
    /// captures.
    pub is_moving: bool,
    pub is_connected: bool,
    /// Movement sensitivity, clamped to `0..=8`.
    pub sensitivity: u8,
}

impl Default for DeskState {
    fn default() -> Self {
        Self {
            current_height_mm: 0,
            min_height_mm: DEFAULT_MIN_HEIGHT_MM,
            max_height_mm: DEFAULT_MAX_HEIGHT_MM,
            is_moving: false,
            is_connected: false,
            sensitivity: DEFAULT_SENSITIVITY,
        }
    }
}

impl DeskState {
    /// Current height in centimetres.
    pub fn height_cm(&self) -> f64 {
        self.current_height_mm as f64 / 10.0
    }

    /// Minimum height in centimetres.
    pub fn min_height_cm(&self) -> f64 {
        self.min_height_mm as f64 / 10.0
    }

    /// Maximum height in centimetres.
    pub fn max_height_cm(&self) -> f64 {
        self.max_height_mm as f64 / 10.0
    }

    /// Position within the travel range as a percentage, clamped to 0–100.
    ///
    /// Returns 0 when the limits coincide (avoids dividing by zero before
    /// real limits have been received).
    pub fn position_percent(&self) -> f64 {
        let min = self.min_height_cm();
        let max = self.max_height_cm();
        if max <= min {
            return 0.0;
        }
        let percent = (self.height_cm() - min) / (max - min) * 100.0;
        percent.clamp(0.0, 100.0)
    }
}

/// Owns the [`DeskState`] and applies decoded events to it.
///
/// The store itself is synchronous and lock-free; the link layer wraps it in
/// whatever guard its execution contexts need.
#[derive(Debug, Default)]
pub struct DeskStateStore {
    state: DeskState,
}

impl DeskStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> DeskState {
        self.state
    }

    /// Applies a decoded event; returns `true` when observers should be
    /// notified (i.e. the event carried a state change).
    pub fn apply(&mut self, event: DeskEvent) -> bool {
        match event {
            DeskEvent::LimitsUpdated { min_mm, max_mm } => {
                self.state.min_height_mm = min_mm;
                self.state.max_height_mm = max_mm;
                debug!(min_mm, max_mm, "height limits updated");
                true
            }
            DeskEvent::HeightUpdated { height_mm } => {
                self.state.current_height_mm = height_mm;
                debug!(height_mm, "height updated");
                true
            }
            DeskEvent::Unrecognized { event_type } => {
                debug!(event_type, "unrecognized notification type");
                false
            }
        }
    }

    /// Marks the link up or down; returns `true` when the flag changed.
    pub fn set_connected(&mut self, connected: bool) -> bool {
        if self.state.is_connected == connected {
            return false;
        }
        self.state.is_connected = connected;
        true
    }

    /// Sets the movement sensitivity, clamping to `0..=8`.
    ///
    /// Returns the value actually stored.
    pub fn set_sensitivity(&mut self, level: i16) -> u8 {
        let clamped = level.clamp(0, MAX_SENSITIVITY as i16) as u8;
        self.state.sensitivity = clamped;
        debug!(sensitivity = clamped, "sensitivity set");
        clamped
    }

    /// Converts a requested height in centimetres to millimetres, clamped to
    /// the desk's current limits. This is the only sanctioned path from a
    /// user-facing height request into the command codec.
    pub fn clamp_height_cm(&self, cm: f64) -> u16 {
        let mm = (cm * 10.0).round() as i64;
        mm.clamp(self.state.min_height_mm as i64, self.state.max_height_mm as i64) as u16
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_uses_factory_limits() {
        let state = DeskState::default();
        assert_eq!(state.min_height_mm, 720);
        assert_eq!(state.max_height_mm, 1220);
        assert_eq!(state.sensitivity, 0);
        assert!(!state.is_connected);
        assert!(!state.is_moving);
    }

    #[test]
    fn test_apply_height_update_changes_snapshot() {
        let mut store = DeskStateStore::new();

        let notify = store.apply(DeskEvent::HeightUpdated { height_mm: 300 });

        assert!(notify);
        assert_eq!(store.snapshot().current_height_mm, 300);
        assert_eq!(store.snapshot().height_cm(), 30.0);
    }

    #[test]
    fn test_apply_limits_update_changes_snapshot() {
        let mut store = DeskStateStore::new();

        let notify = store.apply(DeskEvent::LimitsUpdated {
            min_mm: 650,
            max_mm: 1290,
        });

        assert!(notify);
        assert_eq!(store.snapshot().min_height_cm(), 65.0);
        assert_eq!(store.snapshot().max_height_cm(), 129.0);
    }

    #[test]
    fn test_apply_unrecognized_event_is_a_no_op() {
        let mut store = DeskStateStore::new();
        let before = store.snapshot();

        let notify = store.apply(DeskEvent::Unrecognized { event_type: 0x42 });

        assert!(!notify, "unrecognized events must not notify observers");
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_position_percent_at_range_ends() {
        let mut store = DeskStateStore::new();
        store.apply(DeskEvent::LimitsUpdated {
            min_mm: 720,
            max_mm: 1220,
        });

        store.apply(DeskEvent::HeightUpdated { height_mm: 720 });
        assert_eq!(store.snapshot().position_percent(), 0.0);

        store.apply(DeskEvent::HeightUpdated { height_mm: 1220 });
        assert_eq!(store.snapshot().position_percent(), 100.0);

        store.apply(DeskEvent::HeightUpdated { height_mm: 970 });
        assert_eq!(store.snapshot().position_percent(), 50.0);
    }

    #[test]
    fn test_position_percent_clamps_out_of_range_heights() {
        let mut store = DeskStateStore::new();
        store.apply(DeskEvent::HeightUpdated { height_mm: 100 });
        assert_eq!(store.snapshot().position_percent(), 0.0);

        store.apply(DeskEvent::HeightUpdated { height_mm: 2000 });
        assert_eq!(store.snapshot().position_percent(), 100.0);
    }

    #[test]
    fn test_position_percent_returns_zero_on_degenerate_limits() {
        let mut store = DeskStateStore::new();
        store.apply(DeskEvent::LimitsUpdated {
            min_mm: 800,
            max_mm: 800,
        });
        store.apply(DeskEvent::HeightUpdated { height_mm: 800 });
        assert_eq!(store.snapshot().position_percent(), 0.0);
    }

    #[test]
    fn test_clamp_height_cm_clamps_to_limits() {
        let store = DeskStateStore::new();

        // 72–122 cm defaults: 150 cm clamps to the 1220 mm ceiling.
        assert_eq!(store.clamp_height_cm(150.0), 1220);
        assert_eq!(store.clamp_height_cm(50.0), 720);
        assert_eq!(store.clamp_height_cm(100.0), 1000);
    }

    #[test]
    fn test_clamp_height_cm_rounds_to_nearest_millimetre() {
        let store = DeskStateStore::new();
        assert_eq!(store.clamp_height_cm(100.04), 1000);
        assert_eq!(store.clamp_height_cm(100.06), 1001);
    }

    #[test]
    fn test_set_sensitivity_clamps_both_ends() {
        let mut store = DeskStateStore::new();

        assert_eq!(store.set_sensitivity(-3), 0);
        assert_eq!(store.snapshot().sensitivity, 0);

        assert_eq!(store.set_sensitivity(20), 8);
        assert_eq!(store.snapshot().sensitivity, 8);

        assert_eq!(store.set_sensitivity(5), 5);
        assert_eq!(store.snapshot().sensitivity, 5);
    }

    #[test]
    fn test_set_connected_reports_changes_only() {
        let mut store = DeskStateStore::new();

        assert!(store.set_connected(true));
        assert!(!store.set_connected(true), "no change, no notification");
        assert!(store.set_connected(false));
    }
}
