//! Bounded fixed-interval reconnection policy.
//!
//! One [`ReconnectCycle`] is created per disconnect, so the attempt counter
//! can never leak from one outage into the next. The controller drives the
//! cycle inside a spawned task: each attempt is preceded by the fixed delay,
//! and exhaustion leaves the link in the terminal `Failed` state until an
//! external reconnect request.

use std::time::Duration;

/// Default number of reconnection attempts per disconnect cycle.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Default fixed delay preceding every reconnection attempt.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Reconnection policy parameters.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Attempts per cycle before giving up.
    pub max_attempts: u32,
    /// Fixed delay before each attempt.
    pub delay: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

/// Attempt counter for one reconnection cycle.
#[derive(Debug)]
pub struct ReconnectCycle {
    config: ReconnectConfig,
    attempt: u32,
}

impl ReconnectCycle {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Claims the next attempt number (1-based), or `None` once the cycle is
    /// exhausted.
    pub fn begin_attempt(&mut self) -> Option<u32> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        self.attempt += 1;
        Some(self.attempt)
    }

    /// The fixed delay preceding every attempt.
    pub fn delay(&self) -> Duration {
        self.config.delay
    }

    /// Attempts claimed so far in this cycle.
    pub fn attempts_used(&self) -> u32 {
        self.attempt
    }

    /// Configured attempt budget.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
