//! Real-time sources feeding the virtual clock.
//!
//! # Responsibility
//! - Abstract "what time is it in the real world" so tests can drive it.
//!
//! # Invariants
//! - Sources are shareable across threads.

use chrono::{Local, NaiveDateTime, TimeDelta};
use std::sync::{Arc, Mutex};

/// Provider of the real (wall-clock) instant.
pub trait RealTimeSource: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRealTime;

impl RealTimeSource for SystemRealTime {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Hand-driven real-time source.
///
/// Clones share one instant, so a test can keep a handle while the clock
/// owns another.
#[derive(Debug, Clone)]
pub struct ManualRealTime {
    now: Arc<Mutex<NaiveDateTime>>,
}

impl ManualRealTime {
    pub fn new(start: NaiveDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    /// Moves real time forward (or backward for negative deltas).
    pub fn advance(&self, delta: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(next) = guard.checked_add_signed(delta) {
            *guard = next;
        }
    }

    pub fn set(&self, at: NaiveDateTime) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = at;
    }
}

impl RealTimeSource for ManualRealTime {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
