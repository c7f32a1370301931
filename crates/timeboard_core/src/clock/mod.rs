//! Virtual clock with speed scaling and discontinuous jumps.
//!
//! # Responsibility
//! - Produce the logical "now" read by calendars, alert managers and alarms.
//! - Persist the anchor triple on every mutation when a store is attached.
//!
//! # Invariants
//! - `speed >= 0` at all times; negative or non-finite speeds are rejected.
//! - Every read re-anchors both reference instants, so speed changes only
//!   affect time elapsed after the change.
//! - Persistence is best-effort: a failing store is detached with a warning
//!   and the clock continues in memory.

mod source;

pub use source::{ManualRealTime, RealTimeSource, SystemRealTime};

use crate::repo::clock_repo::ClockStateStore;
use chrono::{NaiveDateTime, TimeDelta};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::sync::{Mutex, MutexGuard};

/// Anchor triple from which the virtual instant is extrapolated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    /// Real instant at the last re-anchor.
    pub reference_real: NaiveDateTime,
    /// Virtual instant at the last re-anchor.
    pub reference_virtual: NaiveDateTime,
    /// Virtual seconds elapsed per real second.
    pub speed: f64,
}

impl ClockState {
    fn anchored_at(real: NaiveDateTime) -> Self {
        Self {
            reference_real: real,
            reference_virtual: real,
            speed: 1.0,
        }
    }

    /// Moves both anchors to `real_now`, advancing the virtual instant by
    /// the scaled real elapsed time.
    fn advance_to(&mut self, real_now: NaiveDateTime) {
        let elapsed = real_now - self.reference_real;
        let elapsed_nanos = elapsed
            .num_nanoseconds()
            .unwrap_or_else(|| elapsed.num_milliseconds().saturating_mul(1_000_000));
        // f64 -> i64 casts saturate.
        let scaled = TimeDelta::nanoseconds((elapsed_nanos as f64 * self.speed) as i64);
        self.reference_virtual = self
            .reference_virtual
            .checked_add_signed(scaled)
            .unwrap_or(if scaled < TimeDelta::zero() {
                NaiveDateTime::MIN
            } else {
                NaiveDateTime::MAX
            });
        self.reference_real = real_now;
    }
}

/// Clock-level argument errors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockError {
    /// Speed is negative, NaN or infinite.
    InvalidSpeed(f64),
}

impl Display for ClockError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSpeed(speed) => {
                write!(f, "clock speed must be a finite value >= 0, got {speed}")
            }
        }
    }
}

impl Error for ClockError {}

struct ClockInner {
    state: ClockState,
    store: Option<Box<dyn ClockStateStore>>,
}

impl ClockInner {
    fn persist(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        match store.save(&self.state) {
            Ok(()) => {}
            Err(err) => {
                warn!(
                    "event=clock_persist module=clock status=error op=save fallback=memory_only error={}",
                    err
                );
                self.store = None;
            }
        }
    }
}

/// Simulable time source shared by every time-aware component.
///
/// Construct one per process (or per test) and pass it around as
/// `Arc<VirtualClock>`.
pub struct VirtualClock {
    source: Box<dyn RealTimeSource>,
    inner: Mutex<ClockInner>,
}

impl VirtualClock {
    /// Creates an in-memory clock starting at real now with speed `1`.
    pub fn new(source: impl RealTimeSource + 'static) -> Self {
        let state = ClockState::anchored_at(source.now());
        Self {
            source: Box::new(source),
            inner: Mutex::new(ClockInner { state, store: None }),
        }
    }

    /// Creates a clock backed by a persistent anchor store.
    ///
    /// A previously saved triple is restored as-is, so real time that passed
    /// while the process was down still advances the virtual clock at the
    /// saved speed. The resulting triple is written back immediately.
    ///
    /// # Side effects
    /// - A failing load or save detaches the store and logs a warning.
    pub fn with_store(
        source: impl RealTimeSource + 'static,
        store: impl ClockStateStore + 'static,
    ) -> Self {
        let mut state = ClockState::anchored_at(source.now());
        let store: Option<Box<dyn ClockStateStore>> = match store.load() {
            Ok(Some(saved)) => {
                info!(
                    "event=clock_persist module=clock status=ok op=load speed={}",
                    saved.speed
                );
                state = saved;
                Some(Box::new(store))
            }
            Ok(None) => Some(Box::new(store)),
            Err(err) => {
                warn!(
                    "event=clock_persist module=clock status=error op=load fallback=memory_only error={}",
                    err
                );
                None
            }
        };

        let clock = Self {
            source: Box::new(source),
            inner: Mutex::new(ClockInner { state, store }),
        };
        clock.lock().persist();
        clock
    }

    /// Returns the current virtual instant and re-anchors to it.
    pub fn now(&self) -> NaiveDateTime {
        let real_now = self.source.now();
        let mut inner = self.lock();
        inner.state.advance_to(real_now);
        inner.state.reference_virtual
    }

    /// Changes the speed multiplier for time elapsed from now on.
    ///
    /// # Errors
    /// - `InvalidSpeed` when `speed` is negative or not finite.
    pub fn set_speed(&self, speed: f64) -> Result<(), ClockError> {
        if !speed.is_finite() || speed < 0.0 {
            return Err(ClockError::InvalidSpeed(speed));
        }
        let real_now = self.source.now();
        let mut inner = self.lock();
        inner.state.advance_to(real_now);
        inner.state.speed = speed;
        inner.persist();
        info!("event=clock_speed module=clock status=ok speed={speed}");
        Ok(())
    }

    /// Sets the virtual instant to `at`, in either direction.
    pub fn jump_to(&self, at: NaiveDateTime) {
        let real_now = self.source.now();
        let mut inner = self.lock();
        inner.state.reference_real = real_now;
        inner.state.reference_virtual = at;
        inner.persist();
        info!("event=clock_jump module=clock status=ok target={at}");
    }

    pub fn speed(&self) -> f64 {
        self.lock().state.speed
    }

    /// Returns the anchor triple as of the last re-anchor.
    pub fn state(&self) -> ClockState {
        self.lock().state
    }

    /// Returns whether mutations are still being persisted.
    pub fn is_persistent(&self) -> bool {
        self.lock().store.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, ClockInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Debug for VirtualClock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("VirtualClock")
            .field("state", &inner.state)
            .field("persistent", &inner.store.is_some())
            .finish()
    }
}
