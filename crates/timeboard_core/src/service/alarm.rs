//! Per-user notification cursor over every alert of every event.
//!
//! # Responsibility
//! - Mirror alerts created through event alert managers into one
//!   time-ordered queue.
//! - Expose a pull-based "next due" cursor for a polling loop.
//!
//! # Invariants
//! - The queue minimum is always the earliest `(at, name)` alert.
//! - `pop_due` only ever removes an alert whose time has been reached.

use crate::clock::VirtualClock;
use crate::model::alert::Alert;
use crate::service::alert_manager::AlertError;
use chrono::{NaiveDateTime, TimeDelta};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Errors returned by [`Alarm::pop_due`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmError {
    /// No alert is queued.
    Empty,
    /// The earliest alert is still in the future.
    NotDue { next_at: NaiveDateTime },
}

impl Display for AlarmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "alarm queue is empty"),
            Self::NotDue { next_at } => write!(f, "next alert is not due until {next_at}"),
        }
    }
}

impl Error for AlarmError {}

/// Cross-event priority queue of alerts.
#[derive(Debug)]
pub struct Alarm {
    clock: Arc<VirtualClock>,
    queue: BinaryHeap<Reverse<Alert>>,
}

impl Alarm {
    pub fn new(clock: Arc<VirtualClock>) -> Self {
        Self {
            clock,
            queue: BinaryHeap::new(),
        }
    }

    /// Rebuilds an alarm from previously queued alerts.
    pub fn with_alerts(clock: Arc<VirtualClock>, alerts: impl IntoIterator<Item = Alert>) -> Self {
        Self {
            clock,
            queue: alerts.into_iter().map(Reverse).collect(),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, at: NaiveDateTime) {
        self.push(Alert::new(name, at));
    }

    pub fn push(&mut self, alert: Alert) {
        self.queue.push(Reverse(alert));
    }

    /// Queues `from + k * interval` for every instant before `until`.
    ///
    /// Unlike the per-event manager this does not reject past instants;
    /// those simply become due immediately.
    pub fn add_recurring(
        &mut self,
        name: &str,
        from: NaiveDateTime,
        until: NaiveDateTime,
        interval: TimeDelta,
    ) -> Result<usize, AlertError> {
        if interval <= TimeDelta::zero() {
            return Err(AlertError::NonPositiveInterval(interval));
        }
        let mut added = 0;
        let mut next = Some(from);
        while let Some(at) = next.filter(|at| *at < until) {
            self.add(name, at);
            added += 1;
            next = at.checked_add_signed(interval);
        }
        Ok(added)
    }

    /// Removes one queued copy of `alert`; returns `false` when absent.
    pub fn remove(&mut self, alert: &Alert) -> bool {
        let mut items = std::mem::take(&mut self.queue).into_vec();
        let position = items.iter().position(|Reverse(queued)| queued == alert);
        if let Some(position) = position {
            items.swap_remove(position);
        }
        self.queue = BinaryHeap::from(items);
        position.is_some()
    }

    /// Returns `true` iff the earliest alert's time has been reached.
    pub fn has_due(&self) -> bool {
        self.peek()
            .is_some_and(|alert| alert.is_due(self.clock.now()))
    }

    /// Removes and returns the earliest alert if it is due.
    ///
    /// # Errors
    /// - `Empty` when nothing is queued.
    /// - `NotDue` when the earliest alert is still in the future.
    pub fn pop_due(&mut self) -> Result<Alert, AlarmError> {
        let Some(next_at) = self.peek().map(Alert::at) else {
            return Err(AlarmError::Empty);
        };
        if next_at > self.clock.now() {
            return Err(AlarmError::NotDue { next_at });
        }
        self.queue
            .pop()
            .map(|Reverse(alert)| alert)
            .ok_or(AlarmError::Empty)
    }

    /// Pops every alert due at a single clock reading.
    pub fn drain_due(&mut self) -> Vec<Alert> {
        let now = self.clock.now();
        let mut due = Vec::new();
        while self.peek().is_some_and(|alert| alert.is_due(now)) {
            if let Some(Reverse(alert)) = self.queue.pop() {
                due.push(alert);
            }
        }
        due
    }

    pub fn peek(&self) -> Option<&Alert> {
        self.queue.peek().map(|Reverse(alert)| alert)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Queued alerts in trigger order.
    pub fn alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .queue
            .iter()
            .map(|Reverse(alert)| alert.clone())
            .collect();
        alerts.sort();
        alerts
    }
}
