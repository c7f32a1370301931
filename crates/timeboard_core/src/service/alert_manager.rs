//! Per-event alert queue.
//!
//! # Responsibility
//! - Keep pending alerts ordered by trigger time and move them to history
//!   once they fire.
//! - Expand recurring alerts eagerly into individual instances.
//!
//! # Invariants
//! - An alert enters `pending` only when its trigger time is strictly after
//!   the clock time at scheduling; past alerts are logged and skipped.
//! - `sweep` stops at the first pending alert that is not yet due.

use crate::model::alert::Alert;
use chrono::{NaiveDateTime, TimeDelta};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors for alert scheduling operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    /// Recurring expansion needs a strictly positive step.
    NonPositiveInterval(TimeDelta),
    /// The alert is not pending on this event.
    UnknownAlert(Alert),
}

impl Display for AlertError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonPositiveInterval(interval) => {
                write!(f, "alert interval must be positive, got {interval}")
            }
            Self::UnknownAlert(alert) => write!(f, "alert is not pending: {alert}"),
        }
    }
}

impl Error for AlertError {}

/// Pending and fired alerts of one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertManager {
    pending: BTreeSet<Alert>,
    history: BTreeSet<Alert>,
}

impl AlertManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules one alert at `at`.
    ///
    /// Returns the stored alert, or `None` when `at <= now` (rejected) or an
    /// identical alert is already pending.
    pub fn schedule_once(
        &mut self,
        name: impl Into<String>,
        at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Option<Alert> {
        let alert = Alert::new(name, at);
        if at <= now {
            warn!(
                "event=alert_rejected module=alerts status=skipped reason=not_in_future at={} now={}",
                at, now
            );
            return None;
        }
        if !self.pending.insert(alert.clone()) {
            return None;
        }
        Some(alert)
    }

    /// Schedules `from + k * interval` for every `k` with the instant before
    /// `until`.
    ///
    /// Each instance is independently subject to the past-rejection rule, so
    /// the returned list omits instances at or before `now`.
    ///
    /// # Errors
    /// - `NonPositiveInterval` when `interval <= 0`.
    pub fn schedule_recurring(
        &mut self,
        name: &str,
        from: NaiveDateTime,
        until: NaiveDateTime,
        interval: TimeDelta,
        now: NaiveDateTime,
    ) -> Result<Vec<Alert>, AlertError> {
        if interval <= TimeDelta::zero() {
            return Err(AlertError::NonPositiveInterval(interval));
        }

        let mut scheduled = Vec::new();
        let mut next = Some(from);
        while let Some(at) = next.filter(|at| *at < until) {
            if let Some(alert) = self.schedule_once(name, at, now) {
                scheduled.push(alert);
            }
            next = at.checked_add_signed(interval);
        }
        Ok(scheduled)
    }

    /// Moves every due pending alert to history and returns them in order.
    pub fn sweep(&mut self, now: NaiveDateTime) -> Vec<Alert> {
        let mut due = Vec::new();
        while self.pending.first().is_some_and(|alert| alert.is_due(now)) {
            let Some(alert) = self.pending.pop_first() else {
                break;
            };
            info!("event=alert_due module=alerts status=ok alert={alert}");
            self.history.insert(alert.clone());
            due.push(alert);
        }
        due
    }

    /// Removes a pending alert; returns `false` when it was not pending.
    pub fn cancel(&mut self, alert: &Alert) -> bool {
        self.pending.remove(alert)
    }

    /// Replaces a pending alert with a new name and trigger time.
    ///
    /// When the new time is not in the future, or the target alert is
    /// already pending, the original alert is kept and `Ok(None)` is
    /// returned.
    pub fn reschedule(
        &mut self,
        alert: &Alert,
        name: impl Into<String>,
        at: NaiveDateTime,
        now: NaiveDateTime,
    ) -> Result<Option<Alert>, AlertError> {
        if !self.pending.contains(alert) {
            return Err(AlertError::UnknownAlert(alert.clone()));
        }
        if at <= now {
            warn!(
                "event=alert_rejected module=alerts status=skipped reason=not_in_future at={} now={}",
                at, now
            );
            return Ok(None);
        }
        let target = Alert::new(name, at);
        if self.pending.contains(&target) {
            warn!(
                "event=alert_rejected module=alerts status=skipped reason=already_pending alert={}",
                target
            );
            return Ok(None);
        }
        self.pending.remove(alert);
        self.pending.insert(target.clone());
        Ok(Some(target))
    }

    /// Pending alerts in trigger order.
    pub fn pending(&self) -> impl Iterator<Item = &Alert> {
        self.pending.iter()
    }

    /// Fired alerts in trigger order.
    pub fn history(&self) -> impl Iterator<Item = &Alert> {
        self.history.iter()
    }

    pub fn next_pending(&self) -> Option<&Alert> {
        self.pending.first()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn is_pending(&self, alert: &Alert) -> bool {
        self.pending.contains(alert)
    }
}

#[cfg(test)]
mod tests {
    use super::{AlertError, AlertManager};
    use chrono::{NaiveDateTime, TimeDelta};

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
    }

    #[test]
    fn recurring_expansion_skips_past_head() {
        let mut manager = AlertManager::new();
        let scheduled = manager
            .schedule_recurring(
                "standup",
                at("2025-01-01T00:00"),
                at("2025-01-01T04:00"),
                TimeDelta::hours(1),
                at("2025-01-01T01:00"),
            )
            .unwrap();

        let times: Vec<_> = scheduled.iter().map(|alert| alert.at()).collect();
        assert_eq!(times, vec![at("2025-01-01T02:00"), at("2025-01-01T03:00")]);
    }

    #[test]
    fn recurring_rejects_zero_interval() {
        let mut manager = AlertManager::new();
        let err = manager
            .schedule_recurring(
                "x",
                at("2025-01-01T00:00"),
                at("2025-01-02T00:00"),
                TimeDelta::zero(),
                at("2024-01-01T00:00"),
            )
            .unwrap_err();
        assert_eq!(err, AlertError::NonPositiveInterval(TimeDelta::zero()));
        assert_eq!(manager.pending_len(), 0);
    }

    #[test]
    fn sweep_stops_at_first_future_alert() {
        let now = at("2025-01-01T00:00");
        let mut manager = AlertManager::new();
        manager.schedule_once("a", at("2025-01-01T01:00"), now);
        manager.schedule_once("b", at("2025-01-01T02:00"), now);
        manager.schedule_once("c", at("2025-01-01T03:00"), now);

        let due = manager.sweep(at("2025-01-01T02:00"));
        assert_eq!(due.len(), 2);
        assert_eq!(manager.pending_len(), 1);
        assert_eq!(manager.history_len(), 2);
        assert_eq!(manager.next_pending().map(|a| a.name()), Some("c"));
    }

    #[test]
    fn reschedule_into_past_keeps_original() {
        let now = at("2025-01-01T00:00");
        let mut manager = AlertManager::new();
        let alert = manager.schedule_once("a", at("2025-01-01T05:00"), now).unwrap();

        let result = manager
            .reschedule(&alert, "a2", at("2024-12-31T00:00"), now)
            .unwrap();
        assert!(result.is_none());
        assert!(manager.is_pending(&alert));

        let moved = manager
            .reschedule(&alert, "a2", at("2025-01-02T00:00"), now)
            .unwrap()
            .unwrap();
        assert_eq!(moved.name(), "a2");
        assert!(!manager.is_pending(&alert));
    }

    #[test]
    fn reschedule_onto_pending_alert_keeps_both() {
        let now = at("2025-01-01T00:00");
        let mut manager = AlertManager::new();
        let first = manager.schedule_once("a", at("2025-01-01T05:00"), now).unwrap();
        let second = manager.schedule_once("b", at("2025-01-01T06:00"), now).unwrap();

        let result = manager
            .reschedule(&first, "b", at("2025-01-01T06:00"), now)
            .unwrap();
        assert!(result.is_none());
        assert!(manager.is_pending(&first));
        assert!(manager.is_pending(&second));
        assert_eq!(manager.pending_len(), 2);

        let same = manager
            .reschedule(&first, "a", at("2025-01-01T05:00"), now)
            .unwrap();
        assert!(same.is_none());
        assert!(manager.is_pending(&first));
    }
}
