//! Per-user planning session.
//!
//! # Responsibility
//! - Own one user's calendars and the user's `Alarm`.
//! - Mirror every alert accepted by an event's alert manager into the
//!   alarm, and remove it from both on delete.
//! - Serialize user mutation and the background notification poll through
//!   one mutex (`SharedPlanner`).
//!
//! # Invariants
//! - Calendar names are unique within a planner.
//! - Alerts rejected as past by an alert manager never reach the alarm.
//! - The poller never invokes its sink while holding the planner lock.

use crate::clock::VirtualClock;
use crate::model::alert::Alert;
use crate::service::alarm::{Alarm, AlarmError};
use crate::service::calendar::{Calendar, CalendarError};
use crate::service::view::MergedCalendar;
use chrono::{NaiveDateTime, TimeDelta};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Errors for planner operations.
#[derive(Debug)]
pub enum PlannerError {
    CalendarNotFound(String),
    DuplicateCalendar(String),
    Calendar(CalendarError),
    Alarm(AlarmError),
    /// The background poller thread could not be started.
    PollerSpawn(std::io::Error),
}

impl Display for PlannerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CalendarNotFound(name) => write!(f, "calendar not found: {name}"),
            Self::DuplicateCalendar(name) => write!(f, "calendar already exists: {name}"),
            Self::Calendar(err) => write!(f, "{err}"),
            Self::Alarm(err) => write!(f, "{err}"),
            Self::PollerSpawn(err) => write!(f, "failed to start alarm poller: {err}"),
        }
    }
}

impl Error for PlannerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Calendar(err) => Some(err),
            Self::Alarm(err) => Some(err),
            Self::PollerSpawn(err) => Some(err),
            Self::CalendarNotFound(_) | Self::DuplicateCalendar(_) => None,
        }
    }
}

impl From<CalendarError> for PlannerError {
    fn from(value: CalendarError) -> Self {
        Self::Calendar(value)
    }
}

impl From<AlarmError> for PlannerError {
    fn from(value: AlarmError) -> Self {
        Self::Alarm(value)
    }
}

/// One user's calendars and notification queue.
#[derive(Debug)]
pub struct Planner {
    owner: String,
    clock: Arc<VirtualClock>,
    calendars: Vec<Calendar>,
    alarm: Alarm,
}

impl Planner {
    pub fn new(owner: impl Into<String>, clock: Arc<VirtualClock>) -> Self {
        let alarm = Alarm::new(clock.clone());
        Self {
            owner: owner.into(),
            clock,
            calendars: Vec::new(),
            alarm,
        }
    }

    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    /// Creates an empty calendar.
    pub fn add_calendar(&mut self, name: &str) -> Result<&mut Calendar, PlannerError> {
        let calendar = Calendar::new(name, self.clock.clone());
        self.insert_calendar(calendar)
    }

    /// Adopts an existing (e.g. restored) calendar and queues its pending
    /// alerts in the alarm.
    pub fn insert_calendar(&mut self, calendar: Calendar) -> Result<&mut Calendar, PlannerError> {
        if self.calendar(calendar.name()).is_some() {
            return Err(PlannerError::DuplicateCalendar(calendar.name().to_string()));
        }
        for alert in calendar.pending_alerts() {
            self.alarm.push(alert);
        }
        info!(
            "event=calendar_open module=planner status=ok owner={} calendar={}",
            self.owner,
            calendar.name()
        );
        self.calendars.push(calendar);
        let last = self.calendars.len() - 1;
        Ok(&mut self.calendars[last])
    }

    /// Removes a calendar and its pending alerts from the alarm.
    pub fn remove_calendar(&mut self, name: &str) -> Result<Calendar, PlannerError> {
        let position = self
            .calendars
            .iter()
            .position(|calendar| calendar.name() == name)
            .ok_or_else(|| PlannerError::CalendarNotFound(name.to_string()))?;
        let calendar = self.calendars.remove(position);
        for alert in calendar.pending_alerts() {
            self.alarm.remove(&alert);
        }
        Ok(calendar)
    }

    pub fn calendar(&self, name: &str) -> Option<&Calendar> {
        self.calendars
            .iter()
            .find(|calendar| calendar.name() == name)
    }

    /// Mutable access for event and note edits.
    ///
    /// Alerts scheduled directly on the returned calendar are not mirrored
    /// into the alarm; use the planner's alert methods for that.
    pub fn calendar_mut(&mut self, name: &str) -> Result<&mut Calendar, PlannerError> {
        self.calendars
            .iter_mut()
            .find(|calendar| calendar.name() == name)
            .ok_or_else(|| PlannerError::CalendarNotFound(name.to_string()))
    }

    pub fn calendar_names(&self) -> Vec<String> {
        self.calendars
            .iter()
            .map(|calendar| calendar.name().to_string())
            .collect()
    }

    /// Read-only union of every calendar, in insertion order.
    pub fn merged_view(&self) -> MergedCalendar {
        let sources: Vec<&Calendar> = self.calendars.iter().collect();
        Calendar::merge(format!("{} (all)", self.owner), self.clock.clone(), &sources)
    }

    /// Deletes an event and drops its pending alerts from the alarm.
    pub fn delete_event(&mut self, calendar: &str, event: &str) -> Result<(), PlannerError> {
        let removed = self.calendar_mut(calendar)?.delete_event(event)?;
        for alert in removed.alerts().pending() {
            self.alarm.remove(alert);
        }
        Ok(())
    }

    /// Schedules a one-off alert and mirrors it when accepted.
    pub fn schedule_alert(
        &mut self,
        calendar: &str,
        event: &str,
        name: &str,
        at: NaiveDateTime,
    ) -> Result<Option<Alert>, PlannerError> {
        let scheduled = self.calendar_mut(calendar)?.schedule_alert(event, name, at)?;
        if let Some(alert) = &scheduled {
            self.alarm.push(alert.clone());
        }
        Ok(scheduled)
    }

    /// Expands a recurring alert and mirrors every accepted instance.
    pub fn schedule_recurring_alert(
        &mut self,
        calendar: &str,
        event: &str,
        name: &str,
        from: NaiveDateTime,
        until: NaiveDateTime,
        interval: TimeDelta,
    ) -> Result<Vec<Alert>, PlannerError> {
        let scheduled = self
            .calendar_mut(calendar)?
            .schedule_recurring_alert(event, name, from, until, interval)?;
        for alert in &scheduled {
            self.alarm.push(alert.clone());
        }
        Ok(scheduled)
    }

    pub fn delete_alert(
        &mut self,
        calendar: &str,
        event: &str,
        alert: &Alert,
    ) -> Result<(), PlannerError> {
        self.calendar_mut(calendar)?.delete_alert(event, alert)?;
        if !self.alarm.remove(alert) {
            warn!(
                "event=alert_delete module=planner status=skipped reason=not_in_alarm alert={}",
                alert
            );
        }
        Ok(())
    }

    /// Moves a pending alert; the alarm follows only when the move happened.
    pub fn reschedule_alert(
        &mut self,
        calendar: &str,
        event: &str,
        alert: &Alert,
        new_name: &str,
        new_at: NaiveDateTime,
    ) -> Result<Option<Alert>, PlannerError> {
        let moved = self
            .calendar_mut(calendar)?
            .reschedule_alert(event, alert, new_name, new_at)?;
        if let Some(new_alert) = &moved {
            self.alarm.remove(alert);
            self.alarm.push(new_alert.clone());
        }
        Ok(moved)
    }

    pub fn has_due_alert(&self) -> bool {
        self.alarm.has_due()
    }

    /// Pops the earliest alarm entry if it is due.
    pub fn next_due_alert(&mut self) -> Result<Alert, PlannerError> {
        Ok(self.alarm.pop_due()?)
    }

    /// Pops every due alarm entry and moves the matching event alerts to
    /// their history.
    pub fn drain_due_alerts(&mut self) -> Vec<Alert> {
        let due = self.alarm.drain_due();
        if !due.is_empty() {
            for calendar in &mut self.calendars {
                calendar.ring_due_alerts();
            }
        }
        due
    }

    pub fn alarm(&self) -> &Alarm {
        &self.alarm
    }
}

/// Cloneable handle serializing every planner access through one mutex.
#[derive(Debug, Clone)]
pub struct SharedPlanner {
    inner: Arc<Mutex<Planner>>,
}

impl SharedPlanner {
    pub fn new(planner: Planner) -> Self {
        Self {
            inner: Arc::new(Mutex::new(planner)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Planner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` with exclusive access to the planner.
    pub fn with<R>(&self, f: impl FnOnce(&mut Planner) -> R) -> R {
        let mut planner = self.lock();
        f(&mut planner)
    }

    /// Starts a background thread that drains due alerts into `sink` every
    /// `interval` until the returned handle is stopped or dropped.
    pub fn spawn_alarm_poller(
        &self,
        interval: Duration,
        mut sink: impl FnMut(Alert) + Send + 'static,
    ) -> Result<AlarmPoller, PlannerError> {
        let stop = Arc::new(AtomicBool::new(false));
        let planner = self.clone();
        let stop_flag = stop.clone();
        let handle = thread::Builder::new()
            .name("timeboard-alarm".to_string())
            .spawn(move || {
                while !stop_flag.load(Ordering::Acquire) {
                    let due = planner.with(Planner::drain_due_alerts);
                    for alert in due {
                        sink(alert);
                    }
                    thread::park_timeout(interval);
                }
            })
            .map_err(PlannerError::PollerSpawn)?;
        info!(
            "event=alarm_poller module=planner status=started interval_ms={}",
            interval.as_millis()
        );
        Ok(AlarmPoller {
            stop,
            handle: Some(handle),
        })
    }
}

/// Handle to a running alarm poll loop.
#[derive(Debug)]
pub struct AlarmPoller {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl AlarmPoller {
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signals the loop to exit and waits for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        let Some(handle) = self.handle.take() else {
            return;
        };
        handle.thread().unpark();
        if handle.join().is_err() {
            warn!("event=alarm_poller module=planner status=error reason=sink_panicked");
        } else {
            info!("event=alarm_poller module=planner status=stopped");
        }
    }
}

impl Drop for AlarmPoller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
