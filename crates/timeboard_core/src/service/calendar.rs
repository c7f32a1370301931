//! Time-partitioned calendar store.
//!
//! # Responsibility
//! - Own every event of one calendar and keep it bucketed into past,
//!   ongoing and future relative to the shared virtual clock.
//! - Keep event-local tag/memo lists, the tag/memo indexes and series
//!   membership in sync across edits and deletes.
//! - Route alert scheduling to each event's alert manager.
//!
//! # Invariants
//! - After `reclassify`, every event id sits in exactly one partition and
//!   that partition matches `Event::classify(now)`.
//! - `past`/`future` are keyed by `(start, name, id)`, `ongoing` by
//!   `(end, name, id)`.
//! - Event names are unique; `by_name` and `events` hold the same ids.
//! - No index or series references an id missing from `events`.
//!
//! # See also
//! - `service::view` for the read-only merged and shared views.

use crate::clock::VirtualClock;
use crate::model::alert::Alert;
use crate::model::event::{
    validate_name, validate_window, Event, EventId, EventKey, EventValidationError, TimeStatus,
};
use crate::model::note::{Note, NoteKind};
use crate::model::series::EventSeries;
use crate::service::alert_manager::{AlertError, AlertManager};
use crate::service::note_index::{NoteEntry, NoteIndex};
use crate::service::view::MergedCalendar;
use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Errors for calendar store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarError {
    EventNotFound(String),
    DuplicateEventName(String),
    /// The note is not attached where the operation expected it.
    NoteNotFound(Note),
    /// Blank tag or memo text.
    BlankNote(NoteKind),
    SeriesNotFound(String),
    DuplicateSeriesName(String),
    /// Generated series instants fall outside the representable range.
    SeriesOutOfRange(String),
    InvalidEvent(EventValidationError),
    Alert(AlertError),
    /// Restored state violates a store invariant.
    InvalidSnapshot(String),
}

impl Display for CalendarError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EventNotFound(name) => write!(f, "event not found: {name}"),
            Self::DuplicateEventName(name) => write!(f, "event name already in use: {name}"),
            Self::NoteNotFound(note) => {
                write!(f, "{} not found: `{}`", note.kind().as_str(), note)
            }
            Self::BlankNote(kind) => write!(f, "{} must not be blank", kind.as_str()),
            Self::SeriesNotFound(name) => write!(f, "series not found: {name}"),
            Self::DuplicateSeriesName(name) => write!(f, "series name already in use: {name}"),
            Self::SeriesOutOfRange(name) => {
                write!(f, "series `{name}` extends past the supported date range")
            }
            Self::InvalidEvent(err) => write!(f, "{err}"),
            Self::Alert(err) => write!(f, "{err}"),
            Self::InvalidSnapshot(message) => write!(f, "invalid calendar snapshot: {message}"),
        }
    }
}

impl Error for CalendarError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidEvent(err) => Some(err),
            Self::Alert(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EventValidationError> for CalendarError {
    fn from(value: EventValidationError) -> Self {
        Self::InvalidEvent(value)
    }
}

impl From<AlertError> for CalendarError {
    fn from(value: AlertError) -> Self {
        Self::Alert(value)
    }
}

/// Bucket selector for [`Calendar::events`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    /// Past, then ongoing, then future.
    All,
    Past,
    Ongoing,
    Future,
}

/// Alert that fired during [`Calendar::ring_due_alerts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueAlert {
    pub event_name: String,
    pub alert: Alert,
}

/// Persistable calendar state. Partitions are derived and not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    pub name: String,
    pub events: Vec<Event>,
    #[serde(default)]
    pub series: Vec<EventSeries>,
    #[serde(default)]
    pub tags: Vec<NoteEntry>,
    #[serde(default)]
    pub memos: Vec<NoteEntry>,
}

type Partition = BTreeMap<EventKey, EventId>;

/// One user calendar.
#[derive(Debug)]
pub struct Calendar {
    name: String,
    clock: Arc<VirtualClock>,
    events: HashMap<EventId, Event>,
    by_name: HashMap<String, EventId>,
    past: Partition,
    ongoing: Partition,
    future: Partition,
    /// Clock reading of the last reclassification; a smaller reading means
    /// the clock jumped backward and the partitions must be rebuilt.
    synced_at: Option<NaiveDateTime>,
    series: Vec<EventSeries>,
    tags: NoteIndex,
    memos: NoteIndex,
}

impl Calendar {
    pub fn new(name: impl Into<String>, clock: Arc<VirtualClock>) -> Self {
        Self {
            name: name.into(),
            clock,
            events: HashMap::new(),
            by_name: HashMap::new(),
            past: Partition::new(),
            ongoing: Partition::new(),
            future: Partition::new(),
            synced_at: None,
            series: Vec::new(),
            tags: NoteIndex::new(NoteKind::Tag),
            memos: NoteIndex::new(NoteKind::Memo),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn clock(&self) -> &Arc<VirtualClock> {
        &self.clock
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Moves events whose bucket changed since the last read.
    ///
    /// Drains the minimum of `future` while it is no longer future, then
    /// the minimum of `ongoing` while it is no longer ongoing. A backward
    /// clock jump rebuilds every partition instead.
    pub fn reclassify(&mut self) {
        let now = self.clock.now();
        if self.synced_at.is_some_and(|last| now < last) {
            self.rebuild_partitions(now);
        } else {
            self.drain(TimeStatus::Future, now);
            self.drain(TimeStatus::Ongoing, now);
        }
        self.synced_at = Some(now);
    }

    /// Adds an event and indexes the notes it already carries.
    ///
    /// # Errors
    /// - `DuplicateEventName` when the name (or id) is already stored.
    pub fn add_event(&mut self, event: Event) -> Result<EventId, CalendarError> {
        let id = self.insert_event(event)?;
        if let Some(event) = self.events.get(&id) {
            let notes: Vec<Note> = event.tags().iter().chain(event.memos()).cloned().collect();
            for note in notes {
                self.index_mut(note.kind()).attach(note, id);
            }
        }
        Ok(id)
    }

    /// Validates and adds a new event; returns its id.
    pub fn create_event(
        &mut self,
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<EventId, CalendarError> {
        let event = Event::new(name, start, end)?;
        self.add_event(event)
    }

    /// Lists events of one bucket (or all) in `(start, name)` order.
    pub fn events(&mut self, filter: TimeFilter) -> Vec<&Event> {
        self.reclassify();
        match filter {
            TimeFilter::All => {
                let mut all = self.bucket(TimeStatus::Past);
                all.extend(self.bucket(TimeStatus::Ongoing));
                all.extend(self.bucket(TimeStatus::Future));
                all
            }
            TimeFilter::Past => self.bucket(TimeStatus::Past),
            TimeFilter::Ongoing => self.bucket(TimeStatus::Ongoing),
            TimeFilter::Future => self.bucket(TimeStatus::Future),
        }
    }

    pub fn event(&self, name: &str) -> Option<&Event> {
        self.by_name.get(name).and_then(|id| self.events.get(id))
    }

    pub fn event_by_id(&self, id: EventId) -> Option<&Event> {
        self.events.get(&id)
    }

    pub fn contains_event(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Returns the bucket currently holding `name`, after reclassifying.
    pub fn status_of(&mut self, name: &str) -> Option<TimeStatus> {
        self.reclassify();
        let id = *self.by_name.get(name)?;
        self.partition_of(id)
    }

    /// Deletes an event and cascades to both indexes and every series.
    pub fn delete_event(&mut self, name: &str) -> Result<Event, CalendarError> {
        let id = self.id_of(name)?;
        self.unplace(id);
        self.by_name.remove(name);
        self.tags.detach_event(id);
        self.memos.detach_event(id);
        for series in &mut self.series {
            series.remove(id);
        }
        let event = self
            .events
            .remove(&id)
            .ok_or_else(|| CalendarError::EventNotFound(name.to_string()))?;
        info!(
            "event=event_delete module=calendar status=ok calendar={} name={}",
            self.name, name
        );
        Ok(event)
    }

    /// Renames an event and re-keys its partition entry.
    pub fn rename_event(&mut self, name: &str, new_name: &str) -> Result<(), CalendarError> {
        let id = self.id_of(name)?;
        if name == new_name {
            return Ok(());
        }
        validate_name(new_name)?;
        if self.by_name.contains_key(new_name) {
            return Err(CalendarError::DuplicateEventName(new_name.to_string()));
        }
        let event = self.event_mut(id)?;
        let old_keys = (EventKey::by_start(event), EventKey::by_end(event));
        event.set_name(new_name)?;
        self.by_name.remove(name);
        self.by_name.insert(new_name.to_string(), id);
        self.replace_keys(id, old_keys);
        Ok(())
    }

    /// Moves an event to a new window and re-buckets it.
    pub fn reschedule_event(
        &mut self,
        name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(), CalendarError> {
        let id = self.id_of(name)?;
        validate_window(start, end)?;
        let event = self.event_mut(id)?;
        let old_keys = (EventKey::by_start(event), EventKey::by_end(event));
        event.set_window(start, end)?;
        self.replace_keys(id, old_keys);
        Ok(())
    }

    /// Attaches a note to an event and the matching index.
    ///
    /// Returns `false` when the event already carried the note.
    pub fn attach_note(&mut self, event_name: &str, note: Note) -> Result<bool, CalendarError> {
        if note.is_blank() {
            return Err(CalendarError::BlankNote(note.kind()));
        }
        let id = self.id_of(event_name)?;
        let added = self.event_mut(id)?.add_note(note.clone());
        self.index_mut(note.kind()).attach(note, id);
        Ok(added)
    }

    /// Removes a note from one event; drops it from the index when it was
    /// the last association.
    pub fn detach_note(&mut self, event_name: &str, note: &Note) -> Result<(), CalendarError> {
        let id = self.id_of(event_name)?;
        if !self.event_mut(id)?.remove_note(note) {
            return Err(CalendarError::NoteNotFound(note.clone()));
        }
        self.index_mut(note.kind()).detach(id, note);
        Ok(())
    }

    /// Renames a note on a single event.
    pub fn rename_note_for_event(
        &mut self,
        event_name: &str,
        note: &Note,
        new_value: &str,
    ) -> Result<(), CalendarError> {
        let new_note = Note::new(note.kind(), new_value);
        if new_note.is_blank() {
            return Err(CalendarError::BlankNote(note.kind()));
        }
        let id = self.id_of(event_name)?;
        let event = self.event_mut(id)?;
        if !event.has_note(note) {
            return Err(CalendarError::NoteNotFound(note.clone()));
        }
        event.replace_note(note, new_note.clone());
        self.index_mut(note.kind()).rename_for_one(note, new_note, id);
        Ok(())
    }

    /// Renames a note on every event carrying it; returns how many events
    /// changed.
    pub fn rename_note_everywhere(
        &mut self,
        note: &Note,
        new_value: &str,
    ) -> Result<usize, CalendarError> {
        let new_note = Note::new(note.kind(), new_value);
        if new_note.is_blank() {
            return Err(CalendarError::BlankNote(note.kind()));
        }
        if !self.index(note.kind()).contains(note) {
            return Err(CalendarError::NoteNotFound(note.clone()));
        }
        let affected = self.index_mut(note.kind()).rename_all(note, new_note.clone());
        for id in &affected {
            if let Some(event) = self.events.get_mut(id) {
                event.replace_note(note, new_note.clone());
            }
        }
        Ok(affected.len())
    }

    /// Removes a note from every event; returns how many events changed.
    pub fn delete_note_everywhere(&mut self, note: &Note) -> Result<usize, CalendarError> {
        if !self.index(note.kind()).contains(note) {
            return Err(CalendarError::NoteNotFound(note.clone()));
        }
        let affected = self.index_mut(note.kind()).delete_all(note);
        for id in &affected {
            if let Some(event) = self.events.get_mut(id) {
                event.remove_note(note);
            }
        }
        Ok(affected.len())
    }

    pub fn tag_event(&mut self, event_name: &str, tag: &str) -> Result<bool, CalendarError> {
        self.attach_note(event_name, Note::tag(tag))
    }

    pub fn memo_event(&mut self, event_name: &str, memo: &str) -> Result<bool, CalendarError> {
        self.attach_note(event_name, Note::memo(memo))
    }

    pub fn untag_event(&mut self, event_name: &str, tag: &str) -> Result<(), CalendarError> {
        self.detach_note(event_name, &Note::tag(tag))
    }

    pub fn remove_memo(&mut self, event_name: &str, memo: &str) -> Result<(), CalendarError> {
        self.detach_note(event_name, &Note::memo(memo))
    }

    pub fn rename_tag_for_event(
        &mut self,
        event_name: &str,
        tag: &str,
        new_tag: &str,
    ) -> Result<(), CalendarError> {
        self.rename_note_for_event(event_name, &Note::tag(tag), new_tag)
    }

    pub fn rename_memo_for_event(
        &mut self,
        event_name: &str,
        memo: &str,
        new_memo: &str,
    ) -> Result<(), CalendarError> {
        self.rename_note_for_event(event_name, &Note::memo(memo), new_memo)
    }

    pub fn rename_tag_everywhere(&mut self, tag: &str, new_tag: &str) -> Result<usize, CalendarError> {
        self.rename_note_everywhere(&Note::tag(tag), new_tag)
    }

    pub fn rename_memo_everywhere(
        &mut self,
        memo: &str,
        new_memo: &str,
    ) -> Result<usize, CalendarError> {
        self.rename_note_everywhere(&Note::memo(memo), new_memo)
    }

    pub fn delete_tag_everywhere(&mut self, tag: &str) -> Result<usize, CalendarError> {
        self.delete_note_everywhere(&Note::tag(tag))
    }

    pub fn delete_memo_everywhere(&mut self, memo: &str) -> Result<usize, CalendarError> {
        self.delete_note_everywhere(&Note::memo(memo))
    }

    /// Distinct tags in first-use order.
    pub fn all_tags(&self) -> Vec<String> {
        self.tags.values()
    }

    /// Distinct memos in first-use order.
    pub fn all_memos(&self) -> Vec<String> {
        self.memos.values()
    }

    /// Events carrying `memo`, in attach order; empty when unknown.
    pub fn events_with_memo(&mut self, memo: &str) -> Vec<&Event> {
        self.reclassify();
        self.indexed_events(&Note::memo(memo))
    }

    /// Every event named `name`, scanning past, ongoing and future.
    pub fn search_by_name(&mut self, name: &str) -> Vec<&Event> {
        let mut matches = self.events(TimeFilter::All);
        matches.retain(|event| event.name() == name);
        matches
    }

    /// Every event starting on `date`.
    pub fn search_by_date(&mut self, date: NaiveDate) -> Vec<&Event> {
        let mut matches = self.events(TimeFilter::All);
        matches.retain(|event| event.start().date() == date);
        matches
    }

    /// Events carrying `tag`, in attach order; empty when unknown.
    pub fn search_by_tag(&mut self, tag: &str) -> Vec<&Event> {
        self.reclassify();
        self.indexed_events(&Note::tag(tag))
    }

    /// Members of the named series in `(start, name)` order.
    ///
    /// `None` means no such series; `Some(vec![])` is an empty series.
    pub fn search_by_series_name(&mut self, series_name: &str) -> Option<Vec<&Event>> {
        self.reclassify();
        let series = self.find_series(series_name)?;
        let mut members: Vec<&Event> = series
            .members()
            .iter()
            .filter_map(|id| self.events.get(id))
            .collect();
        members.sort();
        Some(members)
    }

    /// Creates `count` events `"<event_name> 1"`, `"<event_name> 2"`, ...
    /// each shifted by `step`, and appends them to `series_name`.
    ///
    /// Either every event is created or none is.
    pub fn create_series(
        &mut self,
        series_name: &str,
        event_name: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
        step: TimeDelta,
        count: usize,
    ) -> Result<Vec<EventId>, CalendarError> {
        validate_name(event_name)?;
        validate_window(start, end)?;

        // Instants move linearly, so checking the last window covers them all.
        let last_shift = i32::try_from(count.saturating_sub(1))
            .ok()
            .and_then(|steps| step.checked_mul(steps));
        let in_range = last_shift.is_some_and(|shift| {
            start.checked_add_signed(shift).is_some() && end.checked_add_signed(shift).is_some()
        });
        if !in_range {
            return Err(CalendarError::SeriesOutOfRange(series_name.to_string()));
        }

        let mut pending = Vec::new();
        let mut window = Some((start, end));
        for index in 1..=count {
            let Some((next_start, next_end)) = window else {
                return Err(CalendarError::SeriesOutOfRange(series_name.to_string()));
            };
            let name = format!("{event_name} {index}");
            if self.by_name.contains_key(&name) {
                return Err(CalendarError::DuplicateEventName(name));
            }
            pending.push(Event::new(name, next_start, next_end)?);
            window = next_start
                .checked_add_signed(step)
                .zip(next_end.checked_add_signed(step));
        }

        let series_index = self.ensure_series(series_name);
        let mut ids = Vec::with_capacity(pending.len());
        for event in pending {
            let id = self.add_event(event)?;
            self.series[series_index].insert(id);
            ids.push(id);
        }
        Ok(ids)
    }

    /// Adds an existing event to a series, creating the series on demand.
    pub fn add_to_series(&mut self, event_name: &str, series_name: &str) -> Result<bool, CalendarError> {
        let id = self.id_of(event_name)?;
        let series_index = self.ensure_series(series_name);
        Ok(self.series[series_index].insert(id))
    }

    pub fn rename_series(&mut self, series_name: &str, new_name: &str) -> Result<(), CalendarError> {
        if series_name != new_name && self.find_series(new_name).is_some() {
            return Err(CalendarError::DuplicateSeriesName(new_name.to_string()));
        }
        let series = self
            .series
            .iter_mut()
            .find(|series| series.name() == series_name)
            .ok_or_else(|| CalendarError::SeriesNotFound(series_name.to_string()))?;
        series.rename(new_name);
        Ok(())
    }

    /// Deletes a series; its events stay in the calendar.
    pub fn delete_series(&mut self, series_name: &str) -> Result<EventSeries, CalendarError> {
        let position = self
            .series
            .iter()
            .position(|series| series.name() == series_name)
            .ok_or_else(|| CalendarError::SeriesNotFound(series_name.to_string()))?;
        Ok(self.series.remove(position))
    }

    pub fn series(&self) -> &[EventSeries] {
        &self.series
    }

    /// Schedules a one-off alert on an event.
    ///
    /// `Ok(None)` means the alert was rejected because `at` is not in the
    /// future, or an identical alert is already pending.
    pub fn schedule_alert(
        &mut self,
        event_name: &str,
        alert_name: &str,
        at: NaiveDateTime,
    ) -> Result<Option<Alert>, CalendarError> {
        let now = self.clock.now();
        let id = self.id_of(event_name)?;
        Ok(self.event_mut(id)?.alerts_mut().schedule_once(alert_name, at, now))
    }

    /// Expands a recurring alert on an event; returns the accepted instances.
    pub fn schedule_recurring_alert(
        &mut self,
        event_name: &str,
        alert_name: &str,
        from: NaiveDateTime,
        until: NaiveDateTime,
        interval: TimeDelta,
    ) -> Result<Vec<Alert>, CalendarError> {
        let now = self.clock.now();
        let id = self.id_of(event_name)?;
        let scheduled = self
            .event_mut(id)?
            .alerts_mut()
            .schedule_recurring(alert_name, from, until, interval, now)?;
        Ok(scheduled)
    }

    pub fn delete_alert(&mut self, event_name: &str, alert: &Alert) -> Result<(), CalendarError> {
        let id = self.id_of(event_name)?;
        if !self.event_mut(id)?.alerts_mut().cancel(alert) {
            return Err(AlertError::UnknownAlert(alert.clone()).into());
        }
        Ok(())
    }

    /// Replaces a pending alert; `Ok(None)` keeps the original when the new
    /// time is not in the future.
    pub fn reschedule_alert(
        &mut self,
        event_name: &str,
        alert: &Alert,
        new_name: &str,
        new_at: NaiveDateTime,
    ) -> Result<Option<Alert>, CalendarError> {
        let now = self.clock.now();
        let id = self.id_of(event_name)?;
        let rescheduled = self
            .event_mut(id)?
            .alerts_mut()
            .reschedule(alert, new_name, new_at, now)?;
        Ok(rescheduled)
    }

    /// Sweeps every event's alert manager at one clock reading.
    pub fn ring_due_alerts(&mut self) -> Vec<DueAlert> {
        let now = self.clock.now();
        let mut due: Vec<DueAlert> = self
            .events
            .values_mut()
            .flat_map(|event| {
                let event_name = event.name().to_string();
                event
                    .alerts_mut()
                    .sweep(now)
                    .into_iter()
                    .map(move |alert| DueAlert {
                        event_name: event_name.clone(),
                        alert,
                    })
            })
            .collect();
        due.sort_by(|a, b| a.alert.cmp(&b.alert).then_with(|| a.event_name.cmp(&b.event_name)));
        due
    }

    pub fn alerts_of(&self, event_name: &str) -> Result<&AlertManager, CalendarError> {
        self.event(event_name)
            .map(Event::alerts)
            .ok_or_else(|| CalendarError::EventNotFound(event_name.to_string()))
    }

    /// Pending alerts of every event, in trigger order.
    pub fn pending_alerts(&self) -> Vec<Alert> {
        let mut alerts: Vec<Alert> = self
            .events
            .values()
            .flat_map(|event| event.alerts().pending().cloned())
            .collect();
        alerts.sort();
        alerts
    }

    /// Captures events, series and both indexes in a serializable form.
    pub fn snapshot(&self) -> CalendarSnapshot {
        let mut events: Vec<Event> = self.events.values().cloned().collect();
        events.sort();
        CalendarSnapshot {
            name: self.name.clone(),
            events,
            series: self.series.clone(),
            tags: self.tags.entries(),
            memos: self.memos.entries(),
        }
    }

    /// Rebuilds a calendar from a snapshot, re-deriving the partitions.
    ///
    /// # Errors
    /// - `InvalidSnapshot` for duplicate names or ids, dangling ids in an
    ///   index or series, duplicate series names, or index entries that
    ///   disagree with an event's own note list.
    pub fn restore(snapshot: CalendarSnapshot, clock: Arc<VirtualClock>) -> Result<Self, CalendarError> {
        let mut calendar = Self::new(snapshot.name, clock);
        for event in snapshot.events {
            calendar
                .insert_event(event)
                .map_err(|err| CalendarError::InvalidSnapshot(err.to_string()))?;
        }

        calendar.tags = NoteIndex::from_entries(NoteKind::Tag, snapshot.tags)
            .map_err(CalendarError::InvalidSnapshot)?;
        calendar.memos = NoteIndex::from_entries(NoteKind::Memo, snapshot.memos)
            .map_err(CalendarError::InvalidSnapshot)?;
        calendar.check_indexes()?;

        let mut series_names = HashSet::new();
        for series in &snapshot.series {
            if !series_names.insert(series.name().to_string()) {
                return Err(CalendarError::InvalidSnapshot(format!(
                    "series `{}` listed twice",
                    series.name()
                )));
            }
            if let Some(missing) = series
                .members()
                .iter()
                .find(|id| !calendar.events.contains_key(*id))
            {
                return Err(CalendarError::InvalidSnapshot(format!(
                    "series `{}` references unknown event {missing}",
                    series.name()
                )));
            }
        }
        calendar.series = snapshot.series;
        debug!(
            "event=calendar_restore module=calendar status=ok calendar={} events={}",
            calendar.name,
            calendar.events.len()
        );
        Ok(calendar)
    }

    /// Builds an independent union of `calendars`.
    ///
    /// Events with the same `(start, name)` collapse into the first copy;
    /// on other name collisions the later calendar wins the name lookup.
    /// A copy whose id is already taken gets a fresh one.
    /// Series are concatenated and note indexes unioned, lowest input first.
    pub fn merge(
        name: impl Into<String>,
        clock: Arc<VirtualClock>,
        calendars: &[&Calendar],
    ) -> MergedCalendar {
        let mut merged = Self::new(name, clock);
        let mut by_key: HashMap<(NaiveDateTime, String), EventId> = HashMap::new();
        let mut sources = Vec::with_capacity(calendars.len());

        for source in calendars {
            sources.push(source.name.clone());
            let mut remap: HashMap<EventId, EventId> = HashMap::new();
            let mut ordered: Vec<&Event> = source.events.values().collect();
            ordered.sort();
            for event in ordered {
                let key = (event.start(), event.name().to_string());
                if let Some(existing) = by_key.get(&key) {
                    remap.insert(event.id(), *existing);
                    continue;
                }
                // Inputs restored from one snapshot share ids.
                let copy = if merged.events.contains_key(&event.id()) {
                    event.with_fresh_id()
                } else {
                    event.clone()
                };
                let id = copy.id();
                let status = copy.classify(merged.clock.now());
                merged.by_name.insert(copy.name().to_string(), id);
                merged.events.insert(id, copy);
                merged.place(id, status);
                by_key.insert(key, id);
                remap.insert(event.id(), id);
            }

            for series in &source.series {
                let mut copy = EventSeries::new(series.name());
                for member in series.members() {
                    if let Some(mapped) = remap.get(member) {
                        copy.insert(*mapped);
                    }
                }
                merged.series.push(copy);
            }
            merged.tags.merge_from(&source.tags, |id| remap.get(&id).copied());
            merged.memos.merge_from(&source.memos, |id| remap.get(&id).copied());
        }

        for entry in merged.tags.entries().into_iter().chain(merged.memos.entries()) {
            for id in entry.events {
                if let Some(event) = merged.events.get_mut(&id) {
                    event.add_note(entry.note.clone());
                }
            }
        }

        info!(
            "event=calendar_merge module=calendar status=ok name={} inputs={} events={}",
            merged.name,
            sources.len(),
            merged.events.len()
        );
        MergedCalendar::new(merged, sources)
    }

    pub(crate) fn index(&self, kind: NoteKind) -> &NoteIndex {
        match kind {
            NoteKind::Tag => &self.tags,
            NoteKind::Memo => &self.memos,
        }
    }

    fn index_mut(&mut self, kind: NoteKind) -> &mut NoteIndex {
        match kind {
            NoteKind::Tag => &mut self.tags,
            NoteKind::Memo => &mut self.memos,
        }
    }

    fn indexed_events(&self, note: &Note) -> Vec<&Event> {
        self.index(note.kind())
            .events_of(note)
            .iter()
            .filter_map(|id| self.events.get(id))
            .collect()
    }

    /// Stores an event in the name map and its partition without touching
    /// the note indexes.
    fn insert_event(&mut self, event: Event) -> Result<EventId, CalendarError> {
        let id = event.id();
        if self.by_name.contains_key(event.name()) || self.events.contains_key(&id) {
            return Err(CalendarError::DuplicateEventName(event.name().to_string()));
        }
        let status = event.classify(self.clock.now());
        info!(
            "event=event_add module=calendar status=ok calendar={} name={} bucket={}",
            self.name,
            event.name(),
            status.as_str()
        );
        self.by_name.insert(event.name().to_string(), id);
        self.events.insert(id, event);
        self.place(id, status);
        Ok(id)
    }

    fn check_indexes(&self) -> Result<(), CalendarError> {
        for index in [&self.tags, &self.memos] {
            for entry in index.entries() {
                for id in &entry.events {
                    let carries = self
                        .events
                        .get(id)
                        .is_some_and(|event| event.has_note(&entry.note));
                    if !carries {
                        return Err(CalendarError::InvalidSnapshot(format!(
                            "{} `{}` references event {id} that does not carry it",
                            entry.note.kind().as_str(),
                            entry.note
                        )));
                    }
                }
            }
        }
        for (id, event) in &self.events {
            for note in event.tags().iter().chain(event.memos()) {
                if !self.index(note.kind()).events_of(note).contains(id) {
                    return Err(CalendarError::InvalidSnapshot(format!(
                        "event `{}` carries unindexed {} `{}`",
                        event.name(),
                        note.kind().as_str(),
                        note
                    )));
                }
            }
        }
        Ok(())
    }

    fn id_of(&self, name: &str) -> Result<EventId, CalendarError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| CalendarError::EventNotFound(name.to_string()))
    }

    fn event_mut(&mut self, id: EventId) -> Result<&mut Event, CalendarError> {
        self.events
            .get_mut(&id)
            .ok_or_else(|| CalendarError::EventNotFound(id.to_string()))
    }

    fn find_series(&self, series_name: &str) -> Option<&EventSeries> {
        self.series.iter().find(|series| series.name() == series_name)
    }

    fn ensure_series(&mut self, series_name: &str) -> usize {
        match self
            .series
            .iter()
            .position(|series| series.name() == series_name)
        {
            Some(position) => position,
            None => {
                self.series.push(EventSeries::new(series_name));
                self.series.len() - 1
            }
        }
    }

    fn bucket(&self, status: TimeStatus) -> Vec<&Event> {
        let mut events: Vec<&Event> = self
            .partition(status)
            .values()
            .filter_map(|id| self.events.get(id))
            .collect();
        if status == TimeStatus::Ongoing {
            events.sort();
        }
        events
    }

    fn partition(&self, status: TimeStatus) -> &Partition {
        match status {
            TimeStatus::Past => &self.past,
            TimeStatus::Ongoing => &self.ongoing,
            TimeStatus::Future => &self.future,
        }
    }

    fn partition_mut(&mut self, status: TimeStatus) -> &mut Partition {
        match status {
            TimeStatus::Past => &mut self.past,
            TimeStatus::Ongoing => &mut self.ongoing,
            TimeStatus::Future => &mut self.future,
        }
    }

    fn partition_of(&self, id: EventId) -> Option<TimeStatus> {
        let event = self.events.get(&id)?;
        if self.ongoing.get(&EventKey::by_end(event)) == Some(&id) {
            return Some(TimeStatus::Ongoing);
        }
        let key = EventKey::by_start(event);
        if self.past.get(&key) == Some(&id) {
            Some(TimeStatus::Past)
        } else if self.future.get(&key) == Some(&id) {
            Some(TimeStatus::Future)
        } else {
            None
        }
    }

    fn place(&mut self, id: EventId, status: TimeStatus) {
        let Some(event) = self.events.get(&id) else {
            return;
        };
        let key = match status {
            TimeStatus::Ongoing => EventKey::by_end(event),
            TimeStatus::Past | TimeStatus::Future => EventKey::by_start(event),
        };
        self.partition_mut(status).insert(key, id);
    }

    fn unplace(&mut self, id: EventId) {
        let Some(event) = self.events.get(&id) else {
            return;
        };
        let keys = (EventKey::by_start(event), EventKey::by_end(event));
        self.remove_keys(id, &keys);
    }

    fn remove_keys(&mut self, id: EventId, (by_start, by_end): &(EventKey, EventKey)) {
        for partition in [&mut self.past, &mut self.future] {
            if partition.get(by_start) == Some(&id) {
                partition.remove(by_start);
            }
        }
        if self.ongoing.get(by_end) == Some(&id) {
            self.ongoing.remove(by_end);
        }
    }

    /// Drops the pre-edit keys of `id` and files it under its current ones.
    fn replace_keys(&mut self, id: EventId, old_keys: (EventKey, EventKey)) {
        self.remove_keys(id, &old_keys);
        let now = self.clock.now();
        if let Some(status) = self.events.get(&id).map(|event| event.classify(now)) {
            self.place(id, status);
        }
    }

    fn drain(&mut self, from: TimeStatus, now: NaiveDateTime) {
        loop {
            let Some(id) = self.partition(from).values().next().copied() else {
                return;
            };
            let status = self.events.get(&id).map(|event| event.classify(now));
            if status == Some(from) {
                return;
            }
            self.partition_mut(from).pop_first();
            if let Some(status) = status {
                self.place(id, status);
            }
        }
    }

    fn rebuild_partitions(&mut self, now: NaiveDateTime) {
        self.past.clear();
        self.ongoing.clear();
        self.future.clear();
        for (id, event) in &self.events {
            let (partition, key) = match event.classify(now) {
                TimeStatus::Past => (&mut self.past, EventKey::by_start(event)),
                TimeStatus::Ongoing => (&mut self.ongoing, EventKey::by_end(event)),
                TimeStatus::Future => (&mut self.future, EventKey::by_start(event)),
            };
            partition.insert(key, *id);
        }
        debug!(
            "event=calendar_rebuild module=calendar status=ok calendar={} events={}",
            self.name,
            self.events.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::{Calendar, TimeFilter};
    use crate::clock::{ManualRealTime, VirtualClock};
    use crate::model::event::TimeStatus;
    use chrono::NaiveDateTime;
    use std::sync::Arc;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
    }

    fn calendar_at(now: &str) -> (Calendar, Arc<VirtualClock>) {
        let clock = Arc::new(VirtualClock::new(ManualRealTime::new(at("2000-01-01T00:00"))));
        clock.jump_to(at(now));
        (Calendar::new("work", clock.clone()), clock)
    }

    #[test]
    fn backward_jump_rebuilds_partitions() {
        let (mut calendar, clock) = calendar_at("2020-03-10T00:00");
        calendar
            .create_event("A", at("2020-03-07T12:00"), at("2020-03-08T12:00"))
            .unwrap();
        assert_eq!(calendar.status_of("A"), Some(TimeStatus::Past));

        clock.jump_to(at("2020-03-01T00:00"));
        assert_eq!(calendar.status_of("A"), Some(TimeStatus::Future));
        assert_eq!(calendar.events(TimeFilter::Future).len(), 1);
    }

    #[test]
    fn rename_rekeys_the_partition_entry() {
        let (mut calendar, _clock) = calendar_at("2020-03-07T13:00");
        calendar
            .create_event("A", at("2020-03-07T12:00"), at("2020-03-08T12:00"))
            .unwrap();
        calendar.rename_event("A", "B").unwrap();

        assert!(calendar.event("A").is_none());
        assert_eq!(calendar.status_of("B"), Some(TimeStatus::Ongoing));
        let names: Vec<_> = calendar
            .events(TimeFilter::All)
            .iter()
            .map(|event| event.name().to_string())
            .collect();
        assert_eq!(names, vec!["B".to_string()]);
    }

    #[test]
    fn failed_series_creation_leaves_store_untouched() {
        let (mut calendar, _clock) = calendar_at("2020-01-01T00:00");
        calendar
            .create_event("gym 2", at("2020-02-01T10:00"), at("2020-02-01T11:00"))
            .unwrap();

        let result = calendar.create_series(
            "gym",
            "gym",
            at("2020-01-06T10:00"),
            at("2020-01-06T11:00"),
            chrono::TimeDelta::weeks(1),
            3,
        );
        assert!(result.is_err());
        assert_eq!(calendar.len(), 1);
        assert!(calendar.series().is_empty());
    }
}
