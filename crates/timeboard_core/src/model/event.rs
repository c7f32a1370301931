//! Event domain model.
//!
//! # Responsibility
//! - Define the calendar event record and its temporal classification.
//! - Own the per-event tag/memo lists and the per-event alert manager.
//!
//! # Invariants
//! - `start < end` for every constructed or deserialized event.
//! - Names are non-blank.
//! - Equality and ordering use `(start, name)` only.
//! - Identity/time setters are crate-private so only the calendar store can
//!   mutate them and re-bucket the event in the same step.

use crate::model::note::{Note, NoteKind};
use crate::service::alert_manager::AlertManager;
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use uuid::Uuid;

/// Stable identifier for one event, independent of its (mutable) name.
pub type EventId = Uuid;

const DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Position of an event relative to one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeStatus {
    /// The instant is at or after `end`.
    Past,
    /// `start <= instant < end`.
    Ongoing,
    /// The instant is before `start`.
    Future,
}

impl TimeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Past => "past",
            Self::Ongoing => "ongoing",
            Self::Future => "future",
        }
    }
}

/// Validation failures for event construction and edits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValidationError {
    /// Name is empty after trimming.
    BlankName,
    /// `end` is not strictly after `start`.
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl Display for EventValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankName => write!(f, "event name must not be blank"),
            Self::InvalidWindow { start, end } => {
                write!(f, "event end ({end}) must be after event start ({start})")
            }
        }
    }
}

impl Error for EventValidationError {}

/// Ordering key used by the calendar partitions.
///
/// `at` is the start instant for past/future partitions and the end instant
/// for the ongoing partition. `id` only breaks ties between same-named
/// events of a merged calendar.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    pub at: NaiveDateTime,
    pub name: String,
    pub id: EventId,
}

impl EventKey {
    pub fn by_start(event: &Event) -> Self {
        Self {
            at: event.start,
            name: event.name.clone(),
            id: event.id,
        }
    }

    pub fn by_end(event: &Event) -> Self {
        Self {
            at: event.end,
            name: event.name.clone(),
            id: event.id,
        }
    }
}

/// Calendar event with a validated time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EventRecord")]
pub struct Event {
    id: EventId,
    name: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    tags: Vec<Note>,
    memos: Vec<Note>,
    alerts: AlertManager,
}

/// Unvalidated wire shape; converted through [`Event::try_from`].
#[derive(Deserialize)]
struct EventRecord {
    id: EventId,
    name: String,
    start: NaiveDateTime,
    end: NaiveDateTime,
    #[serde(default)]
    tags: Vec<Note>,
    #[serde(default)]
    memos: Vec<Note>,
    #[serde(default)]
    alerts: AlertManager,
}

impl TryFrom<EventRecord> for Event {
    type Error = EventValidationError;

    fn try_from(record: EventRecord) -> Result<Self, Self::Error> {
        let mut event = Self::with_id(record.id, record.name, record.start, record.end)?;
        for tag in record.tags {
            event.add_note(tag);
        }
        for memo in record.memos {
            event.add_note(memo);
        }
        event.alerts = record.alerts;
        Ok(event)
    }
}

impl Event {
    /// Creates an event with a freshly generated id.
    ///
    /// # Errors
    /// - `BlankName` when `name` trims to empty.
    /// - `InvalidWindow` when `end <= start`.
    pub fn new(
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, EventValidationError> {
        Self::with_id(Uuid::new_v4(), name, start, end)
    }

    /// Creates an event with a caller-provided id (restore/merge paths).
    pub fn with_id(
        id: EventId,
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Self, EventValidationError> {
        let name = name.into();
        validate_name(&name)?;
        validate_window(start, end)?;
        Ok(Self {
            id,
            name,
            start,
            end,
            tags: Vec::new(),
            memos: Vec::new(),
            alerts: AlertManager::new(),
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn duration(&self) -> TimeDelta {
        self.end - self.start
    }

    /// Tags in insertion order.
    pub fn tags(&self) -> &[Note] {
        &self.tags
    }

    /// Memos in insertion order.
    pub fn memos(&self) -> &[Note] {
        &self.memos
    }

    pub fn notes(&self, kind: NoteKind) -> &[Note] {
        match kind {
            NoteKind::Tag => &self.tags,
            NoteKind::Memo => &self.memos,
        }
    }

    pub fn has_note(&self, note: &Note) -> bool {
        self.notes(note.kind()).contains(note)
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    /// Classifies this event relative to `at`.
    pub fn classify(&self, at: NaiveDateTime) -> TimeStatus {
        if at < self.start {
            TimeStatus::Future
        } else if at < self.end {
            TimeStatus::Ongoing
        } else {
            TimeStatus::Past
        }
    }

    /// Copy of this event under a newly generated id.
    pub(crate) fn with_fresh_id(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            ..self.clone()
        }
    }

    pub(crate) fn alerts_mut(&mut self) -> &mut AlertManager {
        &mut self.alerts
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) -> Result<(), EventValidationError> {
        let name = name.into();
        validate_name(&name)?;
        self.name = name;
        Ok(())
    }

    pub(crate) fn set_window(
        &mut self,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<(), EventValidationError> {
        validate_window(start, end)?;
        self.start = start;
        self.end = end;
        Ok(())
    }

    /// Appends a note unless an equal one is already present.
    pub(crate) fn add_note(&mut self, note: Note) -> bool {
        let list = self.notes_mut(note.kind());
        if list.contains(&note) {
            return false;
        }
        list.push(note);
        true
    }

    pub(crate) fn remove_note(&mut self, note: &Note) -> bool {
        let list = self.notes_mut(note.kind());
        let before = list.len();
        list.retain(|existing| existing != note);
        before != list.len()
    }

    /// Swaps `old` for `new` in place; collapses into `new` if it is
    /// already present.
    pub(crate) fn replace_note(&mut self, old: &Note, new: Note) {
        if old == &new {
            return;
        }
        let list = self.notes_mut(old.kind());
        let already_present = list.contains(&new);
        match list.iter().position(|existing| existing == old) {
            Some(position) if !already_present => list[position] = new,
            Some(position) => {
                list.remove(position);
            }
            None => {
                self.add_note(new);
            }
        }
    }

    fn notes_mut(&mut self, kind: NoteKind) -> &mut Vec<Note> {
        match kind {
            NoteKind::Tag => &mut self.tags,
            NoteKind::Memo => &mut self.memos,
        }
    }
}

/// Checks the `start < end` window invariant.
pub fn validate_window(
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Result<(), EventValidationError> {
    if end <= start {
        return Err(EventValidationError::InvalidWindow { start, end });
    }
    Ok(())
}

/// Checks that an event name is not blank.
pub fn validate_name(name: &str) -> Result<(), EventValidationError> {
    if name.trim().is_empty() {
        return Err(EventValidationError::BlankName);
    }
    Ok(())
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.start == other.start && self.name == other.name
    }
}

impl Eq for Event {}

impl Hash for Event {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.start.hash(state);
        self.name.hash(state);
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        self.start
            .cmp(&other.start)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} - {})",
            self.name,
            self.start.format(DISPLAY_FORMAT),
            self.end.format(DISPLAY_FORMAT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{Event, TimeStatus};
    use crate::model::note::Note;
    use chrono::NaiveDateTime;

    fn at(value: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
    }

    #[test]
    fn classify_uses_half_open_window() {
        let event = Event::new("A", at("2020-03-07T12:00"), at("2020-03-08T12:00")).unwrap();
        assert_eq!(event.classify(at("2020-03-07T11:59")), TimeStatus::Future);
        assert_eq!(event.classify(at("2020-03-07T12:00")), TimeStatus::Ongoing);
        assert_eq!(event.classify(at("2020-03-08T11:59")), TimeStatus::Ongoing);
        assert_eq!(event.classify(at("2020-03-08T12:00")), TimeStatus::Past);
    }

    #[test]
    fn add_note_suppresses_duplicates_and_keeps_order() {
        let mut event = Event::new("A", at("2020-03-07T12:00"), at("2020-03-08T12:00")).unwrap();
        assert!(event.add_note(Note::tag("b")));
        assert!(event.add_note(Note::tag("a")));
        assert!(!event.add_note(Note::tag("b")));
        assert!(event.add_note(Note::memo("b")));

        let tags: Vec<_> = event.tags().iter().map(Note::value).collect();
        assert_eq!(tags, vec!["b", "a"]);
        assert_eq!(event.memos().len(), 1);
    }

    #[test]
    fn set_window_keeps_old_values_on_rejection() {
        let mut event = Event::new("A", at("2020-03-07T12:00"), at("2020-03-08T12:00")).unwrap();
        assert!(event
            .set_window(at("2020-03-09T00:00"), at("2020-03-09T00:00"))
            .is_err());
        assert_eq!(event.start(), at("2020-03-07T12:00"));
        assert_eq!(event.end(), at("2020-03-08T12:00"));
    }

    #[test]
    fn display_uses_minute_precision() {
        let event = Event::new("Standup", at("2020-03-07T09:00"), at("2020-03-07T09:15")).unwrap();
        assert_eq!(event.to_string(), "Standup (2020-03-07 09:00 - 2020-03-07 09:15)");
    }
}
