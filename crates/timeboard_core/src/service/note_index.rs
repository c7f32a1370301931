//! Bidirectional note ↔ event index used for tags and memos.
//!
//! # Responsibility
//! - Map each note to the ordered set of events referencing it.
//! - Keep an insertion-ordered enumeration of distinct notes.
//! - Support cascading rename and delete, returning the affected events so
//!   the caller can update each event's own note list.
//!
//! # Invariants
//! - A note is enumerated iff it has at least one associated event.
//! - Association lists never contain the same event twice.
//! - Every key has the index's `NoteKind`.

use crate::model::event::EventId;
use crate::model::note::{Note, NoteKind};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One note with its associated events, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEntry {
    pub note: Note,
    pub events: Vec<EventId>,
}

/// Note index for one `NoteKind`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteIndex {
    kind: NoteKind,
    associations: HashMap<Note, Vec<EventId>>,
    order: Vec<Note>,
}

impl NoteIndex {
    pub fn new(kind: NoteKind) -> Self {
        Self {
            kind,
            associations: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Rebuilds an index from persisted entries.
    ///
    /// # Errors
    /// Returns a description of the first entry with the wrong kind, no
    /// events, or a note already seen.
    pub fn from_entries(kind: NoteKind, entries: Vec<NoteEntry>) -> Result<Self, String> {
        let mut index = Self::new(kind);
        for entry in entries {
            if entry.note.kind() != kind {
                return Err(format!(
                    "{} `{}` stored in {} index",
                    entry.note.kind().as_str(),
                    entry.note,
                    kind.as_str()
                ));
            }
            if entry.events.is_empty() {
                return Err(format!("{} `{}` has no events", kind.as_str(), entry.note));
            }
            if index.contains(&entry.note) {
                return Err(format!("{} `{}` listed twice", kind.as_str(), entry.note));
            }
            for event in entry.events {
                index.attach(entry.note.clone(), event);
            }
        }
        Ok(index)
    }

    pub fn kind(&self) -> NoteKind {
        self.kind
    }

    /// Associates `event` with `note`, creating the note on first use.
    ///
    /// Returns `true` when a new association was recorded.
    pub fn attach(&mut self, note: Note, event: EventId) -> bool {
        if note.kind() != self.kind {
            warn!(
                "event=note_attach module=note_index status=skipped reason=kind_mismatch index={} note={}",
                self.kind.as_str(),
                note.kind().as_str()
            );
            return false;
        }
        if let Some(events) = self.associations.get_mut(&note) {
            if events.contains(&event) {
                return false;
            }
            events.push(event);
            return true;
        }
        self.order.push(note.clone());
        self.associations.insert(note, vec![event]);
        true
    }

    /// Removes one association; drops the note when none remain.
    pub fn detach(&mut self, event: EventId, note: &Note) -> bool {
        let Some(events) = self.associations.get_mut(note) else {
            return false;
        };
        let before = events.len();
        events.retain(|existing| *existing != event);
        let removed = before != events.len();
        if events.is_empty() {
            self.forget(note);
        }
        removed
    }

    /// Removes `event` from every note; returns the notes it was attached to.
    pub fn detach_event(&mut self, event: EventId) -> Vec<Note> {
        let affected: Vec<Note> = self
            .order
            .iter()
            .filter(|note| {
                self.associations
                    .get(*note)
                    .is_some_and(|events| events.contains(&event))
            })
            .cloned()
            .collect();
        for note in &affected {
            self.detach(event, note);
        }
        affected
    }

    /// Moves one event from `note` to `new_note`.
    pub fn rename_for_one(&mut self, note: &Note, new_note: Note, event: EventId) -> bool {
        if !self.detach(event, note) {
            return false;
        }
        self.attach(new_note, event);
        true
    }

    /// Re-keys every association of `note` onto `new_note`.
    ///
    /// Associations merge into an existing `new_note`. Returns the events
    /// that were associated with `note` (empty when `note` is unknown).
    pub fn rename_all(&mut self, note: &Note, new_note: Note) -> Vec<EventId> {
        if note == &new_note {
            return self.events_of(note).to_vec();
        }
        let events = self.delete_all(note);
        for event in &events {
            self.attach(new_note.clone(), *event);
        }
        events
    }

    /// Removes `note` entirely and returns its former associations.
    pub fn delete_all(&mut self, note: &Note) -> Vec<EventId> {
        let events = self.associations.remove(note).unwrap_or_default();
        self.order.retain(|existing| existing != note);
        events
    }

    /// Events associated with `note`, in association order.
    pub fn events_of(&self, note: &Note) -> &[EventId] {
        self.associations
            .get(note)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Looks up the indexed note with the given text.
    pub fn find(&self, value: &str) -> Option<&Note> {
        self.order.iter().find(|note| note.value() == value)
    }

    pub fn contains(&self, note: &Note) -> bool {
        self.associations.contains_key(note)
    }

    /// Distinct notes in first-attach order.
    pub fn all_notes(&self) -> &[Note] {
        &self.order
    }

    /// Text of every note in enumeration order.
    pub fn values(&self) -> Vec<String> {
        self.order.iter().map(|note| note.value().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in enumeration order, for persistence and merging.
    pub fn entries(&self) -> Vec<NoteEntry> {
        self.order
            .iter()
            .map(|note| NoteEntry {
                note: note.clone(),
                events: self.events_of(note).to_vec(),
            })
            .collect()
    }

    /// Unions `other` into this index.
    ///
    /// Notes new to this index are appended after the existing ones, so
    /// merging sources in order yields lowest-source-first enumeration.
    /// `remap` translates each event id; `None` drops the association.
    pub fn merge_from(&mut self, other: &NoteIndex, remap: impl Fn(EventId) -> Option<EventId>) {
        for note in &other.order {
            for event in other.events_of(note) {
                if let Some(mapped) = remap(*event) {
                    self.attach(note.clone(), mapped);
                }
            }
        }
    }

    fn forget(&mut self, note: &Note) {
        self.associations.remove(note);
        self.order.retain(|existing| existing != note);
    }
}

#[cfg(test)]
mod tests {
    use super::NoteIndex;
    use crate::model::note::{Note, NoteKind};
    use uuid::Uuid;

    #[test]
    fn detach_event_clears_every_note() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let mut index = NoteIndex::new(NoteKind::Tag);
        index.attach(Note::tag("x"), a);
        index.attach(Note::tag("y"), a);
        index.attach(Note::tag("y"), b);

        let affected = index.detach_event(a);
        assert_eq!(affected, vec![Note::tag("x"), Note::tag("y")]);
        assert_eq!(index.values(), vec!["y".to_string()]);
        assert_eq!(index.events_of(&Note::tag("y")), &[b]);
    }

    #[test]
    fn attach_rejects_other_kind() {
        let mut index = NoteIndex::new(NoteKind::Memo);
        assert!(!index.attach(Note::tag("x"), Uuid::new_v4()));
        assert!(index.is_empty());
    }

    #[test]
    fn rename_all_to_same_note_is_noop() {
        let a = Uuid::new_v4();
        let mut index = NoteIndex::new(NoteKind::Tag);
        index.attach(Note::tag("x"), a);
        assert_eq!(index.rename_all(&Note::tag("x"), Note::tag("x")), vec![a]);
        assert_eq!(index.events_of(&Note::tag("x")), &[a]);
    }
}
