//! Calendar shared by every user, with per-event visibility.
//!
//! # Responsibility
//! - Track which users may see each event of a shared calendar.
//! - Hand out per-user filtered views.
//!
//! # Invariants
//! - Every event in the calendar has at least one user with access.
//! - Revoking the last user deletes the event (with the usual cascade).

use crate::model::event::{Event, EventId, TimeStatus};
use crate::model::note::NoteKind;
use crate::service::calendar::{Calendar, CalendarError, TimeFilter};
use crate::service::view::CalendarView;
use chrono::{NaiveDate, NaiveDateTime};
use log::info;
use std::collections::{BTreeSet, HashMap};

/// Shared calendar plus an event → users access list.
#[derive(Debug)]
pub struct CommonCalendar {
    calendar: Calendar,
    access: HashMap<EventId, BTreeSet<String>>,
}

impl CommonCalendar {
    /// Shares `calendar`; events it already holds are visible to `owner`.
    pub fn new(mut calendar: Calendar, owner: &str) -> Self {
        let access = calendar
            .events(TimeFilter::All)
            .into_iter()
            .map(|event| (event.id(), BTreeSet::from([owner.to_string()])))
            .collect();
        Self { calendar, access }
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    /// Adds an event visible to `owner`.
    pub fn add_event(&mut self, event: Event, owner: &str) -> Result<EventId, CalendarError> {
        let id = self.calendar.add_event(event)?;
        self.access
            .entry(id)
            .or_default()
            .insert(owner.to_string());
        Ok(id)
    }

    pub fn create_event(
        &mut self,
        name: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
        owner: &str,
    ) -> Result<EventId, CalendarError> {
        let event = Event::new(name, start, end)?;
        self.add_event(event, owner)
    }

    /// Lets `user` see an existing event. Idempotent.
    pub fn grant_access(&mut self, event_name: &str, user: &str) -> Result<(), CalendarError> {
        let id = self.id_of(event_name)?;
        self.access.entry(id).or_default().insert(user.to_string());
        Ok(())
    }

    /// Hides an event from `user`; returns `true` when this removed the
    /// event from the calendar because nobody can see it any more.
    pub fn revoke_access(&mut self, event_name: &str, user: &str) -> Result<bool, CalendarError> {
        let id = self.id_of(event_name)?;
        let Some(users) = self.access.get_mut(&id) else {
            return Ok(false);
        };
        users.remove(user);
        if !users.is_empty() {
            return Ok(false);
        }
        self.access.remove(&id);
        self.calendar.delete_event(event_name)?;
        info!(
            "event=event_delete module=common_calendar status=ok reason=no_users name={}",
            event_name
        );
        Ok(true)
    }

    pub fn tag_event(&mut self, event_name: &str, tag: &str) -> Result<bool, CalendarError> {
        self.calendar.tag_event(event_name, tag)
    }

    pub fn memo_event(&mut self, event_name: &str, memo: &str) -> Result<bool, CalendarError> {
        self.calendar.memo_event(event_name, memo)
    }

    pub fn has_access(&self, event_name: &str, user: &str) -> bool {
        self.calendar
            .event(event_name)
            .and_then(|event| self.access.get(&event.id()))
            .is_some_and(|users| users.contains(user))
    }

    /// Users that can see the event, sorted.
    pub fn users_of(&self, event_name: &str) -> Vec<String> {
        self.calendar
            .event(event_name)
            .and_then(|event| self.access.get(&event.id()))
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Narrows the calendar to what `user` may see.
    pub fn view_for(&mut self, user: impl Into<String>) -> SharedCalendarView<'_> {
        SharedCalendarView {
            calendar: &mut self.calendar,
            access: &self.access,
            user: user.into(),
        }
    }

    fn id_of(&self, event_name: &str) -> Result<EventId, CalendarError> {
        self.calendar
            .event(event_name)
            .map(Event::id)
            .ok_or_else(|| CalendarError::EventNotFound(event_name.to_string()))
    }
}

/// One user's filtered view of a [`CommonCalendar`].
pub struct SharedCalendarView<'a> {
    calendar: &'a mut Calendar,
    access: &'a HashMap<EventId, BTreeSet<String>>,
    user: String,
}

impl SharedCalendarView<'_> {
    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    fn sees(&self, id: EventId) -> bool {
        self.access
            .get(&id)
            .is_some_and(|users| users.contains(&self.user))
    }

    /// Notes of `kind` attached to at least one visible event.
    fn visible_notes(&self, kind: NoteKind) -> Vec<String> {
        let index = self.calendar.index(kind);
        index
            .all_notes()
            .iter()
            .filter(|note| index.events_of(note).iter().any(|id| self.sees(*id)))
            .map(|note| note.value().to_string())
            .collect()
    }
}

impl CalendarView for SharedCalendarView<'_> {
    fn name(&self) -> &str {
        self.calendar.name()
    }

    fn events(&mut self, filter: TimeFilter) -> Vec<&Event> {
        let access = self.access;
        let user = self.user.as_str();
        let mut events = self.calendar.events(filter);
        events.retain(|event| {
            access
                .get(&event.id())
                .is_some_and(|users| users.contains(user))
        });
        events
    }

    fn event(&self, name: &str) -> Option<&Event> {
        self.calendar
            .event(name)
            .filter(|event| self.sees(event.id()))
    }

    fn search_by_name(&mut self, name: &str) -> Vec<&Event> {
        let mut events = self.events(TimeFilter::All);
        events.retain(|event| event.name() == name);
        events
    }

    fn search_by_date(&mut self, date: NaiveDate) -> Vec<&Event> {
        let mut events = self.events(TimeFilter::All);
        events.retain(|event| event.start().date() == date);
        events
    }

    fn search_by_tag(&mut self, tag: &str) -> Vec<&Event> {
        let access = self.access;
        let user = self.user.as_str();
        let mut events = self.calendar.search_by_tag(tag);
        events.retain(|event| {
            access
                .get(&event.id())
                .is_some_and(|users| users.contains(user))
        });
        events
    }

    fn search_by_series_name(&mut self, series_name: &str) -> Option<Vec<&Event>> {
        let access = self.access;
        let user = self.user.as_str();
        let mut events = self.calendar.search_by_series_name(series_name)?;
        events.retain(|event| {
            access
                .get(&event.id())
                .is_some_and(|users| users.contains(user))
        });
        Some(events)
    }

    fn all_tags(&self) -> Vec<String> {
        self.visible_notes(NoteKind::Tag)
    }

    fn all_memos(&self) -> Vec<String> {
        self.visible_notes(NoteKind::Memo)
    }

    fn status_of(&mut self, name: &str) -> Option<TimeStatus> {
        let visible = self.event(name).is_some();
        if !visible {
            return None;
        }
        self.calendar.status_of(name)
    }
}
