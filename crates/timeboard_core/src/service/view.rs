//! Read surfaces shared by plain, merged and per-user calendars.
//!
//! # Responsibility
//! - Define `CalendarView`, the query contract front-ends render from.
//! - Provide `MergedCalendar`, a union of several calendars that exposes
//!   no mutation API.
//!
//! # Invariants
//! - Every query reclassifies before reading, so listings always match the
//!   current clock.

use crate::model::event::{Event, TimeStatus};
use crate::service::calendar::{Calendar, CalendarSnapshot, TimeFilter};
use chrono::NaiveDate;

/// Query contract for calendar-like stores.
pub trait CalendarView {
    fn name(&self) -> &str;

    /// Events of one bucket (or all) in `(start, name)` order.
    fn events(&mut self, filter: TimeFilter) -> Vec<&Event>;

    fn event(&self, name: &str) -> Option<&Event>;

    fn search_by_name(&mut self, name: &str) -> Vec<&Event>;

    fn search_by_date(&mut self, date: NaiveDate) -> Vec<&Event>;

    fn search_by_tag(&mut self, tag: &str) -> Vec<&Event>;

    /// `None` when no series has that name.
    fn search_by_series_name(&mut self, series_name: &str) -> Option<Vec<&Event>>;

    fn all_tags(&self) -> Vec<String>;

    fn all_memos(&self) -> Vec<String>;

    /// Bucket of the named event, if visible.
    fn status_of(&mut self, name: &str) -> Option<TimeStatus>;
}

impl CalendarView for Calendar {
    fn name(&self) -> &str {
        Calendar::name(self)
    }

    fn events(&mut self, filter: TimeFilter) -> Vec<&Event> {
        Calendar::events(self, filter)
    }

    fn event(&self, name: &str) -> Option<&Event> {
        Calendar::event(self, name)
    }

    fn search_by_name(&mut self, name: &str) -> Vec<&Event> {
        Calendar::search_by_name(self, name)
    }

    fn search_by_date(&mut self, date: NaiveDate) -> Vec<&Event> {
        Calendar::search_by_date(self, date)
    }

    fn search_by_tag(&mut self, tag: &str) -> Vec<&Event> {
        Calendar::search_by_tag(self, tag)
    }

    fn search_by_series_name(&mut self, series_name: &str) -> Option<Vec<&Event>> {
        Calendar::search_by_series_name(self, series_name)
    }

    fn all_tags(&self) -> Vec<String> {
        Calendar::all_tags(self)
    }

    fn all_memos(&self) -> Vec<String> {
        Calendar::all_memos(self)
    }

    fn status_of(&mut self, name: &str) -> Option<TimeStatus> {
        Calendar::status_of(self, name)
    }
}

/// Read-only union of several calendars, built by [`Calendar::merge`].
///
/// The merged data is an independent copy; edits to the sources after
/// the merge are not reflected.
#[derive(Debug)]
pub struct MergedCalendar {
    inner: Calendar,
    sources: Vec<String>,
}

impl MergedCalendar {
    pub(crate) fn new(inner: Calendar, sources: Vec<String>) -> Self {
        Self { inner, sources }
    }

    /// Names of the merged calendars, in merge order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn snapshot(&self) -> CalendarSnapshot {
        self.inner.snapshot()
    }
}

impl CalendarView for MergedCalendar {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn events(&mut self, filter: TimeFilter) -> Vec<&Event> {
        self.inner.events(filter)
    }

    fn event(&self, name: &str) -> Option<&Event> {
        self.inner.event(name)
    }

    fn search_by_name(&mut self, name: &str) -> Vec<&Event> {
        self.inner.search_by_name(name)
    }

    fn search_by_date(&mut self, date: NaiveDate) -> Vec<&Event> {
        self.inner.search_by_date(date)
    }

    fn search_by_tag(&mut self, tag: &str) -> Vec<&Event> {
        self.inner.search_by_tag(tag)
    }

    fn search_by_series_name(&mut self, series_name: &str) -> Option<Vec<&Event>> {
        self.inner.search_by_series_name(series_name)
    }

    fn all_tags(&self) -> Vec<String> {
        self.inner.all_tags()
    }

    fn all_memos(&self) -> Vec<String> {
        self.inner.all_memos()
    }

    fn status_of(&mut self, name: &str) -> Option<TimeStatus> {
        self.inner.status_of(name)
    }
}
