//! Event series model.
//!
//! A series groups events by reference. It has no notion of time buckets;
//! the owning calendar materializes members in `(start, name)` order.

use crate::model::event::EventId;
use serde::{Deserialize, Serialize};

/// Named group of events generated or collected together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSeries {
    name: String,
    members: Vec<EventId>,
}

impl EventSeries {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Member ids in insertion order.
    pub fn members(&self) -> &[EventId] {
        &self.members
    }

    pub fn contains(&self, event_id: EventId) -> bool {
        self.members.contains(&event_id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Adds a member; returns `false` when it was already present.
    pub(crate) fn insert(&mut self, event_id: EventId) -> bool {
        if self.contains(event_id) {
            return false;
        }
        self.members.push(event_id);
        true
    }

    /// Removes a member; returns `false` when it was absent.
    pub(crate) fn remove(&mut self, event_id: EventId) -> bool {
        let before = self.members.len();
        self.members.retain(|member| *member != event_id);
        before != self.members.len()
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}
