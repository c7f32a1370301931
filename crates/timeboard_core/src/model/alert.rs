//! Alert domain model.
//!
//! # Invariants
//! - Alerts order by trigger time, then by name.
//! - An alert is due once clock time reaches its trigger time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};

/// Named notification bound to one trigger instant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Alert {
    name: String,
    at: NaiveDateTime,
}

impl Alert {
    pub fn new(name: impl Into<String>, at: NaiveDateTime) -> Self {
        Self {
            name: name.into(),
            at,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Trigger instant on the virtual clock.
    pub fn at(&self) -> NaiveDateTime {
        self.at
    }

    /// Returns `true` when `now` has reached the trigger instant.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        self.at <= now
    }
}

impl Ord for Alert {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at
            .cmp(&other.at)
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl PartialOrd for Alert {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for Alert {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} at {}", self.name, self.at.format("%Y-%m-%dT%H:%M"))
    }
}
