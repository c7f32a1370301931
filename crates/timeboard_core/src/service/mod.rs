//! Calendar services built on the domain model.
//!
//! # Responsibility
//! - Keep every cross-structure invariant (partitions, note indexes, series
//!   membership, alert mirroring) inside one layer.
//! - Keep front-ends decoupled from storage details.

pub mod alarm;
pub mod alert_manager;
pub mod calendar;
pub mod common_calendar;
pub mod note_index;
pub mod planner;
pub mod view;
