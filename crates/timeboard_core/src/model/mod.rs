//! Calendar domain model.
//!
//! # Responsibility
//! - Define the records the calendar store, note indexes and alert queues
//!   operate on.
//! - Keep construction-time validation next to the data it protects.
//!
//! # Invariants
//! - Every event is identified by a stable `EventId` and a store-unique name.
//! - Notes compare by kind and text, never by allocation identity.

pub mod alert;
pub mod event;
pub mod note;
pub mod series;
