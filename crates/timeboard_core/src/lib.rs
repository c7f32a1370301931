//! Core calendar logic for Timeboard.
//! This crate is the single source of truth for calendar, note and alert
//! invariants; front-ends only call into it.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use clock::{ClockError, ClockState, ManualRealTime, RealTimeSource, SystemRealTime, VirtualClock};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::alert::Alert;
pub use model::event::{Event, EventId, EventValidationError, TimeStatus};
pub use model::note::{Note, NoteKind};
pub use model::series::EventSeries;
pub use repo::clock_repo::{ClockStateStore, SqliteClockStateStore};
pub use repo::snapshot_repo::{CalendarSnapshotRepository, SqliteSnapshotRepository};
pub use repo::{RepoError, RepoResult};
pub use service::alarm::{Alarm, AlarmError};
pub use service::alert_manager::{AlertError, AlertManager};
pub use service::calendar::{Calendar, CalendarError, CalendarSnapshot, DueAlert, TimeFilter};
pub use service::common_calendar::{CommonCalendar, SharedCalendarView};
pub use service::planner::{AlarmPoller, Planner, PlannerError, SharedPlanner};
pub use service::view::{CalendarView, MergedCalendar};

/// Minimal health-check API for front-end wiring.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
