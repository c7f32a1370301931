//! Persistence adapters for the clock anchor and calendar snapshots.
//!
//! # Responsibility
//! - Define storage contracts the core depends on (`ClockStateStore`,
//!   `CalendarSnapshotRepository`).
//! - Keep SQL and JSON encoding details inside the persistence boundary.
//!
//! # Invariants
//! - Read paths reject malformed persisted state instead of masking it.
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   transport errors.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod clock_repo;
pub mod snapshot_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by every persistence adapter.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// JSON payload could not be encoded or decoded.
    Serialization(serde_json::Error),
    /// Named record does not exist.
    NotFound(String),
    /// Stored row is present but violates a schema-level expectation.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization(err) => write!(f, "snapshot encoding failed: {err}"),
            Self::NotFound(name) => write!(f, "record not found: {name}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization(err) => Some(err),
            Self::NotFound(_) | Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}
