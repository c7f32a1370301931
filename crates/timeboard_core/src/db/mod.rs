//! Calendar database: connection bootstrap and schema checks.
//!
//! # Responsibility
//! - Hand out SQLite connections holding the `clock_state` and
//!   `calendar_snapshots` tables.
//! - Keep the schema version in `PRAGMA user_version` and refuse files
//!   written by a newer binary.
//!
//! # Invariants
//! - A connection is returned only after migrations ran and every table in
//!   [`CALENDAR_TABLES`] is present.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory};

/// Tables the repositories read and write.
pub const CALENDAR_TABLES: &[&str] = &["clock_state", "calendar_snapshots"];

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The recorded version is current but a calendar table is gone.
    MissingTable(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "calendar database has schema {db_version}, this build reads up to {latest_supported}"
            ),
            Self::MissingTable(table) => {
                write!(f, "calendar database is missing table `{table}`")
            }
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Self::Sqlite(err) = self {
            Some(err)
        } else {
            None
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Fails with `MissingTable` for the first calendar table not in the schema.
pub fn verify_calendar_tables(conn: &Connection) -> DbResult<()> {
    let mut exists = conn.prepare(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1);",
    )?;
    for table in CALENDAR_TABLES {
        if !exists.query_row([table], |row| row.get::<_, bool>(0))? {
            return Err(DbError::MissingTable(*table));
        }
    }
    Ok(())
}
