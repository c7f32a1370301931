//! Calendar snapshot persistence.
//!
//! # Responsibility
//! - Store one JSON-encoded `CalendarSnapshot` per calendar name.
//! - Rebuild validated calendars from stored payloads.
//!
//! # Invariants
//! - Calendar names are unique; `save` replaces the previous payload.
//! - A payload that fails to decode or restore surfaces as
//!   `RepoError::InvalidData` rather than an empty calendar.

use crate::clock::VirtualClock;
use crate::repo::{RepoError, RepoResult};
use crate::service::calendar::{Calendar, CalendarSnapshot};
use log::{error, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;
use std::time::Instant;

/// Storage contract for calendar snapshots.
pub trait CalendarSnapshotRepository {
    /// Inserts or replaces the snapshot stored under `snapshot.name`.
    fn save(&self, snapshot: &CalendarSnapshot) -> RepoResult<()>;
    /// Loads the snapshot stored under `name`.
    fn load(&self, name: &str) -> RepoResult<CalendarSnapshot>;
    /// Stored calendar names in ascending order.
    fn list_names(&self) -> RepoResult<Vec<String>>;
    /// Deletes the snapshot stored under `name`.
    fn delete(&self, name: &str) -> RepoResult<()>;
}

/// SQLite implementation over the `calendar_snapshots` table.
pub struct SqliteSnapshotRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteSnapshotRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Saves the calendar's current state.
    pub fn save_calendar(&self, calendar: &Calendar) -> RepoResult<()> {
        self.save(&calendar.snapshot())
    }

    /// Loads and restores a calendar bound to `clock`.
    pub fn load_calendar(&self, name: &str, clock: Arc<VirtualClock>) -> RepoResult<Calendar> {
        let snapshot = self.load(name)?;
        Calendar::restore(snapshot, clock).map_err(|err| RepoError::InvalidData(err.to_string()))
    }
}

impl CalendarSnapshotRepository for SqliteSnapshotRepository<'_> {
    fn save(&self, snapshot: &CalendarSnapshot) -> RepoResult<()> {
        let started_at = Instant::now();
        let payload = serde_json::to_string(snapshot)?;
        let result = self.conn.execute(
            "INSERT INTO calendar_snapshots (name, payload, saved_at)
             VALUES (?1, ?2, CAST(strftime('%s', 'now') AS INTEGER) * 1000)
             ON CONFLICT(name) DO UPDATE SET
                payload = excluded.payload,
                saved_at = excluded.saved_at;",
            params![snapshot.name, payload],
        );

        match result {
            Ok(_) => {
                info!(
                    "event=snapshot_save module=repo status=ok calendar={} events={} bytes={} duration_ms={}",
                    snapshot.name,
                    snapshot.events.len(),
                    payload.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    "event=snapshot_save module=repo status=error calendar={} error={}",
                    snapshot.name, err
                );
                Err(err.into())
            }
        }
    }

    fn load(&self, name: &str) -> RepoResult<CalendarSnapshot> {
        let payload = self
            .conn
            .query_row(
                "SELECT payload FROM calendar_snapshots WHERE name = ?1;",
                params![name],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .ok_or_else(|| RepoError::NotFound(name.to_string()))?;

        let snapshot: CalendarSnapshot = serde_json::from_str(&payload).map_err(|err| {
            error!(
                "event=snapshot_load module=repo status=error calendar={} error={}",
                name, err
            );
            RepoError::InvalidData(format!("calendar `{name}`: {err}"))
        })?;
        if snapshot.name != name {
            return Err(RepoError::InvalidData(format!(
                "calendar `{name}` stores a snapshot named `{}`",
                snapshot.name
            )));
        }
        info!(
            "event=snapshot_load module=repo status=ok calendar={} events={}",
            name,
            snapshot.events.len()
        );
        Ok(snapshot)
    }

    fn list_names(&self) -> RepoResult<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM calendar_snapshots ORDER BY name ASC;")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn delete(&self, name: &str) -> RepoResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM calendar_snapshots WHERE name = ?1;", params![name])?;
        if changed == 0 {
            return Err(RepoError::NotFound(name.to_string()));
        }
        Ok(())
    }
}
