//! Clock anchor persistence.
//!
//! # Responsibility
//! - Store the single `(reference_real, reference_virtual, speed)` triple.
//!
//! # Invariants
//! - At most one row exists (`id = 1`); `save` overwrites it.
//! - Instants are stored as ISO-8601 text with sub-second precision.

use crate::clock::ClockState;
use crate::repo::{RepoError, RepoResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};

const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Storage contract for the virtual clock anchor.
pub trait ClockStateStore: Send {
    /// Returns the saved triple, or `None` when nothing was saved yet.
    fn load(&self) -> RepoResult<Option<ClockState>>;
    /// Replaces the saved triple.
    fn save(&self, state: &ClockState) -> RepoResult<()>;
}

/// SQLite-backed clock store.
///
/// Owns its connection so a `VirtualClock` can hold it for its lifetime.
pub struct SqliteClockStateStore {
    conn: Connection,
}

impl SqliteClockStateStore {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Returns the underlying connection back to the caller.
    pub fn into_inner(self) -> Connection {
        self.conn
    }
}

impl ClockStateStore for SqliteClockStateStore {
    fn load(&self) -> RepoResult<Option<ClockState>> {
        let row = self
            .conn
            .query_row(
                "SELECT reference_real, reference_virtual, speed
                 FROM clock_state
                 WHERE id = 1;",
                [],
                |row| {
                    Ok((
                        row.get::<_, String>("reference_real")?,
                        row.get::<_, String>("reference_virtual")?,
                        row.get::<_, f64>("speed")?,
                    ))
                },
            )
            .optional()?;

        let Some((real_text, virtual_text, speed)) = row else {
            return Ok(None);
        };
        if !speed.is_finite() || speed < 0.0 {
            return Err(RepoError::InvalidData(format!(
                "invalid speed `{speed}` in clock_state.speed"
            )));
        }

        Ok(Some(ClockState {
            reference_real: parse_instant(&real_text, "clock_state.reference_real")?,
            reference_virtual: parse_instant(&virtual_text, "clock_state.reference_virtual")?,
            speed,
        }))
    }

    fn save(&self, state: &ClockState) -> RepoResult<()> {
        self.conn.execute(
            "INSERT INTO clock_state (id, reference_real, reference_virtual, speed)
             VALUES (1, ?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET
                reference_real = excluded.reference_real,
                reference_virtual = excluded.reference_virtual,
                speed = excluded.speed;",
            params![
                state.reference_real.format(INSTANT_FORMAT).to_string(),
                state.reference_virtual.format(INSTANT_FORMAT).to_string(),
                state.speed,
            ],
        )?;
        Ok(())
    }
}

fn parse_instant(value: &str, column: &str) -> RepoResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, INSTANT_FORMAT)
        .map_err(|_| RepoError::InvalidData(format!("invalid instant `{value}` in {column}")))
}

#[cfg(test)]
mod tests {
    use super::{ClockStateStore, SqliteClockStateStore};
    use crate::clock::ClockState;
    use crate::db::open_db_in_memory;
    use chrono::NaiveDateTime;

    #[test]
    fn save_overwrites_single_row() {
        let store = SqliteClockStateStore::new(open_db_in_memory().unwrap());
        assert!(store.load().unwrap().is_none());

        let first = ClockState {
            reference_real: NaiveDateTime::parse_from_str("2024-05-01T10:00:00.25", "%Y-%m-%dT%H:%M:%S%.f")
                .unwrap(),
            reference_virtual: NaiveDateTime::parse_from_str("1926-08-17T00:00:00", "%Y-%m-%dT%H:%M:%S")
                .unwrap(),
            speed: 2.5,
        };
        store.save(&first).unwrap();
        let second = ClockState {
            speed: 0.0,
            ..first
        };
        store.save(&second).unwrap();

        assert_eq!(store.load().unwrap(), Some(second));
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM clock_state;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
