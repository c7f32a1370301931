use chrono::{NaiveDateTime, TimeDelta};
use timeboard_core::db::open_db;
use timeboard_core::{
    ClockError, ClockState, ClockStateStore, ManualRealTime, RepoError, RepoResult,
    SqliteClockStateStore, VirtualClock,
};

fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
}

#[test]
fn new_clock_tracks_real_time_at_unit_speed() {
    let real = ManualRealTime::new(at("2024-06-01T12:00"));
    let clock = VirtualClock::new(real.clone());

    assert_eq!(clock.now(), at("2024-06-01T12:00"));
    real.advance(TimeDelta::minutes(90));
    assert_eq!(clock.now(), at("2024-06-01T13:30"));
    assert_eq!(clock.speed(), 1.0);
}

#[test]
fn jump_discards_drift_in_either_direction() {
    let real = ManualRealTime::new(at("2024-06-01T12:00"));
    let clock = VirtualClock::new(real.clone());
    clock.set_speed(10.0).unwrap();

    real.advance(TimeDelta::minutes(1));
    clock.jump_to(at("2020-01-01T00:00"));
    assert_eq!(clock.now(), at("2020-01-01T00:00"));

    real.advance(TimeDelta::minutes(1));
    assert_eq!(clock.now(), at("2020-01-01T00:10"));
}

#[test]
fn zero_speed_freezes_virtual_time() {
    let real = ManualRealTime::new(at("2024-06-01T12:00"));
    let clock = VirtualClock::new(real.clone());
    clock.set_speed(0.0).unwrap();

    real.advance(TimeDelta::days(3));
    assert_eq!(clock.now(), at("2024-06-01T12:00"));
}

#[test]
fn negative_speed_is_rejected_without_side_effects() {
    let real = ManualRealTime::new(at("2024-06-01T12:00"));
    let clock = VirtualClock::new(real);
    clock.set_speed(3.0).unwrap();

    let err = clock.set_speed(-0.5).unwrap_err();
    assert_eq!(err, ClockError::InvalidSpeed(-0.5));
    assert_eq!(clock.speed(), 3.0);
}

#[test]
fn persisted_anchor_survives_restart_and_keeps_counting() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clock.db");
    let real = ManualRealTime::new(at("2024-06-01T12:00"));

    {
        let store = SqliteClockStateStore::new(open_db(&path).unwrap());
        let clock = VirtualClock::with_store(real.clone(), store);
        assert!(clock.is_persistent());
        clock.jump_to(at("1999-12-31T23:00"));
        clock.set_speed(2.0).unwrap();
    }

    real.advance(TimeDelta::minutes(30));
    let store = SqliteClockStateStore::new(open_db(&path).unwrap());
    let clock = VirtualClock::with_store(real, store);

    assert_eq!(clock.speed(), 2.0);
    assert_eq!(clock.now(), at("2000-01-01T00:00"));
}

struct BrokenStore;

impl ClockStateStore for BrokenStore {
    fn load(&self) -> RepoResult<Option<ClockState>> {
        Ok(None)
    }

    fn save(&self, _state: &ClockState) -> RepoResult<()> {
        Err(RepoError::InvalidData("disk full".to_string()))
    }
}

#[test]
fn failing_store_degrades_to_memory_only() {
    let real = ManualRealTime::new(at("2024-06-01T12:00"));
    let clock = VirtualClock::with_store(real.clone(), BrokenStore);

    assert!(!clock.is_persistent());
    clock.set_speed(4.0).unwrap();
    real.advance(TimeDelta::minutes(15));
    assert_eq!(clock.now(), at("2024-06-01T13:00"));
}

#[test]
fn state_reports_last_anchor() {
    let real = ManualRealTime::new(at("2024-06-01T12:00"));
    let clock = VirtualClock::new(real);
    clock.jump_to(at("2030-05-05T05:05"));

    let state = clock.state();
    assert_eq!(state.reference_real, at("2024-06-01T12:00"));
    assert_eq!(state.reference_virtual, at("2030-05-05T05:05"));
    assert_eq!(state.speed, 1.0);
}
