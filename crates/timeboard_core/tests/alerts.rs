use chrono::{NaiveDateTime, TimeDelta};
use std::sync::Arc;
use timeboard_core::{
    Alarm, AlarmError, Alert, AlertError, Calendar, CalendarError, DueAlert, ManualRealTime,
    VirtualClock,
};

fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
}

fn setup(now: &str) -> (ManualRealTime, Arc<VirtualClock>, Calendar) {
    let real = ManualRealTime::new(at(now));
    let clock = Arc::new(VirtualClock::new(real.clone()));
    let mut calendar = Calendar::new("alerts", clock.clone());
    calendar
        .create_event("launch", at("2025-01-01T09:00"), at("2025-01-01T10:00"))
        .unwrap();
    calendar
        .create_event("retro", at("2025-01-02T09:00"), at("2025-01-02T10:00"))
        .unwrap();
    (real, clock, calendar)
}

#[test]
fn recurring_ping_expands_into_three_pending_instances() {
    let (_real, _clock, mut calendar) = setup("2024-12-31T23:00");

    let scheduled = calendar
        .schedule_recurring_alert(
            "launch",
            "ping",
            at("2025-01-01T00:00"),
            at("2025-01-01T03:00"),
            TimeDelta::hours(1),
        )
        .unwrap();

    let expected = vec![
        Alert::new("ping", at("2025-01-01T00:00")),
        Alert::new("ping", at("2025-01-01T01:00")),
        Alert::new("ping", at("2025-01-01T02:00")),
    ];
    assert_eq!(scheduled, expected);

    let manager = calendar.alerts_of("launch").unwrap();
    assert_eq!(manager.pending().cloned().collect::<Vec<_>>(), expected);
    assert_eq!(manager.history_len(), 0);
}

#[test]
fn non_positive_interval_is_rejected() {
    let (_real, _clock, mut calendar) = setup("2024-12-31T23:00");
    let err = calendar
        .schedule_recurring_alert(
            "launch",
            "ping",
            at("2025-01-01T00:00"),
            at("2025-01-01T03:00"),
            TimeDelta::zero(),
        )
        .unwrap_err();
    assert_eq!(
        err,
        CalendarError::Alert(AlertError::NonPositiveInterval(TimeDelta::zero()))
    );
    assert_eq!(calendar.alerts_of("launch").unwrap().pending_len(), 0);
}

#[test]
fn past_alert_is_skipped_not_failed() {
    let (_real, _clock, mut calendar) = setup("2025-01-01T12:00");

    let accepted = calendar
        .schedule_alert("launch", "too late", at("2025-01-01T12:00"))
        .unwrap();
    assert_eq!(accepted, None);
    assert_eq!(calendar.alerts_of("launch").unwrap().pending_len(), 0);

    let accepted = calendar
        .schedule_alert("launch", "soon", at("2025-01-01T12:01"))
        .unwrap();
    assert_eq!(accepted, Some(Alert::new("soon", at("2025-01-01T12:01"))));
}

#[test]
fn ring_due_alerts_moves_due_instances_to_history() {
    let (real, _clock, mut calendar) = setup("2024-12-31T23:00");
    calendar
        .schedule_alert("retro", "prep", at("2025-01-01T00:30"))
        .unwrap();
    calendar
        .schedule_alert("launch", "go", at("2025-01-01T00:30"))
        .unwrap();
    calendar
        .schedule_alert("launch", "later", at("2025-01-01T05:00"))
        .unwrap();

    assert!(calendar.ring_due_alerts().is_empty());

    real.advance(TimeDelta::minutes(90));
    let due = calendar.ring_due_alerts();
    assert_eq!(
        due,
        vec![
            DueAlert {
                event_name: "launch".to_string(),
                alert: Alert::new("go", at("2025-01-01T00:30")),
            },
            DueAlert {
                event_name: "retro".to_string(),
                alert: Alert::new("prep", at("2025-01-01T00:30")),
            },
        ]
    );

    let launch = calendar.alerts_of("launch").unwrap();
    assert_eq!(launch.history_len(), 1);
    assert_eq!(launch.pending_len(), 1);
    assert!(calendar.ring_due_alerts().is_empty());
}

#[test]
fn delete_and_reschedule_require_a_pending_alert() {
    let (_real, _clock, mut calendar) = setup("2024-12-31T23:00");
    let alert = calendar
        .schedule_alert("launch", "go", at("2025-01-01T08:00"))
        .unwrap()
        .unwrap();

    let moved = calendar
        .reschedule_alert("launch", &alert, "go early", at("2025-01-01T07:00"))
        .unwrap();
    assert_eq!(moved, Some(Alert::new("go early", at("2025-01-01T07:00"))));

    assert_eq!(
        calendar.delete_alert("launch", &alert).unwrap_err(),
        CalendarError::Alert(AlertError::UnknownAlert(alert.clone()))
    );

    let current = Alert::new("go early", at("2025-01-01T07:00"));
    let kept = calendar
        .reschedule_alert("launch", &current, "go", at("2024-12-31T22:00"))
        .unwrap();
    assert_eq!(kept, None);
    assert!(calendar.alerts_of("launch").unwrap().is_pending(&current));

    calendar.delete_alert("launch", &current).unwrap();
    assert!(calendar.pending_alerts().is_empty());
}

#[test]
fn alarm_reports_empty_then_not_due_then_fires() {
    let real = ManualRealTime::new(at("2025-01-01T00:00"));
    let clock = Arc::new(VirtualClock::new(real.clone()));
    let mut alarm = Alarm::new(clock);

    assert_eq!(alarm.pop_due().unwrap_err(), AlarmError::Empty);

    alarm.add("b", at("2025-01-01T01:00"));
    alarm.add("a", at("2025-01-01T01:00"));
    alarm.add("c", at("2025-01-01T03:00"));
    assert_eq!(
        alarm.pop_due().unwrap_err(),
        AlarmError::NotDue {
            next_at: at("2025-01-01T01:00")
        }
    );
    assert!(!alarm.has_due());

    real.advance(TimeDelta::hours(2));
    assert!(alarm.has_due());
    assert_eq!(alarm.pop_due().unwrap(), Alert::new("a", at("2025-01-01T01:00")));
    assert_eq!(
        alarm.drain_due(),
        vec![Alert::new("b", at("2025-01-01T01:00"))]
    );
    assert_eq!(alarm.len(), 1);
    assert_eq!(alarm.peek(), Some(&Alert::new("c", at("2025-01-01T03:00"))));
}

#[test]
fn alarm_recurring_keeps_instances_before_until() {
    let real = ManualRealTime::new(at("2025-01-01T00:00"));
    let mut alarm = Alarm::new(Arc::new(VirtualClock::new(real)));

    let added = alarm
        .add_recurring(
            "water",
            at("2025-01-01T06:00"),
            at("2025-01-01T08:00"),
            TimeDelta::minutes(30),
        )
        .unwrap();
    assert_eq!(added, 4);
    assert_eq!(
        alarm.alerts().first(),
        Some(&Alert::new("water", at("2025-01-01T06:00")))
    );
    assert!(alarm
        .add_recurring("water", at("2025-01-01T06:00"), at("2025-01-01T08:00"), TimeDelta::zero())
        .is_err());
}
