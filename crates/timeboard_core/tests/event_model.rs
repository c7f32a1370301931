use chrono::NaiveDateTime;
use timeboard_core::{Event, EventValidationError, Note, TimeStatus};

fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
}

#[test]
fn constructor_rejects_empty_and_inverted_windows() {
    let start = at("2024-02-01T10:00");

    assert_eq!(
        Event::new("A", start, start).unwrap_err(),
        EventValidationError::InvalidWindow { start, end: start }
    );
    assert!(Event::new("A", start, at("2024-02-01T09:00")).is_err());
    assert_eq!(
        Event::new("   ", start, at("2024-02-01T11:00")).unwrap_err(),
        EventValidationError::BlankName
    );
}

#[test]
fn ordering_is_start_then_name() {
    let early_b = Event::new("B", at("2024-02-01T09:00"), at("2024-02-01T10:00")).unwrap();
    let late_a = Event::new("A", at("2024-02-01T11:00"), at("2024-02-01T12:00")).unwrap();
    let early_a = Event::new("A", at("2024-02-01T09:00"), at("2024-02-01T09:30")).unwrap();

    let mut events = vec![late_a.clone(), early_b.clone(), early_a.clone()];
    events.sort();
    let names: Vec<_> = events.iter().map(|event| event.name()).collect();
    assert_eq!(names, vec!["A", "B", "A"]);
    assert_eq!(events[0].start(), at("2024-02-01T09:00"));
}

#[test]
fn equality_ignores_end_and_id() {
    let first = Event::new("A", at("2024-02-01T09:00"), at("2024-02-01T10:00")).unwrap();
    let second = Event::new("A", at("2024-02-01T09:00"), at("2024-02-01T17:00")).unwrap();
    assert_ne!(first.id(), second.id());
    assert_eq!(first, second);
}

#[test]
fn serde_rejects_invalid_window() {
    let event = Event::new("A", at("2024-02-01T09:00"), at("2024-02-01T10:00")).unwrap();
    let mut value = serde_json::to_value(&event).unwrap();
    assert_eq!(value["name"], "A");

    value["end"] = value["start"].clone();
    let err = serde_json::from_value::<Event>(value).unwrap_err();
    assert!(err.to_string().contains("must be after"));
}

#[test]
fn serde_round_trip_keeps_notes_and_id() {
    let json = serde_json::json!({
        "id": "7d4f0a56-8b1e-4d7a-9c1e-2a7b1f0e9c11",
        "name": "Planning",
        "start": "2024-02-01T09:00:00",
        "end": "2024-02-01T10:00:00",
        "tags": [{"kind": "tag", "value": "q1"}, {"kind": "tag", "value": "q1"}],
        "memos": [{"kind": "memo", "value": "bring slides"}]
    });

    let event: Event = serde_json::from_value(json).unwrap();
    assert_eq!(event.id().to_string(), "7d4f0a56-8b1e-4d7a-9c1e-2a7b1f0e9c11");
    assert_eq!(event.tags(), &[Note::tag("q1")]);
    assert_eq!(event.memos(), &[Note::memo("bring slides")]);
    assert_eq!(event.alerts().pending_len(), 0);
}

#[test]
fn classify_is_monotonic_over_time() {
    let event = Event::new("A", at("2024-02-01T09:00"), at("2024-02-01T10:00")).unwrap();
    let statuses: Vec<_> = [
        "2024-02-01T08:59",
        "2024-02-01T09:00",
        "2024-02-01T09:59",
        "2024-02-01T10:00",
        "2024-02-02T00:00",
    ]
    .iter()
    .map(|instant| event.classify(at(instant)))
    .collect();

    assert_eq!(
        statuses,
        vec![
            TimeStatus::Future,
            TimeStatus::Ongoing,
            TimeStatus::Ongoing,
            TimeStatus::Past,
            TimeStatus::Past,
        ]
    );
}
