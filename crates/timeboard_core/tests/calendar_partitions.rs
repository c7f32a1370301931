use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use proptest::prelude::*;
use std::sync::Arc;
use timeboard_core::{
    Calendar, CalendarError, ManualRealTime, Note, TimeFilter, TimeStatus, VirtualClock,
};

fn at(value: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").unwrap()
}

fn frozen_clock(now: &str) -> Arc<VirtualClock> {
    let clock = VirtualClock::new(ManualRealTime::new(at("2000-01-01T00:00")));
    clock.jump_to(at(now));
    Arc::new(clock)
}

fn names(events: &[&timeboard_core::Event]) -> Vec<String> {
    events.iter().map(|event| event.name().to_string()).collect()
}

#[test]
fn event_moves_future_ongoing_past_as_clock_jumps() {
    let clock = frozen_clock("2020-03-07T00:00");
    let mut calendar = Calendar::new("personal", clock.clone());
    calendar
        .create_event("A", at("2020-03-07T12:00"), at("2020-03-08T12:00"))
        .unwrap();

    assert_eq!(names(&calendar.events(TimeFilter::Future)), vec!["A"]);

    clock.jump_to(at("2020-03-07T13:00"));
    assert_eq!(names(&calendar.events(TimeFilter::Ongoing)), vec!["A"]);
    assert!(calendar.events(TimeFilter::Future).is_empty());

    clock.jump_to(at("2020-03-09T00:00"));
    assert_eq!(names(&calendar.events(TimeFilter::Past)), vec!["A"]);
    assert!(calendar.events(TimeFilter::Ongoing).is_empty());
}

#[test]
fn duplicate_names_are_rejected() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-01-01T00:00"));
    calendar
        .create_event("Dentist", at("2020-02-01T09:00"), at("2020-02-01T10:00"))
        .unwrap();

    let err = calendar
        .create_event("Dentist", at("2020-03-01T09:00"), at("2020-03-01T10:00"))
        .unwrap_err();
    assert_eq!(err, CalendarError::DuplicateEventName("Dentist".to_string()));
    assert_eq!(calendar.len(), 1);
}

#[test]
fn invalid_window_never_enters_the_store() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-01-01T00:00"));
    let err = calendar
        .create_event("Broken", at("2020-02-01T10:00"), at("2020-02-01T10:00"))
        .unwrap_err();
    assert!(matches!(err, CalendarError::InvalidEvent(_)));
    assert!(calendar.is_empty());
}

#[test]
fn all_filter_lists_buckets_in_order_and_ongoing_by_start() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-05-10T12:00"));
    calendar
        .create_event("long", at("2020-05-01T00:00"), at("2020-06-01T00:00"))
        .unwrap();
    calendar
        .create_event("short", at("2020-05-10T11:00"), at("2020-05-10T13:00"))
        .unwrap();
    calendar
        .create_event("done", at("2020-05-09T00:00"), at("2020-05-09T01:00"))
        .unwrap();
    calendar
        .create_event("later", at("2020-05-11T00:00"), at("2020-05-11T01:00"))
        .unwrap();

    assert_eq!(names(&calendar.events(TimeFilter::Ongoing)), vec!["long", "short"]);
    assert_eq!(
        names(&calendar.events(TimeFilter::All)),
        vec!["done", "long", "short", "later"]
    );
}

#[test]
fn delete_cascades_to_indexes_series_and_name_map() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-01-01T00:00"));
    calendar
        .create_event("A", at("2020-02-01T09:00"), at("2020-02-01T10:00"))
        .unwrap();
    calendar
        .create_event("B", at("2020-02-02T09:00"), at("2020-02-02T10:00"))
        .unwrap();
    calendar.tag_event("A", "solo").unwrap();
    calendar.tag_event("A", "shared").unwrap();
    calendar.tag_event("B", "shared").unwrap();
    calendar.memo_event("A", "call first").unwrap();
    calendar.add_to_series("A", "weekly").unwrap();

    let removed = calendar.delete_event("A").unwrap();
    assert_eq!(removed.name(), "A");

    assert!(!calendar.contains_event("A"));
    assert!(calendar.search_by_name("A").is_empty());
    assert_eq!(calendar.all_tags(), vec!["shared".to_string()]);
    assert!(calendar.all_memos().is_empty());
    assert_eq!(names(&calendar.search_by_tag("shared")), vec!["B"]);
    assert_eq!(calendar.search_by_series_name("weekly"), Some(vec![]));
    assert_eq!(
        calendar.delete_event("A").unwrap_err(),
        CalendarError::EventNotFound("A".to_string())
    );
}

#[test]
fn reschedule_rebuckets_and_keeps_old_window_on_error() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-01-10T00:00"));
    calendar
        .create_event("A", at("2020-01-20T09:00"), at("2020-01-20T10:00"))
        .unwrap();

    calendar
        .reschedule_event("A", at("2020-01-01T09:00"), at("2020-01-01T10:00"))
        .unwrap();
    assert_eq!(calendar.status_of("A"), Some(TimeStatus::Past));

    let err = calendar
        .reschedule_event("A", at("2020-01-05T10:00"), at("2020-01-05T09:00"))
        .unwrap_err();
    assert!(matches!(err, CalendarError::InvalidEvent(_)));
    assert_eq!(calendar.event("A").unwrap().start(), at("2020-01-01T09:00"));
    assert_eq!(calendar.status_of("A"), Some(TimeStatus::Past));
}

#[test]
fn rename_rejects_existing_name_and_blank_name() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-01-01T00:00"));
    calendar
        .create_event("A", at("2020-02-01T09:00"), at("2020-02-01T10:00"))
        .unwrap();
    calendar
        .create_event("B", at("2020-02-02T09:00"), at("2020-02-02T10:00"))
        .unwrap();
    calendar.tag_event("A", "x").unwrap();

    assert_eq!(
        calendar.rename_event("A", "B").unwrap_err(),
        CalendarError::DuplicateEventName("B".to_string())
    );
    assert!(calendar.rename_event("A", " ").is_err());

    calendar.rename_event("A", "C").unwrap();
    assert_eq!(names(&calendar.search_by_tag("x")), vec!["C"]);
    assert_eq!(calendar.event("C").unwrap().tags(), &[Note::tag("x")]);
}

#[test]
fn search_by_date_matches_start_day() {
    let mut calendar = Calendar::new("personal", frozen_clock("2020-01-01T00:00"));
    calendar
        .create_event("overnight", at("2020-02-01T23:00"), at("2020-02-02T01:00"))
        .unwrap();
    calendar
        .create_event("morning", at("2020-02-02T08:00"), at("2020-02-02T09:00"))
        .unwrap();

    let day = NaiveDate::from_ymd_opt(2020, 2, 2).unwrap();
    assert_eq!(names(&calendar.search_by_date(day)), vec!["morning"]);
}

fn arb_event() -> impl Strategy<Value = (i64, i64)> {
    // (start offset in minutes from the base, duration in minutes)
    (0i64..10_000, 1i64..2_000)
}

proptest! {
    #[test]
    fn partitions_match_classification_at_every_step(
        windows in prop::collection::vec(arb_event(), 1..25),
        steps in prop::collection::vec(0i64..3_000, 1..10),
    ) {
        let base = at("2021-01-01T00:00");
        let real = ManualRealTime::new(at("2000-01-01T00:00"));
        let clock = Arc::new(VirtualClock::new(real));
        clock.jump_to(base);
        let mut calendar = Calendar::new("prop", clock.clone());
        for (index, (offset, duration)) in windows.iter().enumerate() {
            let start = base + TimeDelta::minutes(*offset);
            calendar
                .create_event(format!("e{index}"), start, start + TimeDelta::minutes(*duration))
                .unwrap();
        }

        let mut now = base;
        let mut last_status: Vec<Option<TimeStatus>> = vec![None; windows.len()];
        for step in steps {
            now += TimeDelta::minutes(step);
            clock.jump_to(now);

            let mut seen = 0;
            for filter in [TimeFilter::Past, TimeFilter::Ongoing, TimeFilter::Future] {
                seen += calendar.events(filter).len();
            }
            prop_assert_eq!(seen, windows.len());

            for index in 0..windows.len() {
                let name = format!("e{index}");
                let expected = calendar.event(&name).unwrap().classify(now);
                let status = calendar.status_of(&name);
                prop_assert_eq!(status, Some(expected));

                let rank = |status: Option<TimeStatus>| match status {
                    None => 0,
                    Some(TimeStatus::Future) => 1,
                    Some(TimeStatus::Ongoing) => 2,
                    Some(TimeStatus::Past) => 3,
                };
                prop_assert!(rank(status) >= rank(last_status[index]));
                last_status[index] = status;
            }
        }
    }
}
