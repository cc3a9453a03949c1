//! End-to-end tests: feed text in, normalized busy intervals out.

use busy_engine::pipeline::busy_intervals_for;
use busy_engine::{
    collect_busy_intervals, expand_busy_intervals, expand_busy_intervals_with, Budget, BusyInterval,
    CalendarError, EventDefinition, ExpandOptions, ParseError, QueryWindow, RuleFields, RuleSource,
    TimezoneTable,
};
use chrono::{DateTime, TimeZone, Utc};

const BERLIN: &str = "BEGIN:VTIMEZONE\r\nTZID:Europe/Berlin\r\n\
     BEGIN:DAYLIGHT\r\nTZOFFSETFROM:+0100\r\nTZOFFSETTO:+0200\r\nDTSTART:19700329T020000\r\n\
     RRULE:FREQ=YEARLY;BYMONTH=3;BYDAY=-1SU\r\nEND:DAYLIGHT\r\n\
     BEGIN:STANDARD\r\nTZOFFSETFROM:+0200\r\nTZOFFSETTO:+0100\r\nDTSTART:19701025T030000\r\n\
     RRULE:FREQ=YEARLY;BYMONTH=10;BYDAY=-1SU\r\nEND:STANDARD\r\nEND:VTIMEZONE\r\n";

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn window(start: DateTime<Utc>, end: DateTime<Utc>) -> QueryWindow {
    QueryWindow::new(start, end).expect("valid window")
}

fn busy(start: DateTime<Utc>, end: DateTime<Utc>) -> BusyInterval {
    BusyInterval::new(start, end).expect("start < end")
}

fn calendar(events: &[&str]) -> String {
    calendar_with_header("", events)
}

fn calendar_with_header(header: &str, events: &[&str]) -> String {
    let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//test//EN\r\n");
    text.push_str(header);
    for event in events {
        text.push_str("BEGIN:VEVENT\r\n");
        text.push_str(event);
        text.push_str("END:VEVENT\r\n");
    }
    text.push_str("END:VCALENDAR\r\n");
    text
}

// ---------------------------------------------------------------------------
// Recurrence scenarios
// ---------------------------------------------------------------------------

#[test]
fn weekly_count_three_scenario() {
    let text = calendar(&[
        "UID:standup\r\nSUMMARY:Standup\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 1, 22, 0, 0)))
        .expect("should expand");

    assert_eq!(
        result,
        vec![
            busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 9, 30)),
            busy(at(2024, 1, 8, 9, 0), at(2024, 1, 8, 9, 30)),
            busy(at(2024, 1, 15, 9, 0), at(2024, 1, 15, 9, 30)),
        ]
    );
}

#[test]
fn exdate_removes_one_of_four() {
    let text = calendar(&[
        "DTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=WEEKLY;COUNT=4\r\nEXDATE:20240108T090000Z\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0))).unwrap();

    assert_eq!(result.len(), 3);
    assert!(result.iter().all(|i| i.start() != at(2024, 1, 8, 9, 0)));
}

#[test]
fn count_bound_beats_far_until() {
    let text = calendar(&[
        "DTSTART:20240301T090000Z\r\nDTEND:20240301T100000Z\r\nRRULE:FREQ=DAILY;COUNT=5;UNTIL=20301231T000000Z\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 3, 1, 0, 0), at(2024, 3, 31, 0, 0))).unwrap();
    assert_eq!(result.len(), 5);
}

#[test]
fn unparseable_rule_falls_back_to_single_event() {
    let text = calendar(&[
        "DTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=FORTNIGHTLY;COUNT=3\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0))).unwrap();

    assert_eq!(result, vec![busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 9, 30))]);
}

#[test]
fn runaway_rule_falls_back_to_single_event() {
    let text = calendar(&["DTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=DAILY\r\n"]);
    let options = ExpandOptions {
        iteration_ceiling: 5,
        ..ExpandOptions::default()
    };
    let result =
        expand_busy_intervals_with(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0)), &options).unwrap();

    assert_eq!(result, vec![busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 9, 30))]);
}

#[test]
fn overridden_instance_replaces_master_occurrence() {
    let text = calendar(&[
        "UID:standup\r\nDTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\n",
        "UID:standup\r\nRECURRENCE-ID:20240108T090000Z\r\nDTSTART:20240108T140000Z\r\nDTEND:20240108T150000Z\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 1, 22, 0, 0))).unwrap();

    assert_eq!(
        result,
        vec![
            busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 9, 30)),
            busy(at(2024, 1, 8, 14, 0), at(2024, 1, 8, 15, 0)),
            busy(at(2024, 1, 15, 9, 0), at(2024, 1, 15, 9, 30)),
        ]
    );
}

#[test]
fn local_time_is_kept_across_dst() {
    let text = calendar_with_header(
        BERLIN,
        &["DTSTART;TZID=Europe/Berlin:20240325T100000\r\nDTEND;TZID=Europe/Berlin:20240325T110000\r\nRRULE:FREQ=WEEKLY;COUNT=3\r\n"],
    );
    let result = expand_busy_intervals(&text, &window(at(2024, 3, 1, 0, 0), at(2024, 5, 1, 0, 0))).unwrap();

    // 10:00 local is 09:00 UTC before the switch on March 31 and 08:00 after.
    assert_eq!(
        result,
        vec![
            busy(at(2024, 3, 25, 9, 0), at(2024, 3, 25, 10, 0)),
            busy(at(2024, 4, 1, 8, 0), at(2024, 4, 1, 9, 0)),
            busy(at(2024, 4, 8, 8, 0), at(2024, 4, 8, 9, 0)),
        ]
    );
}

#[test]
fn counted_exdate_across_dst_uses_up_the_count() {
    let text = calendar_with_header(
        BERLIN,
        &["DTSTART;TZID=Europe/Berlin:20240325T100000\r\nDTEND;TZID=Europe/Berlin:20240325T110000\r\n\
           RRULE:FREQ=WEEKLY;COUNT=4\r\nEXDATE;TZID=Europe/Berlin:20240401T100000\r\n"],
    );
    let result = expand_busy_intervals(&text, &window(at(2024, 3, 1, 0, 0), at(2024, 5, 1, 0, 0))).unwrap();

    // The excluded April 1 still counts, so the series ends on April 15.
    assert_eq!(
        result,
        vec![
            busy(at(2024, 3, 25, 9, 0), at(2024, 3, 25, 10, 0)),
            busy(at(2024, 4, 8, 8, 0), at(2024, 4, 8, 9, 0)),
            busy(at(2024, 4, 15, 8, 0), at(2024, 4, 15, 9, 0)),
        ]
    );
}

#[test]
fn daily_rule_with_hours_expands_each_day() {
    let text = calendar(&[
        "DTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=DAILY;BYHOUR=9,14;COUNT=6\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 1, 10, 0, 0))).unwrap();

    let expected: Vec<_> = (1..=3)
        .flat_map(|day| [(day, 9), (day, 14)])
        .map(|(day, hour)| busy(at(2024, 1, day, hour, 0), at(2024, 1, day, hour, 30)))
        .collect();
    assert_eq!(result, expected);
}

#[test]
fn recurring_event_started_long_ago_reaches_the_window() {
    let text = calendar(&["DTSTART:20000103T090000Z\r\nDTEND:20000103T100000Z\r\nRRULE:FREQ=DAILY\r\n"]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 1, 3, 0, 0))).unwrap();

    assert_eq!(
        result,
        vec![
            busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 10, 0)),
            busy(at(2024, 1, 2, 9, 0), at(2024, 1, 2, 10, 0)),
        ]
    );
}

// ---------------------------------------------------------------------------
// Window handling and merging
// ---------------------------------------------------------------------------

#[test]
fn overlapping_events_merge() {
    let text = calendar(&[
        "DTSTART:20240101T090000Z\r\nDTEND:20240101T100000Z\r\n",
        "DTSTART:20240101T093000Z\r\nDTEND:20240101T110000Z\r\n",
        "DTSTART:20240101T110000Z\r\nDTEND:20240101T113000Z\r\n",
        "DTSTART:20240101T140000Z\r\nDTEND:20240101T150000Z\r\n",
    ]);
    let window = window(at(2024, 1, 1, 0, 0), at(2024, 1, 2, 0, 0));

    assert_eq!(
        expand_busy_intervals(&text, &window).unwrap(),
        vec![
            busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 11, 30)),
            busy(at(2024, 1, 1, 14, 0), at(2024, 1, 1, 15, 0)),
        ]
    );
    assert_eq!(
        collect_busy_intervals(&text, &window, &ExpandOptions::default())
            .unwrap()
            .len(),
        4
    );
}

#[test]
fn boundary_touching_events_are_kept_unclipped() {
    let text = calendar(&[
        // Ends exactly at window start.
        "DTSTART:20231231T220000Z\r\nDTEND:20240101T000000Z\r\n",
        // Straddles the window end.
        "DTSTART:20240101T230000Z\r\nDTEND:20240102T010000Z\r\n",
        // Entirely before.
        "DTSTART:20231231T200000Z\r\nDTEND:20231231T210000Z\r\n",
    ]);
    let result = expand_busy_intervals(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 1, 2, 0, 0))).unwrap();

    assert_eq!(
        result,
        vec![
            busy(at(2023, 12, 31, 22, 0), at(2024, 1, 1, 0, 0)),
            busy(at(2024, 1, 1, 23, 0), at(2024, 1, 2, 1, 0)),
        ]
    );
}

#[test]
fn expansion_is_idempotent() {
    let text = calendar(&[
        "DTSTART:20240101T090000Z\r\nDTEND:20240101T100000Z\r\nRRULE:FREQ=DAILY;INTERVAL=3\r\n",
        "DTSTART:20240102T093000Z\r\nDTEND:20240102T120000Z\r\nRRULE:FREQ=WEEKLY;BYDAY=TU,TH\r\n",
    ]);
    let window = window(at(2024, 1, 1, 0, 0), at(2024, 3, 1, 0, 0));

    let first = expand_busy_intervals(&text, &window).unwrap();
    let second = expand_busy_intervals(&text, &window).unwrap();
    assert_eq!(first, second);
    assert!(first.windows(2).all(|pair| pair[0].end() < pair[1].start()));
}

// ---------------------------------------------------------------------------
// Request-level failures
// ---------------------------------------------------------------------------

#[test]
fn unparseable_feed_fails_the_request() {
    let err = expand_busy_intervals("not a calendar", &window(at(2024, 1, 1, 0, 0), at(2024, 1, 2, 0, 0)))
        .unwrap_err();
    assert!(matches!(err, CalendarError::Parse(ParseError::MalformedLine { .. })));
    assert!(err.to_string().starts_with("could not load calendar"));
}

#[test]
fn budget_exhaustion_fails_the_request() {
    let text = calendar(&["DTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=DAILY\r\n"]);
    let options = ExpandOptions {
        budget: Budget {
            max_occurrences: Some(10),
            time_limit: None,
        },
        ..ExpandOptions::default()
    };
    let result = expand_busy_intervals_with(&text, &window(at(2024, 1, 1, 0, 0), at(2024, 3, 1, 0, 0)), &options);

    assert_eq!(result, Err(CalendarError::BudgetExceeded { occurrences: 11 }));
}

#[test]
fn budget_is_shared_across_events() {
    let event = "DTSTART:20240101T090000Z\r\nDTEND:20240101T093000Z\r\nRRULE:FREQ=DAILY;COUNT=6\r\n";
    let text = calendar(&[event, event]);
    let window = window(at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0));
    let options = |max| ExpandOptions {
        budget: Budget {
            max_occurrences: Some(max),
            time_limit: None,
        },
        ..ExpandOptions::default()
    };

    assert!(expand_busy_intervals_with(&text, &window, &options(12)).is_ok());
    assert!(matches!(
        expand_busy_intervals_with(&text, &window, &options(11)),
        Err(CalendarError::BudgetExceeded { .. })
    ));
    assert!(expand_busy_intervals_with(&text, &window, &ExpandOptions {
        budget: Budget::unlimited(),
        ..ExpandOptions::default()
    })
    .is_ok());
}

// ---------------------------------------------------------------------------
// Programmatic definitions
// ---------------------------------------------------------------------------

#[test]
fn structured_rule_definitions() {
    let fields = RuleFields {
        frequency: "DAILY".to_string(),
        count: Some(3),
        ..RuleFields::default()
    };
    let event = EventDefinition::utc(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 10, 0))
        .unwrap()
        .with_recurrence(RuleSource::Structured(fields))
        .with_exclusion(chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
    let single = EventDefinition::utc(at(2024, 1, 5, 12, 0), at(2024, 1, 5, 13, 0)).unwrap();

    let mut result = busy_intervals_for(
        &[event, single],
        &TimezoneTable::new(),
        &window(at(2024, 1, 1, 0, 0), at(2024, 2, 1, 0, 0)),
        &ExpandOptions::default(),
    )
    .unwrap();
    result.sort();

    assert_eq!(
        result,
        vec![
            busy(at(2024, 1, 1, 9, 0), at(2024, 1, 1, 10, 0)),
            busy(at(2024, 1, 3, 9, 0), at(2024, 1, 3, 10, 0)),
            busy(at(2024, 1, 5, 12, 0), at(2024, 1, 5, 13, 0)),
        ]
    );
}
