//! Free-time search
//!
//! Computes the complement of one or more calendars' busy intervals over a
//! query window: clip every interval to the window, sort ascending by start,
//! then a single cursor sweep emitting gaps of at least the requested
//! duration. Intervals are half-open `[start, end)`.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::Value;
use tracing::debug;

use crate::common::{Error, Result};
use crate::google::CalendarApi;

/// A busy span taken from a calendar event. Transient, recomputed per search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A gap at least as long as the requested minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeSlot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Fetch every calendar's events over the window and compute the free slots.
///
/// An empty result is the "no slots" outcome, not an error. A fetch failure
/// on any calendar aborts the whole computation carrying that calendar's id;
/// results from the other calendars are discarded.
pub async fn find_free_time(
    calendar: &CalendarApi,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    min_duration: Duration,
    calendar_ids: &[String],
) -> Result<Vec<FreeSlot>> {
    if min_duration <= Duration::zero() {
        return Err(Error::InvalidArgs(
            "duration must be a positive number of minutes".to_string(),
        ));
    }
    if window_start >= window_end {
        return Err(Error::InvalidArgs(
            "startDate must be before endDate".to_string(),
        ));
    }

    let time_min = window_start.to_rfc3339();
    let time_max = window_end.to_rfc3339();

    let mut busy = Vec::new();
    for calendar_id in calendar_ids {
        let events = calendar
            .list_events(
                calendar_id,
                Some(&time_min),
                Some(&time_max),
                None,
                false,
                None,
            )
            .await
            .map_err(|e| Error::CalendarFetch {
                calendar_id: calendar_id.clone(),
                source: Box::new(e),
            })?;

        busy.extend(busy_intervals(&events));
    }

    debug!(
        busy = busy.len(),
        calendars = calendar_ids.len(),
        "computing free slots"
    );
    Ok(free_slots(window_start, window_end, min_duration, &busy))
}

/// The sweep itself, pure over its inputs.
///
/// Overlapping events across calendars cannot produce false gaps: after the
/// sort, `cursor = max(cursor, end)` keeps the cursor past every busy span
/// seen so far regardless of how the spans interleave.
pub fn free_slots(
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    min_duration: Duration,
    busy: &[BusyInterval],
) -> Vec<FreeSlot> {
    let mut clipped: Vec<BusyInterval> = busy
        .iter()
        .filter_map(|interval| {
            let start = interval.start.max(window_start);
            let end = interval.end.min(window_end);
            (start < end).then_some(BusyInterval { start, end })
        })
        .collect();
    clipped.sort_by_key(|interval| interval.start);

    let mut slots = Vec::new();
    let mut cursor = window_start;

    for interval in &clipped {
        if interval.start - cursor >= min_duration {
            slots.push(FreeSlot {
                start: cursor,
                end: interval.start,
            });
        }
        cursor = cursor.max(interval.end);
    }

    if window_end - cursor >= min_duration {
        slots.push(FreeSlot {
            start: cursor,
            end: window_end,
        });
    }

    slots
}

/// Extract busy intervals from raw Calendar API events. Cancelled events and
/// events with unparseable times contribute nothing.
pub fn busy_intervals(events: &[Value]) -> Vec<BusyInterval> {
    events
        .iter()
        .filter_map(|event| {
            if event.get("status").and_then(|v| v.as_str()) == Some("cancelled") {
                return None;
            }
            let start = event_time(event.get("start")?)?;
            let end = event_time(event.get("end")?)?;
            (start < end).then_some(BusyInterval { start, end })
        })
        .collect()
}

/// Decode the Calendar API's start/end shape: `dateTime` for timed events,
/// `date` (midnight UTC) for all-day events.
fn event_time(field: &Value) -> Option<DateTime<Utc>> {
    if let Some(dt) = field.get("dateTime").and_then(|v| v.as_str()) {
        return DateTime::parse_from_rfc3339(dt)
            .ok()
            .map(|t| t.with_timezone(&Utc));
    }

    let date = field.get("date").and_then(|v| v.as_str())?;
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    Some(DateTime::from_naive_utc_and_offset(
        day.and_hms_opt(0, 0, 0)?,
        Utc,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, hour, minute, 0).unwrap()
    }

    fn busy(start: DateTime<Utc>, end: DateTime<Utc>) -> BusyInterval {
        BusyInterval { start, end }
    }

    #[test]
    fn test_single_event_splits_window_in_two() {
        // Window 09:00-12:00, one event 10:00-10:30, minimum 30 minutes.
        let slots = free_slots(
            at(9, 0),
            at(12, 0),
            Duration::minutes(30),
            &[busy(at(10, 0), at(10, 30))],
        );

        assert_eq!(
            slots,
            vec![
                FreeSlot { start: at(9, 0), end: at(10, 0) },
                FreeSlot { start: at(10, 30), end: at(12, 0) },
            ]
        );
    }

    #[test]
    fn test_overlapping_calendars_cover_whole_window() {
        // Calendar A busy 09:00-10:00, calendar B busy 09:30-10:30 over a
        // 09:00-10:30 window: the merged busy time covers everything.
        let slots = free_slots(
            at(9, 0),
            at(10, 30),
            Duration::minutes(10),
            &[busy(at(9, 0), at(10, 0)), busy(at(9, 30), at(10, 30))],
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_zero_events_yields_whole_window() {
        let slots = free_slots(at(9, 0), at(12, 0), Duration::minutes(30), &[]);
        assert_eq!(slots, vec![FreeSlot { start: at(9, 0), end: at(12, 0) }]);
    }

    #[test]
    fn test_whole_window_too_short_yields_nothing() {
        let slots = free_slots(at(9, 0), at(9, 20), Duration::minutes(30), &[]);
        assert!(slots.is_empty());
    }

    #[test]
    fn test_event_spanning_window_yields_nothing() {
        let slots = free_slots(
            at(9, 0),
            at(12, 0),
            Duration::minutes(15),
            &[busy(at(8, 0), at(13, 0))],
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_sub_minimum_gaps_are_suppressed() {
        // Gaps of 20 minutes on both sides of the event, minimum 30.
        let slots = free_slots(
            at(9, 0),
            at(10, 0),
            Duration::minutes(30),
            &[busy(at(9, 20), at(9, 40))],
        );
        assert!(slots.is_empty());
    }

    #[test]
    fn test_exact_fit_slot_is_emitted() {
        let slots = free_slots(at(9, 0), at(10, 0), Duration::minutes(60), &[]);
        assert_eq!(slots.len(), 1);
    }

    #[test]
    fn test_unsorted_input_is_handled() {
        let slots = free_slots(
            at(9, 0),
            at(12, 0),
            Duration::minutes(30),
            &[busy(at(11, 0), at(11, 15)), busy(at(9, 30), at(10, 0))],
        );

        assert_eq!(
            slots,
            vec![
                FreeSlot { start: at(10, 0), end: at(11, 0) },
                FreeSlot { start: at(11, 15), end: at(12, 0) },
            ]
        );
    }

    #[test]
    fn test_events_straddling_window_edges_are_clipped() {
        let slots = free_slots(
            at(9, 0),
            at(12, 0),
            Duration::minutes(30),
            &[busy(at(8, 0), at(9, 30)), busy(at(11, 30), at(13, 0))],
        );
        assert_eq!(slots, vec![FreeSlot { start: at(9, 30), end: at(11, 30) }]);
    }

    #[test]
    fn test_contained_event_does_not_move_cursor_backwards() {
        // Second event ends before the first one does.
        let slots = free_slots(
            at(9, 0),
            at(12, 0),
            Duration::minutes(15),
            &[busy(at(9, 0), at(11, 0)), busy(at(9, 30), at(10, 0))],
        );
        assert_eq!(slots, vec![FreeSlot { start: at(11, 0), end: at(12, 0) }]);
    }

    #[tokio::test]
    async fn test_find_free_time_rejects_inverted_window() {
        let api = CalendarApi::new("token".to_string()).unwrap();
        let result = find_free_time(
            &api,
            at(12, 0),
            at(9, 0),
            Duration::minutes(30),
            &["primary".to_string()],
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }

    #[tokio::test]
    async fn test_find_free_time_rejects_non_positive_duration() {
        let api = CalendarApi::new("token".to_string()).unwrap();
        let result = find_free_time(
            &api,
            at(9, 0),
            at(12, 0),
            Duration::minutes(0),
            &["primary".to_string()],
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidArgs(_))));
    }

    #[test]
    fn test_busy_intervals_parses_timed_events() {
        let events = vec![json!({
            "summary": "standup",
            "start": { "dateTime": "2026-08-05T09:00:00+00:00" },
            "end": { "dateTime": "2026-08-05T09:15:00+00:00" }
        })];

        let intervals = busy_intervals(&events);
        assert_eq!(intervals, vec![busy(at(9, 0), at(9, 15))]);
    }

    #[test]
    fn test_busy_intervals_parses_all_day_events() {
        let events = vec![json!({
            "start": { "date": "2026-08-05" },
            "end": { "date": "2026-08-06" }
        })];

        let intervals = busy_intervals(&events);
        assert_eq!(intervals.len(), 1);
        assert_eq!(intervals[0].start, at(0, 0));
        assert_eq!(intervals[0].end - intervals[0].start, Duration::days(1));
    }

    #[test]
    fn test_busy_intervals_skips_cancelled_and_malformed() {
        let events = vec![
            json!({
                "status": "cancelled",
                "start": { "dateTime": "2026-08-05T09:00:00+00:00" },
                "end": { "dateTime": "2026-08-05T10:00:00+00:00" }
            }),
            json!({ "summary": "no times" }),
            json!({
                "start": { "dateTime": "garbage" },
                "end": { "dateTime": "2026-08-05T10:00:00+00:00" }
            }),
        ];

        assert!(busy_intervals(&events).is_empty());
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const WINDOW_MINUTES: i64 = 720;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 5, 0, 0, 0).unwrap()
    }

    prop_compose! {
        fn busy_set()(intervals in prop::collection::vec((0i64..WINDOW_MINUTES, 1i64..180), 0..12))
            -> Vec<BusyInterval>
        {
            intervals
                .into_iter()
                .map(|(offset, len)| BusyInterval {
                    start: base() + Duration::minutes(offset),
                    end: base() + Duration::minutes(offset + len),
                })
                .collect()
        }
    }

    proptest! {
        #[test]
        fn slots_partition_the_window(busy in busy_set(), min_minutes in 1i64..120) {
            let window_start = base();
            let window_end = base() + Duration::minutes(WINDOW_MINUTES);
            let min_duration = Duration::minutes(min_minutes);

            let slots = free_slots(window_start, window_end, min_duration, &busy);

            // Every slot meets the minimum and stays inside the window.
            for slot in &slots {
                prop_assert!(slot.end - slot.start >= min_duration);
                prop_assert!(slot.start >= window_start);
                prop_assert!(slot.end <= window_end);
            }

            // Slots are ordered and disjoint.
            for pair in slots.windows(2) {
                prop_assert!(pair[0].end <= pair[1].start);
            }

            // No slot intersects any busy interval.
            for slot in &slots {
                for interval in &busy {
                    prop_assert!(slot.end <= interval.start || slot.start >= interval.end);
                }
            }

            // Partition property at minute resolution: every maximal free run
            // is emitted as a slot when it meets the minimum, and the slots
            // are exactly those runs.
            let mut runs: Vec<(i64, i64)> = Vec::new();
            let mut run_start: Option<i64> = None;
            for minute in 0..WINDOW_MINUTES {
                let t = base() + Duration::minutes(minute);
                let busy_now = busy.iter().any(|iv| t >= iv.start && t < iv.end);
                match (busy_now, run_start) {
                    (false, None) => run_start = Some(minute),
                    (true, Some(start)) => {
                        runs.push((start, minute));
                        run_start = None;
                    }
                    _ => {}
                }
            }
            if let Some(start) = run_start {
                runs.push((start, WINDOW_MINUTES));
            }

            let expected: Vec<FreeSlot> = runs
                .into_iter()
                .filter(|(start, end)| end - start >= min_minutes)
                .map(|(start, end)| FreeSlot {
                    start: base() + Duration::minutes(start),
                    end: base() + Duration::minutes(end),
                })
                .collect();

            prop_assert_eq!(slots, expected);
        }
    }
}
