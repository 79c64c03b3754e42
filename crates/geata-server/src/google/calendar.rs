//! Google Calendar API v3 Client
//!
//! List calendars, list/get/create/update/delete events. Events are kept as
//! raw JSON values; the tool layer decides how to render them.

use serde_json::{json, Value};
use tracing::{debug, info};

use super::client::GoogleClient;
use super::common::extract_array;
use crate::common::Result;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

pub struct CalendarApi {
    client: GoogleClient,
}

super::google_api_wrapper!(CalendarApi);

/// Optional event fields shared by create and update.
#[derive(Debug, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub location: Option<String>,
    pub color_id: Option<String>,
    pub attendees: Option<Vec<String>>,
    pub recurrence: Option<String>,
}

impl CalendarApi {
    /// List all calendars visible to the authenticated user.
    pub async fn list_calendars(&self) -> Result<Vec<Value>> {
        info!("listing Google calendars");

        let url = format!("{CALENDAR_API_BASE}/users/me/calendarList");
        let response = self.client.get(&url, &[]).await?;

        let calendars = extract_array(&response, "items");
        debug!(count = calendars.len(), "calendars retrieved");
        Ok(calendars)
    }

    /// List events in a calendar, expanded to single instances and ordered
    /// by start time.
    ///
    /// `time_min`/`time_max` are RFC 3339 bounds; `query` is a free-text
    /// filter applied server-side.
    pub async fn list_events(
        &self,
        calendar_id: &str,
        time_min: Option<&str>,
        time_max: Option<&str>,
        query: Option<&str>,
        show_deleted: bool,
        max_results: Option<usize>,
    ) -> Result<Vec<Value>> {
        info!(calendar_id, "listing events");

        let mut query_params = vec![
            ("orderBy", "startTime".to_string()),
            ("singleEvents", "true".to_string()),
        ];

        if let Some(min) = time_min {
            query_params.push(("timeMin", min.to_string()));
        }
        if let Some(max) = time_max {
            query_params.push(("timeMax", max.to_string()));
        }
        if let Some(q) = query {
            query_params.push(("q", q.to_string()));
        }
        if show_deleted {
            query_params.push(("showDeleted", "true".to_string()));
        }

        let url = format!("{CALENDAR_API_BASE}/calendars/{calendar_id}/events");
        let events = self
            .client
            .get_paginated(&url, &query_params, "items", max_results)
            .await?;

        debug!(count = events.len(), "events retrieved");
        Ok(events)
    }

    /// Get a specific event by ID.
    pub async fn get_event(&self, calendar_id: &str, event_id: &str) -> Result<Value> {
        info!(calendar_id, event_id, "fetching event");

        let url = format!("{CALENDAR_API_BASE}/calendars/{calendar_id}/events/{event_id}");
        self.client.get(&url, &[]).await
    }

    /// Create a new event. `start` and `end` accept RFC 3339 timestamps or
    /// date-only YYYY-MM-DD values (all-day events).
    pub async fn create_event(
        &self,
        calendar_id: &str,
        summary: &str,
        start: &str,
        end: &str,
        extras: &EventPatch,
    ) -> Result<Value> {
        info!(calendar_id, summary, "creating event");

        let mut event = json!({
            "summary": summary,
            "start": parse_datetime(start),
            "end": parse_datetime(end),
        });
        apply_patch(&mut event, extras);

        let url = format!("{CALENDAR_API_BASE}/calendars/{calendar_id}/events");
        let response = self.client.post(&url, &event).await?;

        info!("event created");
        Ok(response)
    }

    /// Update an existing event: fetch the current record, overlay the
    /// provided fields, and put the merged result back.
    pub async fn update_event(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<Value> {
        info!(calendar_id, event_id, "updating event");

        let mut event = self.get_event(calendar_id, event_id).await?;
        apply_patch(&mut event, patch);

        let url = format!("{CALENDAR_API_BASE}/calendars/{calendar_id}/events/{event_id}");
        let response = self.client.put(&url, &event).await?;

        info!("event updated");
        Ok(response)
    }

    /// Delete an event.
    pub async fn delete_event(&self, calendar_id: &str, event_id: &str) -> Result<()> {
        info!(calendar_id, event_id, "deleting event");

        let url = format!("{CALENDAR_API_BASE}/calendars/{calendar_id}/events/{event_id}");
        self.client.delete(&url).await?;

        info!("event deleted");
        Ok(())
    }
}

/// Overlay the provided patch fields onto an event body.
fn apply_patch(event: &mut Value, patch: &EventPatch) {
    if let Some(s) = &patch.summary {
        event["summary"] = json!(s);
    }
    if let Some(d) = &patch.description {
        event["description"] = json!(d);
    }
    if let Some(st) = &patch.start {
        event["start"] = parse_datetime(st);
    }
    if let Some(e) = &patch.end {
        event["end"] = parse_datetime(e);
    }
    if let Some(l) = &patch.location {
        event["location"] = json!(l);
    }
    if let Some(c) = &patch.color_id {
        event["colorId"] = json!(c);
    }
    if let Some(attendees) = &patch.attendees {
        let list: Vec<Value> = attendees.iter().map(|a| json!({ "email": a })).collect();
        event["attendees"] = json!(list);
    }
    if let Some(r) = &patch.recurrence {
        // The API takes a list of RRULE lines.
        event["recurrence"] = json!([r]);
    }
}

/// Turn a datetime string into the Calendar API's start/end shape:
/// date-only values become all-day `{date}`, everything else `{dateTime}`.
fn parse_datetime(dt: &str) -> Value {
    if dt.len() == 10 && !dt.contains('T') {
        json!({ "date": dt })
    } else {
        json!({ "dateTime": dt })
    }
}
