//! Calendar tools

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde_json::{json, Value};

use geata_protocol::{ToolCallResult, ToolDefinition};

use super::{
    optional_bool, optional_str, optional_str_list, optional_u64, require_f64, require_str,
    ServerContext,
};
use crate::common::{Error, Result};
use crate::google::calendar::EventPatch;
use crate::google::CalendarApi;
use crate::schedule;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "google_calendar_set_default".to_string(),
            description: "Set the default calendar used when no calendarId is given".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "calendarId": {
                        "type": "string",
                        "description": "Calendar ID (use 'primary' for the account's primary calendar)"
                    }
                },
                "required": ["calendarId"]
            }),
        },
        ToolDefinition {
            name: "google_calendar_list_calendars".to_string(),
            description: "List all calendars visible to the authenticated account".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "google_calendar_create_event".to_string(),
            description: "Create a calendar event".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "summary": { "type": "string", "description": "Event title" },
                    "start": { "type": "string", "description": "Start (RFC 3339 timestamp, or YYYY-MM-DD for all-day)" },
                    "end": { "type": "string", "description": "End (RFC 3339 timestamp, or YYYY-MM-DD for all-day)" },
                    "calendarId": { "type": "string", "description": "Target calendar (defaults to the session default)" },
                    "description": { "type": "string" },
                    "location": { "type": "string" },
                    "colorId": { "type": "string" },
                    "attendees": { "type": "array", "items": { "type": "string" }, "description": "Attendee email addresses" },
                    "recurrence": { "type": "string", "description": "RRULE line, e.g. RRULE:FREQ=WEEKLY" }
                },
                "required": ["summary", "start", "end"]
            }),
        },
        ToolDefinition {
            name: "google_calendar_get_events".to_string(),
            description: "List upcoming events from a calendar".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "limit": { "type": "integer", "description": "Maximum number of events (default 10)" },
                    "calendarId": { "type": "string" },
                    "timeMin": { "type": "string", "description": "Lower bound, RFC 3339 (default: now)" },
                    "timeMax": { "type": "string", "description": "Upper bound, RFC 3339" },
                    "q": { "type": "string", "description": "Free-text search filter" },
                    "showDeleted": { "type": "boolean" }
                }
            }),
        },
        ToolDefinition {
            name: "google_calendar_get_event".to_string(),
            description: "Get one event's full details".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "eventId": { "type": "string" },
                    "calendarId": { "type": "string" }
                },
                "required": ["eventId"]
            }),
        },
        ToolDefinition {
            name: "google_calendar_update_event".to_string(),
            description: "Update fields of an existing event".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "eventId": { "type": "string" },
                    "calendarId": { "type": "string" },
                    "summary": { "type": "string" },
                    "description": { "type": "string" },
                    "start": { "type": "string" },
                    "end": { "type": "string" },
                    "location": { "type": "string" },
                    "colorId": { "type": "string" },
                    "attendees": { "type": "array", "items": { "type": "string" } },
                    "recurrence": { "type": "string" }
                },
                "required": ["eventId"]
            }),
        },
        ToolDefinition {
            name: "google_calendar_delete_event".to_string(),
            description: "Delete an event".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "eventId": { "type": "string" },
                    "calendarId": { "type": "string" }
                },
                "required": ["eventId"]
            }),
        },
        ToolDefinition {
            name: "google_calendar_find_free_time".to_string(),
            description: "Find free time slots of at least a minimum duration across one or more calendars"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "startDate": { "type": "string", "description": "Window start, RFC 3339 or YYYY-MM-DD" },
                    "endDate": { "type": "string", "description": "Window end, RFC 3339 or YYYY-MM-DD" },
                    "duration": { "type": "number", "description": "Minimum slot length in minutes" },
                    "calendarIds": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Calendars to consider (defaults to the session default)"
                    }
                },
                "required": ["startDate", "endDate", "duration"]
            }),
        },
    ]
}

pub async fn handle(ctx: &ServerContext, tool: &str, args: &Value) -> Result<ToolCallResult> {
    match tool {
        "google_calendar_set_default" => set_default(ctx, args).await,
        "google_calendar_list_calendars" => list_calendars(ctx).await,
        "google_calendar_create_event" => create_event(ctx, args).await,
        "google_calendar_get_events" => get_events(ctx, args).await,
        "google_calendar_get_event" => get_event(ctx, args).await,
        "google_calendar_update_event" => update_event(ctx, args).await,
        "google_calendar_delete_event" => delete_event(ctx, args).await,
        "google_calendar_find_free_time" => find_free_time(ctx, args).await,
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

async fn api(ctx: &ServerContext) -> Result<CalendarApi> {
    CalendarApi::new(ctx.auth.access_token().await?)
}

async fn default_calendar(ctx: &ServerContext) -> String {
    ctx.session.read().await.default_calendar_id.clone()
}

async fn target_calendar(ctx: &ServerContext, args: &Value) -> Result<String> {
    Ok(match optional_str(args, "calendarId")? {
        Some(id) => id.to_string(),
        None => default_calendar(ctx).await,
    })
}

async fn set_default(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let calendar_id = require_str(args, "calendarId")?;
    ctx.session.write().await.default_calendar_id = calendar_id.to_string();
    Ok(ToolCallResult::text(format!(
        "Default calendar ID set to: {calendar_id}"
    )))
}

async fn list_calendars(ctx: &ServerContext) -> Result<ToolCallResult> {
    let calendars = api(ctx).await?.list_calendars().await?;

    let formatted = calendars
        .iter()
        .map(|cal| {
            let summary = cal.get("summary").and_then(|v| v.as_str()).unwrap_or("");
            let primary = cal.get("primary").and_then(|v| v.as_bool()).unwrap_or(false);
            let id = cal.get("id").and_then(|v| v.as_str()).unwrap_or("");
            format!(
                "{summary}{} - ID: {id}",
                if primary { " (Primary)" } else { "" }
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ToolCallResult::text(if formatted.is_empty() {
        "No calendars found.".to_string()
    } else {
        formatted
    }))
}

fn patch_from_args(args: &Value) -> Result<EventPatch> {
    Ok(EventPatch {
        summary: optional_str(args, "summary")?.map(String::from),
        description: optional_str(args, "description")?.map(String::from),
        start: optional_str(args, "start")?.map(String::from),
        end: optional_str(args, "end")?.map(String::from),
        location: optional_str(args, "location")?.map(String::from),
        color_id: optional_str(args, "colorId")?.map(String::from),
        attendees: optional_str_list(args, "attendees")?,
        recurrence: optional_str(args, "recurrence")?.map(String::from),
    })
}

async fn create_event(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let summary = require_str(args, "summary")?;
    let start = require_str(args, "start")?;
    let end = require_str(args, "end")?;
    let mut extras = patch_from_args(args)?;
    // summary/start/end go in positionally
    extras.summary = None;
    extras.start = None;
    extras.end = None;
    let calendar_id = target_calendar(ctx, args).await?;

    let event = api(ctx)
        .await?
        .create_event(&calendar_id, summary, start, end, &extras)
        .await?;

    let id = event.get("id").and_then(|v| v.as_str()).unwrap_or("?");
    Ok(ToolCallResult::text(format!(
        "Event created with ID: {id} in calendar: {calendar_id}"
    )))
}

/// Render an event's start or end, whichever of dateTime/date is present.
fn event_edge(event: &Value, edge: &str) -> String {
    event
        .get(edge)
        .and_then(|v| {
            v.get("dateTime")
                .or_else(|| v.get("date"))
                .and_then(|t| t.as_str())
        })
        .unwrap_or("")
        .to_string()
}

async fn get_events(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let limit = optional_u64(args, "limit")?.unwrap_or(10) as usize;
    let time_min = optional_str(args, "timeMin")?.map(String::from);
    let time_max = optional_str(args, "timeMax")?.map(String::from);
    let query = optional_str(args, "q")?;
    let show_deleted = optional_bool(args, "showDeleted")?.unwrap_or(false);
    let calendar_id = target_calendar(ctx, args).await?;

    // Default to listing upcoming events.
    let time_min = time_min.unwrap_or_else(|| Utc::now().to_rfc3339());

    let events = api(ctx)
        .await?
        .list_events(
            &calendar_id,
            Some(&time_min),
            time_max.as_deref(),
            query,
            show_deleted,
            Some(limit),
        )
        .await?;

    let listing = events
        .iter()
        .map(|event| {
            let summary = event.get("summary").and_then(|v| v.as_str()).unwrap_or("");
            let id = event.get("id").and_then(|v| v.as_str()).unwrap_or("");
            format!(
                "{summary} ({} - {}) - ID: {id}",
                event_edge(event, "start"),
                event_edge(event, "end")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ToolCallResult::text(format!(
        "Calendar: {calendar_id}\n{}",
        if listing.is_empty() {
            "No upcoming events"
        } else {
            listing.as_str()
        }
    )))
}

async fn get_event(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let event_id = require_str(args, "eventId")?;
    let calendar_id = target_calendar(ctx, args).await?;

    let event = api(ctx).await?.get_event(&calendar_id, event_id).await?;

    let mut lines = vec![
        format!(
            "Event: {}",
            event.get("summary").and_then(|v| v.as_str()).unwrap_or("")
        ),
        format!(
            "ID: {}",
            event.get("id").and_then(|v| v.as_str()).unwrap_or("")
        ),
        format!("Start: {}", event_edge(&event, "start")),
        format!("End: {}", event_edge(&event, "end")),
    ];

    if let Some(location) = event.get("location").and_then(|v| v.as_str()) {
        lines.push(format!("Location: {location}"));
    }
    if let Some(description) = event.get("description").and_then(|v| v.as_str()) {
        lines.push(format!("Description: {description}"));
    }
    if let Some(attendees) = event.get("attendees").and_then(|v| v.as_array()) {
        let emails: Vec<&str> = attendees
            .iter()
            .filter_map(|a| a.get("email").and_then(|v| v.as_str()))
            .collect();
        if !emails.is_empty() {
            lines.push(format!("Attendees: {}", emails.join(", ")));
        }
    }
    if let Some(status) = event.get("status").and_then(|v| v.as_str()) {
        lines.push(format!("Status: {status}"));
    }

    Ok(ToolCallResult::text(lines.join("\n")))
}

async fn update_event(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let event_id = require_str(args, "eventId")?;
    let patch = patch_from_args(args)?;
    let calendar_id = target_calendar(ctx, args).await?;

    api(ctx)
        .await?
        .update_event(&calendar_id, event_id, &patch)
        .await?;

    Ok(ToolCallResult::text(format!(
        "Event {event_id} updated in calendar: {calendar_id}"
    )))
}

async fn delete_event(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let event_id = require_str(args, "eventId")?;
    let calendar_id = target_calendar(ctx, args).await?;

    api(ctx)
        .await?
        .delete_event(&calendar_id, event_id)
        .await?;

    Ok(ToolCallResult::text(format!(
        "Event {event_id} deleted from calendar: {calendar_id}"
    )))
}

/// Accept RFC 3339 timestamps and bare YYYY-MM-DD dates (midnight UTC).
fn parse_time_arg(raw: &str, key: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = day.and_hms_opt(0, 0, 0) {
            return Ok(DateTime::from_naive_utc_and_offset(midnight, Utc));
        }
    }
    Err(Error::InvalidArgs(format!(
        "parameter {key} is not a valid timestamp: {raw}"
    )))
}

async fn find_free_time(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let window_start = parse_time_arg(require_str(args, "startDate")?, "startDate")?;
    let window_end = parse_time_arg(require_str(args, "endDate")?, "endDate")?;
    let minutes = require_f64(args, "duration")? as i64;
    let min_duration = Duration::minutes(minutes);

    let calendar_ids = match optional_str_list(args, "calendarIds")? {
        Some(ids) if !ids.is_empty() => ids,
        _ => vec![default_calendar(ctx).await],
    };

    let slots = schedule::find_free_time(
        &api(ctx).await?,
        window_start,
        window_end,
        min_duration,
        &calendar_ids,
    )
    .await?;

    if slots.is_empty() {
        return Ok(ToolCallResult::text(format!(
            "No free time slots of at least {minutes} minutes found between {} and {}.",
            window_start.to_rfc3339(),
            window_end.to_rfc3339()
        )));
    }

    let listing = slots
        .iter()
        .map(|slot| {
            format!(
                "{} - {} ({} minutes)",
                slot.start.to_rfc3339(),
                slot.end.to_rfc3339(),
                (slot.end - slot.start).num_minutes()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ToolCallResult::text(format!(
        "Found {} available time slot(s) of at least {minutes} minutes:\n{listing}",
        slots.len()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_context;

    #[tokio::test]
    async fn test_set_default_updates_session() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let result = handle(
            &ctx,
            "google_calendar_set_default",
            &json!({"calendarId": "team@example.com"}),
        )
        .await
        .unwrap();

        let text = result.content[0].text.as_deref().unwrap();
        assert_eq!(text, "Default calendar ID set to: team@example.com");
        assert_eq!(
            ctx.session.read().await.default_calendar_id,
            "team@example.com"
        );
    }

    #[tokio::test]
    async fn test_find_free_time_requires_duration() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(
            &ctx,
            "google_calendar_find_free_time",
            &json!({"startDate": "2026-08-05T09:00:00Z", "endDate": "2026-08-05T17:00:00Z"}),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_find_free_time_rejects_garbage_dates() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(
            &ctx,
            "google_calendar_find_free_time",
            &json!({"startDate": "next tuesday", "endDate": "2026-08-05T17:00:00Z", "duration": 30}),
        )
        .await
        .unwrap_err();

        match err {
            Error::InvalidArgs(msg) => assert!(msg.contains("startDate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_time_arg_accepts_both_shapes() {
        let ts = parse_time_arg("2026-08-05T09:30:00+02:00", "startDate").unwrap();
        assert_eq!(ts.to_rfc3339(), "2026-08-05T07:30:00+00:00");

        let day = parse_time_arg("2026-08-05", "startDate").unwrap();
        assert_eq!(day.to_rfc3339(), "2026-08-05T00:00:00+00:00");
    }

    #[test]
    fn test_event_edge_prefers_datetime() {
        let event = json!({
            "start": { "dateTime": "2026-08-05T09:00:00Z" },
            "end": { "date": "2026-08-06" }
        });
        assert_eq!(event_edge(&event, "start"), "2026-08-05T09:00:00Z");
        assert_eq!(event_edge(&event, "end"), "2026-08-06");
    }

    #[tokio::test]
    async fn test_create_event_requires_summary() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(
            &ctx,
            "google_calendar_create_event",
            &json!({"start": "2026-08-05T09:00:00Z", "end": "2026-08-05T10:00:00Z"}),
        )
        .await
        .unwrap_err();

        match err {
            Error::InvalidArgs(msg) => assert!(msg.contains("summary")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
