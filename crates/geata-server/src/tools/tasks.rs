//! Tasks tools

use serde_json::{json, Value};

use geata_protocol::{ToolCallResult, ToolDefinition};

use super::{optional_bool, optional_str, require_str, ServerContext};
use crate::common::{Error, Result};
use crate::google::tasks::TaskPatch;
use crate::google::TasksApi;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "google_tasks_set_default_list".to_string(),
            description: "Set the default task list used when no taskListId is given".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskListId": { "type": "string", "description": "Task list ID (use '@default' for the account default)" }
                },
                "required": ["taskListId"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_list_tasklists".to_string(),
            description: "List all task lists".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "google_tasks_list_tasks".to_string(),
            description: "List tasks in a task list".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskListId": { "type": "string" },
                    "showCompleted": { "type": "boolean", "description": "Include completed tasks (default false)" }
                }
            }),
        },
        ToolDefinition {
            name: "google_tasks_get_task".to_string(),
            description: "Get one task's details".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "taskListId": { "type": "string" }
                },
                "required": ["taskId"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_create_task".to_string(),
            description: "Create a task".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" },
                    "notes": { "type": "string" },
                    "due": { "type": "string", "description": "Due date, RFC 3339" },
                    "taskListId": { "type": "string" }
                },
                "required": ["title"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_update_task".to_string(),
            description: "Update fields of an existing task".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "title": { "type": "string" },
                    "notes": { "type": "string" },
                    "due": { "type": "string" },
                    "status": { "type": "string", "enum": ["needsAction", "completed"] },
                    "taskListId": { "type": "string" }
                },
                "required": ["taskId"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_complete_task".to_string(),
            description: "Mark a task as completed".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "taskListId": { "type": "string" }
                },
                "required": ["taskId"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_delete_task".to_string(),
            description: "Delete a task".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskId": { "type": "string" },
                    "taskListId": { "type": "string" }
                },
                "required": ["taskId"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_create_tasklist".to_string(),
            description: "Create a new task list".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": { "type": "string" }
                },
                "required": ["title"]
            }),
        },
        ToolDefinition {
            name: "google_tasks_delete_tasklist".to_string(),
            description: "Delete a task list and all tasks in it".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "taskListId": { "type": "string" }
                },
                "required": ["taskListId"]
            }),
        },
    ]
}

pub async fn handle(ctx: &ServerContext, tool: &str, args: &Value) -> Result<ToolCallResult> {
    match tool {
        "google_tasks_set_default_list" => set_default_list(ctx, args).await,
        "google_tasks_list_tasklists" => list_task_lists(ctx).await,
        "google_tasks_list_tasks" => list_tasks(ctx, args).await,
        "google_tasks_get_task" => get_task(ctx, args).await,
        "google_tasks_create_task" => create_task(ctx, args).await,
        "google_tasks_update_task" => update_task(ctx, args).await,
        "google_tasks_complete_task" => complete_task(ctx, args).await,
        "google_tasks_delete_task" => delete_task(ctx, args).await,
        "google_tasks_create_tasklist" => create_task_list(ctx, args).await,
        "google_tasks_delete_tasklist" => delete_task_list(ctx, args).await,
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

async fn api(ctx: &ServerContext) -> Result<TasksApi> {
    TasksApi::new(ctx.auth.access_token().await?)
}

async fn target_list(ctx: &ServerContext, args: &Value) -> Result<String> {
    Ok(match optional_str(args, "taskListId")? {
        Some(id) => id.to_string(),
        None => ctx.session.read().await.default_task_list_id.clone(),
    })
}

/// Render one task as the multi-line detail block the listings share.
fn render_task(task: &Value) -> String {
    let mut lines = vec![
        format!(
            "{} - ID: {}",
            task.get("title").and_then(|v| v.as_str()).unwrap_or(""),
            task.get("id").and_then(|v| v.as_str()).unwrap_or("")
        ),
        format!(
            "Status: {}",
            task.get("status").and_then(|v| v.as_str()).unwrap_or("")
        ),
    ];

    if let Some(due) = task.get("due").and_then(|v| v.as_str()) {
        lines.push(format!("Due: {due}"));
    }
    if let Some(completed) = task.get("completed").and_then(|v| v.as_str()) {
        lines.push(format!("Completed: {completed}"));
    }
    if let Some(notes) = task.get("notes").and_then(|v| v.as_str()) {
        lines.push(format!("Notes: {notes}"));
    }

    lines.join("\n")
}

async fn set_default_list(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let task_list_id = require_str(args, "taskListId")?;
    ctx.session.write().await.default_task_list_id = task_list_id.to_string();
    Ok(ToolCallResult::text(format!(
        "Default task list ID set to: {task_list_id}"
    )))
}

async fn list_task_lists(ctx: &ServerContext) -> Result<ToolCallResult> {
    let lists = api(ctx).await?.list_task_lists().await?;

    if lists.is_empty() {
        return Ok(ToolCallResult::text("No task lists found."));
    }

    let listing = lists
        .iter()
        .map(|list| {
            format!(
                "{} - ID: {}",
                list.get("title").and_then(|v| v.as_str()).unwrap_or(""),
                list.get("id").and_then(|v| v.as_str()).unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ToolCallResult::text(listing))
}

async fn list_tasks(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let show_completed = optional_bool(args, "showCompleted")?.unwrap_or(false);
    let task_list_id = target_list(ctx, args).await?;

    let tasks = api(ctx)
        .await?
        .list_tasks(&task_list_id, show_completed)
        .await?;

    if tasks.is_empty() {
        return Ok(ToolCallResult::text(format!(
            "No tasks found in task list: {task_list_id}"
        )));
    }

    let listing = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| format!("[{}] {}", i + 1, render_task(task)))
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(ToolCallResult::text(listing))
}

async fn get_task(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let task_id = require_str(args, "taskId")?;
    let task_list_id = target_list(ctx, args).await?;

    let task = api(ctx).await?.get_task(&task_list_id, task_id).await?;
    Ok(ToolCallResult::text(format!("Task: {}", render_task(&task))))
}

async fn create_task(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let title = require_str(args, "title")?;
    let notes = optional_str(args, "notes")?;
    let due = optional_str(args, "due")?;
    let task_list_id = target_list(ctx, args).await?;

    let task = api(ctx)
        .await?
        .create_task(&task_list_id, title, notes, due)
        .await?;

    Ok(ToolCallResult::text(format!(
        "Task created: \"{}\" with ID: {}",
        task.get("title").and_then(|v| v.as_str()).unwrap_or(title),
        task.get("id").and_then(|v| v.as_str()).unwrap_or("?")
    )))
}

async fn update_task(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let task_id = require_str(args, "taskId")?;
    let patch = TaskPatch {
        title: optional_str(args, "title")?.map(String::from),
        notes: optional_str(args, "notes")?.map(String::from),
        due: optional_str(args, "due")?.map(String::from),
        status: optional_str(args, "status")?.map(String::from),
    };
    let task_list_id = target_list(ctx, args).await?;

    let task = api(ctx)
        .await?
        .update_task(&task_list_id, task_id, &patch)
        .await?;

    Ok(ToolCallResult::text(format!(
        "Task updated: \"{}\" with ID: {}",
        task.get("title").and_then(|v| v.as_str()).unwrap_or(""),
        task.get("id").and_then(|v| v.as_str()).unwrap_or(task_id)
    )))
}

async fn complete_task(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let task_id = require_str(args, "taskId")?;
    let task_list_id = target_list(ctx, args).await?;

    api(ctx)
        .await?
        .complete_task(&task_list_id, task_id)
        .await?;

    Ok(ToolCallResult::text(format!(
        "Task {task_id} marked as completed."
    )))
}

async fn delete_task(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let task_id = require_str(args, "taskId")?;
    let task_list_id = target_list(ctx, args).await?;

    api(ctx).await?.delete_task(&task_list_id, task_id).await?;

    Ok(ToolCallResult::text(format!(
        "Task {task_id} deleted from task list {task_list_id}."
    )))
}

async fn create_task_list(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let title = require_str(args, "title")?;

    let list = api(ctx).await?.create_task_list(title).await?;

    Ok(ToolCallResult::text(format!(
        "Task list created: \"{}\" with ID: {}",
        list.get("title").and_then(|v| v.as_str()).unwrap_or(title),
        list.get("id").and_then(|v| v.as_str()).unwrap_or("?")
    )))
}

async fn delete_task_list(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let task_list_id = require_str(args, "taskListId")?;

    api(ctx).await?.delete_task_list(task_list_id).await?;

    Ok(ToolCallResult::text(format!(
        "Task list {task_list_id} deleted."
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_context;

    #[test]
    fn test_render_task_skips_absent_fields() {
        let task = json!({
            "title": "Write report",
            "id": "t1",
            "status": "needsAction"
        });
        let rendered = render_task(&task);
        assert!(rendered.contains("Write report - ID: t1"));
        assert!(rendered.contains("Status: needsAction"));
        assert!(!rendered.contains("Due:"));
        assert!(!rendered.contains("Notes:"));
    }

    #[test]
    fn test_render_task_with_all_fields() {
        let task = json!({
            "title": "Write report",
            "id": "t1",
            "status": "completed",
            "due": "2026-08-06T00:00:00.000Z",
            "completed": "2026-08-05T12:00:00.000Z",
            "notes": "include Q3 numbers"
        });
        let rendered = render_task(&task);
        assert!(rendered.contains("Due: 2026-08-06T00:00:00.000Z"));
        assert!(rendered.contains("Completed: 2026-08-05T12:00:00.000Z"));
        assert!(rendered.contains("Notes: include Q3 numbers"));
    }

    #[tokio::test]
    async fn test_set_default_list_updates_session() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let result = handle(
            &ctx,
            "google_tasks_set_default_list",
            &json!({"taskListId": "work-list"}),
        )
        .await
        .unwrap();

        let text = result.content[0].text.as_deref().unwrap();
        assert_eq!(text, "Default task list ID set to: work-list");
        assert_eq!(ctx.session.read().await.default_task_list_id, "work-list");
    }

    #[tokio::test]
    async fn test_create_task_requires_title() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(&ctx, "google_tasks_create_task", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }
}
