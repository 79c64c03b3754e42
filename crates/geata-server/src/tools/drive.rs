//! Drive tools

use serde_json::{json, Value};

use geata_protocol::{ToolCallResult, ToolDefinition};

use super::{optional_bool, optional_str, optional_u64, require_str, ServerContext};
use crate::common::{Error, Result};
use crate::google::DriveApi;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "google_drive_list_files".to_string(),
            description: "List Drive files matching a query".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Drive search query (default: 'trashed = false')" },
                    "pageSize": { "type": "integer", "description": "Maximum number of files (default 10)" },
                    "orderBy": { "type": "string", "description": "Sort order (default: 'modifiedTime desc')" },
                    "fields": { "type": "string", "description": "Metadata fields to return" }
                }
            }),
        },
        ToolDefinition {
            name: "google_drive_get_file_content".to_string(),
            description: "Get a file's content as text (native Google docs are exported)".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fileId": { "type": "string" }
                },
                "required": ["fileId"]
            }),
        },
        ToolDefinition {
            name: "google_drive_create_file".to_string(),
            description: "Create a Drive file with the given content".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "content": { "type": "string" },
                    "mimeType": { "type": "string", "description": "Content type (default text/plain); native Google types create an empty document" },
                    "folderId": { "type": "string", "description": "Parent folder ID" }
                },
                "required": ["name", "content"]
            }),
        },
        ToolDefinition {
            name: "google_drive_update_file".to_string(),
            description: "Replace a Drive file's content".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fileId": { "type": "string" },
                    "content": { "type": "string" },
                    "mimeType": { "type": "string" }
                },
                "required": ["fileId", "content"]
            }),
        },
        ToolDefinition {
            name: "google_drive_delete_file".to_string(),
            description: "Move a Drive file to trash, or delete it permanently".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fileId": { "type": "string" },
                    "permanently": { "type": "boolean", "description": "Skip trash and delete outright (default false)" }
                },
                "required": ["fileId"]
            }),
        },
        ToolDefinition {
            name: "google_drive_share_file".to_string(),
            description: "Share a Drive file with a user".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "fileId": { "type": "string" },
                    "emailAddress": { "type": "string" },
                    "role": { "type": "string", "enum": ["reader", "commenter", "writer"], "description": "Access level (default reader)" },
                    "sendNotification": { "type": "boolean", "description": "Send a notification email (default true)" },
                    "message": { "type": "string", "description": "Custom notification message" }
                },
                "required": ["fileId", "emailAddress"]
            }),
        },
    ]
}

pub async fn handle(ctx: &ServerContext, tool: &str, args: &Value) -> Result<ToolCallResult> {
    match tool {
        "google_drive_list_files" => list_files(ctx, args).await,
        "google_drive_get_file_content" => get_file_content(ctx, args).await,
        "google_drive_create_file" => create_file(ctx, args).await,
        "google_drive_update_file" => update_file(ctx, args).await,
        "google_drive_delete_file" => delete_file(ctx, args).await,
        "google_drive_share_file" => share_file(ctx, args).await,
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

async fn api(ctx: &ServerContext) -> Result<DriveApi> {
    DriveApi::new(ctx.auth.access_token().await?)
}

/// Render a file size in KB the way the listing shows it.
fn format_size(file: &Value) -> String {
    file.get("size")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<f64>().ok())
        .map(|bytes| format!("{:.2} KB", bytes / 1024.0))
        .unwrap_or_else(|| "N/A".to_string())
}

async fn list_files(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let query = optional_str(args, "query")?;
    let page_size = optional_u64(args, "pageSize")?.unwrap_or(10) as usize;
    let order_by = optional_str(args, "orderBy")?;
    let fields = optional_str(args, "fields")?;

    let files = api(ctx)
        .await?
        .list_files(query, page_size, order_by, fields)
        .await?;

    if files.is_empty() {
        return Ok(ToolCallResult::text("No files found."));
    }

    let listing = files
        .iter()
        .map(|file| {
            format!(
                "{} ({})\nID: {}\nModified: {}\nSize: {}\nLink: {}",
                file.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                file.get("mimeType").and_then(|v| v.as_str()).unwrap_or(""),
                file.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                file.get("modifiedTime").and_then(|v| v.as_str()).unwrap_or(""),
                format_size(file),
                file.get("webViewLink").and_then(|v| v.as_str()).unwrap_or("N/A")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    Ok(ToolCallResult::text(listing))
}

async fn get_file_content(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let file_id = require_str(args, "fileId")?;
    let content = api(ctx).await?.get_file_content(file_id).await?;
    Ok(ToolCallResult::text(content))
}

async fn create_file(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let name = require_str(args, "name")?;
    let content = require_str(args, "content")?;
    let mime_type = optional_str(args, "mimeType")?.unwrap_or("text/plain");
    let folder_id = optional_str(args, "folderId")?;

    let file = api(ctx)
        .await?
        .create_file(name, content, mime_type, folder_id)
        .await?;

    let id = file.get("id").and_then(|v| v.as_str()).unwrap_or("?");
    let link = file
        .get("webViewLink")
        .and_then(|v| v.as_str())
        .unwrap_or("N/A");

    Ok(ToolCallResult::text(
        if mime_type.starts_with("application/vnd.google-apps") {
            format!("Created {mime_type} with name: {name}\nID: {id}\nLink: {link}")
        } else {
            format!("Created file with name: {name}\nID: {id}\nLink: {link}")
        },
    ))
}

async fn update_file(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let file_id = require_str(args, "fileId")?;
    let content = require_str(args, "content")?;
    let mime_type = optional_str(args, "mimeType")?;

    let file = api(ctx)
        .await?
        .update_file_content(file_id, content, mime_type)
        .await?;

    let name = file.get("name").and_then(|v| v.as_str()).unwrap_or(file_id);
    Ok(ToolCallResult::text(format!(
        "File '{name}' updated successfully."
    )))
}

async fn delete_file(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let file_id = require_str(args, "fileId")?;
    let permanently = optional_bool(args, "permanently")?.unwrap_or(false);

    let drive = api(ctx).await?;

    if permanently {
        drive.delete_file(file_id).await?;
        Ok(ToolCallResult::text(format!(
            "File with ID {file_id} permanently deleted."
        )))
    } else {
        drive.trash_file(file_id).await?;
        Ok(ToolCallResult::text(format!(
            "File with ID {file_id} moved to trash."
        )))
    }
}

async fn share_file(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let file_id = require_str(args, "fileId")?;
    let email_address = require_str(args, "emailAddress")?;
    let role = optional_str(args, "role")?.unwrap_or("reader");
    let send_notification = optional_bool(args, "sendNotification")?.unwrap_or(true);
    let message = optional_str(args, "message")?;

    let name = api(ctx)
        .await?
        .share_file(file_id, email_address, role, send_notification, message)
        .await?;

    Ok(ToolCallResult::text(format!(
        "File '{name}' shared with {email_address} as {role}."
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_context;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(&json!({"size": "2048"})), "2.00 KB");
        assert_eq!(format_size(&json!({"size": "1536"})), "1.50 KB");
        assert_eq!(format_size(&json!({})), "N/A");
    }

    #[tokio::test]
    async fn test_create_file_requires_content() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(&ctx, "google_drive_create_file", &json!({"name": "a.txt"}))
            .await
            .unwrap_err();

        match err {
            Error::InvalidArgs(msg) => assert!(msg.contains("content")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_share_file_requires_email() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(&ctx, "google_drive_share_file", &json!({"fileId": "f1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }
}
