//! Gmail tools

use serde_json::{json, Value};

use geata_protocol::{ToolCallResult, ToolDefinition};

use super::{
    optional_bool, optional_str, optional_str_list, optional_u64, require_str, require_str_list,
    RecentEmail, ServerContext,
};
use crate::common::{Error, Result};
use crate::google::gmail::render_message;
use crate::google::GmailApi;

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "google_gmail_list_labels".to_string(),
            description: "List all Gmail labels".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "google_gmail_list_emails".to_string(),
            description: "List emails, optionally filtered by label or search query".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "labelIds": { "type": "array", "items": { "type": "string" }, "description": "Label IDs to filter by (e.g. ['INBOX', 'UNREAD'])" },
                    "maxResults": { "type": "integer", "description": "Maximum number of emails (default 10)" },
                    "query": { "type": "string", "description": "Gmail search query (same syntax as the web UI)" }
                }
            }),
        },
        ToolDefinition {
            name: "google_gmail_get_email".to_string(),
            description: "Get one email's headers, snippet and body".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "messageId": { "type": "string" },
                    "format": { "type": "string", "enum": ["full", "metadata", "minimal", "raw"], "description": "Response detail level (default full)" }
                },
                "required": ["messageId"]
            }),
        },
        ToolDefinition {
            name: "google_gmail_get_email_by_index".to_string(),
            description: "Get an email by its [index] in the most recent listing".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "index": { "type": "integer", "description": "1-based index from the last google_gmail_list_emails result" },
                    "format": { "type": "string", "enum": ["full", "metadata", "minimal", "raw"] }
                },
                "required": ["index"]
            }),
        },
        ToolDefinition {
            name: "google_gmail_send_email".to_string(),
            description: "Send an email".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to": { "type": "array", "items": { "type": "string" }, "description": "Recipient addresses" },
                    "subject": { "type": "string" },
                    "body": { "type": "string" },
                    "cc": { "type": "array", "items": { "type": "string" } },
                    "bcc": { "type": "array", "items": { "type": "string" } },
                    "isHtml": { "type": "boolean", "description": "Send as HTML instead of plain text" }
                },
                "required": ["to", "subject", "body"]
            }),
        },
        ToolDefinition {
            name: "google_gmail_draft_email".to_string(),
            description: "Create a draft email without sending it".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "to": { "type": "array", "items": { "type": "string" } },
                    "subject": { "type": "string" },
                    "body": { "type": "string" },
                    "cc": { "type": "array", "items": { "type": "string" } },
                    "bcc": { "type": "array", "items": { "type": "string" } },
                    "isHtml": { "type": "boolean" }
                },
                "required": ["to", "subject", "body"]
            }),
        },
        ToolDefinition {
            name: "google_gmail_delete_email".to_string(),
            description: "Move an email to trash, or delete it permanently".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "messageId": { "type": "string" },
                    "permanently": { "type": "boolean", "description": "Skip trash and delete outright (default false)" }
                },
                "required": ["messageId"]
            }),
        },
        ToolDefinition {
            name: "google_gmail_modify_labels".to_string(),
            description: "Add and/or remove labels on an email".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "messageId": { "type": "string" },
                    "addLabelIds": { "type": "array", "items": { "type": "string" } },
                    "removeLabelIds": { "type": "array", "items": { "type": "string" } }
                },
                "required": ["messageId"]
            }),
        },
    ]
}

pub async fn handle(ctx: &ServerContext, tool: &str, args: &Value) -> Result<ToolCallResult> {
    match tool {
        "google_gmail_list_labels" => list_labels(ctx).await,
        "google_gmail_list_emails" => list_emails(ctx, args).await,
        "google_gmail_get_email" => get_email(ctx, args).await,
        "google_gmail_get_email_by_index" => get_email_by_index(ctx, args).await,
        "google_gmail_send_email" => send_email(ctx, args, false).await,
        "google_gmail_draft_email" => send_email(ctx, args, true).await,
        "google_gmail_delete_email" => delete_email(ctx, args).await,
        "google_gmail_modify_labels" => modify_labels(ctx, args).await,
        other => Err(Error::UnknownTool(other.to_string())),
    }
}

async fn api(ctx: &ServerContext) -> Result<GmailApi> {
    GmailApi::new(ctx.auth.access_token().await?)
}

async fn list_labels(ctx: &ServerContext) -> Result<ToolCallResult> {
    let labels = api(ctx).await?.list_labels().await?;

    let formatted = labels
        .iter()
        .map(|label| {
            format!(
                "{} - ID: {} ({})",
                label.get("name").and_then(|v| v.as_str()).unwrap_or(""),
                label.get("id").and_then(|v| v.as_str()).unwrap_or(""),
                label.get("type").and_then(|v| v.as_str()).unwrap_or("")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    Ok(ToolCallResult::text(if formatted.is_empty() {
        "No labels found.".to_string()
    } else {
        formatted
    }))
}

async fn list_emails(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let label_ids = optional_str_list(args, "labelIds")?;
    let max_results = optional_u64(args, "maxResults")?.unwrap_or(10) as usize;
    let query = optional_str(args, "query")?;

    let summaries = api(ctx)
        .await?
        .list_messages(query, label_ids.as_deref(), max_results)
        .await?;

    // Refresh the index cache even when nothing matched, so stale indices
    // cannot resolve to a previous listing.
    let mut session = ctx.session.write().await;
    session.recent_emails = summaries
        .iter()
        .map(|m| RecentEmail {
            id: m.id.clone(),
            subject: m.subject.clone(),
        })
        .collect();
    drop(session);

    if summaries.is_empty() {
        return Ok(ToolCallResult::text("No messages found."));
    }

    let listing = summaries
        .iter()
        .enumerate()
        .map(|(i, m)| {
            format!(
                "[{}] ID: {}\nFrom: {}\nDate: {}\nSubject: {}\nSnippet: {}",
                i + 1,
                m.id,
                m.from,
                m.date,
                m.subject,
                m.snippet
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n");

    Ok(ToolCallResult::text(listing))
}

async fn get_email(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let message_id = require_str(args, "messageId")?;
    let format = optional_str(args, "format")?;

    let message = api(ctx).await?.get_message(message_id, format).await?;
    Ok(ToolCallResult::text(render_message(&message)))
}

async fn get_email_by_index(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let index = optional_u64(args, "index")?
        .ok_or_else(|| Error::InvalidArgs("missing required parameter: index".to_string()))?;
    let format = optional_str(args, "format")?.map(String::from);

    let message_id = {
        let session = ctx.session.read().await;
        let count = session.recent_emails.len();
        if index < 1 || index as usize > count {
            return Err(Error::InvalidArgs(format!(
                "invalid email index: {index}. Available range: 1-{count}"
            )));
        }
        session.recent_emails[index as usize - 1].id.clone()
    };

    let message = api(ctx)
        .await?
        .get_message(&message_id, format.as_deref())
        .await?;
    Ok(ToolCallResult::text(render_message(&message)))
}

async fn send_email(ctx: &ServerContext, args: &Value, draft: bool) -> Result<ToolCallResult> {
    let to = require_str_list(args, "to")?;
    let subject = require_str(args, "subject")?;
    let body = require_str(args, "body")?;
    let cc = optional_str_list(args, "cc")?;
    let bcc = optional_str_list(args, "bcc")?;
    let is_html = optional_bool(args, "isHtml")?.unwrap_or(false);

    if to.is_empty() {
        return Err(Error::InvalidArgs(
            "parameter to must contain at least one recipient".to_string(),
        ));
    }

    let gmail = api(ctx).await?;

    if draft {
        let response = gmail
            .create_draft(&to, subject, body, cc.as_deref(), bcc.as_deref(), is_html)
            .await?;
        let id = response.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        Ok(ToolCallResult::text(format!(
            "Draft created successfully. Draft ID: {id}"
        )))
    } else {
        let response = gmail
            .send_message(&to, subject, body, cc.as_deref(), bcc.as_deref(), is_html)
            .await?;
        let id = response.get("id").and_then(|v| v.as_str()).unwrap_or("?");
        Ok(ToolCallResult::text(format!(
            "Email sent successfully. Message ID: {id}"
        )))
    }
}

async fn delete_email(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let message_id = require_str(args, "messageId")?;
    let permanently = optional_bool(args, "permanently")?.unwrap_or(false);

    let gmail = api(ctx).await?;

    if permanently {
        gmail.delete_message(message_id).await?;
        Ok(ToolCallResult::text(format!(
            "Message {message_id} permanently deleted."
        )))
    } else {
        gmail.trash_message(message_id).await?;
        Ok(ToolCallResult::text(format!(
            "Message {message_id} moved to trash."
        )))
    }
}

async fn modify_labels(ctx: &ServerContext, args: &Value) -> Result<ToolCallResult> {
    let message_id = require_str(args, "messageId")?;
    let add = optional_str_list(args, "addLabelIds")?.unwrap_or_default();
    let remove = optional_str_list(args, "removeLabelIds")?.unwrap_or_default();

    api(ctx)
        .await?
        .modify_labels(message_id, &add, &remove)
        .await?;

    let mut result = format!("Successfully modified labels for message {message_id}.");
    if !add.is_empty() {
        result.push_str(&format!("\nAdded labels: {}", add.join(", ")));
    }
    if !remove.is_empty() {
        result.push_str(&format!("\nRemoved labels: {}", remove.join(", ")));
    }

    Ok(ToolCallResult::text(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_context;

    #[tokio::test]
    async fn test_get_email_by_index_with_empty_listing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(&ctx, "google_gmail_get_email_by_index", &json!({"index": 1}))
            .await
            .unwrap_err();

        match err {
            Error::InvalidArgs(msg) => assert!(msg.contains("1-0")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_get_email_by_index_rejects_zero() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        ctx.session.write().await.recent_emails = vec![RecentEmail {
            id: "m1".to_string(),
            subject: "hello".to_string(),
        }];

        let err = handle(&ctx, "google_gmail_get_email_by_index", &json!({"index": 0}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_send_email_requires_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(
            &ctx,
            "google_gmail_send_email",
            &json!({"to": [], "subject": "s", "body": "b"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn test_send_email_rejects_non_list_recipients() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());

        let err = handle(
            &ctx,
            "google_gmail_send_email",
            &json!({"to": "a@example.com", "subject": "s", "body": "b"}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::InvalidArgs(_)));
    }
}
