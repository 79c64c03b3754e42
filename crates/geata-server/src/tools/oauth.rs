//! OAuth lifecycle tools
//!
//! Usable even when API-call auth is unavailable: refresh re-uses the stored
//! grant, re-authentication drops it and runs the consent flow again.

use serde_json::{json, Value};

use geata_protocol::{ToolCallResult, ToolDefinition};

use super::ServerContext;
use crate::common::{Error, Result};

pub fn definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "google_oauth_refresh_tokens".to_string(),
            description: "Refresh the stored Google OAuth tokens using the saved refresh token"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
        ToolDefinition {
            name: "google_oauth_reauthenticate".to_string(),
            description: "Delete the stored Google OAuth tokens and run the browser consent flow again"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {}
            }),
        },
    ]
}

pub async fn handle(ctx: &ServerContext, tool: &str, _args: &Value) -> Result<ToolCallResult> {
    match tool {
        "google_oauth_refresh_tokens" => match ctx.auth.refresh().await {
            Ok(message) => Ok(ToolCallResult::text(message)),
            Err(e) => Ok(ToolCallResult::error(format!(
                "Failed to refresh tokens: {e}"
            ))),
        },
        "google_oauth_reauthenticate" => match ctx.auth.reauthenticate().await {
            Ok(message) => Ok(ToolCallResult::text(message)),
            Err(e) => Ok(ToolCallResult::error(format!(
                "Failed to re-authenticate: {e}"
            ))),
        },
        other => Err(Error::UnknownTool(other.to_string())),
    }
}
