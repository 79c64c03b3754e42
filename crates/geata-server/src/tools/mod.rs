//! Tool surface
//!
//! Tool definitions, argument validation and dispatch. Arguments arrive as
//! untyped JSON and are checked field-by-field before anything touches the
//! network; results are formatted as human-readable text.

pub mod calendar;
pub mod drive;
pub mod gmail;
pub mod oauth;
pub mod tasks;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use geata_protocol::{JsonRpcError, ToolCallResult, ToolDefinition};

use crate::auth::AuthBroker;
use crate::common::{Error, Result};
use crate::config::Config;

// ── Session state ───────────────────────────────────────────────────────────

/// One Gmail listing entry kept for index-based retrieval.
#[derive(Debug, Clone)]
pub struct RecentEmail {
    pub id: String,
    pub subject: String,
}

/// Mutable per-server session state: the default calendar and task list the
/// user selected, plus the most recent email listing. Last writer wins; the
/// deployment model is single-writer.
#[derive(Debug)]
pub struct Session {
    pub default_calendar_id: String,
    pub default_task_list_id: String,
    pub recent_emails: Vec<RecentEmail>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            default_calendar_id: "primary".to_string(),
            default_task_list_id: "@default".to_string(),
            recent_emails: Vec::new(),
        }
    }
}

/// Everything a tool handler needs: the credential broker and the session.
pub struct ServerContext {
    pub auth: Arc<AuthBroker>,
    pub session: RwLock<Session>,
}

impl ServerContext {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            auth: Arc::new(AuthBroker::new(config)?),
            session: RwLock::new(Session::default()),
        })
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────────

/// All tool definitions, grouped per Google service.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let mut tools = oauth::definitions();
    tools.extend(calendar::definitions());
    tools.extend(gmail::definitions());
    tools.extend(drive::definitions());
    tools.extend(tasks::definitions());
    tools
}

/// Route a tool call to its handler and fold the outcome into the MCP
/// result shape: validation problems become JSON-RPC errors, operational
/// failures become tool-level error text.
pub async fn handle_tool_call(
    ctx: &ServerContext,
    name: &str,
    args: &Value,
) -> std::result::Result<ToolCallResult, JsonRpcError> {
    debug!(tool = %name, "handling tool call");

    let outcome = if name.starts_with("google_oauth_") {
        oauth::handle(ctx, name, args).await
    } else if name.starts_with("google_calendar_") {
        calendar::handle(ctx, name, args).await
    } else if name.starts_with("google_gmail_") {
        gmail::handle(ctx, name, args).await
    } else if name.starts_with("google_drive_") {
        drive::handle(ctx, name, args).await
    } else if name.starts_with("google_tasks_") {
        tasks::handle(ctx, name, args).await
    } else {
        Err(Error::UnknownTool(name.to_string()))
    };

    match outcome {
        Ok(result) => Ok(result),
        Err(Error::UnknownTool(tool)) => {
            warn!(tool = %tool, "unknown tool requested");
            Err(JsonRpcError::method_not_found(tool))
        }
        Err(Error::InvalidArgs(message)) => Err(JsonRpcError::invalid_params(message)),
        Err(e) => Ok(ToolCallResult::error(format!("Error: {e}"))),
    }
}

// ── Argument helpers ────────────────────────────────────────────────────────

pub(crate) fn require_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::InvalidArgs(format!("missing required parameter: {key}")))
}

pub(crate) fn optional_str<'a>(args: &'a Value, key: &str) -> Result<Option<&'a str>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(Error::InvalidArgs(format!(
            "parameter {key} must be a string"
        ))),
    }
}

pub(crate) fn optional_bool(args: &Value, key: &str) -> Result<Option<bool>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(_) => Err(Error::InvalidArgs(format!(
            "parameter {key} must be a boolean"
        ))),
    }
}

pub(crate) fn optional_u64(args: &Value, key: &str) -> Result<Option<u64>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| Error::InvalidArgs(format!("parameter {key} must be a number"))),
    }
}

pub(crate) fn require_f64(args: &Value, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| Error::InvalidArgs(format!("missing required parameter: {key}")))
}

pub(crate) fn optional_str_list(args: &Value, key: &str) -> Result<Option<Vec<String>>> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => {
                        return Err(Error::InvalidArgs(format!(
                            "parameter {key} must be an array of strings"
                        )))
                    }
                }
            }
            Ok(Some(out))
        }
        Some(_) => Err(Error::InvalidArgs(format!(
            "parameter {key} must be an array of strings"
        ))),
    }
}

pub(crate) fn require_str_list(args: &Value, key: &str) -> Result<Vec<String>> {
    optional_str_list(args, key)?
        .ok_or_else(|| Error::InvalidArgs(format!("missing required parameter: {key}")))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{AuthConfig, OAuthClient};

    /// A context with dummy OAuth credentials and a throwaway token store.
    /// Suitable for exercising validation paths that never reach the network.
    pub fn test_context(dir: &std::path::Path) -> ServerContext {
        let config = Config {
            auth: AuthConfig::OAuth(OAuthClient {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
            }),
            oauth_port: 3000,
            token_path: dir.join("token.json"),
        };
        ServerContext::new(&config).unwrap()
    }
}
