//! MCP server loop
//!
//! Two transports over the same request processor:
//! - STDIO mode: newline-delimited JSON-RPC on stdin/stdout (primary MCP
//!   integration mode)
//! - TCP mode: line-delimited JSON-RPC on a local port, one task per client

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use geata_protocol::{
    methods, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    RequestId, ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability, ToolsListResult,
    MCP_VERSION,
};

use crate::tools::{handle_tool_call, tool_definitions, ServerContext};

/// Default port for TCP mode.
pub const DEFAULT_PORT: u16 = 18790;

/// Shared state for the TCP server
struct McpServerState {
    ctx: Arc<ServerContext>,
    port: u16,
    running: AtomicBool,
    client_count: AtomicUsize,
    shutdown_tx: broadcast::Sender<()>,
}

/// TCP server instance (cheaply cloneable)
#[derive(Clone)]
pub struct McpServer {
    state: Arc<McpServerState>,
}

impl McpServer {
    pub fn new(ctx: Arc<ServerContext>, port: u16) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            state: Arc::new(McpServerState {
                ctx,
                port,
                running: AtomicBool::new(false),
                client_count: AtomicUsize::new(0),
                shutdown_tx,
            }),
        }
    }

    pub fn port(&self) -> u16 {
        self.state.port
    }

    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::SeqCst)
    }

    pub fn connected_clients(&self) -> usize {
        self.state.client_count.load(Ordering::SeqCst)
    }

    /// Start listening. Returns once the listener is bound; connections are
    /// served on a background task until [`McpServer::stop`].
    pub async fn start(&self) -> Result<(), ServeError> {
        if self.state.running.load(Ordering::SeqCst) {
            return Err(ServeError::AlreadyRunning);
        }

        let addr = format!("127.0.0.1:{}", self.state.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ServeError::BindFailed(e.to_string()))?;

        info!(address = %addr, "MCP server listening");
        self.state.running.store(true, Ordering::SeqCst);

        let state = self.state.clone();
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok((stream, addr)) => {
                                info!(client = %addr, "MCP client connected");
                                state.client_count.fetch_add(1, Ordering::SeqCst);
                                let state_clone = state.clone();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_tcp_connection(&state_clone.ctx, stream).await {
                                        error!(error = %e, "error handling connection");
                                    }
                                    state_clone.client_count.fetch_sub(1, Ordering::SeqCst);
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "error accepting connection");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("MCP server shutting down");
                        break;
                    }
                }
            }
            state.running.store(false, Ordering::SeqCst);
        });

        Ok(())
    }

    pub fn stop(&self) -> Result<(), ServeError> {
        if !self.state.running.load(Ordering::SeqCst) {
            return Err(ServeError::NotRunning);
        }

        let _ = self.state.shutdown_tx.send(());
        Ok(())
    }
}

async fn handle_tcp_connection(ctx: &ServerContext, stream: TcpStream) -> Result<(), ServeError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    let mut initialized = false;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("client disconnected");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let Some(response) = process_request(ctx, trimmed, &mut initialized).await else {
                    continue;
                };
                let response_json = serde_json::to_string(&response)
                    .map_err(|e| ServeError::SerializationFailed(e.to_string()))?;

                writer
                    .write_all(response_json.as_bytes())
                    .await
                    .map_err(|e| ServeError::WriteFailed(e.to_string()))?;
                writer
                    .write_all(b"\n")
                    .await
                    .map_err(|e| ServeError::WriteFailed(e.to_string()))?;
                writer
                    .flush()
                    .await
                    .map_err(|e| ServeError::WriteFailed(e.to_string()))?;
            }
            Err(e) => {
                error!(error = %e, "error reading from client");
                break;
            }
        }
    }

    Ok(())
}

/// Run the server in STDIO mode until EOF.
pub async fn run_stdio(ctx: Arc<ServerContext>) -> Result<(), ServeError> {
    info!("starting MCP server in STDIO mode");

    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin);
    let mut line = String::new();
    let mut initialized = false;

    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) => {
                debug!("EOF received, shutting down");
                break;
            }
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let Some(response) = process_request(&ctx, trimmed, &mut initialized).await else {
                    continue;
                };
                let response_json = serde_json::to_string(&response)
                    .map_err(|e| ServeError::SerializationFailed(e.to_string()))?;

                stdout
                    .write_all(response_json.as_bytes())
                    .await
                    .map_err(|e| ServeError::WriteFailed(e.to_string()))?;
                stdout
                    .write_all(b"\n")
                    .await
                    .map_err(|e| ServeError::WriteFailed(e.to_string()))?;
                stdout
                    .flush()
                    .await
                    .map_err(|e| ServeError::WriteFailed(e.to_string()))?;
            }
            Err(e) => {
                error!(error = %e, "error reading from stdin");
                break;
            }
        }
    }

    Ok(())
}

/// Process a single JSON-RPC request. Returns `None` for notifications,
/// which must not be answered.
async fn process_request(
    ctx: &ServerContext,
    input: &str,
    initialized: &mut bool,
) -> Option<JsonRpcResponse> {
    let request: JsonRpcRequest = match serde_json::from_str(input) {
        Ok(req) => req,
        Err(e) => {
            return Some(JsonRpcResponse::error(
                None,
                JsonRpcError::parse_error(format!("Invalid JSON: {e}")),
            ));
        }
    };

    if request.jsonrpc != "2.0" {
        return Some(JsonRpcResponse::error(
            request.id,
            JsonRpcError::invalid_request("Invalid JSON-RPC version, expected 2.0"),
        ));
    }

    if request.id.is_none() {
        if request.method == methods::INITIALIZED {
            debug!("received initialized notification");
            *initialized = true;
        } else {
            debug!(method = %request.method, "ignoring notification");
        }
        return None;
    }

    let response = match request.method.as_str() {
        methods::INITIALIZE => handle_initialize(request.id, request.params),
        methods::TOOLS_LIST => handle_tools_list(request.id, *initialized),
        methods::TOOLS_CALL => handle_tools_call(ctx, request.id, request.params, *initialized).await,
        methods::PING => JsonRpcResponse::success(request.id, json!({})),
        methods::SHUTDOWN => {
            info!("shutdown requested");
            JsonRpcResponse::success(request.id, json!({}))
        }
        other => {
            warn!(method = %other, "unknown method");
            JsonRpcResponse::error(request.id, JsonRpcError::method_not_found(other))
        }
    };

    Some(response)
}

fn handle_initialize(id: Option<RequestId>, params: Option<Value>) -> JsonRpcResponse {
    if let Some(params) = params {
        match serde_json::from_value::<InitializeParams>(params) {
            Ok(init) => {
                info!(
                    client_name = %init.client_info.name,
                    client_version = %init.client_info.version,
                    protocol_version = %init.protocol_version,
                    "client initializing"
                );
            }
            Err(e) => {
                warn!(error = %e, "failed to parse initialize params, continuing anyway");
            }
        }
    }

    let result = InitializeResult {
        protocol_version: MCP_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
            resources: None,
            prompts: None,
        },
        server_info: ServerInfo {
            name: "geata".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}

fn handle_tools_list(id: Option<RequestId>, initialized: bool) -> JsonRpcResponse {
    if !initialized {
        // Clients are expected to send the initialized notification first,
        // but several are lenient about it.
        warn!("tools/list called before initialized notification");
    }

    let result = ToolsListResult {
        tools: tool_definitions(),
    };

    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}

async fn handle_tools_call(
    ctx: &ServerContext,
    id: Option<RequestId>,
    params: Option<Value>,
    initialized: bool,
) -> JsonRpcResponse {
    if !initialized {
        warn!("tools/call called before initialized notification");
    }

    let params = match params {
        Some(p) => p,
        None => {
            return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
        }
    };

    let call: ToolCallParams = match serde_json::from_value(params) {
        Ok(p) => p,
        Err(e) => {
            return JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_params(format!("Invalid params: {e}")),
            );
        }
    };

    debug!(tool = %call.name, "calling tool");

    match handle_tool_call(ctx, &call.name, &call.arguments).await {
        Ok(result) => match serde_json::to_value(result) {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
        },
        Err(e) => JsonRpcResponse::error(id, e),
    }
}

/// Transport-level server errors
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("failed to bind to address: {0}")]
    BindFailed(String),

    #[error("failed to serialize response: {0}")]
    SerializationFailed(String),

    #[error("failed to write response: {0}")]
    WriteFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::test_support::test_context;

    fn ctx() -> (tempfile::TempDir, ServerContext) {
        let dir = tempfile::tempdir().unwrap();
        let ctx = test_context(dir.path());
        (dir, ctx)
    }

    #[tokio::test]
    async fn test_process_initialize() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"protocolVersion":"2024-11-05","capabilities":{},"clientInfo":{"name":"test","version":"1.0"}}}"#;
        let mut initialized = false;

        let response = process_request(&ctx, request, &mut initialized).await.unwrap();

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_VERSION);
        assert_eq!(result["serverInfo"]["name"], "geata");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn test_initialized_notification_gets_no_response() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let mut initialized = false;

        let response = process_request(&ctx, request, &mut initialized).await;
        assert!(response.is_none());
        assert!(initialized);
    }

    #[tokio::test]
    async fn test_process_tools_list() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#;
        let mut initialized = true;

        let response = process_request(&ctx, request, &mut initialized).await.unwrap();

        assert!(response.error.is_none());
        let result = response.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert!(tools.len() >= 30);
        assert!(tools
            .iter()
            .any(|t| t["name"] == "google_calendar_find_free_time"));
    }

    #[tokio::test]
    async fn test_process_tools_call_invalid_tool() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"no_such_tool","arguments":{}}}"#;
        let mut initialized = true;

        let response = process_request(&ctx, request, &mut initialized).await.unwrap();
        assert_eq!(
            response.error.unwrap().code,
            JsonRpcError::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_process_tools_call_session_tool() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"google_calendar_set_default","arguments":{"calendarId":"primary"}}}"#;
        let mut initialized = true;

        let response = process_request(&ctx, request, &mut initialized).await.unwrap();
        assert!(response.error.is_none());
        let result = response.result.unwrap();
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("primary"));
    }

    #[tokio::test]
    async fn test_process_unknown_method() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"2.0","id":5,"method":"unknown/method"}"#;
        let mut initialized = true;

        let response = process_request(&ctx, request, &mut initialized).await.unwrap();
        assert_eq!(
            response.error.unwrap().code,
            JsonRpcError::METHOD_NOT_FOUND
        );
    }

    #[tokio::test]
    async fn test_process_invalid_json() {
        let (_dir, ctx) = ctx();
        let mut initialized = false;

        let response = process_request(&ctx, "not valid json", &mut initialized)
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::PARSE_ERROR);
    }

    #[tokio::test]
    async fn test_process_wrong_jsonrpc_version() {
        let (_dir, ctx) = ctx();
        let request = r#"{"jsonrpc":"1.0","id":6,"method":"ping"}"#;
        let mut initialized = true;

        let response = process_request(&ctx, request, &mut initialized).await.unwrap();
        assert_eq!(response.error.unwrap().code, JsonRpcError::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_server_is_cloneable() {
        let (_dir, ctx) = ctx();
        let server = McpServer::new(Arc::new(ctx), DEFAULT_PORT);
        let server2 = server.clone();

        assert_eq!(server.port(), server2.port());
        assert!(!server.is_running());
        assert_eq!(server.connected_clients(), 0);
    }
}
