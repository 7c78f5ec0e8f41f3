//! Stdio MCP Tool Session
//!
//! Spawns the tool server as a child process and speaks newline-delimited
//! JSON-RPC 2.0 over its stdin/stdout. A reader task routes responses to
//! the pending request with the same id; one request is in flight at a time.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bridge_core::{
    error::{BridgeError, Result},
    execution::{CallToolResult, ToolSession},
    tool::ToolDescriptor,
};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, oneshot};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

type PendingResponse = oneshot::Sender<std::result::Result<Value, McpError>>;
type SharedPendingMap = Arc<Mutex<HashMap<u64, PendingResponse>>>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Transport-level failures of the stdio session
#[derive(Debug, Error)]
pub enum McpError {
    #[error("failed to spawn MCP server '{server}': {message}")]
    SpawnFailed { server: String, message: String },

    #[error("JSON-RPC timeout calling '{method}' on '{server}'")]
    Timeout { server: String, method: String },

    #[error("JSON-RPC transport closed for '{server}'")]
    TransportClosed { server: String },

    #[error("MCP protocol error ({code}): {message}")]
    Protocol { code: i64, message: String },

    #[error("invalid MCP response: {0}")]
    InvalidResponse(String),
}

impl From<McpError> for BridgeError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Protocol { .. } => Self::ToolExecution(err.to_string()),
            _ => Self::Connection(err.to_string()),
        }
    }
}

/// How to launch the tool server
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct McpServerConfig {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub rpc_timeout: Duration,
}

impl McpServerConfig {
    /// `python <script>` for `.py`, `node <script>` for `.js`
    pub fn for_script(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let command = match path.extension().and_then(|e| e.to_str()) {
            Some("py") => "python",
            Some("js") => "node",
            _ => {
                return Err(BridgeError::UnsupportedServerScript(path.display().to_string()));
            }
        };

        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("server")
            .to_string();

        Ok(Self {
            name,
            command: command.into(),
            args: vec![path.display().to_string()],
            env: HashMap::new(),
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        })
    }

    #[must_use]
    pub const fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }
}

/// A connected stdio MCP session
pub struct McpToolSession {
    server: String,
    writer: Mutex<BoxedWriter>,
    pending: SharedPendingMap,
    next_id: AtomicU64,
    child: Mutex<Option<Child>>,
    rpc_timeout: Duration,
}

impl McpToolSession {
    /// Spawn the server and complete the `initialize` handshake
    pub async fn connect(config: McpServerConfig) -> Result<Self> {
        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_failed = |message: String| McpError::SpawnFailed {
            server: config.name.clone(),
            message,
        };

        let mut child = command.spawn().map_err(|e| spawn_failed(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| spawn_failed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| spawn_failed("failed to capture stdout".into()))?;
        if let Some(stderr) = child.stderr.take() {
            spawn_stderr_loop(config.name.clone(), stderr);
        }

        tracing::info!(server = %config.name, command = %config.command, args = ?config.args, "Spawned MCP server");

        let session = Self::from_io(&config.name, stdout, stdin, config.rpc_timeout);
        *session.child.lock().await = Some(child);

        if let Err(e) = session.initialize().await {
            session.shutdown().await;
            return Err(e);
        }
        Ok(session)
    }

    /// Session over an arbitrary reader/writer pair; no handshake is sent
    fn from_io<R, W>(server: &str, reader: R, writer: W, rpc_timeout: Duration) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: SharedPendingMap = Arc::new(Mutex::new(HashMap::new()));
        spawn_stdout_loop(server.to_string(), reader, pending.clone());

        Self {
            server: server.to_string(),
            writer: Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            child: Mutex::new(None),
            rpc_timeout,
        }
    }

    async fn initialize(&self) -> Result<()> {
        let result = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "tool-bridge", "version": env!("CARGO_PKG_VERSION")}
                }),
            )
            .await?;

        let Some(version) = result.get("protocolVersion").and_then(Value::as_str) else {
            return Err(McpError::InvalidResponse("initialize response missing protocolVersion".into()).into());
        };
        tracing::debug!(server = %self.server, protocol_version = version, "MCP handshake complete");

        self.notify("notifications/initialized").await
    }

    /// Stop the server process; outstanding requests fail
    pub async fn shutdown(&self) {
        let _ = self.writer.lock().await.shutdown().await;
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        fail_all_pending(&self.pending, &self.server).await;
        tracing::info!(server = %self.server, "MCP session closed");
    }

    async fn request(&self, method: &str, params: Value) -> std::result::Result<Value, McpError> {
        // holding the writer for the whole exchange keeps one request in flight
        let mut writer = self.writer.lock().await;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let message = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if let Err(e) = write_message(&mut **writer, &message).await {
            self.pending.lock().await.remove(&id);
            tracing::error!(server = %self.server, method, error = %e, "Failed to write MCP request");
            return Err(McpError::TransportClosed {
                server: self.server.clone(),
            });
        }

        match tokio::time::timeout(self.rpc_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::TransportClosed {
                server: self.server.clone(),
            }),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(McpError::Timeout {
                    server: self.server.clone(),
                    method: method.to_string(),
                })
            }
        }
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let message = json!({"jsonrpc": "2.0", "method": method, "params": {}});
        let mut writer = self.writer.lock().await;
        write_message(&mut **writer, &message).await.map_err(|_| {
            McpError::TransportClosed {
                server: self.server.clone(),
            }
            .into()
        })
    }
}

#[async_trait]
impl ToolSession for McpToolSession {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor.as_ref().map_or_else(|| json!({}), |c| json!({"cursor": c}));
            let result = self.request("tools/list", params).await?;

            let page = result
                .get("tools")
                .and_then(Value::as_array)
                .ok_or_else(|| McpError::InvalidResponse("tools/list response missing tools".into()))?;
            for entry in page {
                tools.push(ToolDescriptor::from_listing(entry)?);
            }

            cursor = result.get("nextCursor").and_then(Value::as_str).map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }

        tracing::debug!(server = %self.server, count = tools.len(), "Listed tools");
        Ok(tools)
    }

    async fn call_tool(&self, name: &str, arguments: &Map<String, Value>) -> Result<CallToolResult> {
        let result = self
            .request("tools/call", json!({"name": name, "arguments": arguments}))
            .await?;

        serde_json::from_value(result)
            .map_err(|e| McpError::InvalidResponse(format!("tools/call result: {e}")).into())
    }
}

async fn write_message(writer: &mut (dyn AsyncWrite + Send + Unpin), message: &Value) -> std::io::Result<()> {
    let mut payload = serde_json::to_vec(message)?;
    payload.push(b'\n');
    writer.write_all(&payload).await?;
    writer.flush().await
}

/// Route one line from the server to its pending request
async fn dispatch_line(server: &str, line: &str, pending: &SharedPendingMap) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }

    let message: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(server = %server, error = %e, "Failed to parse MCP message");
            return;
        }
    };

    // notifications and server-initiated requests carry no numeric response id
    let Some(id) = message.get("id").and_then(Value::as_u64) else {
        tracing::trace!(server = %server, method = ?message.get("method"), "Ignoring MCP message");
        return;
    };

    let response = if let Some(error) = message.get("error") {
        Err(McpError::Protocol {
            code: error.get("code").and_then(Value::as_i64).unwrap_or(-32000),
            message: error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        })
    } else {
        Ok(message.get("result").cloned().unwrap_or(Value::Null))
    };

    if let Some(tx) = pending.lock().await.remove(&id) {
        let _ = tx.send(response);
    }
}

fn spawn_stdout_loop<R>(server: String, reader: R, pending: SharedPendingMap)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => dispatch_line(&server, &line, &pending).await,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "MCP stdout read failed");
                    break;
                }
            }
        }
        fail_all_pending(&pending, &server).await;
    });
}

fn spawn_stderr_loop(server: String, stderr: tokio::process::ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(server = %server, "mcp stderr: {}", line);
        }
    });
}

async fn fail_all_pending(pending: &SharedPendingMap, server: &str) {
    let drained = std::mem::take(&mut *pending.lock().await);
    for (_, tx) in drained {
        let _ = tx.send(Err(McpError::TransportClosed {
            server: server.to_string(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf, duplex, split};

    use super::*;

    /// Minimal in-process MCP server answering over a duplex pipe
    async fn fake_server(stream: DuplexStream) {
        let (reader, mut writer): (ReadHalf<DuplexStream>, WriteHalf<DuplexStream>) = split(stream);
        let mut lines = BufReader::new(reader).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let Some(id) = request.get("id").cloned() else {
                continue;
            };

            let reply = match request["method"].as_str().unwrap() {
                "initialize" => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {"tools": {}},
                    "serverInfo": {"name": "weather", "version": "1.0"}
                }}),
                "tools/list" if request["params"].get("cursor").is_none() => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "tools": [{"name": "get_weather", "description": "Weather", "inputSchema": {"type": "object"}}],
                    "nextCursor": "page-2"
                }}),
                "tools/list" => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "tools": [{"name": "get_time"}]
                }}),
                "tools/call" if request["params"]["name"] == "get_weather" => json!({"jsonrpc": "2.0", "id": id, "result": {
                    "content": [{"type": "text", "text": format!("Sunny in {}", request["params"]["arguments"]["city"].as_str().unwrap())}]
                }}),
                _ => json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32602, "message": "Unknown tool"}}),
            };

            // a notification first, to check it is skipped
            writer
                .write_all(b"{\"jsonrpc\":\"2.0\",\"method\":\"notifications/message\",\"params\":{}}\n")
                .await
                .unwrap();
            writer.write_all(format!("{reply}\n").as_bytes()).await.unwrap();
        }
    }

    async fn connected_session() -> McpToolSession {
        let (client, server) = duplex(64 * 1024);
        tokio::spawn(fake_server(server));
        let (reader, writer) = split(client);
        let session = McpToolSession::from_io("weather", reader, writer, Duration::from_secs(5));
        session.initialize().await.unwrap();
        session
    }

    #[test]
    fn script_extension_selects_interpreter() {
        let config = McpServerConfig::for_script("servers/weather.py").unwrap();
        assert_eq!(config.command, "python");
        assert_eq!(config.args, vec!["servers/weather.py"]);
        assert_eq!(config.name, "weather");
        assert_eq!(config.rpc_timeout, DEFAULT_RPC_TIMEOUT);

        assert_eq!(McpServerConfig::for_script("index.js").unwrap().command, "node");
    }

    #[test]
    fn other_extensions_are_rejected() {
        for script in ["server.rb", "server", "server.ts"] {
            assert!(matches!(
                McpServerConfig::for_script(script),
                Err(BridgeError::UnsupportedServerScript(_))
            ));
        }
    }

    #[tokio::test]
    async fn lists_tools_across_pages() {
        let session = connected_session().await;
        let tools = session.list_tools().await.unwrap();

        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["get_weather", "get_time"]);
        assert_eq!(tools[1].description, "");
        assert_eq!(tools[1].input_schema, json!({}));
    }

    #[tokio::test]
    async fn calls_tool_and_surfaces_rpc_errors() {
        let session = connected_session().await;

        let Value::Object(args) = json!({"city": "Paris"}) else {
            unreachable!()
        };
        let result = session.call_tool("get_weather", &args).await.unwrap();
        assert_eq!(result.joined_text(), "Sunny in Paris");
        assert!(!result.is_error);

        let err = session.call_tool("launch_rocket", &Map::new()).await.unwrap_err();
        assert!(matches!(err, BridgeError::ToolExecution(m) if m.contains("Unknown tool")));
    }

    #[tokio::test]
    async fn closed_stdout_fails_pending_requests() {
        let (client, server) = duplex(1024);
        let (reader, writer) = split(client);
        let session = McpToolSession::from_io("gone", reader, writer, Duration::from_secs(5));
        drop(server);

        let err = session.list_tools().await.unwrap_err();
        assert!(matches!(err, BridgeError::Connection(_)));
    }

    #[tokio::test]
    async fn dispatch_routes_by_id() {
        let pending: SharedPendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(7, tx);

        dispatch_line("s", "not json", &pending).await;
        dispatch_line("s", r#"{"jsonrpc":"2.0","id":8,"result":{}}"#, &pending).await;
        assert_eq!(pending.lock().await.len(), 1);

        dispatch_line("s", r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#, &pending).await;
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
    }
}
