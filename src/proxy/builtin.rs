// ABOUTME: Builtin in-process tools — compiled into the Hub, no child process or network hop
// ABOUTME: Looked up by tool name from ChildSpec::InProcess, mirroring the registry pattern the child transports share

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures_util::stream::BoxStream;
use hub_core::errors::{AppError, AppResult};
use serde_json::Value;

use super::child::{ChildEnv, ChildEvent, InProcessHandler};
use super::protocol::{ChildToolDef, ToolCallContent, ToolCallResult};

const MAX_SLEEP_SECONDS: f64 = 30.0;

/// `wait` — a dependency-free tool useful for exercising the Proxy call
/// pipeline (activation with no credentials, streaming a single event)
/// without standing up a real child server.
struct WaitHandler;

impl InProcessHandler for WaitHandler {
    fn list_tools(&self) -> Vec<ChildToolDef> {
        vec![ChildToolDef {
            name: "sleep".to_string(),
            description: "Sleep for the given number of seconds, then return.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "seconds": {"type": "number", "minimum": 0, "maximum": MAX_SLEEP_SECONDS}
                },
                "required": ["seconds"]
            }),
        }]
    }

    fn call(&self, tool_name: &str, args: Value, _env: &ChildEnv) -> BoxStream<'static, AppResult<ChildEvent>> {
        let tool_name = tool_name.to_string();
        Box::pin(stream! {
            if tool_name != "sleep" {
                yield Err(AppError::UnknownTool { tool_name: format!("wait.{tool_name}") });
                return;
            }

            let seconds = args.get("seconds").and_then(serde_json::Value::as_f64).unwrap_or(0.0);
            let seconds = seconds.clamp(0.0, MAX_SLEEP_SECONDS);
            tokio::time::sleep(Duration::from_secs_f64(seconds)).await;

            yield Ok(ChildEvent::Final(ToolCallResult {
                content: vec![ToolCallContent {
                    content_type: "text".to_string(),
                    text: format!("slept for {seconds}s"),
                }],
                is_error: false,
            }));
        })
    }
}

/// Registry of builtin `InProcessHandler`s, keyed by the `ToolRegistryEntry::tool_name`
/// a `ChildSpec::InProcess` names.
pub struct BuiltinRegistry {
    handlers: HashMap<String, Arc<dyn InProcessHandler>>,
}

impl BuiltinRegistry {
    /// The registry shipped with the Hub: currently just `wait`. Additional
    /// builtins register here as they're added.
    #[must_use]
    pub fn new() -> Self {
        let mut handlers: HashMap<String, Arc<dyn InProcessHandler>> = HashMap::new();
        handlers.insert("wait".to_string(), Arc::new(WaitHandler));
        Self { handlers }
    }

    /// Look up the handler for a builtin tool name.
    #[must_use]
    pub fn get(&self, tool_name: &str) -> Option<Arc<dyn InProcessHandler>> {
        self.handlers.get(tool_name).cloned()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}
