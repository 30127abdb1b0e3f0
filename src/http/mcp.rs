// ABOUTME: MCP Front Door (C13) transport — POST /mcp (Streamable HTTP) and GET /mcp/sse
// ABOUTME: Grounded in the teacher's mcp/sse_transport.rs framing, translated from warp::sse to axum::response::sse

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Extension, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use futures_util::stream::{self, BoxStream, StreamExt};
use hub_core::errors::AppError;
use serde::Deserialize;
use serde_json::Value;

use crate::identity::Principal;
use crate::proxy::child::ChildEvent;
use crate::proxy::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, ToolsListResult};

use super::AppState;

fn error_response(id: u64, err: &AppError) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: None,
        error: Some(JsonRpcError {
            code: -32000,
            message: err.to_string(),
            data: err.details(),
        }),
    }
}

fn ok_response(id: u64, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id,
        result: Some(result),
        error: None,
    }
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Dispatch one decoded JSON-RPC request, returning the frames to emit in
/// order: zero or more progress notifications followed by exactly one
/// terminal response.
async fn dispatch(
    state: &AppState,
    principal: &Principal,
    request: JsonRpcRequest,
) -> Vec<Value> {
    let id = request.id;
    match request.method.as_str() {
        "initialize" => vec![serde_json::to_value(ok_response(id, crate::proxy::protocol::initialize_params()))
            .unwrap_or(Value::Null)],
        "tools/list" => match state.proxy.list_tools(principal).await {
            Ok(tools) => {
                let result = ToolsListResult { tools };
                vec![serde_json::to_value(ok_response(
                    id,
                    serde_json::to_value(result).unwrap_or(Value::Null),
                ))
                .unwrap_or(Value::Null)]
            }
            Err(err) => vec![serde_json::to_value(error_response(id, &err)).unwrap_or(Value::Null)],
        },
        "tools/call" => {
            let Ok(params) = serde_json::from_value::<ToolCallParams>(request.params.unwrap_or(Value::Null)) else {
                return vec![serde_json::to_value(error_response(
                    id,
                    &AppError::Internal("tools/call requires {name, arguments}".to_string()),
                ))
                .unwrap_or(Value::Null)];
            };
            let oauth_redirect_uri = format!("{}/api/credentials/callback", state.public_base_url);
            match state.proxy.call(principal, &params.name, params.arguments, &oauth_redirect_uri).await {
                Ok(mut events) => {
                    let mut frames = Vec::new();
                    while let Some(event) = events.next().await {
                        match event {
                            Ok(ChildEvent::Progress(value)) => {
                                frames.push(serde_json::json!({
                                    "jsonrpc": "2.0",
                                    "method": "notifications/progress",
                                    "params": value,
                                }));
                            }
                            Ok(ChildEvent::Final(result)) => {
                                frames.push(
                                    serde_json::to_value(ok_response(
                                        id,
                                        serde_json::to_value(result).unwrap_or(Value::Null),
                                    ))
                                    .unwrap_or(Value::Null),
                                );
                            }
                            Err(err) => {
                                frames.push(serde_json::to_value(error_response(id, &err)).unwrap_or(Value::Null));
                                break;
                            }
                        }
                    }
                    frames
                }
                Err(err) => vec![serde_json::to_value(error_response(id, &err)).unwrap_or(Value::Null)],
            }
        }
        other => vec![serde_json::to_value(error_response(
            id,
            &AppError::Internal(format!("unknown method {other}")),
        ))
        .unwrap_or(Value::Null)],
    }
}

/// `POST /mcp` — a single JSON-RPC request in, newline-delimited JSON-RPC
/// frames out: zero or more progress notifications followed by the final
/// response, all on the one connection.
pub async fn handle_mcp(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let frames = dispatch(&state, &principal, request).await;
    let mut body = String::new();
    for frame in frames {
        body.push_str(&frame.to_string());
        body.push('\n');
    }
    ([(axum::http::header::CONTENT_TYPE, "application/jsonl")], body).into_response()
}

#[derive(Deserialize)]
pub struct SseQuery {
    /// A JSON-RPC request, URL-safe base64 without padding.
    message: Option<String>,
}

/// `GET /mcp/sse` — if `?message=` carries an encoded JSON-RPC request,
/// its frames are emitted as SSE events; either way the connection is kept
/// open with a 15 s keep-alive comment.
pub async fn handle_sse(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<SseQuery>,
) -> Sse<BoxStream<'static, Result<Event, Infallible>>> {
    let frames = match query.message.as_deref().map(|m| URL_SAFE_NO_PAD.decode(m)) {
        Some(Ok(raw)) => match serde_json::from_slice::<JsonRpcRequest>(&raw) {
            Ok(request) => dispatch(&state, &principal, request).await,
            Err(_) => Vec::new(),
        },
        _ => Vec::new(),
    };

    let events = frames
        .into_iter()
        .map(|frame| Ok(Event::default().data(frame.to_string())));
    let stream = stream::iter(events).boxed();

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("keep-alive"))
}
