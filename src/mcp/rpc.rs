//! JSON-RPC 2.0 message types for the tool-server protocol.
//!
//! Requests we send always carry numeric ids. Messages from the server are
//! decoded loosely into `IncomingMessage` because a server may interleave its
//! own requests and notifications with the responses we wait for.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Request sent to a tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Notification sent to a tool server (no id, no response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// Response in either direction. The id is kept as raw JSON since
/// server-initiated requests may use string ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Value, code: i64, message: &str) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Whether this answers the request with numeric id `id`
    pub fn answers(&self, id: u64) -> bool {
        self.id.as_u64() == Some(id)
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Standard JSON-RPC error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

/// Any message a server may send.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

/// Classified server message
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Request { id: Value, method: String, params: Option<Value> },
    Notification { method: String },
    Response(RpcResponse),
}

impl IncomingMessage {
    pub fn classify(self) -> ServerMessage {
        match (self.method, self.id) {
            (Some(method), Some(id)) => ServerMessage::Request {
                id,
                method,
                params: self.params,
            },
            (Some(method), None) => ServerMessage::Notification { method },
            (None, id) => ServerMessage::Response(RpcResponse {
                jsonrpc: JSONRPC_VERSION.to_string(),
                id: id.unwrap_or(Value::Null),
                result: self.result,
                error: self.error,
            }),
        }
    }
}

/// Reply to a request the server sent us. Only `ping` is supported.
pub fn reply_to_server_request(id: Value, method: &str) -> RpcResponse {
    match method {
        "ping" => RpcResponse::success(id, serde_json::json!({})),
        other => RpcResponse::error(
            id,
            error_codes::METHOD_NOT_FOUND,
            &format!("client does not handle '{}'", other),
        ),
    }
}
