//! Tool-server protocol client (MCP)
//!
//! A `McpClient` speaks JSON-RPC to a tool server through a transport:
//! newline-delimited over a child process's stdio, or POSTed over HTTP.

mod http;
pub mod rpc;
mod stdio;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::error::{Result, ToolhostError};
use crate::resources::Scoped;
use crate::tools::Tool;

pub use http::HttpTransport;
pub use rpc::{RpcError, RpcNotification, RpcRequest, RpcResponse};
pub use stdio::StdioTransport;

/// Protocol revision requested during the handshake
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-03-26";

/// A bidirectional JSON-RPC channel to one tool server.
#[async_trait]
pub trait McpTransport: Send + Sync {
    /// Send a request and wait for the response with the same id
    async fn request(&self, request: RpcRequest) -> Result<RpcResponse>;

    /// Send a notification; no response is expected
    async fn notify(&self, notification: RpcNotification) -> Result<()>;

    /// Release the underlying process or session
    fn close(&self) -> Result<()>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// Identity and protocol settings sent in `initialize`
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A tool as advertised by `tools/list`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct McpToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default = "empty_schema")]
    pub input_schema: Value,
}

fn empty_schema() -> Value {
    json!({"type": "object", "properties": {}})
}

#[derive(Debug, Deserialize)]
struct ListToolsPage {
    #[serde(default)]
    tools: Vec<McpToolInfo>,
    #[serde(rename = "nextCursor", default)]
    next_cursor: Option<String>,
}

/// Client for one connected tool server
pub struct McpClient {
    label: String,
    transport: Box<dyn McpTransport>,
    next_id: AtomicU64,
    server_info: Mutex<Option<Value>>,
}

impl McpClient {
    pub fn new(label: impl Into<String>, transport: Box<dyn McpTransport>) -> Self {
        Self {
            label: label.into(),
            transport,
            next_id: AtomicU64::new(1),
            server_info: Mutex::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// `serverInfo` from the handshake, once connected
    pub fn server_info(&self) -> Option<Value> {
        self.server_info.lock().ok().and_then(|info| info.clone())
    }

    /// Perform the `initialize` handshake
    pub async fn initialize(&self, options: &ClientOptions) -> Result<Value> {
        let params = json!({
            "protocolVersion": options.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": options.client_name,
                "version": options.client_version,
            }
        });
        let result = self.call("initialize", Some(params)).await?;

        let negotiated = result.get("protocolVersion").and_then(Value::as_str);
        if let Some(version) = negotiated.filter(|v| *v != options.protocol_version) {
            log::info!(
                "Server '{}' negotiated protocol {} (requested {})",
                self.label,
                version,
                options.protocol_version
            );
        }
        if let Ok(mut info) = self.server_info.lock() {
            *info = result.get("serverInfo").cloned();
        }

        self.transport
            .notify(RpcNotification::new("notifications/initialized", None))
            .await?;

        tracing::info!(server = %self.label, transport = %self.transport.describe(), "Connected to tool server");
        Ok(result)
    }

    /// Every advertised tool, following pagination
    pub async fn list_tools(&self) -> Result<Vec<McpToolInfo>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        let mut seen = HashSet::new();

        loop {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let result = self.call("tools/list", params).await?;
            let page: ListToolsPage = serde_json::from_value(result)
                .map_err(|e| ToolhostError::Protocol(format!("invalid tools/list result: {}", e)))?;
            tools.extend(page.tools);

            match page.next_cursor {
                Some(next) if !next.is_empty() => {
                    if !seen.insert(next.clone()) {
                        log::warn!("Server '{}' repeated cursor '{}'; stopping pagination", self.label, next);
                        break;
                    }
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        tracing::debug!(server = %self.label, count = tools.len(), "Listed remote tools");
        Ok(tools)
    }

    /// Invoke a remote tool
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value> {
        let result = self
            .call("tools/call", Some(json!({"name": name, "arguments": arguments})))
            .await?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            return Err(ToolhostError::Protocol(format!(
                "tool '{}' failed: {}",
                name,
                content_text(&result)
            )));
        }
        Ok(result)
    }

    async fn call(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(server = %self.label, id, method, "Sending request");

        let response = self.transport.request(RpcRequest::new(id, method, params)).await?;
        if let Some(err) = response.error {
            return Err(ToolhostError::Protocol(format!(
                "{} failed with code {}: {}",
                method, err.code, err.message
            )));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

impl Scoped for McpClient {
    fn scope_label(&self) -> String {
        format!("mcp:{}", self.label)
    }

    fn exit(&self) -> Result<()> {
        log::debug!("Closing tool server '{}'", self.label);
        self.transport.close()
    }
}

fn content_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .filter(|text| !text.is_empty())
        .unwrap_or_else(|| "no error text".to_string())
}

/// A tool hosted by a remote server
pub struct RemoteTool {
    info: McpToolInfo,
    description: String,
    client: Arc<McpClient>,
}

impl RemoteTool {
    pub fn new(info: McpToolInfo, client: Arc<McpClient>) -> Self {
        let description = info.description.clone().unwrap_or_default();
        Self {
            info,
            description,
            client,
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn invoke(&self, arguments: Value) -> Result<Value> {
        self.client.call_tool(&self.info.name, arguments).await
    }
}
