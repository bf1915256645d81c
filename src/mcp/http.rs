//! HTTP transport: JSON-RPC POSTed to a single endpoint.
//!
//! Responses arrive either as a JSON body or as a `text/event-stream` whose
//! `data:` lines carry JSON-RPC messages. The server may assign a session
//! via the `Mcp-Session-Id` header, which is echoed on later requests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;

use super::McpTransport;
use super::rpc::{IncomingMessage, RpcNotification, RpcRequest, RpcResponse, ServerMessage};
use crate::error::{Result, ToolhostError};

pub const SESSION_HEADER: &str = "mcp-session-id";
const ACCEPT_BOTH: &str = "application/json, text/event-stream";

/// Transport to a tool server reachable over HTTP
pub struct HttpTransport {
    url: String,
    client: Client,
    headers: HeaderMap,
    session_id: Mutex<Option<String>>,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build a transport for `url`, sending `headers` with every request.
    pub fn new(url: &str, headers: &HashMap<String, String>) -> Result<Self> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ToolhostError::Config(format!("invalid header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ToolhostError::Config(format!("invalid value for header '{}': {}", name, e)))?;
            header_map.insert(name, value);
        }

        let client = Client::builder()
            .build()
            .map_err(|e| ToolhostError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            url: url.to_string(),
            client,
            headers: header_map,
            session_id: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Session assigned by the server, if any
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().ok().and_then(|id| id.clone())
    }

    async fn post(&self, body: Value) -> Result<reqwest::Response> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolhostError::InvalidState(format!("transport to '{}' is closed", self.url)));
        }

        let mut request = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(ACCEPT, ACCEPT_BOTH)
            .json(&body);
        if let Some(id) = self.session_id() {
            request = request.header(SESSION_HEADER, id);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolhostError::Connection(format!("Request to {} failed: {}", self.url, e)))?;

        if let Some(id) = response.headers().get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
            let mut current = self
                .session_id
                .lock()
                .map_err(|e| ToolhostError::Connection(format!("session lock poisoned: {}", e)))?;
            if current.as_deref() != Some(id) {
                tracing::debug!(url = %self.url, session = id, "Tool server assigned session");
            }
            *current = Some(id.to_string());
        }

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ToolhostError::Connection(format!("HTTP {} from {}: {}", status, self.url, body)));
        }
        Ok(response)
    }
}

/// JSON-RPC messages carried by the `data:` lines of an event stream.
pub fn parse_event_stream(body: &str) -> Vec<Value> {
    let mut messages = Vec::new();
    let mut data = String::new();

    for line in body.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            if !data.is_empty() {
                if let Ok(value) = serde_json::from_str(&data) {
                    messages.push(value);
                }
                data.clear();
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    messages
}

/// Pick the response to request `id` out of a decoded body.
fn find_response(values: Vec<Value>, id: u64) -> Option<RpcResponse> {
    values
        .into_iter()
        .flat_map(|value| match value {
            Value::Array(batch) => batch,
            single => vec![single],
        })
        .filter_map(|value| serde_json::from_value::<IncomingMessage>(value).ok())
        .find_map(|message| match message.classify() {
            ServerMessage::Response(response) if response.answers(id) => Some(response),
            _ => None,
        })
}

#[async_trait]
impl McpTransport for HttpTransport {
    async fn request(&self, request: RpcRequest) -> Result<RpcResponse> {
        let id = request.id;
        let response = self.post(serde_json::to_value(&request)?).await?;

        let is_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        let body = response
            .text()
            .await
            .map_err(|e| ToolhostError::Connection(format!("Failed to read response body: {}", e)))?;

        let values = if is_stream {
            parse_event_stream(&body)
        } else {
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| ToolhostError::Protocol(format!("invalid JSON from {}: {}", self.url, e)))?;
            vec![value]
        };

        find_response(values, id).ok_or_else(|| {
            ToolhostError::Protocol(format!("no response for request {} from {}", id, self.url))
        })
    }

    async fn notify(&self, notification: RpcNotification) -> Result<()> {
        self.post(serde_json::to_value(&notification)?).await?;
        Ok(())
    }

    /// Mark the transport closed and ask the server to end the session.
    ///
    /// The `DELETE` runs on a detached task of the current runtime and is
    /// best-effort: if the runtime shuts down right after teardown (as a
    /// short-lived CLI does) the request may never be sent, and the server
    /// is left to expire the session on its own.
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let Some(session) = self.session_id() else {
            return Ok(());
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let request = self
                    .client
                    .delete(&self.url)
                    .headers(self.headers.clone())
                    .header(SESSION_HEADER, session);
                let url = self.url.clone();
                handle.spawn(async move {
                    if let Err(e) = request.send().await {
                        log::debug!("Session termination for {} failed: {}", url, e);
                    }
                });
            }
            Err(_) => log::debug!("No runtime available to terminate session at {}", self.url),
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_event_stream() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n: keepalive\n\ndata: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\"}\n";
        let messages = parse_event_stream(body);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["id"], 1);
        assert_eq!(messages[1]["method"], "notifications/progress");
    }

    #[test]
    fn test_parse_event_stream_multiline_data() {
        let body = "data: {\"jsonrpc\":\"2.0\",\ndata: \"id\":2,\"result\":{\"ok\":true}}\n\n";
        let messages = parse_event_stream(body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["result"]["ok"], true);
    }

    #[test]
    fn test_find_response_skips_other_messages() {
        let values = vec![
            json!({"jsonrpc": "2.0", "method": "notifications/message"}),
            json!([
                {"jsonrpc": "2.0", "id": 4, "result": {"stale": true}},
                {"jsonrpc": "2.0", "id": 5, "result": {"tools": []}}
            ]),
        ];
        let response = find_response(values, 5).unwrap();
        assert_eq!(response.result.unwrap()["tools"], json!([]));
    }

    #[test]
    fn test_find_response_missing() {
        let values = vec![json!({"jsonrpc": "2.0", "id": 1, "result": {}})];
        assert!(find_response(values, 2).is_none());
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let mut headers = HashMap::new();
        headers.insert("bad header".to_string(), "x".to_string());
        let err = HttpTransport::new("http://localhost:1/mcp", &headers).err().unwrap();
        assert!(matches!(err, ToolhostError::Config(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let transport = HttpTransport::new("http://127.0.0.1:9/mcp", &HashMap::new()).unwrap();
        let err = transport
            .request(RpcRequest::new(1, "initialize", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolhostError::Connection(_)));
        assert_eq!(transport.describe(), "http:http://127.0.0.1:9/mcp");
    }

    /// Accept one connection, capture the raw request, answer with `response`.
    async fn serve_once(listener: &TcpListener, response: String) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                    .and_then(|v| v.parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    break;
                }
            }
            if n == 0 {
                break;
            }
        }
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&buf).to_ascii_lowercase()
    }

    fn http_response(content_type: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            content_type,
            body.len(),
            extra_headers,
            body
        )
    }

    #[tokio::test]
    async fn test_event_stream_response_and_session_tracking() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mcp", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let first = serve_once(
                &listener,
                http_response(
                    "text/event-stream",
                    "Mcp-Session-Id: sess-7\r\n",
                    "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"protocolVersion\":\"2025-03-26\"}}\n\n",
                ),
            )
            .await;
            let second = serve_once(
                &listener,
                http_response("application/json", "", r#"{"jsonrpc":"2.0","id":2,"result":{"tools":[]}}"#),
            )
            .await;
            (first, second)
        });

        let mut headers = HashMap::new();
        headers.insert("X-Api-Key".to_string(), "secret".to_string());
        let transport = HttpTransport::new(&url, &headers).unwrap();

        let init = transport.request(RpcRequest::new(1, "initialize", None)).await.unwrap();
        assert_eq!(init.result.unwrap()["protocolVersion"], "2025-03-26");
        assert_eq!(transport.session_id().as_deref(), Some("sess-7"));

        let list = transport.request(RpcRequest::new(2, "tools/list", None)).await.unwrap();
        assert_eq!(list.result.unwrap()["tools"], json!([]));

        let (first, second) = server.await.unwrap();
        assert!(first.contains("x-api-key: secret"));
        assert!(first.contains("accept: application/json, text/event-stream"));
        assert!(!first.contains("mcp-session-id"));
        assert!(second.contains("mcp-session-id: sess-7"));
    }

    #[tokio::test]
    async fn test_close_terminates_session_while_runtime_lives() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/mcp", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            serve_once(
                &listener,
                http_response(
                    "application/json",
                    "Mcp-Session-Id: sess-9\r\n",
                    r#"{"jsonrpc":"2.0","id":1,"result":{}}"#,
                ),
            )
            .await;
            serve_once(&listener, http_response("application/json", "", "")).await
        });

        let transport = HttpTransport::new(&url, &HashMap::new()).unwrap();
        transport.request(RpcRequest::new(1, "initialize", None)).await.unwrap();
        transport.close().unwrap();
        transport.close().unwrap();

        let termination = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(termination.starts_with("delete /mcp"));
        assert!(termination.contains("mcp-session-id: sess-9"));
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_requests() {
        let transport = HttpTransport::new("http://127.0.0.1:9/mcp", &HashMap::new()).unwrap();
        transport.close().unwrap();
        let err = transport
            .notify(RpcNotification::new("notifications/initialized", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolhostError::InvalidState(_)));
        assert!(err.to_string().contains("closed"));
    }
}
