//! Child-process transport: newline-delimited JSON-RPC over stdin/stdout.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use super::McpTransport;
use super::rpc::{IncomingMessage, RpcNotification, RpcRequest, RpcResponse, ServerMessage, reply_to_server_request};
use crate::error::{Result, ToolhostError};

struct Pipes {
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

/// Transport to a tool server running as a child process
pub struct StdioTransport {
    command: String,
    child: Mutex<Option<Child>>,
    pipes: tokio::sync::Mutex<Pipes>,
    closed: AtomicBool,
}

impl StdioTransport {
    /// Spawn `command` with `env` merged over the host environment.
    pub fn spawn(command: &str, args: &[String], env: &HashMap<String, String>) -> Result<Self> {
        let mut child = Command::new(command)
            .args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ToolhostError::Connection(format!("failed to spawn '{}': {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ToolhostError::Connection("failed to capture server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ToolhostError::Connection("failed to capture server stdout".to_string()))?;

        tracing::debug!(command, pid = ?child.id(), "Spawned tool server");

        Ok(Self {
            command: command.to_string(),
            child: Mutex::new(Some(child)),
            pipes: tokio::sync::Mutex::new(Pipes {
                stdin: Some(stdin),
                stdout: BufReader::new(stdout),
            }),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ToolhostError::InvalidState(format!("transport to '{}' is closed", self.command)));
        }
        Ok(())
    }
}

async fn write_line(stdin: &mut Option<ChildStdin>, line: &str) -> Result<()> {
    let stdin = stdin
        .as_mut()
        .ok_or_else(|| ToolhostError::Connection("server stdin already closed".to_string()))?;
    stdin
        .write_all(format!("{}\n", line).as_bytes())
        .await
        .map_err(|e| ToolhostError::Connection(format!("failed to write to server stdin: {}", e)))?;
    stdin
        .flush()
        .await
        .map_err(|e| ToolhostError::Connection(format!("failed to flush server stdin: {}", e)))?;
    Ok(())
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn request(&self, request: RpcRequest) -> Result<RpcResponse> {
        self.ensure_open()?;
        let mut pipes = self.pipes.lock().await;
        let id = request.id;

        write_line(&mut pipes.stdin, &serde_json::to_string(&request)?).await?;

        loop {
            let mut line = String::new();
            let read = pipes
                .stdout
                .read_line(&mut line)
                .await
                .map_err(|e| ToolhostError::Connection(format!("failed to read from server stdout: {}", e)))?;
            if read == 0 {
                return Err(ToolhostError::Connection(
                    "server process closed stdout (EOF)".to_string(),
                ));
            }

            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let message: IncomingMessage = match serde_json::from_str(line) {
                Ok(message) => message,
                Err(e) => {
                    log::warn!("Ignoring non-JSON output from '{}': {}", self.command, e);
                    continue;
                }
            };

            match message.classify() {
                ServerMessage::Response(response) if response.answers(id) => return Ok(response),
                ServerMessage::Response(response) => {
                    log::debug!("Discarding response for unexpected id {}", response.id);
                }
                ServerMessage::Request { id: server_id, method, .. } => {
                    let reply = reply_to_server_request(server_id, &method);
                    write_line(&mut pipes.stdin, &serde_json::to_string(&reply)?).await?;
                }
                ServerMessage::Notification { method } => {
                    tracing::trace!(command = %self.command, method = %method, "Server notification");
                }
            }
        }
    }

    async fn notify(&self, notification: RpcNotification) -> Result<()> {
        self.ensure_open()?;
        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &serde_json::to_string(&notification)?).await
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Closing stdin lets a well-behaved server exit on its own
        if let Ok(mut pipes) = self.pipes.try_lock() {
            pipes.stdin.take();
        }

        let mut guard = self
            .child
            .lock()
            .map_err(|e| ToolhostError::Connection(format!("child lock poisoned: {}", e)))?;
        let Some(mut child) = guard.take() else {
            return Ok(());
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                log::debug!("Tool server '{}' already exited with {}", self.command, status);
                Ok(())
            }
            Ok(None) => child
                .start_kill()
                .map_err(|e| ToolhostError::Connection(format!("failed to stop '{}': {}", self.command, e))),
            Err(e) => Err(ToolhostError::Connection(format!(
                "failed to query '{}' status: {}",
                self.command, e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("stdio:{}", self.command)
    }
}
