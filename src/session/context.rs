//! Conversation messages and the execution context the proxy is wired to.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// Message body: plain text or provider content blocks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

/// A single conversation message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text)
    }

    /// Concatenated text of the message, ignoring non-text blocks
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// The host's conversation runtime, as seen by the session proxy.
///
/// The proxy only reads and replaces the in-memory message list.
pub trait ExecutionContext: Send + Sync {
    fn messages(&self) -> Vec<Message>;

    fn replace_messages(&self, messages: Vec<Message>);

    fn clear_messages(&self);
}

/// Minimal context keeping messages in memory
#[derive(Debug, Default)]
pub struct InMemoryContext {
    messages: Mutex<Vec<Message>>,
}

impl InMemoryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_messages(messages: Vec<Message>) -> Self {
        Self {
            messages: Mutex::new(messages),
        }
    }

    /// Append a message, as an agent runtime would after a turn
    pub fn push(&self, message: Message) {
        self.lock().push(message);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ExecutionContext for InMemoryContext {
    fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    fn replace_messages(&self, messages: Vec<Message>) {
        *self.lock() = messages;
    }

    fn clear_messages(&self) {
        self.lock().clear();
    }
}
