//! Tool configuration records
//!
//! One `ToolConfig` per discovered file. Type-specific fields are optional
//! here and validated by the adapter that consumes them.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A validated tool configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Identifier; not required to be unique
    pub id: String,

    /// Type tag used for adapter dispatch
    #[serde(rename = "type")]
    pub tool_type: String,

    #[serde(default)]
    pub disabled: bool,

    /// Ordered allow-list of functions or remote tool names
    #[serde(default)]
    pub functions: Option<Vec<String>>,

    /// Dotted path of a native module (`native`)
    #[serde(default)]
    pub module_path: Option<String>,

    /// Executable to spawn (`mcp-stdio`)
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment merged over the host's (`mcp-stdio`)
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint (`mcp-http`)
    #[serde(default)]
    pub url: Option<String>,

    /// Extra request headers (`mcp-http`)
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// File this config was discovered in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<PathBuf>,

    /// Unrecognized fields, retained but ignored
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ToolConfig {
    /// Create a config with only the required fields set
    pub fn new(id: impl Into<String>, tool_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool_type: tool_type.into(),
            disabled: false,
            functions: None,
            module_path: None,
            command: None,
            args: Vec::new(),
            env: HashMap::new(),
            url: None,
            headers: HashMap::new(),
            source_file: None,
            extra: HashMap::new(),
        }
    }

    /// Requested function names; empty when no allow-list was given
    pub fn requested_functions(&self) -> Vec<String> {
        self.functions.clone().unwrap_or_default()
    }

    /// Whether an allow-list restricts what gets exposed
    pub fn has_allow_list(&self) -> bool {
        self.functions.as_ref().is_some_and(|f| !f.is_empty())
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }
}
