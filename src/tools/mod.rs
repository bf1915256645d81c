//! Tool System - discovery, adapter dispatch, and tool handles
//!
//! Configs are discovered from JSON/YAML files, routed by their `type` tag to
//! an adapter, and materialized into `Tool` handles that are handed to the
//! execution collaborator.

mod config;
pub mod discovery;
pub mod factory;
pub mod mcp_adapter;
pub mod native;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

pub use config::ToolConfig;
pub use discovery::{DiscoveryError, FailedConfig, ToolDiscoveryResult, discover};
pub use factory::{AdapterKind, ToolAdapter, ToolFactory};
pub use mcp_adapter::{MCP_DEPENDENCY_ERROR, McpHttpAdapter, McpSettings, McpStdioAdapter};
pub use native::{ModuleCatalog, NativeFunction, NativeFunctionAdapter, NativeModule};

/// Tool definition as presented to a language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

/// A loaded tool capability.
///
/// Loading never calls `invoke`; the execution collaborator does.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model calls the tool by
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON schema for the tool's input
    fn input_schema(&self) -> Value;

    /// Run the tool with JSON arguments
    async fn invoke(&self, arguments: Value) -> Result<Value>;

    /// Convert to a model-facing definition
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition::new(self.name(), self.description(), self.input_schema())
    }
}

/// Outcome of materializing one `ToolConfig`.
#[derive(Default)]
pub struct ToolCreationResult {
    pub tools: Vec<Box<dyn Tool>>,
    pub requested_functions: Vec<String>,
    pub found_functions: Vec<String>,
    pub missing_functions: Vec<String>,
    pub error: Option<String>,
}

impl fmt::Debug for ToolCreationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.tools.iter().map(|t| t.name()).collect();
        f.debug_struct("ToolCreationResult")
            .field("tools", &names)
            .field("requested_functions", &self.requested_functions)
            .field("found_functions", &self.found_functions)
            .field("missing_functions", &self.missing_functions)
            .field("error", &self.error)
            .finish()
    }
}

impl ToolCreationResult {
    /// A result with no tools and an error; every requested function is missing.
    pub fn failed(config: &ToolConfig, error: impl Into<String>) -> Self {
        let requested = config.requested_functions();
        Self {
            tools: Vec::new(),
            missing_functions: requested.clone(),
            requested_functions: requested,
            found_functions: Vec::new(),
            error: Some(error.into()),
        }
    }

    /// Whether this source needs attention
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Take ownership of the created tools
    pub fn into_tools(self) -> Vec<Box<dyn Tool>> {
        self.tools
    }
}

/// Concatenate every result's tools in config order.
pub fn collect_tools(results: Vec<ToolCreationResult>) -> Vec<Box<dyn Tool>> {
    results.into_iter().flat_map(ToolCreationResult::into_tools).collect()
}

/// Partition `requested` against the names a source offers.
///
/// Returns the selected offer indices (first match per name) plus the found
/// and missing names, both in request order.
pub(crate) fn select_requested<'a, I>(requested: &[String], offered: I) -> (Vec<usize>, Vec<String>, Vec<String>)
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let mut selected = Vec::new();
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in requested {
        match offered.clone().into_iter().position(|offer| offer == name) {
            Some(index) => {
                selected.push(index);
                found.push(name.clone());
            }
            None => missing.push(name.clone()),
        }
    }
    (selected, found, missing)
}
