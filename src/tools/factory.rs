//! Adapter registry and dispatch
//!
//! Each `ToolConfig` is routed by its `type` tag to exactly one adapter.
//! Built-in kinds live in fixed slots; hosts may register extra tags at
//! setup time. Per-config failures never abort the batch.

use std::collections::HashMap;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;

use super::config::ToolConfig;
use super::mcp_adapter::{McpHttpAdapter, McpSettings, McpStdioAdapter};
use super::native::{ModuleCatalog, NativeFunctionAdapter};
use super::ToolCreationResult;
use crate::error::{Result, ToolhostError};
use crate::resources::ResourceStack;

pub const NATIVE_TAG: &str = "native";
pub const MCP_TAG: &str = "mcp";
pub const MCP_STDIO_TAG: &str = "mcp-stdio";
pub const MCP_HTTP_TAG: &str = "mcp-http";

const BUILTIN_TAGS: [&str; 4] = [NATIVE_TAG, MCP_TAG, MCP_STDIO_TAG, MCP_HTTP_TAG];

/// Turns one config into tools, registering any opened resources.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    async fn create(&self, config: &ToolConfig, resources: &mut ResourceStack) -> Result<ToolCreationResult>;
}

/// Which adapter handles a config
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Native,
    McpStdio,
    McpHttp,
    Custom(String),
}

impl AdapterKind {
    /// Tag this kind is registered under
    pub fn tag(&self) -> &str {
        match self {
            Self::Native => NATIVE_TAG,
            Self::McpStdio => MCP_STDIO_TAG,
            Self::McpHttp => MCP_HTTP_TAG,
            Self::Custom(tag) => tag,
        }
    }

    pub fn is_builtin_tag(tag: &str) -> bool {
        BUILTIN_TAGS.contains(&tag)
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// Routes configs to adapters
pub struct ToolFactory {
    native: Box<dyn ToolAdapter>,
    mcp_stdio: Box<dyn ToolAdapter>,
    mcp_http: Box<dyn ToolAdapter>,
    custom: HashMap<String, Box<dyn ToolAdapter>>,
}

impl Default for ToolFactory {
    fn default() -> Self {
        Self::new(Arc::new(ModuleCatalog::with_builtins()), McpSettings::default())
    }
}

impl ToolFactory {
    /// Factory with the built-in adapters
    pub fn new(catalog: Arc<ModuleCatalog>, mcp: McpSettings) -> Self {
        Self {
            native: Box::new(NativeFunctionAdapter::new(catalog)),
            mcp_stdio: Box::new(McpStdioAdapter::new(mcp.clone())),
            mcp_http: Box::new(McpHttpAdapter::new(mcp)),
            custom: HashMap::new(),
        }
    }

    /// Register an adapter for a new type tag.
    pub fn register(&mut self, tag: impl Into<String>, adapter: Box<dyn ToolAdapter>) -> Result<()> {
        let tag = tag.into();
        if AdapterKind::is_builtin_tag(&tag) {
            return Err(ToolhostError::Registry(format!("type '{}' is built in", tag)));
        }
        if self.custom.contains_key(&tag) {
            return Err(ToolhostError::Registry(format!("type '{}' is already registered", tag)));
        }
        log::info!("Registered tool adapter for type '{}'", tag);
        self.custom.insert(tag, adapter);
        Ok(())
    }

    /// Swap the adapter behind a built-in kind.
    pub fn replace_builtin(&mut self, kind: AdapterKind, adapter: Box<dyn ToolAdapter>) -> Result<()> {
        let slot = match kind {
            AdapterKind::Native => &mut self.native,
            AdapterKind::McpStdio => &mut self.mcp_stdio,
            AdapterKind::McpHttp => &mut self.mcp_http,
            AdapterKind::Custom(tag) => {
                return Err(ToolhostError::Registry(format!("type '{}' is not built in", tag)));
            }
        };
        *slot = adapter;
        Ok(())
    }

    /// Registered type tags, built-ins first
    pub fn tags(&self) -> Vec<String> {
        let mut custom: Vec<String> = self.custom.keys().cloned().collect();
        custom.sort();
        BUILTIN_TAGS.iter().map(|t| t.to_string()).chain(custom).collect()
    }

    /// Decide which adapter handles `config`.
    ///
    /// `mcp` picks stdio when `command` is set, else HTTP when `url` is set.
    pub fn resolve_kind(&self, config: &ToolConfig) -> std::result::Result<AdapterKind, String> {
        match config.tool_type.as_str() {
            NATIVE_TAG => Ok(AdapterKind::Native),
            MCP_STDIO_TAG => Ok(AdapterKind::McpStdio),
            MCP_HTTP_TAG => Ok(AdapterKind::McpHttp),
            MCP_TAG if config.command.is_some() => Ok(AdapterKind::McpStdio),
            MCP_TAG if config.url.is_some() => Ok(AdapterKind::McpHttp),
            MCP_TAG => Err(format!(
                "MCP tool config '{}' must specify either 'command' (stdio) or 'url' (http)",
                config.id
            )),
            tag if self.custom.contains_key(tag) => Ok(AdapterKind::Custom(tag.to_string())),
            tag => Err(format!("Unknown tool type '{}'", tag)),
        }
    }

    fn adapter(&self, kind: &AdapterKind) -> Option<&dyn ToolAdapter> {
        match kind {
            AdapterKind::Native => Some(self.native.as_ref()),
            AdapterKind::McpStdio => Some(self.mcp_stdio.as_ref()),
            AdapterKind::McpHttp => Some(self.mcp_http.as_ref()),
            AdapterKind::Custom(tag) => self.custom.get(tag).map(|a| a.as_ref()),
        }
    }

    /// Create tools for every enabled config, in order.
    pub async fn create_tools(&self, configs: &[ToolConfig], resources: &mut ResourceStack) -> Vec<ToolCreationResult> {
        let mut results = Vec::new();
        for config in configs {
            if !config.is_enabled() {
                log::info!("Skipping disabled tool config '{}'", config.id);
                continue;
            }
            results.push(self.create_tools_from_config(config, resources).await);
        }
        results
    }

    /// Dispatch a single config. Never fails; problems land in `error`.
    pub async fn create_tools_from_config(&self, config: &ToolConfig, resources: &mut ResourceStack) -> ToolCreationResult {
        let kind = match self.resolve_kind(config) {
            Ok(kind) => kind,
            Err(message) => {
                log::warn!("{}", message);
                return ToolCreationResult::failed(config, message);
            }
        };

        let Some(adapter) = self.adapter(&kind) else {
            return ToolCreationResult::failed(config, format!("Unknown tool type '{}'", kind));
        };

        let outcome = AssertUnwindSafe(adapter.create(config, resources)).catch_unwind().await;
        let result = match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                log::error!("Adapter '{}' failed for '{}': {}", kind, config.id, e);
                ToolCreationResult::failed(config, e.to_string())
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "adapter panicked".to_string());
                log::error!("Adapter '{}' panicked for '{}': {}", kind, config.id, message);
                ToolCreationResult::failed(config, message)
            }
        };

        tracing::info!(
            config = %config.id,
            kind = %kind,
            tools = result.tools.len(),
            missing = result.missing_functions.len(),
            error = result.error.as_deref().unwrap_or(""),
            "Processed tool config"
        );
        result
    }
}
