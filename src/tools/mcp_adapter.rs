//! Adapters for remote tool servers (MCP)
//!
//! `mcp-stdio` spawns the server as a child process, `mcp-http` talks to an
//! endpoint. Both register the client with the `ResourceStack` before any
//! protocol traffic, then list and filter the advertised tools the same way.

use async_trait::async_trait;

use super::config::ToolConfig;
use super::factory::ToolAdapter;
use super::ToolCreationResult;
use crate::error::{Result, ToolhostError};
use crate::resources::ResourceStack;

/// Reported when the crate is built without the `mcp` feature
pub const MCP_DEPENDENCY_ERROR: &str = "MCP dependencies not installed";

/// Result for a remote config when no transport support is compiled in
#[cfg_attr(feature = "mcp", allow(dead_code))]
fn dependency_missing(config: &ToolConfig) -> ToolCreationResult {
    let err = ToolhostError::DependencyMissing(MCP_DEPENDENCY_ERROR.to_string());
    log::warn!("Cannot load tool config '{}': {}", config.id, err);
    ToolCreationResult::failed(config, err.to_string())
}

/// Handshake settings shared by both remote adapters
#[derive(Debug, Clone)]
pub struct McpSettings {
    pub protocol_version: String,
    pub client_name: String,
}

impl Default for McpSettings {
    fn default() -> Self {
        Self {
            protocol_version: "2025-03-26".to_string(),
            client_name: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Adapter for tool servers launched as child processes
#[cfg_attr(not(feature = "mcp"), allow(dead_code))]
#[derive(Debug, Clone, Default)]
pub struct McpStdioAdapter {
    settings: McpSettings,
}

impl McpStdioAdapter {
    pub fn new(settings: McpSettings) -> Self {
        Self { settings }
    }
}

/// Adapter for tool servers reachable over HTTP
#[cfg_attr(not(feature = "mcp"), allow(dead_code))]
#[derive(Debug, Clone, Default)]
pub struct McpHttpAdapter {
    settings: McpSettings,
}

impl McpHttpAdapter {
    pub fn new(settings: McpSettings) -> Self {
        Self { settings }
    }
}

#[cfg(feature = "mcp")]
fn missing_field(config: &ToolConfig, field: &str) -> ToolCreationResult {
    ToolCreationResult::failed(
        config,
        format!("Tool config '{}' is missing required field '{}'", config.id, field),
    )
}

#[cfg(feature = "mcp")]
mod connected {
    use std::sync::Arc;

    use super::McpSettings;
    use crate::error::Result;
    use crate::mcp::{ClientOptions, McpClient, McpToolInfo, McpTransport, RemoteTool};
    use crate::resources::ResourceStack;
    use crate::tools::config::ToolConfig;
    use crate::tools::{Tool, ToolCreationResult, select_requested};

    impl McpSettings {
        fn client_options(&self) -> ClientOptions {
            ClientOptions {
                protocol_version: self.protocol_version.clone(),
                client_name: self.client_name.clone(),
                ..ClientOptions::default()
            }
        }
    }

    /// Register the client, handshake, enumerate, and filter.
    pub(super) async fn load(
        config: &ToolConfig,
        transport: Result<Box<dyn McpTransport>>,
        settings: &McpSettings,
        resources: &mut ResourceStack,
    ) -> ToolCreationResult {
        let transport = match transport {
            Ok(transport) => transport,
            Err(e) => {
                log::warn!("Failed to connect tool server '{}': {}", config.id, e);
                return ToolCreationResult::failed(config, e.to_string());
            }
        };

        let client = resources.enter(Arc::new(McpClient::new(config.id.clone(), transport)));

        let advertised = match enumerate(&client, settings).await {
            Ok(advertised) => advertised,
            Err(e) => {
                log::warn!("Failed to load tools from '{}': {}", config.id, e);
                return ToolCreationResult::failed(config, e.to_string());
            }
        };

        select(config, advertised, &client)
    }

    async fn enumerate(client: &McpClient, settings: &McpSettings) -> Result<Vec<McpToolInfo>> {
        client.initialize(&settings.client_options()).await?;
        client.list_tools().await
    }

    fn remote(info: &McpToolInfo, client: &Arc<McpClient>) -> Box<dyn Tool> {
        Box::new(RemoteTool::new(info.clone(), Arc::clone(client)))
    }

    fn select(config: &ToolConfig, advertised: Vec<McpToolInfo>, client: &Arc<McpClient>) -> ToolCreationResult {
        let mut result = ToolCreationResult::default();

        if !config.has_allow_list() {
            result.found_functions = advertised.iter().map(|t| t.name.clone()).collect();
            result.tools = advertised.iter().map(|t| remote(t, client)).collect();
            return result;
        }

        let requested = config.requested_functions();
        let (selected, found, missing) = select_requested(&requested, advertised.iter().map(|t| t.name.as_str()));
        if !missing.is_empty() {
            log::warn!("Tool server '{}' does not advertise: {}", config.id, missing.join(", "));
        }

        result.tools = selected.into_iter().map(|i| remote(&advertised[i], client)).collect();
        result.requested_functions = requested;
        result.found_functions = found;
        result.missing_functions = missing;
        result
    }
}

#[async_trait]
impl ToolAdapter for McpStdioAdapter {
    #[cfg(feature = "mcp")]
    async fn create(&self, config: &ToolConfig, resources: &mut ResourceStack) -> Result<ToolCreationResult> {
        use crate::mcp::{McpTransport, StdioTransport};

        let Some(command) = config.command.as_deref().filter(|c| !c.is_empty()) else {
            return Ok(missing_field(config, "command"));
        };

        let transport =
            StdioTransport::spawn(command, &config.args, &config.env).map(|t| Box::new(t) as Box<dyn McpTransport>);
        Ok(connected::load(config, transport, &self.settings, resources).await)
    }

    #[cfg(not(feature = "mcp"))]
    async fn create(&self, config: &ToolConfig, _resources: &mut ResourceStack) -> Result<ToolCreationResult> {
        Ok(dependency_missing(config))
    }
}

#[async_trait]
impl ToolAdapter for McpHttpAdapter {
    #[cfg(feature = "mcp")]
    async fn create(&self, config: &ToolConfig, resources: &mut ResourceStack) -> Result<ToolCreationResult> {
        use crate::mcp::{HttpTransport, McpTransport};

        let Some(url) = config.url.as_deref().filter(|u| !u.is_empty()) else {
            return Ok(missing_field(config, "url"));
        };

        let transport = HttpTransport::new(url, &config.headers).map(|t| Box::new(t) as Box<dyn McpTransport>);
        Ok(connected::load(config, transport, &self.settings, resources).await)
    }

    #[cfg(not(feature = "mcp"))]
    async fn create(&self, config: &ToolConfig, _resources: &mut ResourceStack) -> Result<ToolCreationResult> {
        Ok(dependency_missing(config))
    }
}
