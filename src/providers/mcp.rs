//! MCP tool-call provider seam.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

use super::ProviderError;

/// Result of invoking one MCP tool.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ToolCallResult {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            metadata: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Description of a tool a server exposes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Gateway to MCP servers.
#[async_trait]
pub trait McpProvider: Send + Sync + fmt::Debug {
    async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<ToolCallResult, ProviderError>;

    async fn is_server_available(&self, server_id: &str) -> bool;

    async fn get_server_tools(&self, server_id: &str) -> Result<Vec<ToolInfo>, ProviderError>;
}

/// Named MCP providers with a default slot.
#[derive(Debug, Default)]
pub struct McpRegistry {
    providers: FxHashMap<String, Arc<dyn McpProvider>>,
    default: Option<String>,
}

impl McpRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn McpProvider>) {
        let name = name.into();
        if self.default.is_none() {
            self.default = Some(name.clone());
        }
        self.providers.insert(name, provider);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn McpProvider>> {
        self.providers.get(name).cloned()
    }

    #[must_use]
    pub fn default_provider(&self) -> Option<Arc<dyn McpProvider>> {
        self.default.as_deref().and_then(|name| self.get(name))
    }
}

type ToolHandler = Box<dyn Fn(&Map<String, Value>) -> ToolCallResult + Send + Sync>;

/// In-memory MCP server backed by registered closures.
#[derive(Default)]
pub struct MockMcpServer {
    tools: FxHashMap<(String, String), ToolHandler>,
}

impl fmt::Debug for MockMcpServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockMcpServer")
            .field("tools", &self.tools.len())
            .finish()
    }
}

impl MockMcpServer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool handler under `(server, tool)`.
    pub fn tool<F>(mut self, server_id: &str, tool_name: &str, handler: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> ToolCallResult + Send + Sync + 'static,
    {
        self.tools.insert(
            (server_id.to_string(), tool_name.to_string()),
            Box::new(handler),
        );
        self
    }
}

#[async_trait]
impl McpProvider for MockMcpServer {
    async fn call_tool(
        &self,
        server_id: &str,
        tool_name: &str,
        parameters: &Map<String, Value>,
    ) -> Result<ToolCallResult, ProviderError> {
        match self
            .tools
            .get(&(server_id.to_string(), tool_name.to_string()))
        {
            Some(handler) => Ok(handler(parameters)),
            None => Err(ProviderError::request(
                "mock-mcp",
                format!("no tool '{tool_name}' on server '{server_id}'"),
            )),
        }
    }

    async fn is_server_available(&self, server_id: &str) -> bool {
        self.tools.keys().any(|(server, _)| server == server_id)
    }

    async fn get_server_tools(&self, server_id: &str) -> Result<Vec<ToolInfo>, ProviderError> {
        Ok(self
            .tools
            .keys()
            .filter(|(server, _)| server == server_id)
            .map(|(_, tool)| ToolInfo {
                name: tool.clone(),
                description: None,
                input_schema: None,
            })
            .collect())
    }
}
