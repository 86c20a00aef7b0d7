//! Pluggable provider seams: LLM chat, vector-store search, and MCP tool
//! calls.
//!
//! The engine never talks to the outside world directly; node executors go
//! through these traits, and callers inject implementations (or use the
//! mock implementations shipped here for tests and dry runs). Each
//! provider kind also has a small named registry with a default slot.

pub mod llm;
pub mod mcp;
pub mod vector;

use miette::Diagnostic;
use thiserror::Error;

pub use llm::{
    ChatMessage, ChatRequest, ChatResponse, ChatRole, ChatUsage, LlmProvider, LlmRegistry,
    MockLlmProvider,
};
pub use mcp::{McpProvider, McpRegistry, MockMcpServer, ToolCallResult, ToolInfo};
pub use vector::{MockVectorStore, SearchHit, VectorStoreProvider, VectorStoreRegistry};

/// Failures surfaced by provider implementations.
#[derive(Debug, Error, Diagnostic)]
pub enum ProviderError {
    /// The provider (or a named server/store behind it) is not reachable.
    #[error("provider '{name}' is not available")]
    #[diagnostic(
        code(agentflow::provider::unavailable),
        help("Inject a provider implementation, or check its connection state.")
    )]
    Unavailable { name: String },

    /// The request reached the provider but failed.
    #[error("{provider} request failed: {message}")]
    #[diagnostic(code(agentflow::provider::request))]
    Request { provider: String, message: String },
}

impl ProviderError {
    pub fn unavailable(name: impl Into<String>) -> Self {
        Self::Unavailable { name: name.into() }
    }

    pub fn request(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            provider: provider.into(),
            message: message.into(),
        }
    }
}
