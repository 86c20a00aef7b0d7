//! Per-node-type executors.
//!
//! Every node kind has an executor implementing [`NodeExecutor`]. An
//! executor's `execute` is total: it never propagates an error out — all
//! failures are packaged as a failed [`NodeExecutionResult`] with a
//! structured error. Executors mutate the run only through the
//! [`ExecutionContext`]'s public interface, append to its log, and call
//! out through the injected providers in [`ExecutorServices`].
//!
//! The dispatch table built by [`builtin_executors`] is the extension
//! seam: runners register additional executors (or overrides) through
//! `WorkflowRunner::register_executor`.

mod agent;
mod classify;
mod end;
mod file_search;
mod guardrails;
mod if_else;
mod mcp_call;
mod set_state;
mod start;
mod transform;
mod user_approval;
mod while_loop;

pub use agent::AgentExecutor;
pub use classify::ClassifyExecutor;
pub use end::EndExecutor;
pub use file_search::FileSearchExecutor;
pub use guardrails::GuardrailsExecutor;
pub use if_else::IfElseExecutor;
pub use mcp_call::McpExecutor;
pub use set_state::SetStateExecutor;
pub use start::StartExecutor;
pub use transform::TransformExecutor;
pub use user_approval::UserApprovalExecutor;
pub use while_loop::WhileExecutor;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

use crate::approval::ApprovalRegistry;
use crate::context::ExecutionContext;
use crate::definition::NodeDefinition;
use crate::event_bus::EventEmitter;
use crate::providers::{LlmProvider, McpProvider, VectorStoreProvider};
use crate::types::{
    ErrorCode, ErrorInfo, NodeExecutionResult, NodeResultBuilder, NodeType, ValidationReport,
};

/// Injected collaborators shared by all executors in a run.
#[derive(Clone)]
pub struct ExecutorServices {
    pub llm: Option<Arc<dyn LlmProvider>>,
    pub vector: Option<Arc<dyn VectorStoreProvider>>,
    pub mcp: Option<Arc<dyn McpProvider>>,
    pub approvals: Arc<ApprovalRegistry>,
    pub emitter: Arc<dyn EventEmitter>,
}

/// One node kind's execution logic.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// The node kind this executor handles.
    fn node_type(&self) -> NodeType;

    /// Check a node's configuration without executing it. The runner calls
    /// this before every dispatch and during whole-graph validation.
    fn validate(&self, _config: &Value) -> ValidationReport {
        ValidationReport::ok()
    }

    /// Execute the node. Must be total: failures come back as a failed
    /// result, never as a panic or propagated error.
    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        services: &ExecutorServices,
    ) -> NodeExecutionResult;
}

/// The built-in dispatch table covering every [`NodeType`].
#[must_use]
pub fn builtin_executors() -> FxHashMap<NodeType, Arc<dyn NodeExecutor>> {
    let executors: Vec<Arc<dyn NodeExecutor>> = vec![
        Arc::new(StartExecutor),
        Arc::new(EndExecutor),
        Arc::new(AgentExecutor),
        Arc::new(ClassifyExecutor),
        Arc::new(IfElseExecutor),
        Arc::new(WhileExecutor),
        Arc::new(TransformExecutor),
        Arc::new(SetStateExecutor),
        Arc::new(UserApprovalExecutor),
        Arc::new(GuardrailsExecutor),
        Arc::new(FileSearchExecutor),
        Arc::new(McpExecutor),
    ];
    executors
        .into_iter()
        .map(|executor| (executor.node_type(), executor))
        .collect()
}

/// Result builder pre-filled with the node identity and input snapshot.
pub(crate) fn result_for(node: &NodeDefinition, ctx: &ExecutionContext) -> NodeResultBuilder {
    NodeExecutionResult::builder(&node.id, node.node_type).inputs(ctx.input_as_value())
}

/// Shorthand for a failed result.
pub(crate) fn fail(
    node: &NodeDefinition,
    ctx: &ExecutionContext,
    code: ErrorCode,
    message: impl Into<String>,
) -> NodeExecutionResult {
    result_for(node, ctx).failed(ErrorInfo::new(code, message))
}

/// Parse a node's config into its typed view, or produce the failed result
/// directly.
pub(crate) fn parse_config<T: DeserializeOwned>(
    node: &NodeDefinition,
    ctx: &ExecutionContext,
    code: ErrorCode,
) -> Result<T, Box<NodeExecutionResult>> {
    serde_json::from_value(node.config.clone())
        .map_err(|e| Box::new(fail(node, ctx, code, format!("invalid configuration: {e}"))))
}

/// Validation-time variant of [`parse_config`].
pub(crate) fn parse_for_validation<T: DeserializeOwned>(
    config: &Value,
) -> Result<T, ValidationReport> {
    serde_json::from_value(config.clone())
        .map_err(|e| ValidationReport::invalid(format!("invalid configuration: {e}")))
}
