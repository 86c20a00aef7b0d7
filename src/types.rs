//! Core types for the agentflow workflow engine.
//!
//! This module defines the shared structural types used throughout the
//! system: the closed set of node kinds, run and node statuses, structured
//! error payloads, and the per-dispatch / per-run result shapes.
//!
//! All wire-facing types serialize with camelCase field names so that the
//! JSON forms match the workflow definition and execution result contracts.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The closed set of node kinds a workflow may contain.
///
/// Serialized in kebab-case (`"if-else"`, `"set-state"`, ...) to match the
/// workflow definition format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    /// Entry point; exactly one per workflow.
    Start,
    /// Terminal node; reaching it completes the run.
    End,
    /// LLM call with interpolated instructions.
    Agent,
    /// LLM-backed category routing.
    Classify,
    /// Ordered condition list with an optional else branch.
    IfElse,
    /// Bounded loop driving a set of body nodes.
    While,
    /// Sandboxed user script over the context.
    Transform,
    /// Typed assignment to a dot-path variable.
    SetState,
    /// Pause-for-approval checkpoint.
    UserApproval,
    /// Content validation rules over input/output.
    Guardrails,
    /// Retrieval across vector stores.
    FileSearch,
    /// External MCP tool call.
    Mcp,
}

impl NodeType {
    /// All node kinds, in declaration order.
    pub const ALL: [NodeType; 12] = [
        NodeType::Start,
        NodeType::End,
        NodeType::Agent,
        NodeType::Classify,
        NodeType::IfElse,
        NodeType::While,
        NodeType::Transform,
        NodeType::SetState,
        NodeType::UserApproval,
        NodeType::Guardrails,
        NodeType::FileSearch,
        NodeType::Mcp,
    ];

    /// The kebab-case tag used in workflow definitions.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Start => "start",
            NodeType::End => "end",
            NodeType::Agent => "agent",
            NodeType::Classify => "classify",
            NodeType::IfElse => "if-else",
            NodeType::While => "while",
            NodeType::Transform => "transform",
            NodeType::SetState => "set-state",
            NodeType::UserApproval => "user-approval",
            NodeType::Guardrails => "guardrails",
            NodeType::FileSearch => "file-search",
            NodeType::Mcp => "mcp",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a whole run.
///
/// Transitions: pending→running at start; running→completed on clean
/// termination; running→failed on any node failure; running→waiting on an
/// approval pause; waiting→running on resume; any state→cancelled on an
/// external stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Waiting,
    Cancelled,
}

impl ExecutionStatus {
    /// Whether the run has reached a state it will not leave on its own.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Waiting => "waiting",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Status of one node dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Completed,
    Failed,
    Waiting,
    /// Used by `while` to signal "loop body scheduled, come back to me".
    Running,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Waiting => "waiting",
            NodeStatus::Running => "running",
        };
        f.write_str(s)
    }
}

/// Machine-readable error codes surfaced in failed results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    WorkflowExecutionError,
    ExecutorNotFound,
    ValidationError,
    NodeExecutionError,
    AgentExecutionError,
    ClassifyExecutionError,
    IfElseExecutionError,
    ConditionEvaluationError,
    WhileExecutionError,
    TransformExecutionError,
    SetStateError,
    UserApprovalError,
    ApprovalTimeout,
    GuardrailsBlocked,
    GuardrailsError,
    FileSearchError,
    McpExecutionError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Reuse the serde form so logs and wire payloads agree.
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_default();
        f.write_str(&s)
    }
}

/// Structured error payload carried by failed node and run results.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            node_id: None,
            stack: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_node(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.node_id {
            Some(node) => write!(f, "[{}] {} ({})", self.code, self.message, node),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}

/// Record of a single node dispatch.
///
/// One of these is produced per dispatch attempt and appended to the
/// context history in dispatch order; loop bodies therefore appear once per
/// iteration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeExecutionResult {
    pub node_id: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// Snapshot of the run input at dispatch time.
    pub inputs: Value,
    #[serde(default)]
    pub outputs: FxHashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    /// Successor selectors: direct node ids or source-handle names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_nodes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<FxHashMap<String, Value>>,
}

impl NodeExecutionResult {
    /// Start building a result for the given node; stamps `started_at`.
    pub fn builder(node_id: impl Into<String>, node_type: NodeType) -> NodeResultBuilder {
        NodeResultBuilder {
            node_id: node_id.into(),
            node_type,
            started_at: Utc::now(),
            inputs: Value::Null,
            outputs: FxHashMap::default(),
            next_nodes: None,
            metadata: None,
        }
    }
}

/// Fluent builder for [`NodeExecutionResult`].
///
/// Terminal methods (`completed`, `failed`, `waiting`, `running`) stamp
/// `ended_at` and fix the status.
#[derive(Debug)]
pub struct NodeResultBuilder {
    node_id: String,
    node_type: NodeType,
    started_at: DateTime<Utc>,
    inputs: Value,
    outputs: FxHashMap<String, Value>,
    next_nodes: Option<Vec<String>>,
    metadata: Option<FxHashMap<String, Value>>,
}

impl NodeResultBuilder {
    #[must_use]
    pub fn inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    #[must_use]
    pub fn output(mut self, key: impl Into<String>, value: Value) -> Self {
        self.outputs.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn outputs(mut self, outputs: FxHashMap<String, Value>) -> Self {
        self.outputs = outputs;
        self
    }

    #[must_use]
    pub fn next_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.next_nodes = Some(nodes.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata
            .get_or_insert_with(FxHashMap::default)
            .insert(key.into(), value);
        self
    }

    pub fn completed(self) -> NodeExecutionResult {
        self.finish(NodeStatus::Completed, None)
    }

    pub fn failed(self, error: ErrorInfo) -> NodeExecutionResult {
        let error = if error.node_id.is_none() {
            error.with_node(self.node_id.clone())
        } else {
            error
        };
        self.finish(NodeStatus::Failed, Some(error))
    }

    pub fn waiting(self) -> NodeExecutionResult {
        self.finish(NodeStatus::Waiting, None)
    }

    pub fn running(self) -> NodeExecutionResult {
        self.finish(NodeStatus::Running, None)
    }

    fn finish(self, status: NodeStatus, error: Option<ErrorInfo>) -> NodeExecutionResult {
        NodeExecutionResult {
            node_id: self.node_id,
            node_type: self.node_type,
            status,
            inputs: self.inputs,
            outputs: self.outputs,
            error,
            started_at: self.started_at,
            ended_at: Utc::now(),
            next_nodes: self.next_nodes,
            metadata: self.metadata,
        }
    }
}

/// Terminal record for a whole run.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub success: bool,
    pub status: ExecutionStatus,
    pub outputs: FxHashMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub logs: Vec<crate::context::LogEntry>,
    /// Total wall-clock duration in milliseconds.
    pub execution_time: u64,
    /// Final result per node id (last dispatch wins for loop nodes).
    pub node_results: FxHashMap<String, NodeExecutionResult>,
}

/// Outcome of config or whole-graph validation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    /// A passing report.
    #[must_use]
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing report with a single message.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![message.into()],
        }
    }

    /// Collapse a list of problems into a report; empty list passes.
    #[must_use]
    pub fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Add a problem, flipping the report to invalid.
    pub fn push(&mut self, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_tags_round_trip() {
        for kind in NodeType::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: NodeType = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn error_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::IfElseExecutionError).unwrap();
        assert_eq!(json, "\"IF_ELSE_EXECUTION_ERROR\"");
        let json = serde_json::to_string(&ErrorCode::McpExecutionError).unwrap();
        assert_eq!(json, "\"MCP_EXECUTION_ERROR\"");
    }

    #[test]
    fn result_builder_stamps_error_node() {
        let result = NodeExecutionResult::builder("n1", NodeType::Agent)
            .failed(ErrorInfo::new(ErrorCode::AgentExecutionError, "no provider"));
        assert_eq!(result.status, NodeStatus::Failed);
        assert_eq!(result.error.unwrap().node_id.as_deref(), Some("n1"));
    }
}
