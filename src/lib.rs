//! # Agentflow: Graph-driven Agent Workflow Execution
//!
//! Agentflow executes user-authored agent workflows expressed as directed
//! graphs of typed nodes. A workflow routes structured input through
//! agents (LLM calls), classifiers, conditionals, bounded loops, data
//! transforms, state mutations, approval checkpoints, content guardrails,
//! retrieval, and external tool calls, producing a set of outputs plus a
//! full execution trace.
//!
//! ## Core Concepts
//!
//! - **Definitions**: A serializable graph of typed nodes and edges
//! - **Context**: Per-run state — variables, input, output, logs, history
//! - **Expressions**: A CEL-like language for conditions and assignments
//! - **Executors**: One per node kind, with validation and side effects
//! - **Providers**: Injected LLM / vector-store / MCP implementations
//! - **Runner**: The sequential dispatch loop with hard safety limits
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use rustc_hash::FxHashMap;
//! use serde_json::json;
//! use agentflow::definition::{EdgeDefinition, NodeDefinition, WorkflowDefinition};
//! use agentflow::providers::MockLlmProvider;
//! use agentflow::runner::WorkflowRunner;
//! use agentflow::types::NodeType;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut workflow = WorkflowDefinition::new("wf-echo", "echo");
//! workflow.nodes = vec![
//!     NodeDefinition::new("start", NodeType::Start, json!({})),
//!     NodeDefinition::new(
//!         "respond",
//!         NodeType::Agent,
//!         json!({"instructions": "Echo the input back.", "outputVariable": "reply"}),
//!     ),
//!     NodeDefinition::new("end", NodeType::End, json!({})),
//! ];
//! workflow.edges = vec![
//!     EdgeDefinition::new("e1", "start", "respond"),
//!     EdgeDefinition::new("e2", "respond", "end"),
//! ];
//!
//! let mut runner = WorkflowRunner::builder(workflow)
//!     .llm_provider(Arc::new(MockLlmProvider::echo()))
//!     .build();
//!
//! let input = FxHashMap::from_iter([("input".to_string(), json!("hello"))]);
//! let result = runner.run(input).await;
//! assert!(result.success);
//! # }
//! ```
//!
//! ## Pause and Resume
//!
//! A `user-approval` node without an approval callback pauses the run with
//! status `waiting`. Resolve the pending record through
//! [`runner::WorkflowRunner::approvals`] and continue with
//! [`runner::WorkflowRunner::resume`].
//!
//! ## Safety Envelope
//!
//! Every run is bounded: a wall-clock ceiling and a dispatch-count ceiling
//! on the loop, per-loop iteration caps on `while` nodes, a 5-second
//! timeout plus a forbidden-pattern scan on sandboxed `transform` scripts,
//! and per-node timeouts on approvals.
//!
//! ## Module Guide
//!
//! - [`definition`] - Workflow graph definitions and JSON round-trip
//! - [`context`] - The mutable execution context and structured log
//! - [`expr`] - Expression lexer, parser, evaluator, interpolation
//! - [`executors`] - The per-node-type executor family
//! - [`providers`] - LLM / vector / MCP seams, registries, and mocks
//! - [`runner`] - The dispatch loop, routing, limits, and validation
//! - [`approval`] - Pending-approval registry for paused runs
//! - [`sandbox`] - Sandboxed script execution for transforms and rules
//! - [`event_bus`] - Run observability events, sinks, and streams
//! - [`types`] - Shared structural types and result shapes

pub mod approval;
pub mod context;
pub mod definition;
pub mod event_bus;
pub mod executors;
pub mod expr;
pub mod providers;
pub mod runner;
pub mod sandbox;
pub mod types;
pub mod utils;
