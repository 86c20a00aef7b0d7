#![allow(dead_code)]

use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

use agentflow::approval::ApprovalRegistry;
use agentflow::definition::{EdgeDefinition, NodeDefinition, WorkflowDefinition};
use agentflow::event_bus::NullEmitter;
use agentflow::executors::ExecutorServices;
use agentflow::providers::{LlmProvider, McpProvider, VectorStoreProvider};
use agentflow::types::NodeType;

pub fn node(id: &str, node_type: NodeType, config: Value) -> NodeDefinition {
    NodeDefinition::new(id, node_type, config)
}

pub fn edge(id: &str, source: &str, target: &str) -> EdgeDefinition {
    EdgeDefinition::new(id, source, target)
}

pub fn edge_h(id: &str, source: &str, target: &str, handle: &str) -> EdgeDefinition {
    EdgeDefinition::new(id, source, target).with_source_handle(handle)
}

pub fn workflow(nodes: Vec<NodeDefinition>, edges: Vec<EdgeDefinition>) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("wf-test", "test workflow");
    def.nodes = nodes;
    def.edges = edges;
    def
}

pub fn input(pairs: &[(&str, Value)]) -> FxHashMap<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

/// Bare services: no providers, fresh approval registry, silent emitter.
pub fn services() -> ExecutorServices {
    ExecutorServices {
        llm: None,
        vector: None,
        mcp: None,
        approvals: Arc::new(ApprovalRegistry::new()),
        emitter: Arc::new(NullEmitter),
    }
}

pub fn services_with_llm(provider: Arc<dyn LlmProvider>) -> ExecutorServices {
    ExecutorServices {
        llm: Some(provider),
        ..services()
    }
}

pub fn services_with_vector(provider: Arc<dyn VectorStoreProvider>) -> ExecutorServices {
    ExecutorServices {
        vector: Some(provider),
        ..services()
    }
}

pub fn services_with_mcp(provider: Arc<dyn McpProvider>) -> ExecutorServices {
    ExecutorServices {
        mcp: Some(provider),
        ..services()
    }
}
