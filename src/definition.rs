//! Workflow definitions: the serializable graph a caller hands to the
//! runner.
//!
//! A definition is a named, versioned set of typed nodes and directed
//! edges, plus optional initial variables and free-form metadata. The JSON
//! form uses camelCase keys (`sourceHandle`, `targetHandle`, ...), and
//! serializing then re-parsing a definition is engine-equivalent.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::NodeType;

/// Errors raised while loading or emitting workflow definitions.
#[derive(Debug, Error, Diagnostic)]
pub enum DefinitionError {
    /// The JSON text could not be parsed into a definition.
    #[error("invalid workflow definition: {source}")]
    #[diagnostic(
        code(agentflow::definition::parse),
        help("Check the JSON against the workflow definition schema: nodes[], edges[], camelCase keys.")
    )]
    Parse {
        #[from]
        source: serde_json::Error,
    },
}

/// A complete workflow graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDefinition>,
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Initial variable seed applied before the start node runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<FxHashMap<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl WorkflowDefinition {
    /// Minimal definition with the given id and name; nodes and edges are
    /// added by the caller (or a builder in tests).
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: None,
            metadata: None,
        }
    }

    /// Parse a definition from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Emit the definition as compact JSON.
    pub fn to_json_string(&self) -> Result<String, DefinitionError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Find a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All nodes of the given kind, in definition order.
    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &NodeDefinition> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }
}

/// One typed node in the graph.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDefinition {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Type-specific configuration; each executor deserializes its own view.
    #[serde(default)]
    pub config: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeDefinition {
    pub fn new(id: impl Into<String>, node_type: NodeType, config: Value) -> Self {
        Self {
            id: id.into(),
            node_type,
            label: None,
            config,
            position: None,
        }
    }

    /// Label when present, else the node id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.id)
    }
}

/// Canvas position; carried through untouched for the benefit of editors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A directed edge, optionally tagged with a source handle used by
/// branching nodes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl EdgeDefinition {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
            label: None,
        }
    }

    #[must_use]
    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }
}
