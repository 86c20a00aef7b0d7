//! Event variants emitted during a run.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::LogEntry;
use crate::types::{ExecutionStatus, NodeStatus, NodeType};

/// One observability event from the dispatch loop.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// A node is about to execute.
    #[serde(rename_all = "camelCase")]
    NodeStart {
        run_id: Uuid,
        node_id: String,
        node_type: NodeType,
        /// 1-based dispatch ordinal within the run.
        dispatch: u32,
    },
    /// A node finished executing (any status).
    #[serde(rename_all = "camelCase")]
    NodeComplete {
        run_id: Uuid,
        node_id: String,
        node_type: NodeType,
        status: NodeStatus,
        dispatch: u32,
    },
    /// A structured log entry was appended to the context.
    Log { run_id: Uuid, entry: LogEntry },
    /// A user-approval node is waiting for a decision.
    #[serde(rename_all = "camelCase")]
    ApprovalRequested {
        run_id: Uuid,
        node_id: String,
        message: String,
    },
    /// The run reached a terminal state (or paused waiting).
    #[serde(rename_all = "camelCase")]
    RunFinished {
        run_id: Uuid,
        status: ExecutionStatus,
        dispatches: u32,
    },
}

impl Event {
    /// The run this event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Event::NodeStart { run_id, .. }
            | Event::NodeComplete { run_id, .. }
            | Event::Log { run_id, .. }
            | Event::ApprovalRequested { run_id, .. }
            | Event::RunFinished { run_id, .. } => *run_id,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::NodeStart {
                node_id, dispatch, ..
            } => write!(f, "[{dispatch}] -> {node_id}"),
            Event::NodeComplete {
                node_id,
                status,
                dispatch,
                ..
            } => write!(f, "[{dispatch}] <- {node_id} ({status})"),
            Event::Log { entry, .. } => match &entry.node_id {
                Some(node) => write!(f, "[{node}] {}", entry.message),
                None => write!(f, "{}", entry.message),
            },
            Event::ApprovalRequested {
                node_id, message, ..
            } => write!(f, "approval requested by {node_id}: {message}"),
            Event::RunFinished {
                status, dispatches, ..
            } => write!(f, "run finished: {status} after {dispatches} dispatches"),
        }
    }
}
