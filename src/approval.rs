//! Pending-approval registry for `user-approval` nodes.
//!
//! The registry is owned by one runner instance and keyed by
//! `(run_id, node_id)`, so two runs sharing node ids never alias each
//! other's records. Callers resolve a pending record through
//! [`ApprovalRegistry::approve`] / [`ApprovalRegistry::reject`]; the node
//! re-reads the record on its next dispatch.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Decision state of a pending approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Waiting,
    Approved,
    Rejected,
}

/// One pending (or decided) approval request.
#[derive(Clone, Debug)]
pub struct ApprovalRecord {
    pub node_id: String,
    /// Interpolated prompt shown to the approver.
    pub message: String,
    pub approve_label: Option<String>,
    pub reject_label: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub timeout: Option<Duration>,
    pub status: ApprovalStatus,
    requested_instant: Instant,
}

impl ApprovalRecord {
    pub fn new(
        node_id: impl Into<String>,
        message: impl Into<String>,
        approve_label: Option<String>,
        reject_label: Option<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            message: message.into(),
            approve_label,
            reject_label,
            requested_at: Utc::now(),
            timeout,
            status: ApprovalStatus::Waiting,
            requested_instant: Instant::now(),
        }
    }

    /// Whether the configured timeout has elapsed.
    #[must_use]
    pub fn timed_out(&self) -> bool {
        match self.timeout {
            Some(timeout) => self.requested_instant.elapsed() >= timeout,
            None => false,
        }
    }
}

/// Runner-scoped registry of pending approvals.
#[derive(Debug, Default)]
pub struct ApprovalRegistry {
    entries: Mutex<FxHashMap<(Uuid, String), ApprovalRecord>>,
}

impl ApprovalRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record unless one already exists for this key.
    pub fn create(&self, run_id: Uuid, record: ApprovalRecord) {
        let mut entries = self.entries.lock().expect("registry poisoned");
        entries
            .entry((run_id, record.node_id.clone()))
            .or_insert(record);
    }

    /// Snapshot the record for a node, if any.
    #[must_use]
    pub fn get(&self, run_id: Uuid, node_id: &str) -> Option<ApprovalRecord> {
        self.entries
            .lock()
            .expect("registry poisoned")
            .get(&(run_id, node_id.to_string()))
            .cloned()
    }

    /// Mark a waiting record approved. Returns false if absent.
    pub fn approve(&self, run_id: Uuid, node_id: &str) -> bool {
        self.decide(run_id, node_id, ApprovalStatus::Approved)
    }

    /// Mark a waiting record rejected. Returns false if absent.
    pub fn reject(&self, run_id: Uuid, node_id: &str) -> bool {
        self.decide(run_id, node_id, ApprovalStatus::Rejected)
    }

    fn decide(&self, run_id: Uuid, node_id: &str, status: ApprovalStatus) -> bool {
        let mut entries = self.entries.lock().expect("registry poisoned");
        match entries.get_mut(&(run_id, node_id.to_string())) {
            Some(record) => {
                record.status = status;
                true
            }
            None => false,
        }
    }

    /// Drop a record after the node has consumed the decision.
    pub fn remove(&self, run_id: Uuid, node_id: &str) {
        self.entries
            .lock()
            .expect("registry poisoned")
            .remove(&(run_id, node_id.to_string()));
    }

    /// All pending node ids for a run, for inspection.
    #[must_use]
    pub fn pending(&self, run_id: Uuid) -> Vec<String> {
        self.entries
            .lock()
            .expect("registry poisoned")
            .iter()
            .filter(|((run, _), record)| *run == run_id && record.status == ApprovalStatus::Waiting)
            .map(|((_, node), _)| node.clone())
            .collect()
    }
}
