//! Mutable per-run state: variables, input, output, trace, and status.
//!
//! The [`ExecutionContext`] is created by the runner for each run and
//! mutated only by the current node's executor and the runner itself. It
//! carries three disjoint value maps (`variables`, `input`, `output`), the
//! ordered dispatch trace (`execution_path` + `history`), an append-only
//! structured log, per-loop iteration counters, and the run status.
//!
//! # Name resolution
//!
//! Dotted names address nested structure. The first segment picks the
//! root: `input`, `output`, or `state` (a synonym for the variables map);
//! anything else resolves inside the variables map. Reading a missing name
//! yields `None`, never an error. Writes auto-create intermediate
//! mappings; writes into `input` are rejected because the run input is
//! immutable once assigned.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{ExecutionStatus, NodeExecutionResult};
use crate::utils::paths;

/// Severity of a log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in the run's structured trace.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Errors raised by context write operations.
#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    /// The run input is assigned once at start and never mutated.
    #[error("cannot write to '{path}': input is immutable after run start")]
    #[diagnostic(
        code(agentflow::context::input_immutable),
        help("Write to a variable or to output.* instead.")
    )]
    InputImmutable { path: String },

    /// The dot-path was empty or contained empty segments.
    #[error("invalid variable path: '{path}'")]
    #[diagnostic(code(agentflow::context::invalid_path))]
    InvalidPath { path: String },
}

/// The mutable state object threaded through a run.
#[derive(Clone, Debug)]
pub struct ExecutionContext {
    run_id: Uuid,
    variables: FxHashMap<String, Value>,
    input: FxHashMap<String, Value>,
    output: FxHashMap<String, Value>,
    current_node_id: Option<String>,
    execution_path: Vec<String>,
    history: Vec<NodeExecutionResult>,
    iteration_counts: FxHashMap<String, u32>,
    status: ExecutionStatus,
    logs: Vec<LogEntry>,
    created: Instant,
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            variables: FxHashMap::default(),
            input: FxHashMap::default(),
            output: FxHashMap::default(),
            current_node_id: None,
            execution_path: Vec::new(),
            history: Vec::new(),
            iteration_counts: FxHashMap::default(),
            status: ExecutionStatus::Pending,
            logs: Vec::new(),
            created: Instant::now(),
        }
    }

    /// Unique id of the run this context belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    // ------------------------------------------------------------------
    // Variables, input, output
    // ------------------------------------------------------------------

    /// Assign the run input. The runner calls this exactly once at run
    /// start; the input is never mutated afterwards.
    pub fn assign_input(&mut self, input: FxHashMap<String, Value>) {
        self.input = input;
    }

    /// Merge an initial variable seed (workflow-level `variables`).
    pub fn seed_variables(&mut self, seed: impl IntoIterator<Item = (String, Value)>) {
        self.variables.extend(seed);
    }

    /// Resolve a (possibly dotted) name. Missing names yield `None`.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<Value> {
        let segments = paths::split_path(path)?;
        let (first, rest) = segments.split_first()?;
        match *first {
            "input" if rest.is_empty() => Some(Value::Object(to_object(&self.input))),
            "input" => paths::get_path(&self.input, rest).cloned(),
            "output" if rest.is_empty() => Some(Value::Object(to_object(&self.output))),
            "output" => paths::get_path(&self.output, rest).cloned(),
            "state" if rest.is_empty() => Some(Value::Object(to_object(&self.variables))),
            "state" => paths::get_path(&self.variables, rest).cloned(),
            _ => paths::get_path(&self.variables, &segments).cloned(),
        }
    }

    /// Whether a (possibly dotted) name resolves to a value.
    #[must_use]
    pub fn has(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Write a value at a (possibly dotted) name, auto-creating
    /// intermediate mappings. Writes rooted at `input` are rejected.
    pub fn set(&mut self, path: &str, value: Value) -> Result<(), ContextError> {
        let segments = paths::split_path(path).ok_or_else(|| ContextError::InvalidPath {
            path: path.to_string(),
        })?;
        let (first, rest) = segments
            .split_first()
            .ok_or_else(|| ContextError::InvalidPath {
                path: path.to_string(),
            })?;
        match *first {
            "input" => Err(ContextError::InputImmutable {
                path: path.to_string(),
            }),
            "output" => {
                if rest.is_empty() {
                    return Err(ContextError::InvalidPath {
                        path: path.to_string(),
                    });
                }
                paths::set_path(&mut self.output, rest, value);
                Ok(())
            }
            "state" => {
                if rest.is_empty() {
                    return Err(ContextError::InvalidPath {
                        path: path.to_string(),
                    });
                }
                paths::set_path(&mut self.variables, rest, value);
                Ok(())
            }
            _ => {
                paths::set_path(&mut self.variables, &segments, value);
                Ok(())
            }
        }
    }

    /// Write a plain (undotted) variable.
    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    /// Read a plain (undotted) variable.
    #[must_use]
    pub fn get_variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    /// Write an output key.
    pub fn set_output(&mut self, key: impl Into<String>, value: Value) {
        self.output.insert(key.into(), value);
    }

    #[must_use]
    pub fn variables(&self) -> &FxHashMap<String, Value> {
        &self.variables
    }

    #[must_use]
    pub fn input(&self) -> &FxHashMap<String, Value> {
        &self.input
    }

    #[must_use]
    pub fn output(&self) -> &FxHashMap<String, Value> {
        &self.output
    }

    /// Names of all top-level variables, in no particular order.
    #[must_use]
    pub fn variable_names(&self) -> Vec<&str> {
        self.variables.keys().map(String::as_str).collect()
    }

    /// The run input as a JSON object.
    #[must_use]
    pub fn input_as_value(&self) -> Value {
        Value::Object(to_object(&self.input))
    }

    // ------------------------------------------------------------------
    // Trace
    // ------------------------------------------------------------------

    pub(crate) fn set_current_node(&mut self, node_id: Option<String>) {
        self.current_node_id = node_id;
    }

    #[must_use]
    pub fn current_node_id(&self) -> Option<&str> {
        self.current_node_id.as_deref()
    }

    pub(crate) fn push_path(&mut self, node_id: impl Into<String>) {
        self.execution_path.push(node_id.into());
    }

    /// Ordered sequence of node ids actually dispatched; loop bodies repeat.
    #[must_use]
    pub fn execution_path(&self) -> &[String] {
        &self.execution_path
    }

    pub(crate) fn record_result(&mut self, result: NodeExecutionResult) {
        self.history.push(result);
    }

    /// One result per dispatch attempt, in dispatch order.
    #[must_use]
    pub fn history(&self) -> &[NodeExecutionResult] {
        &self.history
    }

    #[must_use]
    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ExecutionStatus) {
        self.status = status;
    }

    /// Wall-clock time since the context was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.created.elapsed()
    }

    // ------------------------------------------------------------------
    // Logs
    // ------------------------------------------------------------------

    /// Append a log entry tagged with the current node id.
    pub fn log(&mut self, level: LogLevel, message: impl Into<String>) -> &LogEntry {
        self.log_with(level, message, None)
    }

    /// Append a log entry carrying structured data.
    pub fn log_with(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> &LogEntry {
        self.logs.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            node_id: self.current_node_id.clone(),
            data,
        });
        self.logs.last().expect("just pushed")
    }

    #[must_use]
    pub fn logs(&self) -> &[LogEntry] {
        &self.logs
    }

    // ------------------------------------------------------------------
    // Loop iteration counters
    // ------------------------------------------------------------------

    /// Current count for a loop key (`while_<nodeId>`), zero if untouched.
    #[must_use]
    pub fn iteration_count(&self, key: &str) -> u32 {
        self.iteration_counts.get(key).copied().unwrap_or(0)
    }

    /// Increment and return the new count.
    pub fn increment_iteration(&mut self, key: impl Into<String>) -> u32 {
        let entry = self.iteration_counts.entry(key.into()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Reset a loop counter; done on both loop exit paths and on error.
    pub fn reset_iteration(&mut self, key: &str) {
        self.iteration_counts.remove(key);
    }

    // ------------------------------------------------------------------
    // Sub-contexts
    // ------------------------------------------------------------------

    /// Deep copy of all mutable state, for hypothetical nested scopes.
    /// Loop bodies currently reuse the parent context; this exists for
    /// future branch isolation.
    #[must_use]
    pub fn create_sub_context(&self) -> ExecutionContext {
        let mut sub = self.clone();
        sub.run_id = self.run_id;
        sub
    }

    /// Fold a sub-context's variables, output, and logs back into this one.
    pub fn merge_sub_context(&mut self, sub: ExecutionContext) {
        self.variables.extend(sub.variables);
        self.output.extend(sub.output);
        let existing = self.logs.len();
        self.logs.extend(sub.logs.into_iter().skip(existing));
    }
}

fn to_object(map: &FxHashMap<String, Value>) -> Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}
