//! The workflow runner: graph indices, the dispatch loop, successor
//! routing, limit enforcement, and the pause/resume protocol.
//!
//! One runner executes one workflow at a time. Dispatch is strictly
//! sequential over a FIFO queue seeded with the start node; branch
//! selection happens through each node result's `next_nodes` (a mix of
//! direct node ids and source-handle names). `while` nodes are the one
//! kind allowed to re-enter the queue; everything else is dispatched at
//! most once per run (per loop iteration for body nodes, which the loop
//! re-arms explicitly).

use futures_util::future::BoxFuture;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;
use uuid::Uuid;

use crate::approval::ApprovalRegistry;
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::{NodeDefinition, WorkflowDefinition};
use crate::event_bus::{Event, EventBus, EventSink, EventStream};
use crate::executors::{builtin_executors, ExecutorServices, NodeExecutor};
use crate::types::{
    ErrorCode, ErrorInfo, ExecutionResult, ExecutionStatus, NodeExecutionResult, NodeStatus,
    NodeType, ValidationReport,
};

const DEFAULT_MAX_EXECUTION_TIME: Duration = Duration::from_millis(300_000);
const DEFAULT_MAX_NODE_EXECUTIONS: u32 = 1_000;

/// Hard limits applied to every run.
#[derive(Clone, Copy, Debug)]
pub struct RunnerOptions {
    /// Wall-clock ceiling, checked before each dispatch.
    pub max_execution_time: Duration,
    /// Dispatch-count ceiling per run.
    pub max_node_executions: u32,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_execution_time: DEFAULT_MAX_EXECUTION_TIME,
            max_node_executions: DEFAULT_MAX_NODE_EXECUTIONS,
        }
    }
}

/// What an approval callback is asked to decide on.
#[derive(Clone, Debug)]
pub struct ApprovalPrompt {
    pub node_id: String,
    pub message: String,
    pub approve_label: Option<String>,
    pub reject_label: Option<String>,
}

/// Async yes/no decision for a waiting `user-approval` node. When set,
/// the runner consults it inline instead of pausing the run.
pub type ApprovalCallback = Arc<dyn Fn(ApprovalPrompt) -> BoxFuture<'static, bool> + Send + Sync>;

/// Cooperative stop signal; honoured at the next dispatch boundary.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request the run to stop; it transitions to `cancelled` before the
    /// next node dispatch.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Builder for [`WorkflowRunner`].
pub struct WorkflowRunnerBuilder {
    definition: WorkflowDefinition,
    options: RunnerOptions,
    llm: Option<Arc<dyn crate::providers::LlmProvider>>,
    vector: Option<Arc<dyn crate::providers::VectorStoreProvider>>,
    mcp: Option<Arc<dyn crate::providers::McpProvider>>,
    approval_callback: Option<ApprovalCallback>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl WorkflowRunnerBuilder {
    #[must_use]
    pub fn options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn max_execution_time(mut self, limit: Duration) -> Self {
        self.options.max_execution_time = limit;
        self
    }

    #[must_use]
    pub fn max_node_executions(mut self, limit: u32) -> Self {
        self.options.max_node_executions = limit;
        self
    }

    #[must_use]
    pub fn llm_provider(mut self, provider: Arc<dyn crate::providers::LlmProvider>) -> Self {
        self.llm = Some(provider);
        self
    }

    #[must_use]
    pub fn vector_provider(
        mut self,
        provider: Arc<dyn crate::providers::VectorStoreProvider>,
    ) -> Self {
        self.vector = Some(provider);
        self
    }

    #[must_use]
    pub fn mcp_provider(mut self, provider: Arc<dyn crate::providers::McpProvider>) -> Self {
        self.mcp = Some(provider);
        self
    }

    #[must_use]
    pub fn approval_callback(mut self, callback: ApprovalCallback) -> Self {
        self.approval_callback = Some(callback);
        self
    }

    #[must_use]
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[must_use]
    pub fn build(self) -> WorkflowRunner {
        let mut node_map = FxHashMap::default();
        let mut edges_by_source: FxHashMap<String, Vec<_>> = FxHashMap::default();
        let mut edges_by_target: FxHashMap<String, Vec<_>> = FxHashMap::default();
        for node in &self.definition.nodes {
            node_map.insert(node.id.clone(), node.clone());
        }
        for edge in &self.definition.edges {
            edges_by_source
                .entry(edge.source.clone())
                .or_default()
                .push(edge.clone());
            edges_by_target
                .entry(edge.target.clone())
                .or_default()
                .push(edge.clone());
        }

        let event_bus = EventBus::new();
        for sink in self.sinks {
            event_bus.add_sink(sink);
        }

        WorkflowRunner {
            definition: self.definition,
            node_map,
            edges_by_source,
            edges_by_target,
            executors: builtin_executors(),
            context: ExecutionContext::new(),
            options: self.options,
            llm: self.llm,
            vector: self.vector,
            mcp: self.mcp,
            approval_callback: self.approval_callback,
            approvals: Arc::new(ApprovalRegistry::new()),
            event_bus,
            node_results: FxHashMap::default(),
            execution_count: 0,
            stop: StopHandle::default(),
            started: None,
        }
    }
}

/// Executes one workflow definition.
pub struct WorkflowRunner {
    definition: WorkflowDefinition,
    node_map: FxHashMap<String, NodeDefinition>,
    edges_by_source: FxHashMap<String, Vec<crate::definition::EdgeDefinition>>,
    edges_by_target: FxHashMap<String, Vec<crate::definition::EdgeDefinition>>,
    executors: FxHashMap<NodeType, Arc<dyn NodeExecutor>>,
    context: ExecutionContext,
    options: RunnerOptions,
    llm: Option<Arc<dyn crate::providers::LlmProvider>>,
    vector: Option<Arc<dyn crate::providers::VectorStoreProvider>>,
    mcp: Option<Arc<dyn crate::providers::McpProvider>>,
    approval_callback: Option<ApprovalCallback>,
    approvals: Arc<ApprovalRegistry>,
    event_bus: EventBus,
    node_results: FxHashMap<String, NodeExecutionResult>,
    execution_count: u32,
    stop: StopHandle,
    started: Option<Instant>,
}

impl WorkflowRunner {
    /// Runner with default options and no providers.
    #[must_use]
    pub fn new(definition: WorkflowDefinition) -> Self {
        Self::builder(definition).build()
    }

    #[must_use]
    pub fn builder(definition: WorkflowDefinition) -> WorkflowRunnerBuilder {
        WorkflowRunnerBuilder {
            definition,
            options: RunnerOptions::default(),
            llm: None,
            vector: None,
            mcp: None,
            approval_callback: None,
            sinks: Vec::new(),
        }
    }

    /// Register (or override) an executor for a node kind.
    pub fn register_executor(&mut self, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(executor.node_type(), executor);
    }

    /// The pending-approval registry; callers resolve waiting approvals
    /// through it, then call [`resume`](Self::resume).
    #[must_use]
    pub fn approvals(&self) -> Arc<ApprovalRegistry> {
        Arc::clone(&self.approvals)
    }

    /// Id of the current (or most recent) run's context.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.context.run_id()
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Subscribe to the run's event stream.
    #[must_use]
    pub fn event_stream(&self) -> EventStream {
        self.event_bus.subscribe()
    }

    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    // ------------------------------------------------------------------
    // Static validation
    // ------------------------------------------------------------------

    /// Whole-graph validation: node uniqueness, start/end shape, edge
    /// integrity, orphan detection, and every node's config validator.
    #[must_use]
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::ok();

        let mut seen = FxHashSet::default();
        for node in &self.definition.nodes {
            if !seen.insert(node.id.clone()) {
                report.push(format!("duplicate node id '{}'", node.id));
            }
        }

        let starts: Vec<&NodeDefinition> =
            self.definition.nodes_of_type(NodeType::Start).collect();
        if starts.len() != 1 {
            report.push(format!(
                "workflow must have exactly one start node, found {}",
                starts.len()
            ));
        }
        let ends: Vec<&NodeDefinition> = self.definition.nodes_of_type(NodeType::End).collect();
        if ends.is_empty() {
            report.push("workflow must have at least one end node");
        }

        for edge in &self.definition.edges {
            if !self.node_map.contains_key(&edge.source) {
                report.push(format!(
                    "edge '{}' references unknown source '{}'",
                    edge.id, edge.source
                ));
            }
            if !self.node_map.contains_key(&edge.target) {
                report.push(format!(
                    "edge '{}' references unknown target '{}'",
                    edge.id, edge.target
                ));
            }
        }

        for start in &starts {
            if self.edges_by_target.contains_key(&start.id) {
                report.push(format!("start node '{}' must not have incoming edges", start.id));
            }
        }
        for end in &ends {
            if self.edges_by_source.contains_key(&end.id) {
                report.push(format!("end node '{}' must not have outgoing edges", end.id));
            }
        }
        for node in &self.definition.nodes {
            if node.node_type != NodeType::Start && !self.edges_by_target.contains_key(&node.id) {
                report.push(format!("node '{}' is unreachable (no incoming edges)", node.id));
            }
        }

        for node in &self.definition.nodes {
            match self.executors.get(&node.node_type) {
                Some(executor) => {
                    let config_report = executor.validate(&node.config);
                    for error in config_report.errors {
                        report.push(format!("node '{}': {error}", node.id));
                    }
                }
                None => {
                    report.push(format!(
                        "node '{}': no executor registered for type '{}'",
                        node.id, node.node_type
                    ));
                }
            }
        }

        report
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Run the workflow to a terminal state (or a waiting pause).
    #[instrument(skip(self, input), fields(workflow = %self.definition.id))]
    pub async fn run(&mut self, input: FxHashMap<String, Value>) -> ExecutionResult {
        self.context = ExecutionContext::new();
        if let Some(seed) = &self.definition.variables {
            self.context
                .seed_variables(seed.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        self.context.assign_input(input);
        self.context.set_status(ExecutionStatus::Running);
        self.node_results.clear();
        self.execution_count = 0;
        self.started = Some(Instant::now());

        let starts: Vec<String> = self
            .definition
            .nodes_of_type(NodeType::Start)
            .map(|n| n.id.clone())
            .collect();
        if starts.len() != 1 {
            return self.finish_failed(
                ErrorCode::WorkflowExecutionError,
                format!("workflow must have exactly one start node, found {}", starts.len()),
            );
        }

        let queue = VecDeque::from([starts[0].clone()]);
        self.dispatch_loop(queue, FxHashSet::default()).await
    }

    /// Continue a paused run from the given node, merging `resume_data`
    /// into the variables first. The existing context is reused.
    #[instrument(skip(self, resume_data), fields(workflow = %self.definition.id))]
    pub async fn resume(
        &mut self,
        node_id: &str,
        resume_data: Option<FxHashMap<String, Value>>,
    ) -> ExecutionResult {
        if !self.node_map.contains_key(node_id) {
            return self.finish_failed(
                ErrorCode::WorkflowExecutionError,
                format!("cannot resume: unknown node '{node_id}'"),
            );
        }
        if let Some(data) = resume_data {
            for (name, value) in data {
                self.context.set_variable(name, value);
            }
        }
        self.context.set_status(ExecutionStatus::Running);
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }

        let queue = VecDeque::from([node_id.to_string()]);
        self.dispatch_loop(queue, FxHashSet::default()).await
    }

    async fn dispatch_loop(
        &mut self,
        mut queue: VecDeque<String>,
        mut visited: FxHashSet<String>,
    ) -> ExecutionResult {
        let services = ExecutorServices {
            llm: self.llm.clone(),
            vector: self.vector.clone(),
            mcp: self.mcp.clone(),
            approvals: Arc::clone(&self.approvals),
            emitter: self.event_bus.emitter(),
        };
        let emitter = self.event_bus.emitter();
        let run_id = self.context.run_id();

        while let Some(current_id) = queue.pop_front() {
            if self.stop.is_stopped() {
                self.context
                    .log(LogLevel::Warn, "run cancelled by stop request");
                self.context.set_status(ExecutionStatus::Cancelled);
                return self.finish(None);
            }
            if let Some(started) = self.started {
                if started.elapsed() > self.options.max_execution_time {
                    return self.finish_failed(
                        ErrorCode::WorkflowExecutionError,
                        format!(
                            "workflow execution timeout after {} ms",
                            self.options.max_execution_time.as_millis()
                        ),
                    );
                }
            }
            if self.execution_count >= self.options.max_node_executions {
                return self.finish_failed(
                    ErrorCode::WorkflowExecutionError,
                    format!(
                        "workflow execution limit of {} node dispatches reached",
                        self.options.max_node_executions
                    ),
                );
            }

            let Some(node) = self.node_map.get(&current_id).cloned() else {
                self.context.log(
                    LogLevel::Warn,
                    format!("skipping unknown node '{current_id}'"),
                );
                continue;
            };
            if visited.contains(&current_id) && node.node_type != NodeType::While {
                continue;
            }

            self.context.set_current_node(Some(current_id.clone()));
            self.context.push_path(&current_id);
            self.execution_count += 1;
            let dispatch = self.execution_count;
            let _ = emitter.emit(Event::NodeStart {
                run_id,
                node_id: current_id.clone(),
                node_type: node.node_type,
                dispatch,
            });
            tracing::debug!(node = %current_id, kind = %node.node_type, dispatch, "dispatching node");

            let log_mark = self.context.logs().len();
            let result = match self.executors.get(&node.node_type).cloned() {
                Some(executor) => {
                    let config_report = executor.validate(&node.config);
                    if config_report.valid {
                        executor.execute(&node, &mut self.context, &services).await
                    } else {
                        NodeExecutionResult::builder(&current_id, node.node_type)
                            .inputs(self.context.input_as_value())
                            .failed(ErrorInfo::new(
                                ErrorCode::ValidationError,
                                config_report.errors.join("; "),
                            ))
                    }
                }
                None => NodeExecutionResult::builder(&current_id, node.node_type)
                    .inputs(self.context.input_as_value())
                    .failed(ErrorInfo::new(
                        ErrorCode::ExecutorNotFound,
                        format!("no executor registered for type '{}'", node.node_type),
                    )),
            };

            for entry in self.context.logs()[log_mark..].to_vec() {
                let _ = emitter.emit(Event::Log { run_id, entry });
            }

            self.node_results.insert(current_id.clone(), result.clone());
            self.context.record_result(result.clone());
            let _ = emitter.emit(Event::NodeComplete {
                run_id,
                node_id: current_id.clone(),
                node_type: node.node_type,
                status: result.status,
                dispatch,
            });

            if result.status == NodeStatus::Failed {
                self.context.set_status(ExecutionStatus::Failed);
                return self.finish(result.error.clone());
            }

            if result.status == NodeStatus::Waiting && node.node_type == NodeType::UserApproval {
                match self.approval_callback.clone() {
                    Some(callback) => {
                        let record = self.approvals.get(run_id, &current_id);
                        let prompt = ApprovalPrompt {
                            node_id: current_id.clone(),
                            message: record
                                .as_ref()
                                .map(|r| r.message.clone())
                                .unwrap_or_default(),
                            approve_label: record.as_ref().and_then(|r| r.approve_label.clone()),
                            reject_label: record.and_then(|r| r.reject_label),
                        };
                        if callback(prompt).await {
                            self.approvals.approve(run_id, &current_id);
                        } else {
                            self.approvals.reject(run_id, &current_id);
                        }
                        // Re-dispatch the same node to consume the decision.
                        queue.push_front(current_id);
                        continue;
                    }
                    None => {
                        self.context.set_status(ExecutionStatus::Waiting);
                        return self.finish(None);
                    }
                }
            }

            if node.node_type != NodeType::While {
                visited.insert(current_id.clone());
            }

            if node.node_type == NodeType::While && result.status == NodeStatus::Running {
                // Loop scheduling: body nodes first, then the while node
                // itself, yielding bounded repetition.
                if let Some(body) = &result.next_nodes {
                    for body_id in body {
                        if !self.node_map.contains_key(body_id) {
                            return self.finish_failed(
                                ErrorCode::WhileExecutionError,
                                format!(
                                    "loop '{current_id}' references unknown body node '{body_id}'"
                                ),
                            );
                        }
                        visited.remove(body_id);
                        queue.push_back(body_id.clone());
                    }
                }
                queue.push_back(current_id);
                continue;
            }

            if node.node_type == NodeType::End {
                self.context.set_status(ExecutionStatus::Completed);
                return self.finish(None);
            }

            for successor in self.successors(&node, &result) {
                let successor_is_while = self
                    .node_map
                    .get(&successor)
                    .map(|n| n.node_type == NodeType::While)
                    .unwrap_or(false);
                if !visited.contains(&successor) || successor_is_while {
                    queue.push_back(successor);
                }
            }
        }

        // Queue drained without reaching an end node.
        if self.context.status() == ExecutionStatus::Running {
            self.context.set_status(ExecutionStatus::Completed);
        }
        self.finish(None)
    }

    /// Interpret a result's `next_nodes` as direct node ids or source
    /// handle names; without `next_nodes`, follow all outgoing edges in
    /// definition order.
    fn successors(&self, node: &NodeDefinition, result: &NodeExecutionResult) -> Vec<String> {
        let outgoing = self.edges_by_source.get(&node.id);
        let mut out: Vec<String> = Vec::new();

        match &result.next_nodes {
            Some(entries) => {
                if entries.is_empty() {
                    return out;
                }
                for entry in entries {
                    if self.node_map.contains_key(entry) {
                        push_unique(&mut out, entry.clone());
                    } else if let Some(edges) = outgoing {
                        for edge in edges
                            .iter()
                            .filter(|e| e.source_handle.as_deref() == Some(entry.as_str()))
                        {
                            push_unique(&mut out, edge.target.clone());
                        }
                    }
                }
                // A selector that matched nothing at all falls back to the
                // plain outgoing edges, so branch-reporting nodes still work
                // on graphs with unlabeled edges.
                if out.is_empty() {
                    if let Some(edges) = outgoing {
                        for edge in edges {
                            push_unique(&mut out, edge.target.clone());
                        }
                    }
                }
            }
            None => {
                if let Some(edges) = outgoing {
                    for edge in edges {
                        push_unique(&mut out, edge.target.clone());
                    }
                }
            }
        }
        out
    }

    fn finish_failed(&mut self, code: ErrorCode, message: String) -> ExecutionResult {
        self.context.log(LogLevel::Error, message.clone());
        self.context.set_status(ExecutionStatus::Failed);
        self.finish(Some(ErrorInfo::new(code, message)))
    }

    fn finish(&mut self, error: Option<ErrorInfo>) -> ExecutionResult {
        self.context.set_current_node(None);
        let status = self.context.status();
        let _ = self.event_bus.emitter().emit(Event::RunFinished {
            run_id: self.context.run_id(),
            status,
            dispatches: self.execution_count,
        });
        ExecutionResult {
            success: status == ExecutionStatus::Completed,
            status,
            outputs: self.context.output().clone(),
            error,
            logs: self.context.logs().to_vec(),
            execution_time: self
                .started
                .map(|s| s.elapsed().as_millis() as u64)
                .unwrap_or(0),
            node_results: self.node_results.clone(),
        }
    }
}

fn push_unique(out: &mut Vec<String>, value: String) {
    if !out.contains(&value) {
        out.push(value);
    }
}
