//! `user-approval` — pause-for-decision checkpoint.
//!
//! State machine: waiting -> approved | rejected | timed_out. The first
//! dispatch files a pending record in the runner's approval registry and
//! returns `waiting`; the runner then either consults its approval
//! callback or pauses the run. On re-dispatch the record's state decides
//! the outcome; an elapsed timeout dispatches the configured action.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::approval::{ApprovalRecord, ApprovalStatus};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::event_bus::Event;
use crate::expr;
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 86_400_000;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum TimeoutAction {
    Approve,
    Reject,
    #[default]
    Fail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApprovalConfig {
    message: String,
    #[serde(default)]
    approve_label: Option<String>,
    #[serde(default)]
    reject_label: Option<String>,
    /// Milliseconds; bounded to [1s, 24h].
    #[serde(default)]
    timeout: Option<u64>,
    #[serde(default)]
    timeout_action: TimeoutAction,
}

pub struct UserApprovalExecutor;

#[async_trait]
impl NodeExecutor for UserApprovalExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::UserApproval
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: ApprovalConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        if config.message.trim().is_empty() {
            report.push("message must not be empty");
        }
        if let Some(timeout) = config.timeout {
            if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&timeout) {
                report.push(format!(
                    "timeout must be between {MIN_TIMEOUT_MS} and {MAX_TIMEOUT_MS} ms"
                ));
            }
        }
        report
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: ApprovalConfig = match parse_config(node, ctx, ErrorCode::UserApprovalError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let run_id = ctx.run_id();
        let existing = services.approvals.get(run_id, &node.id);

        let record = match existing {
            Some(record) => record,
            None => {
                let message = expr::interpolate(&config.message, ctx);
                let record = ApprovalRecord::new(
                    &node.id,
                    message.clone(),
                    config.approve_label.clone(),
                    config.reject_label.clone(),
                    config.timeout.map(Duration::from_millis),
                );
                services.approvals.create(run_id, record);
                ctx.log(LogLevel::Info, format!("waiting for approval: {message}"));
                let _ = services.emitter.emit(Event::ApprovalRequested {
                    run_id,
                    node_id: node.id.clone(),
                    message,
                });
                return result_for(node, ctx).waiting();
            }
        };

        match record.status {
            ApprovalStatus::Approved => {
                services.approvals.remove(run_id, &node.id);
                self.finish(node, ctx, true, "approved", false)
            }
            ApprovalStatus::Rejected => {
                services.approvals.remove(run_id, &node.id);
                self.finish(node, ctx, false, "rejected", false)
            }
            ApprovalStatus::Waiting if record.timed_out() => {
                services.approvals.remove(run_id, &node.id);
                match config.timeout_action {
                    TimeoutAction::Approve => {
                        ctx.log(LogLevel::Warn, "approval timed out; auto-approving");
                        self.finish(node, ctx, true, "approved", true)
                    }
                    TimeoutAction::Reject => {
                        ctx.log(LogLevel::Warn, "approval timed out; auto-rejecting");
                        self.finish(node, ctx, false, "rejected", true)
                    }
                    TimeoutAction::Fail => {
                        ctx.log(LogLevel::Error, "approval timed out");
                        result_for(node, ctx).failed(
                            ErrorInfo::new(
                                ErrorCode::ApprovalTimeout,
                                format!(
                                    "approval timed out after {} ms",
                                    config.timeout.unwrap_or_default()
                                ),
                            )
                            .with_details(json!({ "message": record.message })),
                        )
                    }
                }
            }
            ApprovalStatus::Waiting => result_for(node, ctx).waiting(),
        }
    }
}

impl UserApprovalExecutor {
    fn finish(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        approved: bool,
        action: &str,
        timed_out: bool,
    ) -> NodeExecutionResult {
        ctx.set_variable(
            "_approvalResult",
            json!({ "approved": approved, "action": action, "timedOut": timed_out }),
        );
        ctx.set_output("approved", Value::Bool(approved));
        ctx.log(LogLevel::Info, format!("approval resolved: {action}"));
        let handle = if approved { "approved" } else { "rejected" };
        result_for(node, ctx)
            .output("approved", Value::Bool(approved))
            .output("action", Value::String(action.to_string()))
            .meta("timedOut", Value::Bool(timed_out))
            .next_nodes([handle.to_string()])
            .completed()
    }
}
