//! `if-else` — ordered condition list selecting a labelled output.
//!
//! All conditions are evaluated (for the log); the first that reduces to
//! true selects its output handle. A condition that raises an expression
//! error is logged and treated as false, not fatal.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr;
use crate::types::{ErrorCode, NodeExecutionResult, NodeType, ValidationReport};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Condition {
    id: String,
    expression: String,
    #[serde(default)]
    label: Option<String>,
    output_handle: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IfElseConfig {
    conditions: Vec<Condition>,
    #[serde(default)]
    else_output_handle: Option<String>,
}

pub struct IfElseExecutor;

#[async_trait]
impl NodeExecutor for IfElseExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::IfElse
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: IfElseConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        let mut ids = HashSet::new();
        for condition in &config.conditions {
            if !ids.insert(condition.id.clone()) {
                report.push(format!("duplicate condition id '{}'", condition.id));
            }
            if condition.expression.trim().is_empty() {
                report.push(format!("condition '{}' has an empty expression", condition.id));
            }
            if condition.output_handle.trim().is_empty() {
                report.push(format!("condition '{}' has an empty output handle", condition.id));
            }
        }
        report
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        _services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: IfElseConfig = match parse_config(node, ctx, ErrorCode::IfElseExecutionError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let mut selected: Option<&Condition> = None;
        let mut evaluations = Vec::with_capacity(config.conditions.len());
        for condition in &config.conditions {
            let outcome = match expr::evaluate_condition(&condition.expression, ctx) {
                Ok(value) => value,
                Err(e) => {
                    ctx.log_with(
                        LogLevel::Warn,
                        format!("condition '{}' failed, treating as false: {e}", condition.id),
                        Some(json!({ "expression": condition.expression, "offset": e.offset() })),
                    );
                    false
                }
            };
            ctx.log(
                LogLevel::Debug,
                format!("condition '{}' => {outcome}", condition.expression),
            );
            evaluations.push(json!({
                "id": condition.id,
                "expression": condition.expression,
                "result": outcome,
            }));
            if outcome && selected.is_none() {
                selected = Some(condition);
            }
        }

        let (branch, handle) = match selected {
            Some(condition) => (
                condition
                    .label
                    .clone()
                    .unwrap_or_else(|| condition.expression.clone()),
                Some(condition.output_handle.clone()),
            ),
            None => ("else".to_string(), config.else_output_handle.clone()),
        };

        let branch_report = json!({
            "branch": branch,
            "handle": handle,
            "evaluations": evaluations,
        });
        ctx.set_output("_ifElseResult", branch_report.clone());

        let mut builder = result_for(node, ctx).output("_ifElseResult", branch_report);
        builder = match &handle {
            Some(handle) => builder.next_nodes([handle.clone()]),
            // No condition matched and no else branch: no successors.
            None => builder.next_nodes(Vec::<String>::new()),
        };
        builder.completed()
    }
}
