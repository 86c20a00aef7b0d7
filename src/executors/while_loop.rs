//! `while` — bounded loop over a set of body nodes.
//!
//! The loop is scheduled by the runner: a `running` result with
//! `next_nodes` set to the body node ids makes the runner enqueue the body
//! and then re-enqueue this node, producing bounded repetition. Both exit
//! paths (condition false, iteration cap) reset the loop counter.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr;
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

const DEFAULT_MAX_ITERATIONS: u32 = 100;
const MAX_ITERATIONS_CEILING: u32 = 10_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhileConfig {
    condition: String,
    #[serde(default = "default_max_iterations")]
    max_iterations: u32,
    #[serde(default)]
    body_nodes: Vec<String>,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

pub struct WhileExecutor;

impl WhileExecutor {
    /// Key under which the runner-visible iteration counter lives.
    #[must_use]
    pub fn counter_key(node_id: &str) -> String {
        format!("while_{node_id}")
    }
}

#[async_trait]
impl NodeExecutor for WhileExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::While
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: WhileConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        if config.condition.trim().is_empty() {
            report.push("condition must not be empty");
        }
        if config.max_iterations < 1 || config.max_iterations > MAX_ITERATIONS_CEILING {
            report.push(format!(
                "maxIterations must be between 1 and {MAX_ITERATIONS_CEILING}"
            ));
        }
        report
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        _services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: WhileConfig = match parse_config(node, ctx, ErrorCode::WhileExecutionError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let counter_key = Self::counter_key(&node.id);
        let iterations_done = ctx.iteration_count(&counter_key);

        if iterations_done >= config.max_iterations {
            ctx.log(
                LogLevel::Warn,
                format!(
                    "loop '{}' exiting after hitting the {} iteration cap",
                    node.id, config.max_iterations
                ),
            );
            ctx.reset_iteration(&counter_key);
            return result_for(node, ctx)
                .output("iterations", json!(iterations_done))
                .meta("reason", json!("max_iterations_reached"))
                .completed();
        }

        let should_continue = match expr::evaluate_condition(&config.condition, ctx) {
            Ok(value) => value,
            Err(e) => {
                ctx.reset_iteration(&counter_key);
                return result_for(node, ctx).failed(
                    ErrorInfo::new(
                        ErrorCode::ConditionEvaluationError,
                        format!("loop condition failed: {e}"),
                    )
                    .with_details(json!({ "condition": config.condition, "offset": e.offset() })),
                );
            }
        };

        if !should_continue {
            ctx.log(
                LogLevel::Debug,
                format!("loop '{}' finished after {iterations_done} iteration(s)", node.id),
            );
            ctx.reset_iteration(&counter_key);
            return result_for(node, ctx)
                .output("iterations", json!(iterations_done))
                .meta("reason", json!("condition_false"))
                .completed();
        }

        let iteration = ctx.increment_iteration(counter_key);
        ctx.set_variable("_loopIteration", json!(iteration));
        ctx.set_variable(format!("_{}_iteration", node.id), json!(iteration));
        ctx.log(
            LogLevel::Debug,
            format!("loop '{}' entering iteration {iteration}", node.id),
        );

        result_for(node, ctx)
            .output("iteration", json!(iteration))
            .next_nodes(config.body_nodes.clone())
            .running()
    }
}
