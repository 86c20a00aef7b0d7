//! `transform` — sandboxed user script over the context.
//!
//! The script runs on the embedded engine with a fixed binding surface:
//! `input`, `variables`, `output`, each named input variable, and the
//! helpers `log`, `get_variable`, `set_variable`. The script's return
//! value becomes the transform's output. A 5-second wall clock bounds
//! execution.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::sandbox::{self, SandboxError, ScriptInput};
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

fn default_output_variable() -> String {
    "transformResult".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransformConfig {
    code: String,
    #[serde(default)]
    input_variables: Option<Vec<String>>,
    #[serde(default = "default_output_variable")]
    output_variable: String,
}

pub struct TransformExecutor;

#[async_trait]
impl NodeExecutor for TransformExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Transform
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: TransformConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        if config.code.trim().is_empty() {
            return ValidationReport::invalid("code must not be empty");
        }
        if let Err(e) = sandbox::scan_source(&config.code) {
            return ValidationReport::invalid(e.to_string());
        }
        if let Err(e) = sandbox::check_syntax(&config.code) {
            return ValidationReport::invalid(e.to_string());
        }
        ValidationReport::ok()
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        _services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: TransformConfig =
            match parse_config(node, ctx, ErrorCode::TransformExecutionError) {
                Ok(config) => config,
                Err(result) => return *result,
            };

        let mut bindings: Vec<(String, Value)> = vec![
            ("input".to_string(), ctx.input_as_value()),
            (
                "variables".to_string(),
                Value::Object(map_to_object(ctx.variables())),
            ),
            (
                "output".to_string(),
                Value::Object(map_to_object(ctx.output())),
            ),
        ];
        if let Some(names) = &config.input_variables {
            for name in names {
                bindings.push((name.clone(), ctx.get(name).unwrap_or(Value::Null)));
            }
        }

        let outcome = sandbox::run_script(ScriptInput {
            code: config.code.clone(),
            bindings,
            variables: ctx.variables().clone(),
            input: ctx.input().clone(),
            output: ctx.output().clone(),
            allow_writes: true,
            timeout: SCRIPT_TIMEOUT,
        })
        .await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                let details = match &e {
                    SandboxError::Timeout { limit_ms } => json!({ "timeoutMs": limit_ms }),
                    _ => Value::Null,
                };
                return result_for(node, ctx).failed(
                    ErrorInfo::new(ErrorCode::TransformExecutionError, e.to_string())
                        .with_details(details),
                );
            }
        };

        for message in outcome.logs {
            ctx.log(LogLevel::Debug, message);
        }
        for (name, value) in outcome.writes {
            ctx.set_variable(name, value);
        }

        let result_value = outcome.value.unwrap_or(Value::Null);
        ctx.set_variable(config.output_variable.clone(), result_value.clone());
        ctx.set_output("result", result_value.clone());

        result_for(node, ctx).output("result", result_value).completed()
    }
}

fn map_to_object(map: &FxHashMap<String, Value>) -> serde_json::Map<String, Value> {
    map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
}
