//! `set-state` — typed assignment to a dot-path variable.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr;
use crate::types::{ErrorCode, NodeExecutionResult, NodeType, ValidationReport};
use crate::utils::paths;

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum ValueType {
    String,
    Number,
    Boolean,
    Json,
    Expression,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetStateConfig {
    /// Dot-path of the form `ident(.ident)*`.
    variable: String,
    value_type: ValueType,
    value: String,
}

pub struct SetStateExecutor;

#[async_trait]
impl NodeExecutor for SetStateExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::SetState
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: SetStateConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        if !paths::is_identifier_path(&config.variable) {
            return ValidationReport::invalid(format!(
                "variable '{}' is not a dot-path of identifiers",
                config.variable
            ));
        }
        ValidationReport::ok()
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        _services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: SetStateConfig = match parse_config(node, ctx, ErrorCode::SetStateError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let value = match parse_value(&config, ctx) {
            Ok(value) => value,
            Err(message) => {
                ctx.log(LogLevel::Error, message.clone());
                return result_for(node, ctx).failed(
                    crate::types::ErrorInfo::new(ErrorCode::SetStateError, message)
                        .with_details(serde_json::json!({ "variable": config.variable })),
                );
            }
        };

        if let Err(e) = ctx.set(&config.variable, value.clone()) {
            return result_for(node, ctx).failed(crate::types::ErrorInfo::new(
                ErrorCode::SetStateError,
                e.to_string(),
            ));
        }
        // Mirrored into the run output for downstream convenience.
        ctx.set_output(config.variable.clone(), value.clone());
        ctx.log(
            LogLevel::Debug,
            format!("set '{}' ({:?})", config.variable, config.value_type),
        );

        result_for(node, ctx)
            .output("variable", Value::String(config.variable.clone()))
            .output("value", value)
            .completed()
    }
}

fn parse_value(config: &SetStateConfig, ctx: &ExecutionContext) -> Result<Value, String> {
    match config.value_type {
        ValueType::String => Ok(Value::String(expr::interpolate(&config.value, ctx))),
        ValueType::Number => {
            let trimmed = config.value.trim();
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("cannot convert '{}' to a number", config.value))
        }
        ValueType::Boolean => match config.value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Ok(Value::Bool(false)),
            other => Err(format!("cannot convert '{other}' to a boolean")),
        },
        ValueType::Json => {
            let parsed: Value = serde_json::from_str(&config.value)
                .map_err(|e| format!("invalid JSON value: {e}"))?;
            Ok(interpolate_strings(&parsed, ctx))
        }
        ValueType::Expression => match expr::evaluate(&config.value, ctx) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(Value::Null),
            Err(e) => Err(format!("expression failed: {e}")),
        },
    }
}

/// Interpolate every string inside a parsed JSON structure.
fn interpolate_strings(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => Value::String(expr::interpolate(s, ctx)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_strings(item, ctx))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), interpolate_strings(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}
