//! `mcp` — call a tool on an external MCP server.
//!
//! Parameters are interpolated recursively before the call: a leaf string
//! that is exactly one `{{ var }}` placeholder resolves to the raw value
//! (keeping its type), while embedded placeholders interpolate as text.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr;
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

fn default_output_variable() -> String {
    "mcpResult".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct McpConfig {
    server_id: String,
    tool_name: String,
    #[serde(default)]
    parameters: Map<String, Value>,
    #[serde(default = "default_output_variable")]
    output_variable: String,
}

pub struct McpExecutor;

#[async_trait]
impl NodeExecutor for McpExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Mcp
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: McpConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        if config.server_id.trim().is_empty() {
            report.push("serverId must not be empty");
        }
        if config.tool_name.trim().is_empty() {
            report.push("toolName must not be empty");
        }
        report
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: McpConfig = match parse_config(node, ctx, ErrorCode::McpExecutionError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let Some(provider) = services.mcp.clone() else {
            return result_for(node, ctx).failed(ErrorInfo::new(
                ErrorCode::McpExecutionError,
                "no MCP provider configured",
            ));
        };

        if !provider.is_server_available(&config.server_id).await {
            return result_for(node, ctx).failed(ErrorInfo::new(
                ErrorCode::McpExecutionError,
                format!("MCP server '{}' is not available", config.server_id),
            ));
        }

        let parameters = match expr::interpolate_value(&Value::Object(config.parameters.clone()), ctx)
        {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        ctx.log(
            LogLevel::Info,
            format!(
                "calling tool '{}' on server '{}'",
                config.tool_name, config.server_id
            ),
        );

        let result = match provider
            .call_tool(&config.server_id, &config.tool_name, &parameters)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                return result_for(node, ctx).failed(ErrorInfo::new(
                    ErrorCode::McpExecutionError,
                    format!("tool call failed: {e}"),
                ));
            }
        };

        if !result.success {
            let reason = result
                .error
                .unwrap_or_else(|| "tool reported failure".to_string());
            return result_for(node, ctx).failed(
                ErrorInfo::new(
                    ErrorCode::McpExecutionError,
                    format!("tool '{}' failed: {reason}", config.tool_name),
                )
                .with_details(json!({ "serverId": config.server_id })),
            );
        }

        let data = result.data.unwrap_or(Value::Null);
        ctx.set_variable(config.output_variable.clone(), data.clone());
        ctx.set_output("result", data.clone());
        if let Some(metadata) = &result.metadata {
            ctx.set_variable(
                format!("{}_metadata", config.output_variable),
                metadata.clone(),
            );
        }

        result_for(node, ctx)
            .output("result", data)
            .output("serverId", Value::String(config.server_id))
            .output("toolName", Value::String(config.tool_name))
            .completed()
    }
}
