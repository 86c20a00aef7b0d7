//! `agent` — one LLM call with interpolated instructions.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr;
use crate::providers::{ChatMessage, ChatRequest};
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

fn default_output_variable() -> String {
    "agentResponse".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentConfig {
    instructions: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    temperature: Option<f64>,
    #[serde(default)]
    max_tokens: Option<u32>,
    #[serde(default)]
    system_prompt: Option<String>,
    #[serde(default)]
    tools: Option<Vec<Value>>,
    #[serde(default = "default_output_variable")]
    output_variable: String,
}

pub struct AgentExecutor;

#[async_trait]
impl NodeExecutor for AgentExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Agent
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: AgentConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        if config.instructions.trim().is_empty() {
            report.push("instructions must not be empty");
        }
        if let Some(t) = config.temperature {
            if !(0.0..=2.0).contains(&t) {
                report.push("temperature must be between 0 and 2");
            }
        }
        if config.max_tokens == Some(0) {
            report.push("maxTokens must be at least 1");
        }
        report
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: AgentConfig = match parse_config(node, ctx, ErrorCode::AgentExecutionError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let Some(provider) = services.llm.clone() else {
            return result_for(node, ctx).failed(ErrorInfo::new(
                ErrorCode::AgentExecutionError,
                "no LLM provider configured",
            ));
        };

        let mut messages = Vec::new();
        if let Some(system_prompt) = &config.system_prompt {
            messages.push(ChatMessage::system(expr::interpolate(system_prompt, ctx)));
        }
        let mut user_content = expr::interpolate(&config.instructions, ctx);
        if !ctx.input().is_empty() {
            let input_dump = serde_json::to_string_pretty(&ctx.input_as_value())
                .unwrap_or_else(|_| "{}".to_string());
            user_content.push_str("\n\nInput:\n");
            user_content.push_str(&input_dump);
        }
        messages.push(ChatMessage::user(user_content));

        let request = ChatRequest {
            messages,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            tools: config.tools.clone(),
            stop_sequences: None,
        };

        ctx.log(
            LogLevel::Info,
            format!("agent '{}' calling {}", node.display_name(), provider.name()),
        );

        let response = match provider.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                return result_for(node, ctx).failed(ErrorInfo::new(
                    ErrorCode::AgentExecutionError,
                    format!("LLM call failed: {e}"),
                ));
            }
        };

        ctx.set_variable(
            config.output_variable.clone(),
            Value::String(response.content.clone()),
        );
        ctx.set_output("response", Value::String(response.content.clone()));
        if let Some(total) = response.usage.as_ref().and_then(|u| u.total_tokens) {
            ctx.set_variable(format!("{}_tokens", config.output_variable), json!(total));
        }

        let mut builder = result_for(node, ctx)
            .output("response", Value::String(response.content.clone()))
            .output("model", Value::String(response.model.clone()))
            .output(
                "finishReason",
                response
                    .finish_reason
                    .clone()
                    .map(Value::String)
                    .unwrap_or(Value::Null),
            )
            .output(
                "usage",
                serde_json::to_value(&response.usage).unwrap_or(Value::Null),
            );
        if let Some(tool_calls) = &response.tool_calls {
            // Recorded for future dispatch; the engine does not invoke
            // agent-returned tools itself.
            builder = builder.meta("toolCalls", Value::Array(tool_calls.clone()));
        }
        builder.completed()
    }
}
