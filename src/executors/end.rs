//! `end` — terminal node; optionally maps context values into the run
//! output.

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::types::{ErrorCode, NodeExecutionResult, NodeType, ValidationReport};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndConfig {
    /// output key -> dot-path to read from the context.
    #[serde(default)]
    output_mapping: Option<FxHashMap<String, String>>,
}

pub struct EndExecutor;

#[async_trait]
impl NodeExecutor for EndExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::End
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        match parse_for_validation::<EndConfig>(config) {
            Ok(_) => ValidationReport::ok(),
            Err(report) => report,
        }
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        _services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: EndConfig = match parse_config(node, ctx, ErrorCode::WorkflowExecutionError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let mut builder = result_for(node, ctx);
        if let Some(mapping) = &config.output_mapping {
            for (out_key, source_path) in mapping {
                match ctx.get(source_path) {
                    Some(value) => {
                        ctx.set_output(out_key.clone(), value.clone());
                        builder = builder.output(out_key.clone(), value);
                    }
                    None => {
                        ctx.log(
                            LogLevel::Debug,
                            format!("output mapping '{out_key}' skipped: '{source_path}' is unset"),
                        );
                    }
                }
            }
        }
        ctx.log(LogLevel::Info, "workflow reached end node");
        builder.completed()
    }
}
