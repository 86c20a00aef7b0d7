//! `file-search` — retrieval across one or more vector stores.
//!
//! Results from all stores are merged, sorted by descending score, and
//! truncated. A store that errors is logged as a warning and skipped;
//! only a missing provider fails the node.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::cmp::Ordering;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr;
use crate::expr::eval::value_to_display;
use crate::providers::SearchHit;
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

const MAX_RESULTS_CEILING: u32 = 100;

fn default_max_results() -> u32 {
    5
}

fn default_output_variable() -> String {
    "searchResults".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileSearchConfig {
    vector_store_ids: Vec<String>,
    #[serde(default = "default_max_results")]
    max_results: u32,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    query_variable: Option<String>,
    #[serde(default = "default_output_variable")]
    output_variable: String,
}

pub struct FileSearchExecutor;

#[async_trait]
impl NodeExecutor for FileSearchExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::FileSearch
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: FileSearchConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        if config.vector_store_ids.is_empty() {
            report.push("at least one vector store id is required");
        }
        if config.vector_store_ids.iter().any(|id| id.trim().is_empty()) {
            report.push("vector store ids must not be empty");
        }
        if config.max_results < 1 || config.max_results > MAX_RESULTS_CEILING {
            report.push(format!("maxResults must be between 1 and {MAX_RESULTS_CEILING}"));
        }
        report
    }

    async fn execute(
        &self,
        node: &NodeDefinition,
        ctx: &mut ExecutionContext,
        services: &ExecutorServices,
    ) -> NodeExecutionResult {
        let config: FileSearchConfig = match parse_config(node, ctx, ErrorCode::FileSearchError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let Some(provider) = services.vector.clone() else {
            return result_for(node, ctx).failed(ErrorInfo::new(
                ErrorCode::FileSearchError,
                "no vector store provider configured",
            ));
        };
        if !provider.is_available() {
            return result_for(node, ctx).failed(ErrorInfo::new(
                ErrorCode::FileSearchError,
                "vector store provider is unavailable",
            ));
        }

        let query = resolve_query(&config, ctx);
        let max_results = config.max_results as usize;

        let mut hits: Vec<SearchHit> = Vec::new();
        for store_id in &config.vector_store_ids {
            match provider.search(store_id, &query, max_results).await {
                Ok(store_hits) => {
                    ctx.log(
                        LogLevel::Debug,
                        format!("store '{store_id}' returned {} hit(s)", store_hits.len()),
                    );
                    hits.extend(store_hits);
                }
                Err(e) => {
                    ctx.log(
                        LogLevel::Warn,
                        format!("store '{store_id}' failed, skipping: {e}"),
                    );
                }
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(max_results);

        let results_value = serde_json::to_value(&hits).unwrap_or_else(|_| json!([]));
        let contents: Vec<Value> = hits
            .iter()
            .map(|hit| Value::String(hit.content.clone()))
            .collect();

        ctx.set_variable(config.output_variable.clone(), results_value.clone());
        ctx.set_variable(
            format!("{}_content", config.output_variable),
            Value::Array(contents),
        );
        ctx.set_output("results", results_value.clone());
        ctx.set_output("resultCount", json!(hits.len()));
        ctx.log(
            LogLevel::Info,
            format!("file search found {} result(s) for '{query}'", hits.len()),
        );

        result_for(node, ctx)
            .output("results", results_value)
            .output("resultCount", json!(hits.len()))
            .output("query", Value::String(query))
            .completed()
    }
}

/// Pick the query: explicit (interpolated), then a named variable, then
/// the run input.
fn resolve_query(config: &FileSearchConfig, ctx: &ExecutionContext) -> String {
    if let Some(query) = &config.query {
        return expr::interpolate(query, ctx);
    }
    if let Some(variable) = &config.query_variable {
        if let Some(value) = ctx.get(variable) {
            return value_to_display(&value);
        }
    }
    match ctx.get("input.input") {
        Some(value) => value_to_display(&value),
        None => value_to_display(&ctx.input_as_value()),
    }
}
