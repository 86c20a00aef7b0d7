//! `classify` — LLM-backed category routing.
//!
//! The model is asked at temperature 0 to name one of the configured
//! categories. The response is matched, in order, by exact
//! case-insensitive name, by substring in either direction, then by exact
//! id; if nothing matches, the first category is chosen rather than
//! failing silently downstream.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fmt::Write as _;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::expr::eval::value_to_display;
use crate::providers::{ChatMessage, ChatRequest};
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

fn default_input_variable() -> String {
    "input".to_string()
}

fn default_output_variable() -> String {
    "classification".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Category {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    examples: Option<Vec<String>>,
    #[serde(default)]
    output_handle: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClassifyConfig {
    categories: Vec<Category>,
    #[serde(default = "default_input_variable")]
    input_variable: String,
    #[serde(default = "default_output_variable")]
    output_variable: String,
    #[serde(default)]
    model: Option<String>,
}

pub struct ClassifyExecutor;

#[async_trait]
impl NodeExecutor for ClassifyExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Classify
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: ClassifyConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        if config.categories.is_empty() {
            report.push("at least one category is required");
        }
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for category in &config.categories {
            if !ids.insert(category.id.clone()) {
                report.push(format!("duplicate category id '{}'", category.id));
            }
            if !names.insert(category.name.to_lowercase()) {
                report.push(format!("duplicate category name '{}'", category.name));
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
        let config: ClassifyConfig =
            match parse_config(node, ctx, ErrorCode::ClassifyExecutionError) {
                Ok(config) => config,
                Err(result) => return *result,
            };

        let Some(provider) = services.llm.clone() else {
            return result_for(node, ctx).failed(ErrorInfo::new(
                ErrorCode::ClassifyExecutionError,
                "no LLM provider configured",
            ));
        };

        let content = ctx
            .get(&config.input_variable)
            .map(|v| value_to_display(&v))
            .unwrap_or_default();

        let request = ChatRequest {
            messages: vec![ChatMessage::user(build_prompt(&config.categories, &content))],
            model: config.model.clone(),
            temperature: Some(0.0),
            ..ChatRequest::default()
        };

        let response = match provider.chat(request).await {
            Ok(response) => response,
            Err(e) => {
                return result_for(node, ctx).failed(ErrorInfo::new(
                    ErrorCode::ClassifyExecutionError,
                    format!("LLM call failed: {e}"),
                ));
            }
        };

        let chosen = match_category(&config.categories, &response.content).unwrap_or_else(|| {
            // Unmatchable responses fall back to the first category.
            &config.categories[0]
        });
        if match_category(&config.categories, &response.content).is_none() {
            ctx.log(
                LogLevel::Warn,
                format!(
                    "classifier reply '{}' matched no category; falling back to '{}'",
                    response.content.trim(),
                    chosen.name
                ),
            );
        }

        ctx.set_variable(
            config.output_variable.clone(),
            Value::String(chosen.name.clone()),
        );
        ctx.set_output("category", Value::String(chosen.name.clone()));
        ctx.set_output("categoryId", Value::String(chosen.id.clone()));
        ctx.log(
            LogLevel::Info,
            format!("classified input as '{}'", chosen.name),
        );

        let mut builder = result_for(node, ctx)
            .output("category", Value::String(chosen.name.clone()))
            .output("categoryId", Value::String(chosen.id.clone()))
            .output("rawResponse", Value::String(response.content.clone()))
            .meta("model", json!(response.model));
        if let Some(handle) = &chosen.output_handle {
            builder = builder.next_nodes([handle.clone()]);
        }
        builder.completed()
    }
}

fn build_prompt(categories: &[Category], content: &str) -> String {
    let mut prompt = String::from(
        "Classify the following content into exactly one of these categories.\n\nCategories:\n",
    );
    for category in categories {
        let _ = write!(prompt, "- {}", category.name);
        if let Some(description) = &category.description {
            let _ = write!(prompt, ": {description}");
        }
        prompt.push('\n');
        if let Some(examples) = &category.examples {
            for example in examples {
                let _ = writeln!(prompt, "  example: {example}");
            }
        }
    }
    let _ = write!(
        prompt,
        "\nContent:\n{content}\n\nRespond with the category name only."
    );
    prompt
}

/// Match rules, in order: exact case-insensitive name; substring either
/// direction; exact id.
fn match_category<'a>(categories: &'a [Category], response: &str) -> Option<&'a Category> {
    let needle = response.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    if let Some(found) = categories
        .iter()
        .find(|c| c.name.to_lowercase() == needle)
    {
        return Some(found);
    }
    if let Some(found) = categories.iter().find(|c| {
        let name = c.name.to_lowercase();
        needle.contains(&name) || name.contains(&needle)
    }) {
        return Some(found);
    }
    categories.iter().find(|c| c.id == response.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn categories() -> Vec<Category> {
        vec![
            Category {
                id: "s".into(),
                name: "Support".into(),
                description: None,
                examples: None,
                output_handle: Some("s".into()),
            },
            Category {
                id: "t".into(),
                name: "Tech".into(),
                description: None,
                examples: None,
                output_handle: Some("t".into()),
            },
        ]
    }

    #[test]
    fn match_prefers_exact_name() {
        let cats = categories();
        assert_eq!(match_category(&cats, "tech").unwrap().id, "t");
        assert_eq!(match_category(&cats, " Support ").unwrap().id, "s");
    }

    #[test]
    fn match_falls_through_substring_then_id() {
        let cats = categories();
        assert_eq!(
            match_category(&cats, "This looks like a Tech question").unwrap().id,
            "t"
        );
        assert_eq!(match_category(&cats, "s").unwrap().id, "s");
        assert!(match_category(&cats, "nonsense").is_none());
    }
}
