//! `guardrails` — content validation rules over the run's input/output.
//!
//! Rules come in four kinds: regex, keyword, llm, and custom (a sandboxed
//! validator snippet). Results aggregate per the node's `onFail` policy:
//! `block` fails the node, `warn` completes with warnings metadata,
//! `continue` completes silently.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::time::Duration;

use super::{parse_config, parse_for_validation, result_for, ExecutorServices, NodeExecutor};
use crate::context::{ExecutionContext, LogLevel};
use crate::definition::NodeDefinition;
use crate::providers::{ChatMessage, ChatRequest};
use crate::sandbox::{self, ScriptInput};
use crate::types::{ErrorCode, ErrorInfo, NodeExecutionResult, NodeType, ValidationReport};

const VALIDATOR_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum Mode {
    Input,
    Output,
    Both,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum OnFail {
    Block,
    Warn,
    Continue,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RuleType {
    Regex,
    Keyword,
    Llm,
    Custom,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RuleDef {
    id: String,
    name: String,
    #[serde(rename = "type")]
    rule_type: RuleType,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GuardrailsConfig {
    mode: Mode,
    on_fail: OnFail,
    #[serde(default)]
    rules: Vec<RuleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegexRule {
    pattern: String,
    #[serde(default = "default_flags")]
    flags: String,
    #[serde(default)]
    should_match: bool,
}

fn default_flags() -> String {
    "gi".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordRule {
    keywords: Vec<String>,
    #[serde(default)]
    case_sensitive: bool,
    #[serde(default)]
    should_contain: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmRule {
    prompt: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomRule {
    validator: String,
}

struct RuleOutcome {
    id: String,
    name: String,
    passed: bool,
    message: Option<String>,
    details: Option<Value>,
}

impl RuleOutcome {
    fn to_value(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "passed": self.passed,
            "message": self.message,
            "details": self.details,
        })
    }
}

pub struct GuardrailsExecutor;

#[async_trait]
impl NodeExecutor for GuardrailsExecutor {
    fn node_type(&self) -> NodeType {
        NodeType::Guardrails
    }

    fn validate(&self, config: &Value) -> ValidationReport {
        let config: GuardrailsConfig = match parse_for_validation(config) {
            Ok(config) => config,
            Err(report) => return report,
        };
        let mut report = ValidationReport::ok();
        let mut ids = HashSet::new();
        for rule in &config.rules {
            if !ids.insert(rule.id.clone()) {
                report.push(format!("duplicate rule id '{}'", rule.id));
            }
            match rule.rule_type {
                RuleType::Regex => {
                    match serde_json::from_value::<RegexRule>(rule.config.clone()) {
                        Ok(regex_rule) => {
                            if compile_regex(&regex_rule).is_err() {
                                report.push(format!(
                                    "rule '{}': invalid pattern '{}'",
                                    rule.id, regex_rule.pattern
                                ));
                            }
                        }
                        Err(e) => report.push(format!("rule '{}': {e}", rule.id)),
                    }
                }
                RuleType::Keyword => {
                    if let Err(e) = serde_json::from_value::<KeywordRule>(rule.config.clone()) {
                        report.push(format!("rule '{}': {e}", rule.id));
                    }
                }
                RuleType::Llm => {
                    if let Err(e) = serde_json::from_value::<LlmRule>(rule.config.clone()) {
                        report.push(format!("rule '{}': {e}", rule.id));
                    }
                }
                RuleType::Custom => {
                    match serde_json::from_value::<CustomRule>(rule.config.clone()) {
                        Ok(custom) => {
                            if let Err(e) = sandbox::scan_source(&custom.validator) {
                                report.push(format!("rule '{}': {e}", rule.id));
                            }
                        }
                        Err(e) => report.push(format!("rule '{}': {e}", rule.id)),
                    }
                }
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
        let config: GuardrailsConfig = match parse_config(node, ctx, ErrorCode::GuardrailsError) {
            Ok(config) => config,
            Err(result) => return *result,
        };

        let content = content_for_mode(config.mode, ctx);
        let mut outcomes = Vec::with_capacity(config.rules.len());
        for rule in &config.rules {
            match run_rule(rule, &content, ctx, services).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    return result_for(node, ctx).failed(
                        ErrorInfo::new(ErrorCode::GuardrailsError, error)
                            .with_details(json!({ "ruleId": rule.id })),
                    );
                }
            }
        }

        let failed: Vec<&RuleOutcome> = outcomes.iter().filter(|o| !o.passed).collect();
        let all_passed = failed.is_empty();
        let results_value = Value::Array(outcomes.iter().map(RuleOutcome::to_value).collect());
        ctx.set_variable("_guardrailResults", results_value.clone());
        ctx.set_variable("_guardrailsPassed", Value::Bool(all_passed));

        let handle = if all_passed { "pass" } else { "fail" };
        let builder = result_for(node, ctx)
            .output("passed", Value::Bool(all_passed))
            .output("results", results_value)
            .next_nodes([handle.to_string()]);

        if all_passed {
            ctx.log(LogLevel::Info, "all guardrail rules passed");
            return builder.completed();
        }

        let failed_summaries: Vec<Value> = failed.iter().map(|o| o.to_value()).collect();
        match config.on_fail {
            OnFail::Block => {
                ctx.log(
                    LogLevel::Error,
                    format!("{} guardrail rule(s) failed; blocking", failed.len()),
                );
                builder.failed(
                    ErrorInfo::new(
                        ErrorCode::GuardrailsBlocked,
                        format!("{} guardrail rule(s) failed", failed.len()),
                    )
                    .with_details(json!({ "failedRules": failed_summaries })),
                )
            }
            OnFail::Warn => {
                ctx.log_with(
                    LogLevel::Warn,
                    format!("{} guardrail rule(s) failed", failed.len()),
                    Some(json!({ "failedRules": failed_summaries.clone() })),
                );
                builder
                    .meta("warnings", Value::Array(failed_summaries))
                    .completed()
            }
            OnFail::Continue => builder.completed(),
        }
    }
}

/// Content under validation, stringified (JSON for structures).
fn content_for_mode(mode: Mode, ctx: &ExecutionContext) -> String {
    let value = match mode {
        Mode::Input => ctx.input_as_value(),
        Mode::Output => Value::Object(ctx.output().iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        Mode::Both => json!({
            "input": ctx.input_as_value(),
            "output": Value::Object(ctx.output().iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        }),
    };
    match value {
        Value::String(s) => s,
        other => serde_json::to_string(&other).unwrap_or_default(),
    }
}

async fn run_rule(
    rule: &RuleDef,
    content: &str,
    ctx: &ExecutionContext,
    services: &ExecutorServices,
) -> Result<RuleOutcome, String> {
    let passed_and_details: (bool, Option<Value>, Option<String>) = match rule.rule_type {
        RuleType::Regex => {
            let regex_rule: RegexRule = serde_json::from_value(rule.config.clone())
                .map_err(|e| format!("rule '{}': {e}", rule.id))?;
            let compiled = compile_regex(&regex_rule)
                .map_err(|e| format!("rule '{}': invalid pattern: {e}", rule.id))?;
            let matched = compiled.is_match(content);
            (
                matched == regex_rule.should_match,
                Some(json!({ "matched": matched, "pattern": regex_rule.pattern })),
                None,
            )
        }
        RuleType::Keyword => {
            let keyword_rule: KeywordRule = serde_json::from_value(rule.config.clone())
                .map_err(|e| format!("rule '{}': {e}", rule.id))?;
            let haystack = if keyword_rule.case_sensitive {
                content.to_string()
            } else {
                content.to_lowercase()
            };
            let found: Vec<&String> = keyword_rule
                .keywords
                .iter()
                .filter(|k| {
                    let needle = if keyword_rule.case_sensitive {
                        (*k).clone()
                    } else {
                        k.to_lowercase()
                    };
                    haystack.contains(&needle)
                })
                .collect();
            let present = !found.is_empty();
            (
                present == keyword_rule.should_contain,
                Some(json!({ "found": found })),
                None,
            )
        }
        RuleType::Llm => {
            let llm_rule: LlmRule = serde_json::from_value(rule.config.clone())
                .map_err(|e| format!("rule '{}': {e}", rule.id))?;
            let provider = services
                .llm
                .clone()
                .ok_or_else(|| format!("rule '{}': no LLM provider configured", rule.id))?;
            let prompt = format!(
                "{}\n\nContent:\n{content}\n\nReply with PASS or FAIL followed by a short reason.",
                llm_rule.prompt
            );
            let response = provider
                .chat(ChatRequest {
                    messages: vec![ChatMessage::user(prompt)],
                    model: llm_rule.model.clone(),
                    temperature: Some(0.0),
                    ..ChatRequest::default()
                })
                .await
                .map_err(|e| format!("rule '{}': LLM call failed: {e}", rule.id))?;
            let verdict = response
                .content
                .trim()
                .split_whitespace()
                .next()
                .unwrap_or("")
                .to_uppercase();
            (
                verdict.starts_with("PASS"),
                Some(json!({ "verdict": response.content.trim() })),
                None,
            )
        }
        RuleType::Custom => {
            let custom: CustomRule = serde_json::from_value(rule.config.clone())
                .map_err(|e| format!("rule '{}': {e}", rule.id))?;
            sandbox::scan_source(&custom.validator)
                .map_err(|e| format!("rule '{}': {e}", rule.id))?;
            let outcome = sandbox::run_script(ScriptInput {
                code: custom.validator.clone(),
                bindings: vec![("content".to_string(), Value::String(content.to_string()))],
                variables: ctx.variables().clone(),
                input: ctx.input().clone(),
                output: ctx.output().clone(),
                allow_writes: false,
                timeout: VALIDATOR_TIMEOUT,
            })
            .await
            .map_err(|e| format!("rule '{}': {e}", rule.id))?;
            interpret_validator_result(outcome.value)
                .map_err(|e| format!("rule '{}': {e}", rule.id))?
        }
    };

    let (passed, details, custom_message) = passed_and_details;
    Ok(RuleOutcome {
        id: rule.id.clone(),
        name: rule.name.clone(),
        passed,
        message: if passed {
            None
        } else {
            custom_message.or_else(|| rule.message.clone())
        },
        details,
    })
}

/// A custom validator may return a bare boolean or a
/// `{passed, message?, details?}` mapping.
fn interpret_validator_result(
    value: Option<Value>,
) -> Result<(bool, Option<Value>, Option<String>), String> {
    match value {
        Some(Value::Bool(passed)) => Ok((passed, None, None)),
        Some(Value::Object(map)) => {
            let passed = map
                .get("passed")
                .and_then(Value::as_bool)
                .ok_or("validator result object must carry a boolean 'passed'")?;
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string);
            let details = map.get("details").cloned();
            Ok((passed, details, message))
        }
        other => Err(format!(
            "validator must return a boolean or an object, got {}",
            other
                .map(|v| v.to_string())
                .unwrap_or_else(|| "nothing".to_string())
        )),
    }
}

/// Translate JS-style flags onto the regex crate's inline flags. The `g`
/// flag has no meaning for a match test and is ignored.
fn compile_regex(rule: &RegexRule) -> Result<regex::Regex, regex::Error> {
    let mut inline = String::new();
    for flag in rule.flags.chars() {
        match flag {
            'i' => inline.push('i'),
            'm' => inline.push('m'),
            's' => inline.push('s'),
            _ => {}
        }
    }
    let pattern = if inline.is_empty() {
        rule.pattern.clone()
    } else {
        format!("(?{inline}){}", rule.pattern)
    };
    regex::Regex::new(&pattern)
}
