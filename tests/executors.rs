mod common;

use serde_json::json;
use std::sync::Arc;

use agentflow::approval::ApprovalStatus;
use agentflow::context::ExecutionContext;
use agentflow::executors::{
    AgentExecutor, ClassifyExecutor, EndExecutor, FileSearchExecutor, GuardrailsExecutor,
    IfElseExecutor, McpExecutor, NodeExecutor, SetStateExecutor, StartExecutor, TransformExecutor,
    UserApprovalExecutor, WhileExecutor,
};
use agentflow::providers::{MockLlmProvider, MockMcpServer, MockVectorStore, ToolCallResult};
use agentflow::types::{ErrorCode, NodeStatus, NodeType};

use common::{input, node, services, services_with_llm, services_with_mcp, services_with_vector};

fn ctx_with_input(pairs: &[(&str, serde_json::Value)]) -> ExecutionContext {
    let mut ctx = ExecutionContext::new();
    ctx.assign_input(input(pairs));
    ctx
}

// ----------------------------------------------------------------------
// start / end
// ----------------------------------------------------------------------

#[tokio::test]
async fn start_records_inputs_as_outputs() {
    let mut ctx = ctx_with_input(&[("q", json!("hello"))]);
    let start = node("s", NodeType::Start, json!({}));
    let result = StartExecutor.execute(&start, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(result.outputs.get("q"), Some(&json!("hello")));
}

#[tokio::test]
async fn end_applies_output_mapping_and_skips_unset() {
    let mut ctx = ctx_with_input(&[("q", json!("hi"))]);
    ctx.set_variable("summary", json!("done"));
    let end = node(
        "e",
        NodeType::End,
        json!({"outputMapping": {"final": "summary", "q": "input.q", "gone": "not.there"}}),
    );
    let result = EndExecutor.execute(&end, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.output().get("final"), Some(&json!("done")));
    assert_eq!(ctx.output().get("q"), Some(&json!("hi")));
    assert!(!ctx.output().contains_key("gone"));
}

// ----------------------------------------------------------------------
// agent
// ----------------------------------------------------------------------

#[tokio::test]
async fn agent_writes_response_and_token_count() {
    let provider = Arc::new(MockLlmProvider::with_replies(["the answer"]));
    let services = services_with_llm(provider.clone());
    let mut ctx = ctx_with_input(&[("input", json!("question"))]);
    let agent = node(
        "a",
        NodeType::Agent,
        json!({"instructions": "Answer {{input.input}}", "outputVariable": "reply"}),
    );
    let result = AgentExecutor.execute(&agent, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.get_variable("reply"), Some(&json!("the answer")));
    assert_eq!(ctx.output().get("response"), Some(&json!("the answer")));
    assert!(ctx.get_variable("reply_tokens").is_some());
    assert_eq!(result.outputs.get("response"), Some(&json!("the answer")));

    // The instructions were interpolated and the input appended.
    let requests = provider.requests();
    let user = &requests[0].messages.last().unwrap().content;
    assert!(user.starts_with("Answer question"));
    assert!(user.contains("Input:"));
}

#[tokio::test]
async fn agent_without_provider_fails() {
    let mut ctx = ctx_with_input(&[]);
    let agent = node("a", NodeType::Agent, json!({"instructions": "x"}));
    let result = AgentExecutor.execute(&agent, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::AgentExecutionError);
}

#[test]
fn agent_validate_checks_ranges() {
    let executor = AgentExecutor;
    assert!(!executor.validate(&json!({"instructions": ""})).valid);
    assert!(
        !executor
            .validate(&json!({"instructions": "x", "temperature": 3.0}))
            .valid
    );
    assert!(
        !executor
            .validate(&json!({"instructions": "x", "maxTokens": 0}))
            .valid
    );
    assert!(
        executor
            .validate(&json!({"instructions": "x", "temperature": 0.7, "maxTokens": 256}))
            .valid
    );
}

// ----------------------------------------------------------------------
// classify
// ----------------------------------------------------------------------

fn classify_node() -> agentflow::definition::NodeDefinition {
    node(
        "c",
        NodeType::Classify,
        json!({"categories": [
            {"id": "s", "name": "Support", "outputHandle": "s"},
            {"id": "t", "name": "Tech", "outputHandle": "t"},
        ]}),
    )
}

#[tokio::test]
async fn classify_matches_and_routes_by_handle() {
    let services = services_with_llm(Arc::new(MockLlmProvider::with_replies(["Tech"])));
    let mut ctx = ctx_with_input(&[("input", json!("reset password"))]);
    let result = ClassifyExecutor.execute(&classify_node(), &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.get_variable("classification"), Some(&json!("Tech")));
    assert_eq!(ctx.output().get("category"), Some(&json!("Tech")));
    assert_eq!(ctx.output().get("categoryId"), Some(&json!("t")));
    assert_eq!(result.next_nodes, Some(vec!["t".to_string()]));
}

#[tokio::test]
async fn classify_falls_back_to_first_category() {
    let services = services_with_llm(Arc::new(MockLlmProvider::with_replies(["???"])));
    let mut ctx = ctx_with_input(&[("input", json!("hm"))]);
    let result = ClassifyExecutor.execute(&classify_node(), &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.get_variable("classification"), Some(&json!("Support")));
    assert_eq!(result.next_nodes, Some(vec!["s".to_string()]));
}

#[test]
fn classify_validate_rejects_duplicate_names() {
    let report = ClassifyExecutor.validate(&json!({"categories": [
        {"id": "a", "name": "Same"},
        {"id": "b", "name": "same"},
    ]}));
    assert!(!report.valid);
}

// ----------------------------------------------------------------------
// if-else
// ----------------------------------------------------------------------

#[tokio::test]
async fn if_else_selects_first_true_condition() {
    let mut ctx = ExecutionContext::new();
    ctx.set_variable("n", json!(5));
    let branch = node(
        "b",
        NodeType::IfElse,
        json!({"conditions": [
            {"id": "c1", "expression": "n > 10", "outputHandle": "big"},
            {"id": "c2", "expression": "n > 2", "outputHandle": "medium"},
            {"id": "c3", "expression": "n > 4", "outputHandle": "alsoTrue"},
        ], "elseOutputHandle": "small"}),
    );
    let result = IfElseExecutor.execute(&branch, &mut ctx, &services()).await;
    assert_eq!(result.next_nodes, Some(vec!["medium".to_string()]));
    let report = ctx.output().get("_ifElseResult").unwrap();
    assert_eq!(report["branch"], json!("n > 2"));
    // Every condition is evaluated for the log, not just the winner.
    assert_eq!(report["evaluations"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn if_else_condition_error_is_treated_as_false() {
    let mut ctx = ExecutionContext::new();
    ctx.set_variable("n", json!(1));
    let branch = node(
        "b",
        NodeType::IfElse,
        json!({"conditions": [
            {"id": "broken", "expression": "n ++ 2", "outputHandle": "x"},
            {"id": "ok", "expression": "n == 1", "outputHandle": "y"},
        ]}),
    );
    let result = IfElseExecutor.execute(&branch, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(result.next_nodes, Some(vec!["y".to_string()]));
}

#[tokio::test]
async fn if_else_without_match_or_else_reports_no_successors() {
    let mut ctx = ExecutionContext::new();
    let branch = node(
        "b",
        NodeType::IfElse,
        json!({"conditions": [{"id": "c", "expression": "false", "outputHandle": "x"}]}),
    );
    let result = IfElseExecutor.execute(&branch, &mut ctx, &services()).await;
    assert_eq!(result.next_nodes, Some(vec![]));
}

// ----------------------------------------------------------------------
// while
// ----------------------------------------------------------------------

#[tokio::test]
async fn while_runs_body_then_exits_on_condition() {
    let mut ctx = ExecutionContext::new();
    ctx.set_variable("n", json!(0));
    let w = node(
        "w",
        NodeType::While,
        json!({"condition": "n < 1", "bodyNodes": ["inc"], "maxIterations": 10}),
    );

    let first = WhileExecutor.execute(&w, &mut ctx, &services()).await;
    assert_eq!(first.status, NodeStatus::Running);
    assert_eq!(first.next_nodes, Some(vec!["inc".to_string()]));
    assert_eq!(ctx.get_variable("_loopIteration"), Some(&json!(1)));
    assert_eq!(ctx.get_variable("_w_iteration"), Some(&json!(1)));

    ctx.set_variable("n", json!(1));
    let second = WhileExecutor.execute(&w, &mut ctx, &services()).await;
    assert_eq!(second.status, NodeStatus::Completed);
    assert_eq!(
        second.metadata.unwrap().get("reason"),
        Some(&json!("condition_false"))
    );
    assert_eq!(ctx.iteration_count("while_w"), 0);
}

#[tokio::test]
async fn while_stops_at_max_iterations() {
    let mut ctx = ExecutionContext::new();
    let w = node(
        "w",
        NodeType::While,
        json!({"condition": "true", "bodyNodes": [], "maxIterations": 2}),
    );
    assert_eq!(
        WhileExecutor.execute(&w, &mut ctx, &services()).await.status,
        NodeStatus::Running
    );
    assert_eq!(
        WhileExecutor.execute(&w, &mut ctx, &services()).await.status,
        NodeStatus::Running
    );
    let third = WhileExecutor.execute(&w, &mut ctx, &services()).await;
    assert_eq!(third.status, NodeStatus::Completed);
    assert_eq!(
        third.metadata.unwrap().get("reason"),
        Some(&json!("max_iterations_reached"))
    );
    assert_eq!(ctx.iteration_count("while_w"), 0);
}

#[tokio::test]
async fn while_condition_error_fails_and_resets() {
    let mut ctx = ExecutionContext::new();
    let w = node(
        "w",
        NodeType::While,
        json!({"condition": "1 /", "bodyNodes": []}),
    );
    let result = WhileExecutor.execute(&w, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Failed);
    assert_eq!(
        result.error.unwrap().code,
        ErrorCode::ConditionEvaluationError
    );
    assert_eq!(ctx.iteration_count("while_w"), 0);
}

#[test]
fn while_validate_bounds_iterations() {
    let executor = WhileExecutor;
    assert!(!executor.validate(&json!({"condition": "true", "maxIterations": 0})).valid);
    assert!(
        !executor
            .validate(&json!({"condition": "true", "maxIterations": 20000}))
            .valid
    );
    assert!(executor.validate(&json!({"condition": "true"})).valid);
}

// ----------------------------------------------------------------------
// transform
// ----------------------------------------------------------------------

#[tokio::test]
async fn transform_runs_script_and_applies_effects() {
    let mut ctx = ctx_with_input(&[("n", json!(4))]);
    ctx.set_variable("factor", json!(10));
    let t = node(
        "t",
        NodeType::Transform,
        json!({"code": r#"
            let f = get_variable("factor");
            log("applying factor");
            set_variable("seen", true);
            input.n * f
        "#, "outputVariable": "scaled"}),
    );
    let result = TransformExecutor.execute(&t, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.get_variable("scaled"), Some(&json!(40)));
    assert_eq!(ctx.get_variable("seen"), Some(&json!(true)));
    assert_eq!(ctx.output().get("result"), Some(&json!(40)));
    assert!(ctx.logs().iter().any(|l| l.message == "applying factor"));
}

#[test]
fn transform_validate_rejects_forbidden_patterns_without_executing() {
    let executor = TransformExecutor;
    for snippet in [
        "eval(\"1\")",
        "let p = process;",
        "fetch(url)",
        "globalThis",
        "require('fs')",
    ] {
        let report = executor.validate(&json!({"code": snippet}));
        assert!(!report.valid, "should reject: {snippet}");
    }
    assert!(!executor.validate(&json!({"code": ""})).valid);
    assert!(!executor.validate(&json!({"code": "let x = ;"})).valid);
    assert!(executor.validate(&json!({"code": "1 + 1"})).valid);
}

// ----------------------------------------------------------------------
// set-state
// ----------------------------------------------------------------------

#[tokio::test]
async fn set_state_parses_each_value_type() {
    let mut ctx = ExecutionContext::new();
    ctx.set_variable("who", json!("ada"));
    let services = services();

    let cases = [
        (json!({"variable": "a", "valueType": "string", "value": "hi {{who}}"}), json!("hi ada")),
        (json!({"variable": "b", "valueType": "number", "value": " 2.5 "}), json!(2.5)),
        (json!({"variable": "c", "valueType": "boolean", "value": "YES"}), json!(true)),
        (json!({"variable": "d", "valueType": "boolean", "value": "off"}), json!(false)),
        (
            json!({"variable": "e", "valueType": "json", "value": "{\"greet\": \"hey {{who}}\"}"}),
            json!({"greet": "hey ada"}),
        ),
        (json!({"variable": "f", "valueType": "expression", "value": "1 + 2 * 3"}), json!(7.0)),
    ];
    for (config, expected) in cases {
        let n = node("set", NodeType::SetState, config.clone());
        let result = SetStateExecutor.execute(&n, &mut ctx, &services).await;
        assert_eq!(result.status, NodeStatus::Completed, "config: {config}");
        let variable = config["variable"].as_str().unwrap();
        assert_eq!(ctx.get(variable), Some(expected.clone()), "config: {config}");
        // Also mirrored into the run output.
        assert_eq!(ctx.output().get(variable), Some(&expected));
    }
}

#[tokio::test]
async fn set_state_nested_path_and_failures() {
    let mut ctx = ExecutionContext::new();
    let services = services();

    let nested = node(
        "set",
        NodeType::SetState,
        json!({"variable": "user.name", "valueType": "string", "value": "ada"}),
    );
    SetStateExecutor.execute(&nested, &mut ctx, &services).await;
    assert_eq!(ctx.get("user.name"), Some(json!("ada")));

    let bad_number = node(
        "set",
        NodeType::SetState,
        json!({"variable": "x", "valueType": "number", "value": "not a number"}),
    );
    let result = SetStateExecutor.execute(&bad_number, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::SetStateError);

    let bad_bool = node(
        "set",
        NodeType::SetState,
        json!({"variable": "x", "valueType": "boolean", "value": "maybe"}),
    );
    let result = SetStateExecutor.execute(&bad_bool, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Failed);

    // Writes into the immutable input root are rejected.
    let into_input = node(
        "set",
        NodeType::SetState,
        json!({"variable": "input.q", "valueType": "string", "value": "nope"}),
    );
    let result = SetStateExecutor.execute(&into_input, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::SetStateError);
}

#[test]
fn set_state_validate_checks_variable_path() {
    let executor = SetStateExecutor;
    assert!(
        !executor
            .validate(&json!({"variable": "1bad", "valueType": "string", "value": ""}))
            .valid
    );
    assert!(
        !executor
            .validate(&json!({"variable": "a..b", "valueType": "string", "value": ""}))
            .valid
    );
    assert!(
        executor
            .validate(&json!({"variable": "a.b_c", "valueType": "expression", "value": "1"}))
            .valid
    );
}

// ----------------------------------------------------------------------
// user-approval
// ----------------------------------------------------------------------

#[tokio::test]
async fn approval_waits_then_consumes_decision() {
    let services = services();
    let mut ctx = ExecutionContext::new();
    ctx.set_variable("change", json!("deploy v2"));
    let gate = node(
        "gate",
        NodeType::UserApproval,
        json!({"message": "Approve {{change}}?"}),
    );

    let first = UserApprovalExecutor.execute(&gate, &mut ctx, &services).await;
    assert_eq!(first.status, NodeStatus::Waiting);
    let record = services.approvals.get(ctx.run_id(), "gate").unwrap();
    assert_eq!(record.message, "Approve deploy v2?");
    assert_eq!(record.status, ApprovalStatus::Waiting);

    // Still waiting on re-dispatch without a decision.
    let again = UserApprovalExecutor.execute(&gate, &mut ctx, &services).await;
    assert_eq!(again.status, NodeStatus::Waiting);

    services.approvals.approve(ctx.run_id(), "gate");
    let resolved = UserApprovalExecutor.execute(&gate, &mut ctx, &services).await;
    assert_eq!(resolved.status, NodeStatus::Completed);
    assert_eq!(resolved.next_nodes, Some(vec!["approved".to_string()]));
    assert_eq!(ctx.output().get("approved"), Some(&json!(true)));
    assert_eq!(ctx.get_variable("_approvalResult").unwrap()["approved"], json!(true));
    // The registry entry is cleaned up after consumption.
    assert!(services.approvals.get(ctx.run_id(), "gate").is_none());
}

#[tokio::test]
async fn approval_rejection_routes_to_rejected_handle() {
    let services = services();
    let mut ctx = ExecutionContext::new();
    let gate = node("gate", NodeType::UserApproval, json!({"message": "ok?"}));
    UserApprovalExecutor.execute(&gate, &mut ctx, &services).await;
    services.approvals.reject(ctx.run_id(), "gate");
    let resolved = UserApprovalExecutor.execute(&gate, &mut ctx, &services).await;
    assert_eq!(resolved.status, NodeStatus::Completed);
    assert_eq!(resolved.next_nodes, Some(vec!["rejected".to_string()]));
    assert_eq!(ctx.output().get("approved"), Some(&json!(false)));
}

#[test]
fn approval_validate_bounds_timeout() {
    let executor = UserApprovalExecutor;
    assert!(!executor.validate(&json!({"message": "ok?", "timeout": 10})).valid);
    assert!(
        !executor
            .validate(&json!({"message": "ok?", "timeout": 100_000_000}))
            .valid
    );
    assert!(executor.validate(&json!({"message": "ok?", "timeout": 5000})).valid);
    assert!(!executor.validate(&json!({"message": "  "})).valid);
}

// ----------------------------------------------------------------------
// guardrails
// ----------------------------------------------------------------------

#[tokio::test]
async fn guardrails_regex_block_lists_failed_rules() {
    let mut ctx = ctx_with_input(&[("input", json!("card 4111111111111111"))]);
    let guard = node(
        "g",
        NodeType::Guardrails,
        json!({"mode": "input", "onFail": "block", "rules": [
            {"id": "pan", "name": "no card numbers", "type": "regex",
             "config": {"pattern": "\\d{16}", "shouldMatch": false}},
        ]}),
    );
    let result = GuardrailsExecutor.execute(&guard, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.code, ErrorCode::GuardrailsBlocked);
    let details = error.details.unwrap();
    assert_eq!(details["failedRules"][0]["id"], json!("pan"));
    assert_eq!(ctx.get_variable("_guardrailsPassed"), Some(&json!(false)));
}

#[tokio::test]
async fn guardrails_warn_completes_with_warnings() {
    let mut ctx = ctx_with_input(&[("input", json!("secret stuff"))]);
    let guard = node(
        "g",
        NodeType::Guardrails,
        json!({"mode": "input", "onFail": "warn", "rules": [
            {"id": "kw", "name": "no secrets", "type": "keyword",
             "config": {"keywords": ["secret"], "shouldContain": false}},
        ]}),
    );
    let result = GuardrailsExecutor.execute(&guard, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert!(result.metadata.unwrap().contains_key("warnings"));
    assert_eq!(result.next_nodes, Some(vec!["fail".to_string()]));
}

#[tokio::test]
async fn guardrails_custom_validator_shapes() {
    let mut ctx = ctx_with_input(&[("input", json!("short"))]);
    let guard = node(
        "g",
        NodeType::Guardrails,
        json!({"mode": "input", "onFail": "block", "rules": [
            {"id": "len", "name": "length cap", "type": "custom",
             "config": {"validator": "content.len() < 100"}},
            {"id": "obj", "name": "object form", "type": "custom",
             "config": {"validator": "#{passed: true, message: \"fine\"}"}},
        ]}),
    );
    let result = GuardrailsExecutor.execute(&guard, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(result.next_nodes, Some(vec!["pass".to_string()]));
    assert_eq!(ctx.get_variable("_guardrailsPassed"), Some(&json!(true)));
}

#[tokio::test]
async fn guardrails_llm_rule_uses_first_token() {
    let services = services_with_llm(Arc::new(MockLlmProvider::with_replies([
        "FAIL: contains policy violation",
    ])));
    let mut ctx = ctx_with_input(&[("input", json!("bad content"))]);
    let guard = node(
        "g",
        NodeType::Guardrails,
        json!({"mode": "input", "onFail": "continue", "rules": [
            {"id": "llm", "name": "policy", "type": "llm", "config": {"prompt": "Check policy."}},
        ]}),
    );
    let result = GuardrailsExecutor.execute(&guard, &mut ctx, &services).await;
    // continue: completes silently even though the rule failed.
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.get_variable("_guardrailsPassed"), Some(&json!(false)));
}

#[test]
fn guardrails_validate_catches_bad_rules() {
    let executor = GuardrailsExecutor;
    let report = executor.validate(&json!({"mode": "input", "onFail": "block", "rules": [
        {"id": "r", "name": "a", "type": "regex", "config": {"pattern": "("}},
        {"id": "r", "name": "b", "type": "keyword", "config": {"keywords": []}},
        {"id": "c", "name": "c", "type": "custom", "config": {"validator": "fetch(x)"}},
    ]}));
    assert!(!report.valid);
    assert!(report.errors.iter().any(|e| e.contains("duplicate rule id")));
    assert!(report.errors.iter().any(|e| e.contains("invalid pattern")));
    assert!(report.errors.iter().any(|e| e.contains("forbidden pattern")));
}

// ----------------------------------------------------------------------
// file-search
// ----------------------------------------------------------------------

#[tokio::test]
async fn file_search_aggregates_sorts_and_truncates() {
    let mut store = MockVectorStore::new();
    store.seed("docs", [("d1", "rust workflow engine"), ("d2", "unrelated cooking")]);
    store.seed("wiki", [("w1", "the workflow runner dispatches nodes")]);
    store.fail_store("broken");
    let services = services_with_vector(Arc::new(store));

    let mut ctx = ctx_with_input(&[("input", json!("workflow"))]);
    let search = node(
        "fs",
        NodeType::FileSearch,
        json!({"vectorStoreIds": ["docs", "broken", "wiki"], "maxResults": 2,
               "query": "workflow engine"}),
    );
    let result = FileSearchExecutor.execute(&search, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Completed);
    assert_eq!(ctx.output().get("resultCount"), Some(&json!(2)));
    let hits = ctx.get_variable("searchResults").unwrap().as_array().unwrap().clone();
    assert_eq!(hits.len(), 2);
    // Descending score order.
    assert!(hits[0]["score"].as_f64().unwrap() >= hits[1]["score"].as_f64().unwrap());
    let contents = ctx.get_variable("searchResults_content").unwrap();
    assert!(contents.as_array().unwrap().iter().all(|c| c.is_string()));
    // The broken store is a logged warning, not a failure.
    assert!(ctx.logs().iter().any(|l| l.message.contains("broken")));
}

#[tokio::test]
async fn file_search_without_provider_fails() {
    let mut ctx = ctx_with_input(&[("input", json!("q"))]);
    let search = node("fs", NodeType::FileSearch, json!({"vectorStoreIds": ["docs"]}));
    let result = FileSearchExecutor.execute(&search, &mut ctx, &services()).await;
    assert_eq!(result.status, NodeStatus::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::FileSearchError);
}

#[test]
fn file_search_validate_bounds() {
    let executor = FileSearchExecutor;
    assert!(!executor.validate(&json!({"vectorStoreIds": []})).valid);
    assert!(!executor.validate(&json!({"vectorStoreIds": [""]})).valid);
    assert!(
        !executor
            .validate(&json!({"vectorStoreIds": ["a"], "maxResults": 500}))
            .valid
    );
    assert!(executor.validate(&json!({"vectorStoreIds": ["a"]})).valid);
}

// ----------------------------------------------------------------------
// mcp
// ----------------------------------------------------------------------

#[tokio::test]
async fn mcp_interpolates_parameters_preserving_types() {
    let server = MockMcpServer::new().tool("files", "read", |params| {
        ToolCallResult::ok(json!({"echo": params.clone()}))
            .with_metadata(json!({"elapsedMs": 3}))
    });
    let services = services_with_mcp(Arc::new(server));

    let mut ctx = ExecutionContext::new();
    ctx.set_variable("count", json!(7));
    ctx.set_variable("dir", json!("/tmp"));
    let call = node(
        "m",
        NodeType::Mcp,
        json!({"serverId": "files", "toolName": "read",
               "parameters": {"limit": "{{count}}", "path": "{{dir}}/notes.txt"}}),
    );
    let result = McpExecutor.execute(&call, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Completed);
    let data = ctx.get_variable("mcpResult").unwrap();
    // Whole-placeholder leaf keeps the number type; embedded interpolates.
    assert_eq!(data["echo"]["limit"], json!(7));
    assert_eq!(data["echo"]["path"], json!("/tmp/notes.txt"));
    assert_eq!(
        ctx.get_variable("mcpResult_metadata"),
        Some(&json!({"elapsedMs": 3}))
    );
}

#[tokio::test]
async fn mcp_failure_paths() {
    let server = MockMcpServer::new().tool("srv", "boom", |_| ToolCallResult::failure("exploded"));
    let services = services_with_mcp(Arc::new(server));
    let mut ctx = ExecutionContext::new();

    let unavailable = node(
        "m",
        NodeType::Mcp,
        json!({"serverId": "nope", "toolName": "x"}),
    );
    let result = McpExecutor.execute(&unavailable, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Failed);
    assert_eq!(result.error.unwrap().code, ErrorCode::McpExecutionError);

    let failing = node(
        "m2",
        NodeType::Mcp,
        json!({"serverId": "srv", "toolName": "boom"}),
    );
    let result = McpExecutor.execute(&failing, &mut ctx, &services).await;
    assert_eq!(result.status, NodeStatus::Failed);
    let error = result.error.unwrap();
    assert!(error.message.contains("exploded"));
}

#[test]
fn mcp_validate_requires_ids() {
    let executor = McpExecutor;
    assert!(!executor.validate(&json!({"serverId": "", "toolName": "t"})).valid);
    assert!(!executor.validate(&json!({"serverId": "s", "toolName": " "})).valid);
    assert!(executor.validate(&json!({"serverId": "s", "toolName": "t"})).valid);
}
