//! End-to-end workflow scenarios exercising the full dispatch loop.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use agentflow::definition::NodeDefinition;
use agentflow::providers::MockLlmProvider;
use agentflow::runner::WorkflowRunner;
use agentflow::types::{ErrorCode, ExecutionStatus, NodeType};

use common::{edge, edge_h, input, node, workflow};

fn set_state(id: &str, variable: &str, value_type: &str, value: &str) -> NodeDefinition {
    node(
        id,
        NodeType::SetState,
        json!({"variable": variable, "valueType": value_type, "value": value}),
    )
}

#[tokio::test]
async fn linear_agent_echo() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            node(
                "agent",
                NodeType::Agent,
                json!({"instructions": "Echo", "outputVariable": "r"}),
            ),
            node("end", NodeType::End, json!({})),
        ],
        vec![edge("e1", "start", "agent"), edge("e2", "agent", "end")],
    );
    let mut runner = WorkflowRunner::builder(def)
        .llm_provider(Arc::new(MockLlmProvider::with_replies(["hello"])))
        .build();
    let result = runner.run(input(&[("input", json!("hello"))])).await;

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.outputs.get("response"), Some(&json!("hello")));
    assert_eq!(runner.context().get_variable("r"), Some(&json!("hello")));
}

#[tokio::test]
async fn classify_routes_to_matching_branch() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            node(
                "classify",
                NodeType::Classify,
                json!({"categories": [
                    {"id": "s", "name": "Support", "outputHandle": "s"},
                    {"id": "t", "name": "Tech", "outputHandle": "t"},
                ]}),
            ),
            set_state("A", "route", "string", "support"),
            set_state("B", "route", "string", "tech"),
            node("end", NodeType::End, json!({})),
        ],
        vec![
            edge("e1", "start", "classify"),
            edge_h("e2", "classify", "A", "s"),
            edge_h("e3", "classify", "B", "t"),
            edge("e4", "A", "end"),
            edge("e5", "B", "end"),
        ],
    );
    let mut runner = WorkflowRunner::builder(def)
        .llm_provider(Arc::new(MockLlmProvider::with_replies(["Tech"])))
        .build();
    let result = runner.run(input(&[("input", json!("reset password"))])).await;

    assert!(result.success);
    let path = runner.context().execution_path();
    assert!(path.contains(&"B".to_string()));
    assert!(!path.contains(&"A".to_string()));
    assert_eq!(result.outputs.get("category"), Some(&json!("Tech")));
}

#[tokio::test]
async fn if_else_with_set_state_takes_the_hi_branch() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            set_state("setN", "n", "number", "3"),
            node(
                "branch",
                NodeType::IfElse,
                json!({"conditions": [{"id": "c1", "expression": "n>2", "outputHandle": "hi"}],
                       "elseOutputHandle": "lo"}),
            ),
            set_state("hiNode", "branchTaken", "string", "hi"),
            set_state("loNode", "branchTaken", "string", "lo"),
            node("end", NodeType::End, json!({})),
        ],
        vec![
            edge("e1", "start", "setN"),
            edge("e2", "setN", "branch"),
            edge_h("e3", "branch", "hiNode", "hi"),
            edge_h("e4", "branch", "loNode", "lo"),
            edge("e5", "hiNode", "end"),
            edge("e6", "loNode", "end"),
        ],
    );
    let mut runner = WorkflowRunner::new(def);
    let result = runner.run(input(&[])).await;

    assert!(result.success);
    assert_eq!(result.outputs["_ifElseResult"]["branch"], json!("n>2"));
    assert_eq!(runner.context().get_variable("branchTaken"), Some(&json!("hi")));
    assert!(!runner.context().execution_path().contains(&"loNode".to_string()));
}

#[tokio::test]
async fn while_loop_counts_to_three() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            set_state("init", "n", "number", "0"),
            node(
                "loop",
                NodeType::While,
                json!({"condition": "n<3", "bodyNodes": ["inc"], "maxIterations": 10}),
            ),
            set_state("inc", "n", "expression", "n+1"),
            node("end", NodeType::End, json!({})),
        ],
        vec![
            edge("e1", "start", "init"),
            edge("e2", "init", "loop"),
            edge("e3", "loop", "end"),
        ],
    );
    let mut runner = WorkflowRunner::new(def);
    let result = runner.run(input(&[])).await;

    assert!(result.success);
    assert_eq!(runner.context().get_variable("n"), Some(&json!(3.0)));
    assert_eq!(
        result.node_results["loop"].metadata.as_ref().unwrap()["reason"],
        json!("condition_false")
    );

    // Dispatches: start + init + 4 while entries + 3 body runs + end.
    let path = runner.context().execution_path();
    assert_eq!(path.len(), 10);
    assert_eq!(path.iter().filter(|n| *n == "loop").count(), 4);
    assert_eq!(path.iter().filter(|n| *n == "inc").count(), 3);
    // The loop counter is reset on exit.
    assert_eq!(runner.context().iteration_count("while_loop"), 0);
}

#[tokio::test]
async fn approval_timeout_with_fail_action() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            node(
                "gate",
                NodeType::UserApproval,
                json!({"message": "ok?", "timeout": 1000, "timeoutAction": "fail"}),
            ),
            node("end", NodeType::End, json!({})),
        ],
        vec![edge("e1", "start", "gate"), edge("e2", "gate", "end")],
    );
    let mut runner = WorkflowRunner::new(def);

    let first = runner.run(input(&[])).await;
    assert_eq!(first.status, ExecutionStatus::Waiting);
    assert!(!first.success);
    assert_eq!(first.node_results["gate"].status, agentflow::types::NodeStatus::Waiting);

    tokio::time::sleep(Duration::from_millis(1100)).await;

    let second = runner.resume("gate", None).await;
    assert_eq!(second.status, ExecutionStatus::Failed);
    assert_eq!(second.error.unwrap().code, ErrorCode::ApprovalTimeout);
}

#[tokio::test]
async fn approval_resume_after_external_decision() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            node("gate", NodeType::UserApproval, json!({"message": "ok?"})),
            node("end", NodeType::End, json!({})),
        ],
        vec![edge("e1", "start", "gate"), edge("e2", "gate", "end")],
    );
    let mut runner = WorkflowRunner::new(def);

    let paused = runner.run(input(&[])).await;
    assert_eq!(paused.status, ExecutionStatus::Waiting);

    runner.approvals().approve(runner.run_id(), "gate");
    let done = runner
        .resume("gate", Some(input(&[("extra", json!("ctx"))])))
        .await;
    assert_eq!(done.status, ExecutionStatus::Completed);
    assert_eq!(done.outputs.get("approved"), Some(&json!(true)));
    assert_eq!(runner.context().get_variable("extra"), Some(&json!("ctx")));
}

#[tokio::test]
async fn guardrail_blocks_card_numbers() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            node(
                "guard",
                NodeType::Guardrails,
                json!({"mode": "input", "onFail": "block", "rules": [
                    {"id": "pan", "name": "card numbers", "type": "regex",
                     "config": {"pattern": "\\d{16}", "shouldMatch": false}},
                ]}),
            ),
            node("end", NodeType::End, json!({})),
        ],
        vec![edge("e1", "start", "guard"), edge("e2", "guard", "end")],
    );
    let mut runner = WorkflowRunner::new(def);
    let result = runner
        .run(input(&[("input", json!("card 4111111111111111"))]))
        .await;

    assert!(!result.success);
    assert_eq!(result.status, ExecutionStatus::Failed);
    let error = result.error.unwrap();
    assert_eq!(error.code, ErrorCode::GuardrailsBlocked);
    assert_eq!(error.details.unwrap()["failedRules"][0]["id"], json!("pan"));
}

#[tokio::test]
async fn nested_while_loops_serialize_on_the_queue() {
    // Outer loop (i < 2) re-arms an inner loop (j < 1) on each pass; both
    // interleave on the single dispatch queue and still terminate cleanly.
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            set_state("i0", "i", "number", "0"),
            node(
                "outer",
                NodeType::While,
                json!({"condition": "i < 2", "bodyNodes": ["j0", "inner", "incI"],
                       "maxIterations": 20}),
            ),
            set_state("j0", "j", "number", "0"),
            node(
                "inner",
                NodeType::While,
                json!({"condition": "j < 1", "bodyNodes": ["incJ"], "maxIterations": 20}),
            ),
            set_state("incJ", "j", "expression", "j + 1"),
            set_state("incI", "i", "expression", "i + 1"),
            node("end", NodeType::End, json!({})),
        ],
        vec![
            edge("e1", "start", "i0"),
            edge("e2", "i0", "outer"),
            edge("e3", "outer", "end"),
        ],
    );
    let mut runner = WorkflowRunner::new(def);
    let result = runner.run(input(&[])).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(runner.context().get_variable("i"), Some(&json!(2.0)));
    // Both loop counters are back to zero.
    assert_eq!(runner.context().iteration_count("while_outer"), 0);
    assert_eq!(runner.context().iteration_count("while_inner"), 0);
    // Both loops exited on a false condition, not the iteration cap.
    assert_eq!(
        result.node_results["outer"].metadata.as_ref().unwrap()["reason"],
        json!("condition_false")
    );
    assert_eq!(
        result.node_results["inner"].metadata.as_ref().unwrap()["reason"],
        json!("condition_false")
    );
}

#[tokio::test]
async fn history_matches_execution_path() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            set_state("a", "x", "number", "1"),
            set_state("b", "y", "number", "2"),
            node("end", NodeType::End, json!({})),
        ],
        vec![
            edge("e1", "start", "a"),
            edge("e2", "a", "b"),
            edge("e3", "b", "end"),
        ],
    );
    let mut runner = WorkflowRunner::new(def);
    let result = runner.run(input(&[("q", json!("invariants"))])).await;
    assert!(result.success);

    let ctx = runner.context();
    assert_eq!(ctx.history().len(), ctx.execution_path().len());
    for (entry, node_id) in ctx.history().iter().zip(ctx.execution_path()) {
        assert_eq!(&entry.node_id, node_id);
    }
    // Every dispatched node has a final result recorded.
    for node_id in ctx.execution_path() {
        assert!(result.node_results.contains_key(node_id));
    }
    // Logs survive into the terminal result.
    assert!(!result.logs.is_empty());
    assert!(result.execution_time < 10_000);
}

#[tokio::test]
async fn execution_result_serializes_to_contract_shape() {
    let def = workflow(
        vec![
            node("start", NodeType::Start, json!({})),
            node("end", NodeType::End, json!({})),
        ],
        vec![edge("e1", "start", "end")],
    );
    let mut runner = WorkflowRunner::new(def);
    let result = runner.run(input(&[])).await;
    let text = serde_json::to_string(&result).unwrap();
    assert!(text.contains("\"success\":true"));
    assert!(text.contains("\"status\":\"completed\""));
    assert!(text.contains("\"executionTime\""));
    assert!(text.contains("\"nodeResults\""));
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["nodeResults"]["end"]["status"], json!("completed"));
    assert_eq!(value["nodeResults"]["end"]["nodeType"], json!("end"));
}
