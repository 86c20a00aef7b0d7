//! Sandboxed execution of user-supplied scripts.
//!
//! `transform` nodes and custom guardrail validators run caller-authored
//! snippets on an embedded [rhai](https://rhai.rs) engine. The sandbox
//! exposes only the bindings and host functions passed in — there is no
//! filesystem, network, or process surface — and enforces a wall-clock
//! deadline through the engine's progress hook.
//!
//! A static forbidden-pattern scan runs at validation time as a second
//! layer on top of the restricted binding surface.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task;

/// Source fragments rejected by the static scan. The scan is substring
/// based on purpose: it is a belt-and-suspenders layer, the restricted
/// binding surface is the primary defense.
pub const FORBIDDEN_PATTERNS: &[&str] = &[
    "eval(",
    "Function(",
    "import(",
    "require(",
    "process",
    "__dirname",
    "__filename",
    "globalThis",
    "window",
    "document",
    "localStorage",
    "sessionStorage",
    "fetch(",
    "XMLHttpRequest",
    "WebSocket",
];

/// Failures from validating or running a sandboxed script.
#[derive(Debug, Error, Diagnostic)]
pub enum SandboxError {
    /// The static scan found a forbidden fragment.
    #[error("script contains forbidden pattern '{pattern}'")]
    #[diagnostic(
        code(agentflow::sandbox::forbidden),
        help("Scripts may only use the provided bindings and helpers; host and I/O APIs are rejected.")
    )]
    Forbidden { pattern: String },

    /// The script failed to compile.
    #[error("script syntax error: {message}")]
    #[diagnostic(code(agentflow::sandbox::syntax))]
    Compile { message: String },

    /// The script raised at runtime.
    #[error("script runtime error: {message}")]
    #[diagnostic(code(agentflow::sandbox::runtime))]
    Runtime { message: String },

    /// The wall-clock deadline elapsed.
    #[error("script exceeded the {limit_ms} ms execution limit")]
    #[diagnostic(code(agentflow::sandbox::timeout))]
    Timeout { limit_ms: u64 },

    /// The script's return value could not be mapped into the value domain.
    #[error("script returned an unsupported value: {message}")]
    #[diagnostic(code(agentflow::sandbox::result))]
    Result { message: String },
}

/// Scan `code` for forbidden fragments without executing anything.
pub fn scan_source(code: &str) -> Result<(), SandboxError> {
    for pattern in FORBIDDEN_PATTERNS {
        if code.contains(pattern) {
            return Err(SandboxError::Forbidden {
                pattern: (*pattern).to_string(),
            });
        }
    }
    Ok(())
}

/// Compile `code` to check its syntax without executing it.
pub fn check_syntax(code: &str) -> Result<(), SandboxError> {
    rhai::Engine::new()
        .compile(code)
        .map(|_| ())
        .map_err(|e| SandboxError::Compile {
            message: e.to_string(),
        })
}

/// Everything a script sees.
#[derive(Debug, Default)]
pub struct ScriptInput {
    pub code: String,
    /// Scope variables, pushed under their given names.
    pub bindings: Vec<(String, Value)>,
    /// Backing map for `get_variable` / `set_variable`.
    pub variables: FxHashMap<String, Value>,
    /// Backing map for `get_input`.
    pub input: FxHashMap<String, Value>,
    /// Backing map for `get_output`.
    pub output: FxHashMap<String, Value>,
    /// Whether `set_variable` is exposed.
    pub allow_writes: bool,
    pub timeout: Duration,
}

/// Result plus buffered side effects, applied by the caller.
#[derive(Debug, Default)]
pub struct ScriptOutcome {
    /// Return value; `None` when the script produced no value.
    pub value: Option<Value>,
    /// Messages passed to `log(...)`, in call order.
    pub logs: Vec<String>,
    /// Variable writes via `set_variable`, in call order.
    pub writes: Vec<(String, Value)>,
}

#[derive(Debug, Default)]
struct Effects {
    logs: Vec<String>,
    writes: Vec<(String, Value)>,
}

/// Run a script to completion on a blocking thread.
///
/// The deadline is enforced inside the engine's progress hook, so a spin
/// loop cannot outlive `input.timeout` by more than one check interval.
pub async fn run_script(input: ScriptInput) -> Result<ScriptOutcome, SandboxError> {
    task::spawn_blocking(move || run_blocking(input))
        .await
        .map_err(|e| SandboxError::Runtime {
            message: format!("sandbox task failed: {e}"),
        })?
}

fn run_blocking(input: ScriptInput) -> Result<ScriptOutcome, SandboxError> {
    let mut engine = rhai::Engine::new();
    engine.set_max_call_levels(64);
    engine.set_max_array_size(100_000);
    engine.set_max_map_size(100_000);
    engine.set_max_string_size(1_000_000);

    let limit_ms = input.timeout.as_millis() as u64;
    let deadline = Instant::now() + input.timeout;
    engine.on_progress(move |_| {
        if Instant::now() >= deadline {
            Some("deadline".into())
        } else {
            None
        }
    });

    let effects = Arc::new(Mutex::new(Effects::default()));

    {
        let effects = Arc::clone(&effects);
        engine.register_fn("log", move |message: &str| {
            effects
                .lock()
                .expect("effects poisoned")
                .logs
                .push(message.to_string());
        });
    }
    {
        let effects = Arc::clone(&effects);
        let variables = input.variables.clone();
        engine.register_fn("get_variable", move |name: &str| -> rhai::Dynamic {
            // Reads observe earlier writes from the same script.
            let guard = effects.lock().expect("effects poisoned");
            let written = guard
                .writes
                .iter()
                .rev()
                .find(|(written_name, _)| written_name == name)
                .map(|(_, value)| value.clone());
            drop(guard);
            let value = written.or_else(|| variables.get(name).cloned());
            match value {
                Some(value) => rhai::serde::to_dynamic(&value).unwrap_or(rhai::Dynamic::UNIT),
                None => rhai::Dynamic::UNIT,
            }
        });
    }
    if input.allow_writes {
        let effects = Arc::clone(&effects);
        engine.register_fn("set_variable", move |name: &str, value: rhai::Dynamic| {
            let value: Value = rhai::serde::from_dynamic(&value).unwrap_or(Value::Null);
            effects
                .lock()
                .expect("effects poisoned")
                .writes
                .push((name.to_string(), value));
        });
    }
    {
        let input_map = input.input.clone();
        engine.register_fn("get_input", move |name: &str| -> rhai::Dynamic {
            match input_map.get(name) {
                Some(value) => rhai::serde::to_dynamic(value).unwrap_or(rhai::Dynamic::UNIT),
                None => rhai::Dynamic::UNIT,
            }
        });
    }
    {
        let output_map = input.output.clone();
        engine.register_fn("get_output", move |name: &str| -> rhai::Dynamic {
            match output_map.get(name) {
                Some(value) => rhai::serde::to_dynamic(value).unwrap_or(rhai::Dynamic::UNIT),
                None => rhai::Dynamic::UNIT,
            }
        });
    }

    let mut scope = rhai::Scope::new();
    for (name, value) in &input.bindings {
        let dynamic = rhai::serde::to_dynamic(value).unwrap_or(rhai::Dynamic::UNIT);
        scope.push_dynamic(name.as_str(), dynamic);
    }

    let result = engine.eval_with_scope::<rhai::Dynamic>(&mut scope, &input.code);
    let effects = Arc::try_unwrap(effects)
        .map(|m| m.into_inner().expect("effects poisoned"))
        .unwrap_or_else(|arc| {
            let guard = arc.lock().expect("effects poisoned");
            Effects {
                logs: guard.logs.clone(),
                writes: guard.writes.clone(),
            }
        });

    match result {
        Ok(value) => {
            let value = if value.is_unit() {
                None
            } else {
                Some(
                    rhai::serde::from_dynamic::<Value>(&value).map_err(|e| {
                        SandboxError::Result {
                            message: e.to_string(),
                        }
                    })?,
                )
            };
            Ok(ScriptOutcome {
                value,
                logs: effects.logs,
                writes: effects.writes,
            })
        }
        Err(err) => match *err {
            rhai::EvalAltResult::ErrorTerminated(..) => Err(SandboxError::Timeout { limit_ms }),
            rhai::EvalAltResult::ErrorParsing(..) => Err(SandboxError::Compile {
                message: err.to_string(),
            }),
            _ => Err(SandboxError::Runtime {
                message: err.to_string(),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scan_rejects_each_forbidden_pattern() {
        for pattern in FORBIDDEN_PATTERNS {
            let code = format!("let x = {pattern}y");
            assert!(scan_source(&code).is_err(), "pattern not caught: {pattern}");
        }
        assert!(scan_source("let x = 1 + 2; x").is_ok());
    }

    #[test]
    fn syntax_check_catches_parse_errors() {
        assert!(check_syntax("let x = ;").is_err());
        assert!(check_syntax("let x = 1; x * 2").is_ok());
    }

    #[tokio::test]
    async fn script_sees_bindings_and_buffers_effects() {
        let outcome = run_script(ScriptInput {
            code: r#"
                let n = get_variable("n");
                set_variable("doubled", n * 2);
                log("doubling done");
                n * 2
            "#
            .to_string(),
            variables: FxHashMap::from_iter([("n".to_string(), json!(21))]),
            allow_writes: true,
            timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .await
        .unwrap();

        assert_eq!(outcome.value, Some(json!(42)));
        assert_eq!(outcome.logs, vec!["doubling done".to_string()]);
        assert_eq!(outcome.writes, vec![("doubled".to_string(), json!(42))]);
    }

    #[tokio::test]
    async fn reads_observe_earlier_writes() {
        let outcome = run_script(ScriptInput {
            code: r#"
                set_variable("a", 5);
                get_variable("a")
            "#
            .to_string(),
            allow_writes: true,
            timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(outcome.value, Some(json!(5)));
    }

    #[tokio::test]
    async fn spin_loop_hits_the_deadline() {
        let err = run_script(ScriptInput {
            code: "let i = 0; while true { i += 1; } i".to_string(),
            timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { limit_ms: 100 }));
    }

    #[tokio::test]
    async fn bindings_are_pushed_into_scope() {
        let outcome = run_script(ScriptInput {
            code: "input.n + 1".to_string(),
            bindings: vec![("input".to_string(), json!({"n": 4}))],
            timeout: Duration::from_secs(1),
            ..Default::default()
        })
        .await
        .unwrap();
        assert_eq!(outcome.value, Some(json!(5)));
    }
}
