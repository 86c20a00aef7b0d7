//! `{{ expr }}` interpolation in user-provided strings.
//!
//! Each embedded expression is evaluated against the context. An unset
//! result (or an expression that fails to evaluate) leaves the literal
//! `{{…}}` segment in place; mappings and lists serialize as JSON;
//! everything else takes its string form.

use serde_json::{Map, Value};

use super::eval::{evaluate, value_to_display};
use crate::context::ExecutionContext;

/// Replace every `{{ expr }}` segment in `template`.
#[must_use]
pub fn interpolate(template: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let raw = &after_open[..close];
                match evaluate(raw.trim(), ctx) {
                    Ok(Some(value)) => out.push_str(&value_to_display(&value)),
                    // Unset or failed: keep the literal segment.
                    Ok(None) | Err(_) => {
                        out.push_str("{{");
                        out.push_str(raw);
                        out.push_str("}}");
                    }
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unbalanced braces pass through untouched.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Recursively interpolate a JSON structure.
///
/// A leaf string that is exactly one `{{ expr }}` placeholder is replaced
/// by the raw evaluated value (keeping its type); strings with embedded
/// placeholders interpolate as text; lists and mappings recurse.
#[must_use]
pub fn interpolate_value(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => {
            if let Some(expr) = whole_placeholder(s) {
                return match evaluate(expr, ctx) {
                    Ok(Some(resolved)) => resolved,
                    Ok(None) | Err(_) => value.clone(),
                };
            }
            Value::String(interpolate(s, ctx))
        }
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| interpolate_value(item, ctx))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(key.clone(), interpolate_value(item, ctx));
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// If `s` is exactly one `{{ expr }}` placeholder, return the inner
/// expression text.
fn whole_placeholder(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    let inner = trimmed.strip_prefix("{{")?.strip_suffix("}}")?;
    if inner.contains("{{") || inner.contains("}}") {
        return None;
    }
    Some(inner.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_with(vars: &[(&str, Value)]) -> ExecutionContext {
        let mut ctx = ExecutionContext::new();
        for (name, value) in vars {
            ctx.set_variable(*name, value.clone());
        }
        ctx
    }

    #[test]
    fn unset_leaves_literal_in_place() {
        let ctx = ExecutionContext::new();
        assert_eq!(
            interpolate("hi {{undefined.path}}!", &ctx),
            "hi {{undefined.path}}!"
        );
    }

    #[test]
    fn structures_serialize_as_json() {
        let ctx = ctx_with(&[("user", json!({"name": "ada"}))]);
        assert_eq!(interpolate("u={{user}}", &ctx), r#"u={"name":"ada"}"#);
    }

    #[test]
    fn whole_placeholder_keeps_value_type() {
        let ctx = ctx_with(&[("count", json!(3))]);
        let params = json!({"n": "{{count}}", "msg": "have {{count}} items"});
        let resolved = interpolate_value(&params, &ctx);
        assert_eq!(resolved, json!({"n": 3, "msg": "have 3 items"}));
    }

    #[test]
    fn unbalanced_braces_pass_through() {
        let ctx = ExecutionContext::new();
        assert_eq!(interpolate("oops {{name", &ctx), "oops {{name");
    }
}
