//! Tree-walking evaluator and the value coercion rules shared with node
//! executors.

use serde_json::{Number, Value};
use std::cmp::Ordering;

use super::builtins;
use super::parser::{parse, BinaryOp, Expr, UnaryOp};
use super::ExprError;
use crate::context::ExecutionContext;

/// Parse and evaluate `source` against the context. `Ok(None)` means the
/// expression produced *unset* (e.g. a missing variable).
pub fn evaluate(source: &str, ctx: &ExecutionContext) -> Result<Option<Value>, ExprError> {
    let expr = parse(source)?;
    Evaluator { ctx }.eval(&expr)
}

/// Evaluate `source` and reduce the result to a boolean.
pub fn evaluate_condition(source: &str, ctx: &ExecutionContext) -> Result<bool, ExprError> {
    Ok(truthy(&evaluate(source, ctx)?))
}

struct Evaluator<'a> {
    ctx: &'a ExecutionContext,
}

impl Evaluator<'_> {
    fn eval(&self, expr: &Expr) -> Result<Option<Value>, ExprError> {
        match expr {
            Expr::Number { value, offset } => Ok(Some(number_value(*value, *offset)?)),
            Expr::Str { value, .. } => Ok(Some(Value::String(value.clone()))),
            Expr::Bool { value, .. } => Ok(Some(Value::Bool(*value))),
            Expr::Null { .. } => Ok(Some(Value::Null)),
            Expr::Ident { name, .. } => Ok(self.ctx.get(name)),
            Expr::Unary { op, operand, offset } => self.eval_unary(*op, operand, *offset),
            Expr::Binary {
                op,
                lhs,
                rhs,
                offset,
            } => self.eval_binary(*op, lhs, rhs, *offset),
            Expr::Member {
                object, property, ..
            } => {
                let value = self.eval(object)?;
                Ok(member_access(&value, property))
            }
            Expr::Index { object, index, .. } => {
                let value = self.eval(object)?;
                let key = self.eval(index)?;
                Ok(index_access(&value, &key))
            }
            Expr::Call {
                name,
                receiver,
                args,
                offset,
            } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                if let Some(receiver) = receiver {
                    values.push(self.eval(receiver)?);
                }
                for arg in args {
                    values.push(self.eval(arg)?);
                }
                builtins::call(name, &values, *offset)
            }
        }
    }

    fn eval_unary(
        &self,
        op: UnaryOp,
        operand: &Expr,
        offset: usize,
    ) -> Result<Option<Value>, ExprError> {
        let value = self.eval(operand)?;
        match op {
            UnaryOp::Not => Ok(Some(Value::Bool(!truthy(&value)))),
            UnaryOp::Neg => {
                let n = to_number_strict(&value, offset)?;
                Ok(Some(number_value(-n, offset)?))
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
        offset: usize,
    ) -> Result<Option<Value>, ExprError> {
        // Short-circuit operators return the deciding operand as-is.
        match op {
            BinaryOp::Or => {
                let left = self.eval(lhs)?;
                if truthy(&left) {
                    return Ok(left);
                }
                return self.eval(rhs);
            }
            BinaryOp::And => {
                let left = self.eval(lhs)?;
                if !truthy(&left) {
                    return Ok(left);
                }
                return self.eval(rhs);
            }
            _ => {}
        }

        let left = self.eval(lhs)?;
        let right = self.eval(rhs)?;
        match op {
            BinaryOp::Eq => Ok(Some(Value::Bool(values_equal(&left, &right)))),
            BinaryOp::NotEq => Ok(Some(Value::Bool(!values_equal(&left, &right)))),
            BinaryOp::Greater => Ok(Some(Value::Bool(compare(&left, &right) == Ordering::Greater))),
            BinaryOp::GreaterEq => Ok(Some(Value::Bool(compare(&left, &right) != Ordering::Less))),
            BinaryOp::Less => Ok(Some(Value::Bool(compare(&left, &right) == Ordering::Less))),
            BinaryOp::LessEq => Ok(Some(Value::Bool(compare(&left, &right) != Ordering::Greater))),
            BinaryOp::Add => {
                if matches!(left, Some(Value::String(_))) || matches!(right, Some(Value::String(_)))
                {
                    let mut out = coerce_string(&left);
                    out.push_str(&coerce_string(&right));
                    Ok(Some(Value::String(out)))
                } else {
                    let a = to_number_strict(&left, offset)?;
                    let b = to_number_strict(&right, offset)?;
                    Ok(Some(number_value(a + b, offset)?))
                }
            }
            BinaryOp::Sub => {
                let a = to_number_strict(&left, offset)?;
                let b = to_number_strict(&right, offset)?;
                Ok(Some(number_value(a - b, offset)?))
            }
            BinaryOp::Mul => {
                let a = to_number_strict(&left, offset)?;
                let b = to_number_strict(&right, offset)?;
                Ok(Some(number_value(a * b, offset)?))
            }
            BinaryOp::Div => {
                let a = to_number_strict(&left, offset)?;
                let b = to_number_strict(&right, offset)?;
                if b == 0.0 {
                    return Err(ExprError::DivisionByZero { offset });
                }
                Ok(Some(number_value(a / b, offset)?))
            }
            BinaryOp::Mod => {
                let a = to_number_strict(&left, offset)?;
                let b = to_number_strict(&right, offset)?;
                if b == 0.0 {
                    return Err(ExprError::DivisionByZero { offset });
                }
                Ok(Some(number_value(a % b, offset)?))
            }
            BinaryOp::Or | BinaryOp::And => unreachable!("handled above"),
        }
    }
}

// ----------------------------------------------------------------------
// Coercion rules, shared with node executors
// ----------------------------------------------------------------------

/// Boolean coercion: false, null, unset, 0, "", empty list, empty mapping
/// are false; everything else is true.
#[must_use]
pub fn truthy(value: &Option<Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(Value::Object(map)) => !map.is_empty(),
    }
}

/// Equality: null equals both null and unset; same-type values compare
/// directly (lists/mappings by canonical serialization); cross-numeric by
/// numeric coercion; everything else by string form.
#[must_use]
pub fn values_equal(a: &Option<Value>, b: &Option<Value>) -> bool {
    let a_null = matches!(a, None | Some(Value::Null));
    let b_null = matches!(b, None | Some(Value::Null));
    if a_null || b_null {
        return a_null && b_null;
    }
    let (a, b) = (a.as_ref().expect("non-null"), b.as_ref().expect("non-null"));
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            canonical_string(a) == canonical_string(b)
        }
        _ => {
            if a.is_number() || b.is_number() {
                let ax = to_number_soft(&Some(a.clone()));
                let bx = to_number_soft(&Some(b.clone()));
                if let (Some(x), Some(y)) = (ax, bx) {
                    return x == y;
                }
            }
            value_to_display(a) == value_to_display(b)
        }
    }
}

/// Ordering: null/unset sort before non-null; mixed number/string compares
/// numerically when either side is numeric; otherwise lexicographically by
/// string form.
#[must_use]
pub fn compare(a: &Option<Value>, b: &Option<Value>) -> Ordering {
    let a_null = matches!(a, None | Some(Value::Null));
    let b_null = matches!(b, None | Some(Value::Null));
    match (a_null, b_null) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        (false, false) => {}
    }
    let (av, bv) = (a.as_ref().expect("non-null"), b.as_ref().expect("non-null"));
    if av.is_number() || bv.is_number() {
        if let (Some(x), Some(y)) = (to_number_soft(a), to_number_soft(b)) {
            return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
        }
    }
    value_to_display(av).cmp(&value_to_display(bv))
}

/// Best-effort numeric view: numbers pass through, booleans map to 0/1,
/// parseable strings parse. Anything else is `None`.
#[must_use]
pub fn to_number_soft(value: &Option<Value>) -> Option<f64> {
    match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
            }
        }
        _ => None,
    }
}

/// Numeric coercion for arithmetic: null/unset are 0, otherwise the soft
/// rules apply and failure is an expression error.
pub(crate) fn to_number_strict(value: &Option<Value>, offset: usize) -> Result<f64, ExprError> {
    match value {
        None | Some(Value::Null) => Ok(0.0),
        other => to_number_soft(other).ok_or_else(|| ExprError::NotNumeric {
            what: type_name(other).to_string(),
            offset,
        }),
    }
}

/// Wrap an f64 into the value domain; non-finite results are an error
/// because the value domain cannot represent them.
pub(crate) fn number_value(f: f64, offset: usize) -> Result<Value, ExprError> {
    Number::from_f64(f)
        .map(Value::Number)
        .ok_or(ExprError::NonFinite { offset })
}

/// String coercion: unset renders empty, null renders "null", strings pass
/// through, numbers drop a trailing ".0", structures serialize as JSON.
#[must_use]
pub fn coerce_string(value: &Option<Value>) -> String {
    match value {
        None => String::new(),
        Some(v) => value_to_display(v),
    }
}

/// Render a single value for display or string-compare.
#[must_use]
pub fn value_to_display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(fmt_number).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(_) | Value::Object(_) => {
            serde_json::to_string(value).unwrap_or_else(|_| String::new())
        }
    }
}

/// Format a float the way the language prints numbers: integral values
/// without a decimal point.
#[must_use]
pub fn fmt_number(f: f64) -> String {
    if f.fract() == 0.0 && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{f}")
    }
}

/// Serialization with object keys sorted recursively, used to compare
/// structures for equality.
#[must_use]
pub fn canonical_string(value: &Value) -> String {
    fn canonicalize(value: &Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
            Value::Object(map) => {
                let mut entries: Vec<(&String, &Value)> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                Value::Object(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k.clone(), canonicalize(v)))
                        .collect(),
                )
            }
            other => other.clone(),
        }
    }
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

pub(crate) fn type_name(value: &Option<Value>) -> &'static str {
    match value {
        None => "undefined",
        Some(Value::Null) => "null",
        Some(Value::Bool(_)) => "boolean",
        Some(Value::Number(_)) => "number",
        Some(Value::String(_)) => "string",
        Some(Value::Array(_)) => "array",
        Some(Value::Object(_)) => "object",
    }
}

/// Member access: mappings index by key; anything else (including strings
/// and lists) yields unset. Access on null/unset yields unset.
#[must_use]
pub fn member_access(value: &Option<Value>, property: &str) -> Option<Value> {
    match value {
        Some(Value::Object(map)) => map.get(property).cloned(),
        _ => None,
    }
}

/// Index access: mappings by string-coerced key, lists by numerically
/// coerced integral index, strings per character.
#[must_use]
pub fn index_access(value: &Option<Value>, key: &Option<Value>) -> Option<Value> {
    match value {
        Some(Value::Object(map)) => map.get(&coerce_string(key)).cloned(),
        Some(Value::Array(items)) => {
            let idx = integral_index(key)?;
            items.get(idx).cloned()
        }
        Some(Value::String(s)) => {
            let idx = integral_index(key)?;
            s.chars().nth(idx).map(|c| Value::String(c.to_string()))
        }
        _ => None,
    }
}

fn integral_index(key: &Option<Value>) -> Option<usize> {
    let n = to_number_soft(key)?;
    if n.fract() != 0.0 || n < 0.0 {
        return None;
    }
    Some(n as usize)
}
