//! Built-in functions available to expressions.
//!
//! Every function can be called bare (`length(name)`) or as a method on a
//! receiver (`name.length()`); the parser rewrites the method form so the
//! receiver arrives here as the first argument.

use serde_json::Value;

use super::eval::{
    coerce_string, number_value, to_number_soft, to_number_strict, type_name, values_equal,
};
use super::ExprError;

type Arg = Option<Value>;

pub(crate) fn call(name: &str, args: &[Arg], offset: usize) -> Result<Option<Value>, ExprError> {
    match name {
        "contains" => {
            expect_arity(name, args, 2, offset)?;
            Ok(Some(Value::Bool(contains(&args[0], &args[1]))))
        }
        "startsWith" => {
            expect_arity(name, args, 2, offset)?;
            Ok(Some(Value::Bool(
                coerce_string(&args[0]).starts_with(&coerce_string(&args[1])),
            )))
        }
        "endsWith" => {
            expect_arity(name, args, 2, offset)?;
            Ok(Some(Value::Bool(
                coerce_string(&args[0]).ends_with(&coerce_string(&args[1])),
            )))
        }
        "length" => {
            expect_arity(name, args, 1, offset)?;
            Ok(length(&args[0]))
        }
        "toLowerCase" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::String(coerce_string(&args[0]).to_lowercase())))
        }
        "toUpperCase" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::String(coerce_string(&args[0]).to_uppercase())))
        }
        "trim" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::String(
                coerce_string(&args[0]).trim().to_string(),
            )))
        }
        "typeof" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::String(type_name(&args[0]).to_string())))
        }
        "isNull" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::Bool(matches!(
                args[0],
                None | Some(Value::Null)
            ))))
        }
        "isNumber" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::Bool(matches!(args[0], Some(Value::Number(_))))))
        }
        "isString" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::Bool(matches!(args[0], Some(Value::String(_))))))
        }
        "isBoolean" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::Bool(matches!(args[0], Some(Value::Bool(_))))))
        }
        "isArray" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::Bool(matches!(args[0], Some(Value::Array(_))))))
        }
        "isObject" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::Bool(matches!(args[0], Some(Value::Object(_))))))
        }
        "toString" => {
            expect_arity(name, args, 1, offset)?;
            Ok(Some(Value::String(coerce_string(&args[0]))))
        }
        "toNumber" => {
            expect_arity(name, args, 1, offset)?;
            match to_number_soft(&args[0]) {
                Some(n) => Ok(Some(number_value(n, offset)?)),
                None => Ok(Some(Value::Null)),
            }
        }
        "abs" => numeric_unary(name, args, offset, f64::abs),
        "floor" => numeric_unary(name, args, offset, f64::floor),
        "ceil" => numeric_unary(name, args, offset, f64::ceil),
        "round" => numeric_unary(name, args, offset, f64::round),
        "min" => numeric_fold(name, args, offset, f64::min),
        "max" => numeric_fold(name, args, offset, f64::max),
        _ => Err(ExprError::UnknownFunction {
            name: name.to_string(),
            offset,
        }),
    }
}

fn expect_arity(name: &str, args: &[Arg], expected: usize, offset: usize) -> Result<(), ExprError> {
    if args.len() != expected {
        return Err(ExprError::Arity {
            name: name.to_string(),
            expected: expected.to_string(),
            got: args.len(),
            offset,
        });
    }
    Ok(())
}

fn numeric_unary(
    name: &str,
    args: &[Arg],
    offset: usize,
    op: impl Fn(f64) -> f64,
) -> Result<Option<Value>, ExprError> {
    expect_arity(name, args, 1, offset)?;
    let n = to_number_strict(&args[0], offset)?;
    Ok(Some(number_value(op(n), offset)?))
}

fn numeric_fold(
    name: &str,
    args: &[Arg],
    offset: usize,
    op: impl Fn(f64, f64) -> f64,
) -> Result<Option<Value>, ExprError> {
    if args.is_empty() {
        return Err(ExprError::Arity {
            name: name.to_string(),
            expected: "at least 1".to_string(),
            got: 0,
            offset,
        });
    }
    let mut acc = to_number_strict(&args[0], offset)?;
    for arg in &args[1..] {
        acc = op(acc, to_number_strict(arg, offset)?);
    }
    Ok(Some(number_value(acc, offset)?))
}

fn contains(haystack: &Arg, needle: &Arg) -> bool {
    match haystack {
        Some(Value::String(s)) => s.contains(&coerce_string(needle)),
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| values_equal(&Some(item.clone()), needle)),
        Some(Value::Object(map)) => map.contains_key(&coerce_string(needle)),
        _ => false,
    }
}

fn length(value: &Arg) -> Option<Value> {
    let n = match value {
        Some(Value::String(s)) => s.chars().count(),
        Some(Value::Array(items)) => items.len(),
        Some(Value::Object(map)) => map.len(),
        _ => return None,
    };
    Some(Value::Number(serde_json::Number::from(n as u64)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn contains_covers_all_container_kinds() {
        assert!(contains(&Some(json!("hello")), &Some(json!("ell"))));
        assert!(contains(&Some(json!([1, 2, 3])), &Some(json!(2))));
        assert!(contains(&Some(json!({"k": 1})), &Some(json!("k"))));
        assert!(!contains(&None, &Some(json!("x"))));
    }

    #[test]
    fn length_is_unset_for_scalars() {
        assert_eq!(length(&Some(json!(5))), None);
        assert_eq!(length(&Some(json!("héllo"))), Some(json!(5)));
        assert_eq!(length(&Some(json!([1, 2]))), Some(json!(2)));
    }

    #[test]
    fn unknown_function_errors_with_offset() {
        let err = call("nope", &[], 7).unwrap_err();
        assert_eq!(err.offset(), 7);
    }
}
