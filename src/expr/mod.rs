//! A small CEL-like expression language evaluated against the execution
//! context.
//!
//! Used by `if-else` and `while` conditions, `set-state` assignments of
//! type `expression`, and `{{ expr }}` string interpolation. The language
//! covers boolean logic, comparison, arithmetic, member/index access,
//! and a fixed set of built-in functions callable bare
//! (`length(name)`) or method-style (`name.length()`).
//!
//! Precedence, low to high: `||`, `&&`, comparison
//! (`== != > < >= <=`), additive (`+ -`), multiplicative (`* / %`),
//! unary (`! -`), postfix (`.ident`, `[expr]`, call), primary.
//!
//! # Values
//!
//! Expression values are `serde_json::Value`; *unset* (a missing
//! variable, member access past the end of a structure) is modeled as
//! `None` and is distinct from JSON null everywhere except equality,
//! where null and unset compare equal.
//!
//! # Errors
//!
//! Every lexer, parser, and runtime failure carries the source offset it
//! was detected at; node executors convert these into failed results.

mod builtins;
pub mod eval;
pub mod interpolate;
pub mod lexer;
pub mod parser;

use miette::Diagnostic;
use thiserror::Error;

use crate::context::ExecutionContext;

pub use eval::{evaluate, evaluate_condition, truthy};
pub use interpolate::{interpolate, interpolate_value};

/// Failure in any phase of expression handling, tagged with the source
/// offset where it was detected.
#[derive(Debug, Error, Diagnostic)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at position {offset}")]
    #[diagnostic(code(agentflow::expr::lex))]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at position {offset}")]
    #[diagnostic(code(agentflow::expr::unterminated_string))]
    UnterminatedString { offset: usize },

    #[error("invalid number literal at position {offset}")]
    #[diagnostic(code(agentflow::expr::number))]
    InvalidNumber { offset: usize },

    #[error("expected {expected} at position {offset}")]
    #[diagnostic(code(agentflow::expr::parse))]
    UnexpectedToken { expected: String, offset: usize },

    #[error("unexpected end of expression at position {offset}")]
    #[diagnostic(code(agentflow::expr::eof))]
    UnexpectedEnd { offset: usize },

    #[error("only identifiers and methods can be called (position {offset})")]
    #[diagnostic(code(agentflow::expr::callee))]
    InvalidCallee { offset: usize },

    #[error("division by zero at position {offset}")]
    #[diagnostic(code(agentflow::expr::division_by_zero))]
    DivisionByZero { offset: usize },

    #[error("unknown function '{name}' at position {offset}")]
    #[diagnostic(
        code(agentflow::expr::unknown_function),
        help("Built-ins: contains, startsWith, endsWith, length, toLowerCase, toUpperCase, trim, typeof, isNull, isNumber, isString, isBoolean, isArray, isObject, toString, toNumber, abs, floor, ceil, round, min, max.")
    )]
    UnknownFunction { name: String, offset: usize },

    #[error("function '{name}' expects {expected} argument(s), got {got} (position {offset})")]
    #[diagnostic(code(agentflow::expr::arity))]
    Arity {
        name: String,
        expected: String,
        got: usize,
        offset: usize,
    },

    #[error("cannot convert {what} to a number (position {offset})")]
    #[diagnostic(code(agentflow::expr::numeric_coercion))]
    NotNumeric { what: String, offset: usize },

    #[error("numeric result is not finite (position {offset})")]
    #[diagnostic(code(agentflow::expr::non_finite))]
    NonFinite { offset: usize },
}

impl ExprError {
    /// Byte offset into the source where the failure was detected.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            ExprError::UnexpectedChar { offset, .. }
            | ExprError::UnterminatedString { offset }
            | ExprError::InvalidNumber { offset }
            | ExprError::UnexpectedToken { offset, .. }
            | ExprError::UnexpectedEnd { offset }
            | ExprError::InvalidCallee { offset }
            | ExprError::DivisionByZero { offset }
            | ExprError::UnknownFunction { offset, .. }
            | ExprError::Arity { offset, .. }
            | ExprError::NotNumeric { offset, .. }
            | ExprError::NonFinite { offset } => *offset,
        }
    }
}

/// Parse and evaluate `source`, reducing the result to a boolean via the
/// language's truthiness rules (false, null, unset, 0, "", empty list,
/// empty mapping are false; everything else is true).
pub fn condition(source: &str, ctx: &ExecutionContext) -> Result<bool, ExprError> {
    evaluate_condition(source, ctx)
}
