//! Execution errors.

use std::fmt;

/// Errors raised while evaluating a compiled expression.
///
/// Null-extended code never faults on missing data; what remains are
/// genuine contract violations: data-shape failures surfaced by
/// eliminated sequence operators, unknown host functions, type errors,
/// and constructs that should never reach execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// A parameter was read with no bound value.
    UnboundParameter { name: String },
    /// An opaque call named a function absent from the host table.
    UnknownFunction { name: String },
    /// An operand had a type the operator cannot accept.
    TypeError { message: String },
    /// Numeric overflow during arithmetic.
    Overflow { message: String },
    /// A data-shape violation surfaced by an eliminated operator,
    /// e.g. `Single` with zero or multiple matches.
    InvalidOperation { message: String },
    /// A sequence operator reached execution without being eliminated.
    UnloweredOperator { op: String },
    /// An abstract path placeholder reached execution unresolved.
    PlaceholderAtRuntime { marker: String },
    /// A compiled function was invoked with the wrong argument count.
    ArityMismatch { expected: usize, got: usize },
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::UnboundParameter { name } => {
                write!(f, "unbound parameter: {}", name)
            }
            EvalError::UnknownFunction { name } => {
                write!(f, "unknown host function: {}", name)
            }
            EvalError::TypeError { message } => {
                write!(f, "type error: {}", message)
            }
            EvalError::Overflow { message } => {
                write!(f, "numeric overflow: {}", message)
            }
            EvalError::InvalidOperation { message } => {
                write!(f, "invalid operation: {}", message)
            }
            EvalError::UnloweredOperator { op } => {
                write!(f, "sequence operator {} reached execution without elimination", op)
            }
            EvalError::PlaceholderAtRuntime { marker } => {
                write!(f, "abstract placeholder {} reached execution", marker)
            }
            EvalError::ArityMismatch { expected, got } => {
                write!(f, "expected {} argument(s), got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for EvalError {}
