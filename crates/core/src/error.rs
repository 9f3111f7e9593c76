//! Error types for the rewriting core.

/// Errors raised by the path algebra.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    /// An expression that is not a pure access chain was handed to a
    /// path operation.
    #[error("expression is not an access chain: {detail}")]
    NotAChain { detail: String },

    /// An abstract placeholder aligned with a non-array position of the
    /// concrete path during resolution.
    #[error("path shapes do not align at step {position}: concrete {concrete} vs abstract {abstract_}")]
    ShapeMismatch {
        position: usize,
        concrete: String,
        abstract_: String,
    },

    /// A `current()` or `current_index()` reference with no enclosing
    /// `each()` in the path.
    #[error("dangling current() at step {position} of {path}: no enclosing each()")]
    DanglingCurrent { position: usize, path: String },
}

/// Errors raised by the tree rewriters (elimination, extraction).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RewriteError {
    /// A sequence operator with no defined elimination or extraction
    /// rule. Raised at rewrite time, never deferred to execution.
    #[error("sequence operator {op} is not supported")]
    UnsupportedOperator { op: String },

    /// A sequence operator was given a lambda of the wrong arity.
    #[error("operator {op} expects a lambda of {expected} parameter(s), got {got}")]
    LambdaArity {
        op: String,
        expected: usize,
        got: usize,
    },

    /// A sequence operator was given a non-lambda argument where a
    /// lambda is required.
    #[error("operator {op} expects a lambda argument")]
    ExpectedLambda { op: String },

    #[error(transparent)]
    Path(#[from] PathError),
}
