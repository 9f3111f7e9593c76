//! Plan-construction errors.
//!
//! Every configuration-shape problem surfaces here, during the
//! one-time build: cycles, sibling-element reads, ambiguous source
//! arrays, bad priorities, unresolved placeholders. Nothing is
//! deferred into per-record execution.

use graft_core::{PathError, RewriteError};

/// Errors raised while turning declared rules into an execution plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// The dependency graph contains a cycle.
    #[error("cyclic dependency between mutators targeting: {}", paths.join(", "))]
    CyclicDependency { paths: Vec<String> },

    /// A per-element mutator reads state outside its own element: a
    /// sibling element by literal index, any-element access over the
    /// array it iterates, or the whole array itself.
    #[error("mutator targeting {target} depends on {dependency}, which reaches outside its own element")]
    ExternalDependency { target: String, dependency: String },

    /// Two distinct source arrays bound to the same target iteration.
    #[error("mutator targeting {target} binds multiple source arrays to one iteration: {}", sources.join(", "))]
    MultipleSourceArrays { target: String, sources: Vec<String> },

    /// A declared validation priority is outside the supported range.
    #[error("validation priority {priority} is outside 0..={max}")]
    PriorityOutOfRange { priority: i32, max: i32 },

    /// An abstract `each()` placeholder survived to assembly with no
    /// iteration to bind it.
    #[error("unresolved each() placeholder over {path}")]
    UnresolvedPlaceholder { path: String },

    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}
