//! graft-core: expression model, path algebra, and the pure
//! tree-to-tree transforms of the rule compiler.
//!
//! Everything here is a synchronous, CPU-bound rewrite over immutable
//! expression trees. The crate layers bottom-up:
//!
//! - [`value`] / [`expr`] -- the runtime value model and the closed
//!   expression sum type
//! - [`path`] -- access-chain algebra with abstract array placeholders
//! - [`subst`] / [`alias`] / [`merge`] -- parameter substitution,
//!   alias scoping, lambda composition
//! - [`eliminate`] -- sequence operators lowered to indexed loops
//! - [`nullprop`] -- short-circuit guards over access chains
//! - [`deps`] -- dependency path extraction
//! - [`equiv`] / [`canonical`] -- structural equivalence and
//!   closure-free canonical forms with shape hashing
//!
//! Plan construction and execution live in the sibling crates built
//! on top of these transforms.

pub mod alias;
pub mod canonical;
pub mod deps;
pub mod eliminate;
pub mod equiv;
pub mod error;
pub mod expr;
pub mod merge;
pub mod nullprop;
pub mod path;
pub mod subst;
pub mod value;

// ── Convenience re-exports: key types ────────────────────────────────

pub use error::{PathError, RewriteError};
pub use expr::{BinOp, Expr, Param, SeqOp, UnOp};
pub use path::{Path, Step};
pub use value::Value;

// ── Convenience re-exports: transform entry points ───────────────────

pub use alias::{resolve_aliases, Alias};
pub use canonical::{canonicalize, shape_hash, shape_hash_hex, CanonicalForm};
pub use deps::extract_dependencies;
pub use eliminate::{eliminate, Eliminated, IndexBinding, IndexKind};
pub use equiv::equivalent;
pub use merge::{merge, merge_from_two_roots};
pub use nullprop::extend_nulls;
pub use subst::substitute;
