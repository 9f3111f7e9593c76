//! graft-eval: the execution boundary of the rule compiler.
//!
//! Everything upstream of this crate is a pure tree rewrite; this
//! crate makes the results runnable:
//!
//! - [`interp`] -- a tree-walking evaluator over the runtime value
//!   model, lenient where null-extended code expects it
//! - [`backend`] -- the seam for an external native-code generator,
//!   with the interpreter standing behind it in-tree
//! - [`cache`] -- the publish-once compiled-function cache keyed by
//!   canonical-shape hash
//! - [`record`] -- scoped per-thread recording sessions that bypass
//!   the shared cache
//! - [`engine`] / [`mutate`] / [`validate`] / [`convert`] -- plan
//!   compilation and the three compiled artifacts

pub mod backend;
pub mod cache;
pub mod convert;
pub mod engine;
pub mod error;
pub mod interp;
pub mod mutate;
pub mod record;
pub mod validate;

pub use backend::{Backend, CompiledFn, InterpBackend};
pub use cache::CompiledCache;
pub use convert::CompiledConverter;
pub use engine::Engine;
pub use error::EvalError;
pub use interp::{HostFn, HostFunctions, Interp};
pub use mutate::CompiledMutator;
pub use record::Recording;
pub use validate::{CompiledValidator, ValidationFinding, ValidationTree};
