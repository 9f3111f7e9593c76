//! Artifact compilation front door.
//!
//! An [`Engine`] owns the backend, the shared compiled-function
//! cache, and the host-function table, and turns execution plans into
//! the three compiled artifacts: mutation, validation, conversion.
//!
//! Per plan step, the resolved loop-based body is canonicalized and
//! compiled through the cache (or privately, under an active recording
//! session); the extracted canonical slots are re-evaluated per
//! invocation so captured opaque calls keep their once-per-invocation
//! semantics.

use std::sync::Arc;

use graft_core::{Expr, Path, Value};
use graft_plan::{ExecutionPlan, MutatorAction, PlanStep};

use crate::backend::{Backend, CompiledFn, InterpBackend};
use crate::cache::CompiledCache;
use crate::convert::CompiledConverter;
use crate::error::EvalError;
use crate::interp::{HostFunctions, Interp};
use crate::mutate::CompiledMutator;
use crate::validate::CompiledValidator;

/// One compiled plan step: the shared function plus the slots this
/// declaration captured.
#[derive(Clone)]
pub(crate) struct CompiledStep {
    pub seq: usize,
    pub target: Path,
    pub action: MutatorAction,
    pub slots: Vec<Expr>,
    pub func: CompiledFn,
}

impl CompiledStep {
    /// Evaluates the captured slots and returns the leading argument
    /// vector for an invocation.
    pub fn slot_args(&self, interp: &Interp) -> Result<Vec<Value>, EvalError> {
        let mut args = Vec::with_capacity(self.slots.len() + 2);
        for slot in &self.slots {
            args.push(interp.eval_closed(slot)?);
        }
        Ok(args)
    }
}

pub struct Engine {
    backend: Arc<dyn Backend>,
    cache: CompiledCache,
    interp: Interp,
}

impl Engine {
    /// Interpreter backend, empty host table.
    pub fn new() -> Engine {
        Engine {
            backend: Arc::new(InterpBackend::new()),
            cache: CompiledCache::new(),
            interp: Interp::new(),
        }
    }

    /// Interpreter backend over a host-function table.
    pub fn with_host(host: HostFunctions) -> Engine {
        let host = Arc::new(host);
        Engine {
            backend: Arc::new(InterpBackend::with_host(host.clone())),
            cache: CompiledCache::new(),
            interp: Interp::with_host(host),
        }
    }

    /// An external backend; the host table still serves canonical-slot
    /// evaluation.
    pub fn with_backend(backend: Arc<dyn Backend>, host: Arc<HostFunctions>) -> Engine {
        Engine {
            backend,
            cache: CompiledCache::new(),
            interp: Interp::with_host(host),
        }
    }

    pub fn cache(&self) -> &CompiledCache {
        &self.cache
    }

    /// Compiles the writer steps of a single-root plan into a mutation
    /// function.
    pub fn compile_mutator(&self, plan: &ExecutionPlan) -> Result<CompiledMutator, EvalError> {
        if plan.source().is_some() {
            return Err(EvalError::TypeError {
                message: "converter plan passed to mutator compilation".to_string(),
            });
        }
        let steps = self.compile_steps(plan.mutation_steps())?;
        Ok(CompiledMutator::new(self.interp.clone(), steps))
    }

    /// Compiles the validator steps of a single-root plan into a
    /// validation function.
    pub fn compile_validator(&self, plan: &ExecutionPlan) -> Result<CompiledValidator, EvalError> {
        if plan.source().is_some() {
            return Err(EvalError::TypeError {
                message: "converter plan passed to validator compilation".to_string(),
            });
        }
        let steps = self.compile_steps(plan.validation_steps())?;
        Ok(CompiledValidator::new(self.interp.clone(), steps))
    }

    /// Compiles the writer steps of a two-root plan into a conversion
    /// function.
    pub fn compile_converter(&self, plan: &ExecutionPlan) -> Result<CompiledConverter, EvalError> {
        if plan.source().is_none() {
            return Err(EvalError::TypeError {
                message: "mutator plan passed to converter compilation".to_string(),
            });
        }
        let steps = self.compile_steps(plan.mutation_steps())?;
        Ok(CompiledConverter::new(self.interp.clone(), steps))
    }

    fn compile_steps(&self, steps: &[PlanStep]) -> Result<Vec<CompiledStep>, EvalError> {
        steps
            .iter()
            .map(|step| {
                let (form, func) = self.cache.get_or_compile(self.backend.as_ref(), &step.body)?;
                Ok(CompiledStep {
                    seq: step.seq,
                    target: step.target.clone(),
                    action: step.action.clone(),
                    slots: form.extracted,
                    func,
                })
            })
            .collect()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
