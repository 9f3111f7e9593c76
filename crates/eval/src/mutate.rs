//! The compiled mutation artifact.

use graft_core::Value;

use crate::engine::CompiledStep;
use crate::error::EvalError;
use crate::interp::Interp;
use crate::record;

/// A pure mutation function over one data tree: every writer step
/// applied in dependency order, in place.
pub struct CompiledMutator {
    interp: Interp,
    steps: Vec<CompiledStep>,
}

impl CompiledMutator {
    pub(crate) fn new(interp: Interp, steps: Vec<CompiledStep>) -> CompiledMutator {
        CompiledMutator { interp, steps }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Applies every step to `data` in plan order. Later writers may
    /// deliberately overwrite earlier ones; a step whose conditions do
    /// not hold leaves its target untouched.
    pub fn apply(&self, data: &mut Value) -> Result<(), EvalError> {
        for step in &self.steps {
            let mut args = step.slot_args(&self.interp)?;
            args.push(std::mem::replace(data, Value::Null));
            let result = (step.func)(&mut args);
            *data = args.pop().unwrap_or(Value::Null);
            result?;
            record::note_executed(&step.target.to_string());
        }
        Ok(())
    }
}
