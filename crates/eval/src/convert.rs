//! The compiled conversion artifact.

use graft_core::Value;

use crate::engine::CompiledStep;
use crate::error::EvalError;
use crate::interp::Interp;
use crate::record;

/// A conversion function over a source/destination pair. The fresh
/// form builds the destination from `Null`; the merge form writes into
/// an existing destination, overwriting only what the rules target.
pub struct CompiledConverter {
    interp: Interp,
    steps: Vec<CompiledStep>,
}

impl CompiledConverter {
    pub(crate) fn new(interp: Interp, steps: Vec<CompiledStep>) -> CompiledConverter {
        CompiledConverter { interp, steps }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Builds a fresh destination tree from `source`.
    pub fn convert(&self, source: &Value) -> Result<Value, EvalError> {
        let mut dest = Value::Null;
        self.convert_into(source, &mut dest)?;
        Ok(dest)
    }

    /// Merges `source` into an existing destination tree.
    pub fn convert_into(&self, source: &Value, dest: &mut Value) -> Result<(), EvalError> {
        for step in &self.steps {
            let mut args = step.slot_args(&self.interp)?;
            args.push(source.clone());
            args.push(std::mem::replace(dest, Value::Null));
            let result = (step.func)(&mut args);
            *dest = args.pop().unwrap_or(Value::Null);
            result?;
            record::note_executed(&step.target.to_string());
        }
        Ok(())
    }
}
