//! The backend seam.
//!
//! A [`Backend`] turns a canonical form into an invocable function:
//! the boundary where an external native-code generator would plug in.
//! [`InterpBackend`] is the in-tree implementation, closing the
//! tree-walking evaluator over the canonical shape.
//!
//! Compiled functions take the extracted slot values first, then the
//! shape's original parameters. Slots are evaluated by the caller per
//! logical invocation, so an extracted opaque call still runs once per
//! invocation rather than once at compile time.

use std::sync::Arc;

use graft_core::{CanonicalForm, Expr, Value};

use crate::error::EvalError;
use crate::interp::{HostFunctions, Interp};

/// An invocable compiled function. Arguments are the canonical slot
/// values followed by the data roots; root parameters mutated by the
/// body are written back into the slice.
pub type CompiledFn = Arc<dyn Fn(&mut [Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Compiles closed, loop-based canonical shapes into invocable
/// functions.
pub trait Backend: Send + Sync {
    fn compile(&self, form: &CanonicalForm) -> Result<CompiledFn, EvalError>;
}

/// Tree-walking interpreter behind the backend seam.
pub struct InterpBackend {
    interp: Interp,
}

impl InterpBackend {
    pub fn new() -> InterpBackend {
        InterpBackend {
            interp: Interp::new(),
        }
    }

    pub fn with_host(host: Arc<HostFunctions>) -> InterpBackend {
        InterpBackend {
            interp: Interp::with_host(host),
        }
    }
}

impl Default for InterpBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for InterpBackend {
    fn compile(&self, form: &CanonicalForm) -> Result<CompiledFn, EvalError> {
        if !matches!(form.shape, Expr::Lambda { .. }) {
            return Err(EvalError::TypeError {
                message: "canonical shape is not a lambda".to_string(),
            });
        }
        let shape = form.shape.clone();
        let interp = self.interp.clone();
        Ok(Arc::new(move |args| interp.eval_lambda(&shape, args)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::canonicalize;
    use graft_core::Param;

    #[test]
    fn compiled_function_takes_slots_then_roots() {
        // |d| d.X > 5 canonicalizes with the constant in slot 0.
        let rule = Expr::lambda(
            vec![Param::new(0, "d")],
            Expr::param(0, "d").field("X").gt(Expr::int(5)),
        );
        let form = canonicalize(&rule);
        assert_eq!(form.slot_count(), 1);

        let f = InterpBackend::new().compile(&form).unwrap();
        let data = Value::record([("X", Value::Int(9))]);
        let mut args = [Value::Int(5), data];
        assert_eq!(f(&mut args).unwrap(), Value::Bool(true));

        // Same shape, different captured constant.
        let mut args = [Value::Int(100), Value::record([("X", Value::Int(9))])];
        assert_eq!(f(&mut args).unwrap(), Value::Bool(false));
    }
}
