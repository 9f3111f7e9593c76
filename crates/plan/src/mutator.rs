//! Mutator declarations.
//!
//! A mutator is one declared rule: a target path, conjoined
//! conditions, and an action. Declarations are plain immutable data;
//! all derivation (dependencies, ordering, loop assembly) happens at
//! plan-construction time.

use graft_core::{Expr, Path};

use crate::error::PlanError;

/// Highest allowed validation priority. Lower numbers win; ties break
/// by declaration order.
pub const MAX_PRIORITY: i32 = 100;

/// What a mutator does to its target when its conditions hold.
#[derive(Debug, Clone, PartialEq)]
pub enum MutatorAction {
    /// Write the value expression into the target.
    Set(Expr),
    /// Write `Null` into the target.
    Nullify,
    /// Mark the target subtree validation-inert.
    Disable,
    /// Invalid when the target itself is null or empty.
    Required { message: String },
    /// Invalid when the conditions hold.
    Invalid { message: String, priority: i32 },
}

impl MutatorAction {
    /// True for the actions that write the target during mutation.
    pub fn writes(&self) -> bool {
        matches!(self, MutatorAction::Set(_) | MutatorAction::Nullify)
    }

    /// Validation priority; actions without a declared priority rank
    /// highest.
    pub fn priority(&self) -> i32 {
        match self {
            MutatorAction::Invalid { priority, .. } => *priority,
            _ => 0,
        }
    }
}

/// One declared rule.
///
/// `seq` is the declaration sequence number, the stable tie-break for
/// every ordering decision downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct MutatorDecl {
    pub seq: usize,
    pub target: Path,
    pub conditions: Vec<Expr>,
    pub action: MutatorAction,
}

pub(crate) fn check_priority(priority: i32) -> Result<(), PlanError> {
    if !(0..=MAX_PRIORITY).contains(&priority) {
        return Err(PlanError::PriorityOutOfRange {
            priority,
            max: MAX_PRIORITY,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_range_is_inclusive() {
        assert!(check_priority(0).is_ok());
        assert!(check_priority(MAX_PRIORITY).is_ok());
        assert!(matches!(
            check_priority(-1),
            Err(PlanError::PriorityOutOfRange { priority: -1, .. })
        ));
        assert!(matches!(
            check_priority(MAX_PRIORITY + 1),
            Err(PlanError::PriorityOutOfRange { .. })
        ));
    }

    #[test]
    fn action_write_classification() {
        assert!(MutatorAction::Set(Expr::int(1)).writes());
        assert!(MutatorAction::Nullify.writes());
        assert!(!MutatorAction::Disable.writes());
        assert!(!MutatorAction::Required {
            message: "m".to_string()
        }
        .writes());
    }
}
