//! Alias resolution.
//!
//! An alias binds a placeholder parameter to a path expression. A list
//! of aliases defines the scope a sub-configurator's declarations are
//! rebased through: placeholders are substituted in declaration order,
//! and a later alias may reference parameters bound by earlier ones.

use crate::expr::{Expr, Param};
use crate::subst::{rename_binders, substitute};

/// A placeholder parameter bound to a path expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Alias {
    pub placeholder: Param,
    pub bound: Expr,
}

impl Alias {
    pub fn new(placeholder: Param, bound: Expr) -> Alias {
        Alias { placeholder, bound }
    }
}

/// Substitutes every placeholder occurrence in `expr` with its bound
/// path.
///
/// Aliases apply in declaration order; each bound expression is first
/// resolved against the aliases declared before it. Before a
/// placeholder is substituted, any unrelated lambda or block binder
/// sharing its id is renamed to a fresh id so the two are never
/// conflated.
pub fn resolve_aliases(expr: &Expr, aliases: &[Alias]) -> Expr {
    // Resolve each bound expression against its predecessors.
    let mut resolved: Vec<(u32, Expr)> = Vec::with_capacity(aliases.len());
    for alias in aliases {
        let mut bound = alias.bound.clone();
        for (id, earlier) in &resolved {
            bound = substitute(&bound, *id, earlier);
        }
        resolved.push((alias.placeholder.id, bound));
    }

    let mut out = expr.clone();
    let mut next = fresh_floor(&out, &resolved);
    for (id, bound) in &resolved {
        out = rename_binders(&out, *id, &mut next);
        out = substitute(&out, *id, bound);
    }
    out
}

fn fresh_floor(expr: &Expr, resolved: &[(u32, Expr)]) -> u32 {
    let mut max = expr.max_param_id();
    for (id, bound) in resolved {
        max = max.max(*id).max(bound.max_param_id());
    }
    max + 1
}
