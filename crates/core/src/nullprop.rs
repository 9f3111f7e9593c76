//! Null-propagation extension.
//!
//! Rewrites access chains into short-circuiting form: any null
//! reference, empty string, or empty list along a chain makes the
//! whole expression evaluate to `Null` instead of faulting, and an
//! out-of-range (or negative) index degrades the same way. Opaque
//! calls are guarded so a null argument skips the call entirely.
//!
//! Hoisted locals keep every guarded subexpression evaluated exactly
//! once. Lenient `&&` / `||` and comparisons over `Null` are the
//! evaluator's contract and need no rewriting here.

use crate::expr::{Expr, Param, UnOp};
use crate::subst::map_children;
use crate::value::Value;

/// Extends every access chain in `expr` with short-circuit guards.
pub fn extend_nulls(expr: &Expr) -> Expr {
    let mut next = expr.max_param_id() + 1;
    rewrite(expr, &mut next)
}

fn rewrite(expr: &Expr, next: &mut u32) -> Expr {
    match expr {
        Expr::Member { object, name } => {
            let object = rewrite(object, next);
            guard_member(object, name, next)
        }
        Expr::Index { object, key } => {
            let object = rewrite(object, next);
            let key = rewrite(key, next);
            guard_index(object, key, next)
        }
        // Assignment targets name a place to create, never a value to
        // guard.
        Expr::Assign { target, value } => Expr::Assign {
            target: target.clone(),
            value: Box::new(rewrite(value, next)),
        },
        Expr::Call { function, args } if !args.is_empty() => {
            let args: Vec<Expr> = args.iter().map(|a| rewrite(a, next)).collect();
            guard_call(function, args, next)
        }
        _ => map_children(expr, &mut |c| rewrite(c, next)),
    }
}

fn is_empty(expr: Expr) -> Expr {
    Expr::Unary {
        op: UnOp::IsNullOrEmpty,
        operand: Box::new(expr),
    }
}

fn alloc(next: &mut u32, name: &str) -> Param {
    let id = *next;
    *next += 1;
    Param::new(id, name.to_string())
}

/// `obj.name` becomes `if obj is null/empty then Null else obj.name`,
/// hoisting `obj` into a local unless it is already a parameter.
fn guard_member(object: Expr, name: &str, next: &mut u32) -> Expr {
    match object {
        Expr::Param(_) => Expr::cond(
            is_empty(object.clone()),
            Expr::null(),
            object.field(name.to_string()),
        ),
        other => {
            let t = alloc(next, "t");
            let hoisted = Expr::Param(t.clone());
            Expr::Block {
                vars: vec![t],
                exprs: vec![
                    Expr::Assign {
                        target: Box::new(hoisted.clone()),
                        value: Box::new(other),
                    },
                    Expr::cond(
                        is_empty(hoisted.clone()),
                        Expr::null(),
                        hoisted.field(name.to_string()),
                    ),
                ],
            }
        }
    }
}

/// `obj[k]` gains an emptiness guard plus, for integer keys, a range
/// guard covering negative and past-the-end indices.
fn guard_index(object: Expr, key: Expr, next: &mut u32) -> Expr {
    let (vars, mut pre, obj) = hoist(object, "t", next);
    let (key_vars, key_pre, key) = match key {
        k @ (Expr::Const(_) | Expr::Param(_)) => (Vec::new(), Vec::new(), k),
        computed => {
            let k = alloc(next, "k");
            (
                vec![k.clone()],
                vec![Expr::Assign {
                    target: Box::new(Expr::Param(k.clone())),
                    value: Box::new(computed),
                }],
                Expr::Param(k),
            )
        }
    };

    let mut test = is_empty(obj.clone());
    if !matches!(key, Expr::Const(Value::Text(_))) {
        // Integer index: out-of-range degrades like null.
        test = test
            .or_(key.clone().lt(Expr::int(0)))
            .or_(key.clone().ge(obj.clone().length()));
    }
    let access = Expr::cond(test, Expr::null(), obj.index_by(key));

    if vars.is_empty() && key_vars.is_empty() {
        return access;
    }
    let mut all_vars = vars;
    all_vars.extend(key_vars);
    pre.extend(key_pre);
    pre.push(access);
    Expr::Block {
        vars: all_vars,
        exprs: pre,
    }
}

/// A call with any null argument evaluates to `Null` without being
/// dispatched. Arguments hoist into locals so each is evaluated once.
fn guard_call(function: &str, args: Vec<Expr>, next: &mut u32) -> Expr {
    let mut vars = Vec::new();
    let mut pre = Vec::new();
    let mut locals = Vec::new();
    for arg in args {
        let (v, p, e) = hoist(arg, "a", next);
        vars.extend(v);
        pre.extend(p);
        locals.push(e);
    }

    let mut any_null: Option<Expr> = None;
    for local in &locals {
        let check = local.clone().eq_(Expr::null());
        any_null = Some(match any_null {
            Some(acc) => acc.or_(check),
            None => check,
        });
    }
    let test = any_null.unwrap_or_else(|| Expr::boolean(false));
    let guarded = Expr::cond(
        test,
        Expr::null(),
        Expr::call(function.to_string(), locals),
    );

    if vars.is_empty() {
        return guarded;
    }
    pre.push(guarded);
    Expr::Block { vars, exprs: pre }
}

/// Hoists a non-trivial expression into a fresh local; parameters and
/// constants pass through unhoisted.
fn hoist(expr: Expr, name: &str, next: &mut u32) -> (Vec<Param>, Vec<Expr>, Expr) {
    match expr {
        e @ (Expr::Param(_) | Expr::Const(_)) => (Vec::new(), Vec::new(), e),
        other => {
            let t = alloc(next, name);
            let local = Expr::Param(t.clone());
            (
                vec![t],
                vec![Expr::Assign {
                    target: Box::new(local.clone()),
                    value: Box::new(other),
                }],
                local,
            )
        }
    }
}
