//! Parameter substitution.
//!
//! The shared engine under alias resolution and lambda merging:
//! replace free occurrences of a parameter with an expression,
//! respecting shadowing by inner binders, and rename binders whose id
//! would collide with a substitution target.

use crate::expr::{Expr, Param};

/// Rebuilds one level of the tree, applying `f` to every direct child.
///
/// The workhorse under every structural rewrite in this workspace:
/// binders are preserved as-is, children are mapped in order.
pub fn map_children(expr: &Expr, f: &mut dyn FnMut(&Expr) -> Expr) -> Expr {
    match expr {
        Expr::Param(_) | Expr::Const(_) | Expr::Break | Expr::Fail { .. } => expr.clone(),
        Expr::Member { object, name } => Expr::Member {
            object: Box::new(f(object)),
            name: name.clone(),
        },
        Expr::Index { object, key } => Expr::Index {
            object: Box::new(f(object)),
            key: Box::new(f(key)),
        },
        Expr::Length(object) => Expr::Length(Box::new(f(object))),
        Expr::Each(object) => Expr::Each(Box::new(f(object))),
        Expr::Current(object) => Expr::Current(Box::new(f(object))),
        Expr::CurrentIndex(object) => Expr::CurrentIndex(Box::new(f(object))),
        Expr::TemplateIndex(object) => Expr::TemplateIndex(Box::new(f(object))),
        Expr::Seq { op, source, args } => Expr::Seq {
            op: *op,
            source: Box::new(f(source)),
            args: args.iter().map(|a| f(a)).collect(),
        },
        Expr::Call { function, args } => Expr::Call {
            function: function.clone(),
            args: args.iter().map(|a| f(a)).collect(),
        },
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: Box::new(f(left)),
            right: Box::new(f(right)),
        },
        Expr::Unary { op, operand } => Expr::Unary {
            op: *op,
            operand: Box::new(f(operand)),
        },
        Expr::Cond {
            test,
            if_true,
            if_false,
        } => Expr::Cond {
            test: Box::new(f(test)),
            if_true: Box::new(f(if_true)),
            if_false: Box::new(f(if_false)),
        },
        Expr::NewRecord { fields } => Expr::NewRecord {
            fields: fields
                .iter()
                .map(|(name, e)| (name.clone(), f(e)))
                .collect(),
        },
        Expr::NewList { items } => Expr::NewList {
            items: items.iter().map(|i| f(i)).collect(),
        },
        Expr::Lambda { params, body } => Expr::Lambda {
            params: params.clone(),
            body: Box::new(f(body)),
        },
        Expr::Block { vars, exprs } => Expr::Block {
            vars: vars.clone(),
            exprs: exprs.iter().map(|e| f(e)).collect(),
        },
        Expr::Assign { target, value } => Expr::Assign {
            target: Box::new(f(target)),
            value: Box::new(f(value)),
        },
        Expr::For {
            index,
            length,
            body,
        } => Expr::For {
            index: index.clone(),
            length: Box::new(f(length)),
            body: Box::new(f(body)),
        },
        Expr::Append { list, value } => Expr::Append {
            list: Box::new(f(list)),
            value: Box::new(f(value)),
        },
    }
}

/// Replaces every free occurrence of parameter `id` with `replacement`.
///
/// Inner binders with the same id shadow the substitution: their
/// scopes are left untouched.
pub fn substitute(expr: &Expr, id: u32, replacement: &Expr) -> Expr {
    match expr {
        Expr::Param(p) if p.id == id => replacement.clone(),
        Expr::Lambda { params, .. } if params.iter().any(|p| p.id == id) => expr.clone(),
        Expr::Block { vars, .. } if vars.iter().any(|p| p.id == id) => expr.clone(),
        Expr::For {
            index,
            length,
            body,
        } if index.id == id => Expr::For {
            index: index.clone(),
            // The loop index scopes the body only.
            length: Box::new(substitute(length, id, replacement)),
            body: body.clone(),
        },
        _ => map_children(expr, &mut |c| substitute(c, id, replacement)),
    }
}

/// Renames every binder with parameter id `id` to a fresh id drawn
/// from `next`, rewriting bound uses to match. Names are preserved.
///
/// Used before substituting an alias placeholder so an unrelated
/// lambda parameter sharing the placeholder's id is never conflated
/// with it.
pub fn rename_binders(expr: &Expr, id: u32, next: &mut u32) -> Expr {
    match expr {
        Expr::Lambda { params, body } if params.iter().any(|p| p.id == id) => {
            let fresh_id = alloc(next);
            let new_params: Vec<Param> = params
                .iter()
                .map(|p| {
                    if p.id == id {
                        Param::new(fresh_id, p.name.clone())
                    } else {
                        p.clone()
                    }
                })
                .collect();
            let fresh_name = new_params
                .iter()
                .find(|p| p.id == fresh_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let rebound = substitute(body, id, &Expr::param(fresh_id, fresh_name));
            let rebound = rename_binders(&rebound, id, next);
            Expr::Lambda {
                params: new_params,
                body: Box::new(rebound),
            }
        }
        Expr::Block { vars, exprs } if vars.iter().any(|p| p.id == id) => {
            let fresh_id = alloc(next);
            let new_vars: Vec<Param> = vars
                .iter()
                .map(|p| {
                    if p.id == id {
                        Param::new(fresh_id, p.name.clone())
                    } else {
                        p.clone()
                    }
                })
                .collect();
            let fresh_name = new_vars
                .iter()
                .find(|p| p.id == fresh_id)
                .map(|p| p.name.clone())
                .unwrap_or_default();
            let exprs = exprs
                .iter()
                .map(|e| {
                    let e = substitute(e, id, &Expr::param(fresh_id, fresh_name.clone()));
                    rename_binders(&e, id, next)
                })
                .collect();
            Expr::Block {
                vars: new_vars,
                exprs,
            }
        }
        Expr::For {
            index,
            length,
            body,
        } if index.id == id => {
            let fresh_id = alloc(next);
            let fresh = Param::new(fresh_id, index.name.clone());
            let new_body = substitute(body, id, &Expr::Param(fresh.clone()));
            let new_body = rename_binders(&new_body, id, next);
            Expr::For {
                index: fresh,
                length: Box::new(rename_binders(length, id, next)),
                body: Box::new(new_body),
            }
        }
        _ => map_children(expr, &mut |c| rename_binders(c, id, next)),
    }
}

fn alloc(next: &mut u32) -> u32 {
    let id = *next;
    *next += 1;
    id
}
