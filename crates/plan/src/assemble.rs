//! Resolved loop-based assembly.
//!
//! Turns one declared mutator into a closed, loop-based lambda over
//! the plan's root parameters: a `For` nest over every array hop of
//! the target, the conjoined conditions as a guard, and the action as
//! an assignment (or a hit-collection loop for validators). Dangling
//! `current()` / `current_index()` markers resolve to the loop-index
//! parameters in positional order; sequence operators are eliminated
//! and access chains null-extended, so the result is ready for a
//! backend.

use graft_core::subst::map_children;
use graft_core::{eliminate, extend_nulls, Expr, Param, Path, PathError, Step, UnOp};

use crate::error::PlanError;
use crate::mutator::{MutatorAction, MutatorDecl};

pub(crate) fn assemble_step(
    params: &[Param],
    m: &MutatorDecl,
    bindings: &[Option<Path>],
) -> Result<Expr, PlanError> {
    let mut next = fresh_floor(params, m);

    // One loop index per array hop of the target.
    let hop_count = m
        .target
        .steps
        .iter()
        .filter(|step| matches!(step, Step::Each | Step::TemplateIndex))
        .count();
    let loops: Vec<Param> = (0..hop_count)
        .map(|k| alloc(&mut next, &format!("i{}", k)))
        .collect();

    // Concrete target chain, collecting the array prefix at each hop.
    let mut target_expr = Expr::Param(m.target.root.clone());
    let mut prefixes: Vec<Expr> = Vec::with_capacity(hop_count);
    let mut hop = 0usize;
    for (pos, step) in m.target.steps.iter().enumerate() {
        target_expr = match step {
            Step::Field(name) => target_expr.field(name.clone()),
            Step::Key(key) => target_expr.key(key.clone()),
            Step::At(i) => target_expr.at(*i),
            Step::Each | Step::TemplateIndex => {
                prefixes.push(target_expr.clone());
                let idx = loops[hop].clone();
                hop += 1;
                target_expr.index_by(Expr::Param(idx))
            }
            Step::Current => {
                if hop == 0 {
                    return Err(PlanError::Path(PathError::DanglingCurrent {
                        position: pos,
                        path: m.target.to_string(),
                    }));
                }
                target_expr.index_by(Expr::Param(loops[hop - 1].clone()))
            }
            Step::CurrentIndex => {
                return Err(PlanError::Path(PathError::NotAChain {
                    detail: "current_index() in a target path".to_string(),
                }))
            }
        };
    }

    // Loop lengths: the paired source array drives converter hops, the
    // target's own array drives the rest.
    let mut lengths: Vec<Expr> = Vec::with_capacity(hop_count);
    for (k, prefix) in prefixes.iter().enumerate() {
        let length = match bindings.get(k).and_then(|b| b.as_ref()) {
            Some(source_array) => {
                resolve_markers(&source_array.to_expr(), &loops[..k])?.length()
            }
            None => prefix.clone().length(),
        };
        lengths.push(length);
    }

    let mut conditions = Vec::with_capacity(m.conditions.len() + 1);
    for condition in &m.conditions {
        conditions.push(resolve_markers(condition, &loops)?);
    }

    let mut hits: Option<Param> = None;
    let inner = match &m.action {
        MutatorAction::Set(value) => Expr::Assign {
            target: Box::new(target_expr.clone()),
            value: Box::new(resolve_markers(value, &loops)?),
        },
        MutatorAction::Nullify => Expr::Assign {
            target: Box::new(target_expr.clone()),
            value: Box::new(Expr::null()),
        },
        MutatorAction::Disable
        | MutatorAction::Required { .. }
        | MutatorAction::Invalid { .. } => {
            if let MutatorAction::Required { .. } = &m.action {
                conditions.push(Expr::Unary {
                    op: UnOp::IsNullOrEmpty,
                    operand: Box::new(target_expr.clone()),
                });
            }
            let out = alloc(&mut next, "hits");
            hits = Some(out.clone());
            Expr::Append {
                list: Box::new(Expr::Param(out)),
                value: Box::new(Expr::NewList {
                    items: loops.iter().cloned().map(Expr::Param).collect(),
                }),
            }
        }
    };

    let mut body = match conjoin(conditions) {
        Some(test) => Expr::cond(test, inner, Expr::null()),
        None => inner,
    };
    for k in (0..hop_count).rev() {
        body = Expr::For {
            index: loops[k].clone(),
            length: Box::new(lengths[k].clone()),
            body: Box::new(body),
        };
    }
    if let Some(out) = hits {
        // Validators evaluate to the list of hit index vectors.
        body = Expr::Block {
            vars: vec![out.clone()],
            exprs: vec![
                Expr::Assign {
                    target: Box::new(Expr::Param(out.clone())),
                    value: Box::new(Expr::NewList { items: vec![] }),
                },
                body,
                Expr::Param(out),
            ],
        };
    }

    let body = eliminate(&body)?.expr;
    let body = extend_nulls(&body);
    Ok(Expr::Lambda {
        params: params.to_vec(),
        body: Box::new(body),
    })
}

fn conjoin(conditions: Vec<Expr>) -> Option<Expr> {
    let mut it = conditions.into_iter();
    let first = it.next()?;
    Some(it.fold(first, |acc, c| acc.and_(c)))
}

fn fresh_floor(params: &[Param], m: &MutatorDecl) -> u32 {
    let mut max = params.iter().map(|p| p.id).max().unwrap_or(0);
    max = max.max(m.target.root.id);
    for condition in &m.conditions {
        max = max.max(condition.max_param_id());
    }
    if let MutatorAction::Set(value) = &m.action {
        max = max.max(value.max_param_id());
    }
    max + 1
}

fn alloc(next: &mut u32, name: &str) -> Param {
    let id = *next;
    *next += 1;
    Param::new(id, name.to_string())
}

// ──────────────────────────────────────────────
// Marker resolution
// ──────────────────────────────────────────────

/// Replaces dangling `current()` / `current_index()` markers with the
/// enclosing target iteration's loop indices, ordinal by ordinal along
/// each chain spine.
pub(crate) fn resolve_markers(expr: &Expr, loops: &[Param]) -> Result<Expr, PlanError> {
    Ok(spine(expr, loops)?.0)
}

/// Rewrites one chain spine, returning the rewritten expression and
/// the number of target iterations the spine consumed.
fn spine(expr: &Expr, loops: &[Param]) -> Result<(Expr, usize), PlanError> {
    match expr {
        Expr::Member { object, name } => {
            let (object, k) = spine(object, loops)?;
            Ok((object.field(name.clone()), k))
        }
        Expr::Index { object, key } => {
            let (object, k) = spine(object, loops)?;
            let key = resolve_markers(key, loops)?;
            Ok((object.index_by(key), k))
        }
        Expr::Length(object) => {
            let (object, k) = spine(object, loops)?;
            Ok((object.length(), k))
        }
        Expr::Current(object) => {
            let (object, k) = spine(object, loops)?;
            let idx = loop_at(loops, k, expr)?;
            Ok((object.index_by(Expr::Param(idx)), k + 1))
        }
        Expr::CurrentIndex(object) => {
            // A trailing element marker binds the same hop as the
            // index itself.
            let inner = match object.as_ref() {
                Expr::Current(o) | Expr::Each(o) => o.as_ref(),
                other => other,
            };
            let (_, k) = spine(inner, loops)?;
            let idx = loop_at(loops, k, expr)?;
            Ok((Expr::Param(idx), k + 1))
        }
        Expr::Each(_) | Expr::TemplateIndex(_) => Err(PlanError::UnresolvedPlaceholder {
            path: render_chain(expr),
        }),
        other => {
            let mut err: Option<PlanError> = None;
            let out = map_children(other, &mut |child| match resolve_markers(child, loops) {
                Ok(rewritten) => rewritten,
                Err(e) => {
                    err.get_or_insert(e);
                    child.clone()
                }
            });
            match err {
                Some(e) => Err(e),
                None => Ok((out, 0)),
            }
        }
    }
}

fn loop_at(loops: &[Param], ordinal: usize, expr: &Expr) -> Result<Param, PlanError> {
    loops.get(ordinal).cloned().ok_or_else(|| {
        PlanError::Path(PathError::DanglingCurrent {
            position: ordinal,
            path: render_chain(expr),
        })
    })
}

fn render_chain(expr: &Expr) -> String {
    Path::from_expr(expr)
        .map(|p| p.to_string())
        .unwrap_or_else(|_| "<non-chain expression>".to_string())
}
