//! Sequence-operator elimination.
//!
//! Rewrites every tagged sequence operator into explicit indexed
//! iteration: conditionals, `For` loops, comparisons, and assignments
//! into hoisted locals. Every value a chain produces is paired with
//! the concrete index path that produced it, exposed through
//! [`IndexBinding`] locals, so later stages can map a result back to
//! its originating array slot.
//!
//! Source sequences, seeds, and probe values hoist into locals, and
//! every selector or predicate lambda body appears exactly once in the
//! generated tree, so embedded opaque calls run once per logical
//! invocation rather than once per rewritten branch.
//!
//! `FirstOrDefault` / `SingleOrDefault` over an empty or fully
//! filtered sequence yield index `-1` and `Null`. `First` / `Single`
//! over an empty sequence, and `Single*` with more than one match,
//! lower to `Fail` nodes that surface as invalid-operation failures at
//! execution time. Operators with no elimination rule (`GroupBy`) are
//! rejected here, never deferred to execution.

use crate::error::RewriteError;
use crate::expr::{Expr, Param, SeqOp};
use crate::path::Path;
use crate::subst::{map_children, substitute};

// ──────────────────────────────────────────────
// Results
// ──────────────────────────────────────────────

/// How an eliminated chain exposes originating indices.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexKind {
    /// Locals holding the index at each array hop of the selected
    /// element; `-1` when nothing was selected.
    Element { locals: Vec<Param> },
    /// A local holding, per produced element, the list of hop indices
    /// in production order.
    PerElement { local: Param },
}

/// Index-path pairing for one eliminated chain.
///
/// `sources[0]` is the base sequence path; later entries are the
/// `SelectMany` child sequence paths, each rooted at the selector's
/// own parameter. `None` where a source is not chain-shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexBinding {
    pub sources: Vec<Option<Path>>,
    pub kind: IndexKind,
}

/// An expression with every sequence operator lowered to loops.
#[derive(Debug, Clone, PartialEq)]
pub struct Eliminated {
    pub expr: Expr,
    pub index_locals: Vec<IndexBinding>,
}

/// Lowers every sequence operator in `expr` into explicit iteration.
pub fn eliminate(expr: &Expr) -> Result<Eliminated, RewriteError> {
    let mut el = Eliminator {
        next: expr.max_param_id() + 1,
        bindings: Vec::new(),
    };
    let body = el.rewrite(expr)?;

    // Index locals live in an outermost scope so callers can read
    // them after evaluation.
    let exposed: Vec<Param> = el
        .bindings
        .iter()
        .flat_map(|b| match &b.kind {
            IndexKind::Element { locals } => locals.clone(),
            IndexKind::PerElement { local } => vec![local.clone()],
        })
        .collect();
    let expr = if exposed.is_empty() {
        body
    } else {
        Expr::Block {
            vars: exposed,
            exprs: vec![body],
        }
    };
    Ok(Eliminated {
        expr,
        index_locals: el.bindings,
    })
}

// ──────────────────────────────────────────────
// Eliminator
// ──────────────────────────────────────────────

enum Terminal {
    Materialize,
    First { or_default: bool, pred: Option<Expr> },
    Single { or_default: bool, pred: Option<Expr> },
    Any { pred: Option<Expr> },
    All { pred: Expr },
    Sum { selector: Option<Expr> },
    Count { pred: Option<Expr> },
    Aggregate { seed: Expr, func: Expr },
    Contains { value: Expr },
}

/// Fresh locals allocated for one chain's terminal.
struct TermState {
    result: Option<Param>,
    flag: Option<Param>,
    acc: Option<Param>,
    out: Option<Param>,
    out_idx: Option<Param>,
    probe: Option<Param>,
    idx_locals: Vec<Param>,
}

impl TermState {
    fn empty() -> TermState {
        TermState {
            result: None,
            flag: None,
            acc: None,
            out: None,
            out_idx: None,
            probe: None,
            idx_locals: Vec::new(),
        }
    }

    /// Chain-internal locals, declared on the chain's own block.
    fn internal_vars(&self) -> Vec<Param> {
        [&self.result, &self.flag, &self.acc, &self.out, &self.probe]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }
}

struct Eliminator {
    next: u32,
    bindings: Vec<IndexBinding>,
}

impl Eliminator {
    fn fresh(&mut self, name: &str) -> Param {
        let id = self.next;
        self.next += 1;
        Param::new(id, name.to_string())
    }

    fn rewrite(&mut self, expr: &Expr) -> Result<Expr, RewriteError> {
        match expr {
            Expr::Seq { op, source, args } => self.rewrite_chain(*op, source, args),
            _ => self.try_map(expr),
        }
    }

    fn try_map(&mut self, expr: &Expr) -> Result<Expr, RewriteError> {
        let mut err: Option<RewriteError> = None;
        let out = map_children(expr, &mut |c| match self.rewrite(c) {
            Ok(x) => x,
            Err(e) => {
                if err.is_none() {
                    err = Some(e);
                }
                c.clone()
            }
        });
        match err {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }

    fn rewrite_chain(
        &mut self,
        op: SeqOp,
        source: &Expr,
        args: &[Expr],
    ) -> Result<Expr, RewriteError> {
        // Unwind intermediate stages off the source side.
        let mut stages: Vec<(SeqOp, Vec<Expr>)> = Vec::new();
        let mut base = source;
        while let Expr::Seq {
            op: sop,
            source: ssrc,
            args: sargs,
        } = base
        {
            if !is_stage(*sop) {
                break;
            }
            stages.push((*sop, sargs.clone()));
            base = ssrc;
        }
        stages.reverse();

        let arg0 = args.first().cloned();
        let terminal = match op {
            SeqOp::GroupBy => {
                return Err(RewriteError::UnsupportedOperator {
                    op: op.name().to_string(),
                })
            }
            SeqOp::Select | SeqOp::Where | SeqOp::SelectMany => {
                stages.push((op, args.to_vec()));
                Terminal::Materialize
            }
            SeqOp::First => Terminal::First {
                or_default: false,
                pred: arg0,
            },
            SeqOp::FirstOrDefault => Terminal::First {
                or_default: true,
                pred: arg0,
            },
            SeqOp::Single => Terminal::Single {
                or_default: false,
                pred: arg0,
            },
            SeqOp::SingleOrDefault => Terminal::Single {
                or_default: true,
                pred: arg0,
            },
            SeqOp::Any => Terminal::Any { pred: arg0 },
            SeqOp::All => Terminal::All {
                pred: expect_arg(op, arg0)?,
            },
            SeqOp::Sum => Terminal::Sum { selector: arg0 },
            SeqOp::Count => Terminal::Count { pred: arg0 },
            SeqOp::Aggregate => {
                let mut it = args.iter().cloned();
                let seed = expect_arg(op, it.next())?;
                let func = expect_arg(op, it.next())?;
                Terminal::Aggregate { seed, func }
            }
            SeqOp::Contains => Terminal::Contains {
                value: expect_arg(op, arg0)?,
            },
        };

        self.gen_chain(base, &stages, terminal)
    }

    fn gen_chain(
        &mut self,
        base: &Expr,
        stages: &[(SeqOp, Vec<Expr>)],
        terminal: Terminal,
    ) -> Result<Expr, RewriteError> {
        let hops = 1 + stages
            .iter()
            .filter(|(op, _)| *op == SeqOp::SelectMany)
            .count();
        let sources = chain_sources(base, stages);

        let base_rw = self.rewrite(base)?;
        let src = self.fresh("src");

        let mut state = TermState::empty();
        let mut init: Vec<Expr> = Vec::new();
        match &terminal {
            Terminal::Materialize => {
                let out = self.fresh("out");
                let out_idx = self.fresh("out_idx");
                init.push(assign(&out, Expr::NewList { items: vec![] }));
                init.push(assign(&out_idx, Expr::NewList { items: vec![] }));
                state.out = Some(out);
                state.out_idx = Some(out_idx.clone());
                self.bindings.push(IndexBinding {
                    sources: sources.clone(),
                    kind: IndexKind::PerElement { local: out_idx },
                });
            }
            Terminal::First { .. } | Terminal::Single { .. } => {
                let result = self.fresh("found_value");
                let flag = self.fresh(match terminal {
                    Terminal::Single { .. } => "match_count",
                    _ => "found",
                });
                init.push(assign(&result, Expr::null()));
                init.push(match terminal {
                    Terminal::Single { .. } => assign(&flag, Expr::int(0)),
                    _ => assign(&flag, Expr::boolean(false)),
                });
                let idx_locals: Vec<Param> =
                    (0..hops).map(|k| self.fresh(&format!("idx{}", k))).collect();
                for idx in &idx_locals {
                    init.push(assign(idx, Expr::int(-1)));
                }
                state.result = Some(result);
                state.flag = Some(flag);
                state.idx_locals = idx_locals.clone();
                self.bindings.push(IndexBinding {
                    sources: sources.clone(),
                    kind: IndexKind::Element { locals: idx_locals },
                });
            }
            Terminal::Any { .. } | Terminal::Contains { .. } => {
                let flag = self.fresh("found");
                init.push(assign(&flag, Expr::boolean(false)));
                state.flag = Some(flag);
                if let Terminal::Contains { value } = &terminal {
                    let probe = self.fresh("probe");
                    let value_rw = self.rewrite(value)?;
                    init.push(assign(&probe, value_rw));
                    state.probe = Some(probe);
                }
            }
            Terminal::All { .. } => {
                let flag = self.fresh("all_ok");
                init.push(assign(&flag, Expr::boolean(true)));
                state.flag = Some(flag);
            }
            Terminal::Sum { .. } | Terminal::Count { .. } => {
                let acc = self.fresh("acc");
                init.push(assign(&acc, Expr::int(0)));
                state.acc = Some(acc);
            }
            Terminal::Aggregate { seed, .. } => {
                let acc = self.fresh("acc");
                let seed_rw = self.rewrite(seed)?;
                init.push(assign(&acc, seed_rw));
                state.acc = Some(acc);
            }
        }

        // Loop nest.
        let i0 = self.fresh("i0");
        let elem = Expr::Param(src.clone()).index_by(Expr::Param(i0.clone()));
        let mut idx_chain = vec![Expr::Param(i0.clone())];
        let loop_body = self.apply_stages(elem, stages, &mut idx_chain, &terminal, &state)?;
        let for_loop = Expr::For {
            index: i0,
            length: Box::new(Expr::Param(src.clone()).length()),
            body: Box::new(loop_body),
        };

        // Post-loop checks and result.
        let mut exprs = vec![assign(&src, base_rw)];
        exprs.extend(init);
        exprs.push(for_loop);
        match &terminal {
            Terminal::First { or_default: false, .. } => {
                let flag = local(&state.flag);
                exprs.push(Expr::cond(
                    Expr::Param(flag).not_(),
                    Expr::Fail {
                        message: "sequence contains no matching element".to_string(),
                    },
                    Expr::null(),
                ));
            }
            Terminal::Single { or_default: false, .. } => {
                let count = local(&state.flag);
                exprs.push(Expr::cond(
                    Expr::Param(count).eq_(Expr::int(0)),
                    Expr::Fail {
                        message: "sequence contains no matching element".to_string(),
                    },
                    Expr::null(),
                ));
            }
            _ => {}
        }
        let result = match &terminal {
            Terminal::Materialize => Expr::Param(local(&state.out)),
            Terminal::First { .. } | Terminal::Single { .. } => {
                Expr::Param(local(&state.result))
            }
            Terminal::Any { .. } | Terminal::All { .. } | Terminal::Contains { .. } => {
                Expr::Param(local(&state.flag))
            }
            Terminal::Sum { .. } | Terminal::Count { .. } | Terminal::Aggregate { .. } => {
                Expr::Param(local(&state.acc))
            }
        };
        exprs.push(result);

        let mut vars = vec![src];
        vars.extend(state.internal_vars());
        Ok(Expr::Block { vars, exprs })
    }

    /// Builds the per-element body: stage wrappers from the outside
    /// in, the terminal action at the innermost position.
    fn apply_stages(
        &mut self,
        elem: Expr,
        stages: &[(SeqOp, Vec<Expr>)],
        idx_chain: &mut Vec<Expr>,
        terminal: &Terminal,
        state: &TermState,
    ) -> Result<Expr, RewriteError> {
        let Some(((op, args), rest)) = stages.split_first() else {
            return self.terminal_body(elem, idx_chain, terminal, state);
        };
        match op {
            SeqOp::Where => {
                let pred = self.apply_lambda(*op, args, &[elem.clone()])?;
                let inner = self.apply_stages(elem, rest, idx_chain, terminal, state)?;
                Ok(Expr::cond(pred, inner, Expr::null()))
            }
            SeqOp::Select => {
                let cur = self.fresh("cur");
                let selected = self.apply_lambda(*op, args, &[elem])?;
                let inner =
                    self.apply_stages(Expr::Param(cur.clone()), rest, idx_chain, terminal, state)?;
                Ok(Expr::Block {
                    vars: vec![cur.clone()],
                    exprs: vec![assign(&cur, selected), inner],
                })
            }
            SeqOp::SelectMany => {
                let inner_list = self.fresh("inner");
                let selected = self.apply_lambda(*op, args, &[elem])?;
                let j = self.fresh("j");
                idx_chain.push(Expr::Param(j.clone()));
                let child = Expr::Param(inner_list.clone()).index_by(Expr::Param(j.clone()));
                let inner_body = self.apply_stages(child, rest, idx_chain, terminal, state)?;
                idx_chain.pop();
                Ok(Expr::Block {
                    vars: vec![inner_list.clone()],
                    exprs: vec![
                        assign(&inner_list, selected),
                        Expr::For {
                            index: j,
                            length: Box::new(Expr::Param(inner_list).length()),
                            body: Box::new(inner_body),
                        },
                    ],
                })
            }
            other => Err(RewriteError::UnsupportedOperator {
                op: other.name().to_string(),
            }),
        }
    }

    fn terminal_body(
        &mut self,
        elem: Expr,
        idx_chain: &[Expr],
        terminal: &Terminal,
        state: &TermState,
    ) -> Result<Expr, RewriteError> {
        match terminal {
            Terminal::Materialize => {
                let out = local(&state.out);
                let out_idx = local(&state.out_idx);
                Ok(Expr::Block {
                    vars: vec![],
                    exprs: vec![
                        Expr::Append {
                            list: Box::new(Expr::Param(out)),
                            value: Box::new(elem),
                        },
                        Expr::Append {
                            list: Box::new(Expr::Param(out_idx)),
                            value: Box::new(Expr::NewList {
                                items: idx_chain.to_vec(),
                            }),
                        },
                    ],
                })
            }
            Terminal::First { pred, .. } => {
                let result = local(&state.result);
                let found = local(&state.flag);
                let mut hit = vec![assign(&result, elem.clone())];
                for (idx, value) in state.idx_locals.iter().zip(idx_chain.iter()) {
                    hit.push(assign(idx, value.clone()));
                }
                hit.push(assign(&found, Expr::boolean(true)));
                let hit = Expr::Block {
                    vars: vec![],
                    exprs: hit,
                };
                let body = match pred {
                    Some(lam) => {
                        let test = self.apply_lambda(SeqOp::First, std::slice::from_ref(lam), &[elem])?;
                        Expr::cond(test, hit, Expr::null())
                    }
                    None => hit,
                };
                // Keep the first match: once found, later elements are
                // skipped.
                Ok(Expr::cond(Expr::Param(found).not_(), body, Expr::null()))
            }
            Terminal::Single { pred, .. } => {
                let result = local(&state.result);
                let count = local(&state.flag);
                let mut hit = vec![assign(&result, elem.clone())];
                for (idx, value) in state.idx_locals.iter().zip(idx_chain.iter()) {
                    hit.push(assign(idx, value.clone()));
                }
                hit.push(assign(&count, Expr::Param(count.clone()).add(Expr::int(1))));
                let hit = Expr::Block {
                    vars: vec![],
                    exprs: hit,
                };
                let ambiguity_checked = Expr::cond(
                    Expr::Param(count.clone()).gt(Expr::int(0)),
                    Expr::Fail {
                        message: "sequence contains more than one matching element".to_string(),
                    },
                    hit,
                );
                Ok(match pred {
                    Some(lam) => {
                        let test = self.apply_lambda(SeqOp::Single, std::slice::from_ref(lam), &[elem])?;
                        Expr::cond(test, ambiguity_checked, Expr::null())
                    }
                    None => ambiguity_checked,
                })
            }
            Terminal::Any { pred } => {
                let found = local(&state.flag);
                let hit = assign(&found, Expr::boolean(true));
                let body = match pred {
                    Some(lam) => {
                        let test = self.apply_lambda(SeqOp::Any, std::slice::from_ref(lam), &[elem])?;
                        Expr::cond(test, hit, Expr::null())
                    }
                    None => hit,
                };
                Ok(Expr::cond(Expr::Param(found).not_(), body, Expr::null()))
            }
            Terminal::All { pred } => {
                let ok = local(&state.flag);
                let test = self.apply_lambda(SeqOp::All, std::slice::from_ref(pred), &[elem])?;
                Ok(Expr::cond(
                    test,
                    Expr::null(),
                    assign(&ok, Expr::boolean(false)),
                ))
            }
            Terminal::Sum { selector } => {
                let acc = local(&state.acc);
                let term = match selector {
                    Some(lam) => self.apply_lambda(SeqOp::Sum, std::slice::from_ref(lam), &[elem])?,
                    None => elem,
                };
                Ok(assign(&acc, Expr::Param(acc.clone()).add(term)))
            }
            Terminal::Count { pred } => {
                let acc = local(&state.acc);
                let bump = assign(&acc, Expr::Param(acc.clone()).add(Expr::int(1)));
                Ok(match pred {
                    Some(lam) => {
                        let test = self.apply_lambda(SeqOp::Count, std::slice::from_ref(lam), &[elem])?;
                        Expr::cond(test, bump, Expr::null())
                    }
                    None => bump,
                })
            }
            Terminal::Aggregate { func, .. } => {
                let acc = local(&state.acc);
                let folded = self.apply_lambda(
                    SeqOp::Aggregate,
                    std::slice::from_ref(func),
                    &[Expr::Param(acc.clone()), elem],
                )?;
                Ok(assign(&acc, folded))
            }
            Terminal::Contains { .. } => {
                let found = local(&state.flag);
                let probe = local(&state.probe);
                let hit = Expr::cond(
                    elem.eq_(Expr::Param(probe)),
                    assign(&found, Expr::boolean(true)),
                    Expr::null(),
                );
                Ok(Expr::cond(Expr::Param(found).not_(), hit, Expr::null()))
            }
        }
    }

    /// Eliminates nested operators inside a lambda body, then
    /// substitutes the actuals for its parameters. Each lambda body
    /// lands in exactly one place in the generated tree.
    fn apply_lambda(
        &mut self,
        op: SeqOp,
        args: &[Expr],
        actuals: &[Expr],
    ) -> Result<Expr, RewriteError> {
        let lam = args.first().ok_or_else(|| RewriteError::ExpectedLambda {
            op: op.name().to_string(),
        })?;
        match lam {
            Expr::Lambda { params, body } if params.len() == actuals.len() => {
                let mut out = self.rewrite(body)?;
                for (p, actual) in params.iter().zip(actuals.iter()) {
                    out = substitute(&out, p.id, actual);
                }
                Ok(out)
            }
            Expr::Lambda { params, .. } => Err(RewriteError::LambdaArity {
                op: op.name().to_string(),
                expected: actuals.len(),
                got: params.len(),
            }),
            _ => Err(RewriteError::ExpectedLambda {
                op: op.name().to_string(),
            }),
        }
    }
}

fn is_stage(op: SeqOp) -> bool {
    matches!(op, SeqOp::Select | SeqOp::SelectMany | SeqOp::Where)
}

fn expect_arg(op: SeqOp, arg: Option<Expr>) -> Result<Expr, RewriteError> {
    arg.ok_or_else(|| RewriteError::ExpectedLambda {
        op: op.name().to_string(),
    })
}

fn assign(target: &Param, value: Expr) -> Expr {
    Expr::Assign {
        target: Box::new(Expr::Param(target.clone())),
        value: Box::new(value),
    }
}

/// Base and `SelectMany` child sequence paths, where chain-shaped.
fn chain_sources(base: &Expr, stages: &[(SeqOp, Vec<Expr>)]) -> Vec<Option<Path>> {
    let mut sources = vec![Path::from_expr(base).ok()];
    for (op, args) in stages {
        if *op == SeqOp::SelectMany {
            let child = args.first().and_then(|lam| match lam {
                Expr::Lambda { body, .. } => Path::from_expr(body).ok(),
                _ => None,
            });
            sources.push(child);
        }
    }
    sources
}

/// Internal invariant: gen_chain allocates every local its terminal
/// reads before building the loop body.
fn local(slot: &Option<Param>) -> Param {
    match slot {
        Some(p) => p.clone(),
        None => unreachable!("terminal state local missing"),
    }
}
