//! Canonicalization and shape hashing.
//!
//! `canonicalize` extracts every constant and every independently
//! evaluable pure subtree out of an expression into a flat slot list,
//! leaving a closure-free shape whose parameters are renumbered and
//! renamed canonically. Two declarations that differ only in captured
//! values produce the same shape, so they share one compiled function.
//!
//! The shape is hashed by digesting its canonical JSON encoding, the
//! same way bundle etags are computed elsewhere in this workspace's
//! lineage: serialize, digest, compare.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::expr::{Expr, Param};
use crate::subst::map_children;

/// A closure-free shape plus the subtrees extracted from it.
///
/// `shape` is always a lambda; its parameter list is the slot
/// parameters (one per extracted subtree, in extraction order)
/// followed by the original lambda's parameters. Callers evaluate
/// `extracted[i]` to produce the argument for slot `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalForm {
    pub shape: Expr,
    pub extracted: Vec<Expr>,
}

impl CanonicalForm {
    /// Number of extracted slots preceding the original parameters.
    pub fn slot_count(&self) -> usize {
        self.extracted.len()
    }
}

/// Extracts constants and independent pure subtrees, then renumbers
/// every parameter in first-use order under canonical names.
pub fn canonicalize(expr: &Expr) -> CanonicalForm {
    let (params, body) = match expr {
        Expr::Lambda { params, body } => (params.clone(), body.as_ref().clone()),
        other => (Vec::new(), other.clone()),
    };

    let mut slots: Vec<Expr> = Vec::new();
    let mut slot_params: Vec<Param> = Vec::new();
    let mut next_tmp = expr.max_param_id() + 1;
    let body = extract(&body, &mut slots, &mut slot_params, &mut next_tmp);

    let mut all_params = slot_params;
    all_params.extend(params);
    let shape = Expr::Lambda {
        params: all_params,
        body: Box::new(body),
    };

    CanonicalForm {
        shape: renumber(&shape),
        extracted: slots,
    }
}

/// SHA-256 over the canonical JSON encoding of the shape.
pub fn shape_hash(form: &CanonicalForm) -> [u8; 32] {
    let encoded = serde_json::to_vec(&form.shape)
        .unwrap_or_else(|e| panic!("serialization error computing shape hash: {}", e));
    Sha256::digest(&encoded).into()
}

/// Hex rendering of the shape hash, for diagnostics and recordings.
pub fn shape_hash_hex(form: &CanonicalForm) -> String {
    let hash = shape_hash(form);
    let mut out = String::with_capacity(64);
    for byte in hash {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

// ──────────────────────────────────────────────
// Extraction
// ──────────────────────────────────────────────

fn extract(
    expr: &Expr,
    slots: &mut Vec<Expr>,
    slot_params: &mut Vec<Param>,
    next_tmp: &mut u32,
) -> Expr {
    if is_extractable(expr) {
        // Identical subtrees share one slot.
        if let Some(i) = slots.iter().position(|s| s == expr) {
            return Expr::Param(slot_params[i].clone());
        }
        let param = Param::new(*next_tmp, format!("c{}", slots.len()));
        *next_tmp += 1;
        slots.push(expr.clone());
        slot_params.push(param.clone());
        return Expr::Param(param);
    }
    map_children(expr, &mut |c| extract(c, slots, slot_params, next_tmp))
}

/// A subtree can move into a slot when it references no parameter and
/// consists only of pure value nodes, so evaluating it once up front
/// is indistinguishable from evaluating it in place.
fn is_extractable(expr: &Expr) -> bool {
    let mut ok = true;
    expr.walk(&mut |e| {
        ok &= matches!(
            e,
            Expr::Const(_)
                | Expr::Call { .. }
                | Expr::Binary { .. }
                | Expr::Unary { .. }
                | Expr::Cond { .. }
                | Expr::NewRecord { .. }
                | Expr::NewList { .. }
                | Expr::Member { .. }
                | Expr::Index { .. }
                | Expr::Length(_)
        );
    });
    ok
}

// ──────────────────────────────────────────────
// Canonical renumbering
// ──────────────────────────────────────────────

struct Renumber {
    next: u32,
    free: HashMap<u32, Param>,
    scopes: Vec<HashMap<u32, Param>>,
}

impl Renumber {
    fn alloc(&mut self) -> Param {
        let id = self.next;
        self.next += 1;
        Param::new(id, format!("p{}", id))
    }

    fn bind(&mut self, old: &Param) -> Param {
        let fresh = self.alloc();
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(old.id, fresh.clone());
        }
        fresh
    }

    fn lookup(&mut self, old: &Param) -> Param {
        for scope in self.scopes.iter().rev() {
            if let Some(p) = scope.get(&old.id) {
                return p.clone();
            }
        }
        if let Some(p) = self.free.get(&old.id) {
            return p.clone();
        }
        let fresh = self.alloc();
        self.free.insert(old.id, fresh.clone());
        fresh
    }

    fn rewrite(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Param(p) => Expr::Param(self.lookup(p)),
            Expr::Lambda { params, body } => {
                self.scopes.push(HashMap::new());
                let new_params = params.iter().map(|p| self.bind(p)).collect();
                let new_body = self.rewrite(body);
                self.scopes.pop();
                Expr::Lambda {
                    params: new_params,
                    body: Box::new(new_body),
                }
            }
            Expr::Block { vars, exprs } => {
                self.scopes.push(HashMap::new());
                let new_vars = vars.iter().map(|p| self.bind(p)).collect();
                let new_exprs = exprs.iter().map(|e| self.rewrite(e)).collect();
                self.scopes.pop();
                Expr::Block {
                    vars: new_vars,
                    exprs: new_exprs,
                }
            }
            Expr::For {
                index,
                length,
                body,
            } => {
                let new_length = self.rewrite(length);
                self.scopes.push(HashMap::new());
                let new_index = self.bind(index);
                let new_body = self.rewrite(body);
                self.scopes.pop();
                Expr::For {
                    index: new_index,
                    length: Box::new(new_length),
                    body: Box::new(new_body),
                }
            }
            other => map_children(other, &mut |c| self.rewrite(c)),
        }
    }
}

fn renumber(expr: &Expr) -> Expr {
    let mut r = Renumber {
        next: 0,
        free: HashMap::new(),
        scopes: Vec::new(),
    };
    r.rewrite(expr)
}
