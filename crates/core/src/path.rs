//! Path algebra over access chains.
//!
//! A `Path` is the flattened form of a pure access-chain expression:
//! an ordered run of steps from a single root parameter. Steps are
//! either concrete (a field name, a literal index or key) or abstract
//! (`each()` introducing a bound array position, `current()` /
//! `current_index()` referencing the nearest enclosing binding,
//! `template_index()` a shape-only placeholder).
//!
//! Dependency bookkeeping, sibling-element detection, and plan loop
//! binding all work on this form rather than on raw expressions.

use std::fmt;

use serde::Serialize;

use crate::error::PathError;
use crate::expr::{Expr, Param};

// ──────────────────────────────────────────────
// Steps
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Step {
    /// `.name` member access.
    Field(String),
    /// `["key"]` dictionary access.
    Key(String),
    /// `[3]` literal array index.
    At(i64),
    /// `.each()` -- iterated array position.
    Each,
    /// `.current()` -- element bound by the nearest enclosing `each()`.
    Current,
    /// `.current_index()` -- index bound by the nearest enclosing `each()`.
    CurrentIndex,
    /// `.template_index()` -- shape-only placeholder.
    TemplateIndex,
}

impl Step {
    /// True for the steps that occupy an array position.
    pub fn is_array_hop(&self) -> bool {
        matches!(
            self,
            Step::At(_) | Step::Each | Step::Current | Step::CurrentIndex | Step::TemplateIndex
        )
    }

    /// True for the abstract placeholder steps.
    pub fn is_abstract(&self) -> bool {
        matches!(
            self,
            Step::Each | Step::Current | Step::CurrentIndex | Step::TemplateIndex
        )
    }
}

// ──────────────────────────────────────────────
// Paths
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Path {
    pub root: Param,
    pub steps: Vec<Step>,
}

impl Path {
    pub fn new(root: Param, steps: Vec<Step>) -> Path {
        Path { root, steps }
    }

    /// Flattens a pure access-chain expression into a path.
    ///
    /// Anything that is not a chain of member/index/marker accesses
    /// over a single root parameter is rejected.
    pub fn from_expr(expr: &Expr) -> Result<Path, PathError> {
        let mut steps = Vec::new();
        let mut node = expr;
        loop {
            match node {
                Expr::Param(p) => {
                    steps.reverse();
                    return Ok(Path {
                        root: p.clone(),
                        steps,
                    });
                }
                Expr::Member { object, name } => {
                    steps.push(Step::Field(name.clone()));
                    node = object;
                }
                Expr::Index { object, key } => {
                    match key.as_ref() {
                        Expr::Const(crate::value::Value::Int(i)) => steps.push(Step::At(*i)),
                        Expr::Const(crate::value::Value::Text(s)) => {
                            steps.push(Step::Key(s.clone()))
                        }
                        other => {
                            return Err(PathError::NotAChain {
                                detail: format!("computed index key {:?}", other),
                            })
                        }
                    }
                    node = object;
                }
                Expr::Each(object) => {
                    steps.push(Step::Each);
                    node = object;
                }
                Expr::Current(object) => {
                    steps.push(Step::Current);
                    node = object;
                }
                Expr::CurrentIndex(object) => {
                    steps.push(Step::CurrentIndex);
                    node = object;
                }
                Expr::TemplateIndex(object) => {
                    steps.push(Step::TemplateIndex);
                    node = object;
                }
                other => {
                    return Err(PathError::NotAChain {
                        detail: format!("{} node in chain", node_kind(other)),
                    })
                }
            }
        }
    }

    /// Rebuilds the access-chain expression for this path.
    pub fn to_expr(&self) -> Expr {
        let mut expr = Expr::Param(self.root.clone());
        for step in &self.steps {
            expr = match step {
                Step::Field(name) => expr.field(name.clone()),
                Step::Key(key) => expr.key(key.clone()),
                Step::At(i) => expr.at(*i),
                Step::Each => expr.each(),
                Step::Current => expr.current(),
                Step::CurrentIndex => expr.current_index(),
                Step::TemplateIndex => expr.template_index(),
            };
        }
        expr
    }

    /// Build-time validity: every `current()` / `current_index()` must
    /// have an enclosing `each()` earlier in the path.
    pub fn validate(&self) -> Result<(), PathError> {
        let mut eaches = 0usize;
        for (i, step) in self.steps.iter().enumerate() {
            match step {
                Step::Each => eaches += 1,
                Step::Current | Step::CurrentIndex if eaches == 0 => {
                    return Err(PathError::DanglingCurrent {
                        position: i,
                        path: self.to_string(),
                    })
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Canonical form for dependency bookkeeping: `current()` reads the
    /// same element family as `each()`, so the two collapse.
    pub fn canonical(&self) -> Path {
        Path {
            root: self.root.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| match s {
                    Step::Current => Step::Each,
                    other => other.clone(),
                })
                .collect(),
        }
    }

    /// Number of abstract array hops (`each()`-family steps).
    pub fn marker_depth(&self) -> usize {
        self.steps.iter().filter(|s| s.is_abstract()).count()
    }

    /// For each abstract array hop, the path of the array it iterates
    /// (the prefix before the marker), in order of appearance.
    pub fn marker_arrays(&self) -> Vec<Path> {
        let mut arrays = Vec::new();
        for (i, step) in self.steps.iter().enumerate() {
            if step.is_abstract() {
                arrays.push(Path {
                    root: self.root.clone(),
                    steps: self.steps[..i].to_vec(),
                });
            }
        }
        arrays
    }

    /// True when one path is a prefix of the other modulo abstraction:
    /// an abstract array hop matches a literal index at the same
    /// position, and `each()` / `current()` / `template_index()` match
    /// each other. Paths over different roots never overlap.
    pub fn overlaps(&self, other: &Path) -> bool {
        if self.root.id != other.root.id {
            return false;
        }
        let a = self.canonical();
        let b = other.canonical();
        for (sa, sb) in a.steps.iter().zip(b.steps.iter()) {
            let matched = match (sa, sb) {
                (Step::Field(x), Step::Field(y)) => x == y,
                (Step::Key(x), Step::Key(y)) => x == y,
                (Step::At(x), Step::At(y)) => x == y,
                (x, y) if x.is_array_hop() && y.is_array_hop() => true,
                _ => false,
            };
            if !matched {
                return false;
            }
        }
        true
    }

    /// Resolves an abstract path against a concrete one.
    ///
    /// Walks both paths left-to-right. At each aligned array hop a
    /// placeholder in the abstract path takes the concrete literal
    /// index; an abstract literal index wins over the concrete one.
    /// After the first diverging field the remaining abstract steps are
    /// copied verbatim. A placeholder aligned with a field access is a
    /// shape mismatch; a `current()` left unresolved in the output is a
    /// dangling reference.
    pub fn resolve_abstract(concrete: &Path, abstract_: &Path) -> Result<Path, PathError> {
        let mut out: Vec<Step> = Vec::with_capacity(abstract_.steps.len());
        let mut ci = 0usize;
        let mut diverged = false;

        for (ai, astep) in abstract_.steps.iter().enumerate() {
            if diverged || ci >= concrete.steps.len() {
                out.push(astep.clone());
                continue;
            }
            let cstep = &concrete.steps[ci];
            match (cstep, astep) {
                (Step::Field(c), Step::Field(a)) if c == a => {
                    out.push(astep.clone());
                    ci += 1;
                }
                (Step::Field(_), Step::Field(a)) => {
                    diverged = true;
                    out.push(Step::Field(a.clone()));
                }
                (Step::Key(c), Step::Key(a)) if c == a => {
                    out.push(astep.clone());
                    ci += 1;
                }
                (Step::Key(_), Step::Key(a)) => {
                    diverged = true;
                    out.push(Step::Key(a.clone()));
                }
                // Aligned array hops: the concrete literal substitutes
                // for the abstract placeholder.
                (Step::At(i), a) if a.is_abstract() => {
                    out.push(Step::At(*i));
                    ci += 1;
                }
                // Abstract literal index at an aligned array hop wins.
                (c, Step::At(a)) if c.is_array_hop() => {
                    out.push(Step::At(*a));
                    ci += 1;
                }
                // Both still abstract: keep the concrete side's marker.
                (c, a) if c.is_abstract() && a.is_abstract() => {
                    out.push(c.clone());
                    ci += 1;
                }
                (c, a) => {
                    return Err(PathError::ShapeMismatch {
                        position: ai,
                        concrete: format!("{:?}", c),
                        abstract_: format!("{:?}", a),
                    })
                }
            }
        }

        let resolved = Path {
            root: concrete.root.clone(),
            steps: out,
        };
        resolved.validate()?;
        Ok(resolved)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root.name)?;
        for step in &self.steps {
            match step {
                Step::Field(name) => write!(f, ".{}", name)?,
                Step::Key(key) => write!(f, "[\"{}\"]", key)?,
                Step::At(i) => write!(f, "[{}]", i)?,
                Step::Each => write!(f, ".each()")?,
                Step::Current => write!(f, ".current()")?,
                Step::CurrentIndex => write!(f, ".current_index()")?,
                Step::TemplateIndex => write!(f, ".template_index()")?,
            }
        }
        Ok(())
    }
}

fn node_kind(expr: &Expr) -> &'static str {
    match expr {
        Expr::Param(_) => "parameter",
        Expr::Member { .. } => "member",
        Expr::Index { .. } => "index",
        Expr::Length(_) => "length",
        Expr::Each(_) => "each",
        Expr::Current(_) => "current",
        Expr::CurrentIndex(_) => "current-index",
        Expr::TemplateIndex(_) => "template-index",
        Expr::Seq { .. } => "sequence-operator",
        Expr::Call { .. } => "call",
        Expr::Binary { .. } => "binary",
        Expr::Unary { .. } => "unary",
        Expr::Cond { .. } => "conditional",
        Expr::Const(_) => "constant",
        Expr::NewRecord { .. } => "new-record",
        Expr::NewList { .. } => "new-list",
        Expr::Lambda { .. } => "lambda",
        Expr::Block { .. } => "block",
        Expr::Assign { .. } => "assign",
        Expr::For { .. } => "for",
        Expr::Break => "break",
        Expr::Append { .. } => "append",
        Expr::Fail { .. } => "fail",
    }
}
