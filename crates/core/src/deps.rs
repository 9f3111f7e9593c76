//! Dependency extraction.
//!
//! Derives the minimal deduplicated set of abstract paths an
//! expression reads. Chains contribute their full leaf path (never the
//! prefixes); sequence-operator lambda bodies contribute paths scoped
//! under the source's `each()` placeholder, in addition to the source
//! sequence path itself; constants contribute nothing.
//!
//! Marker kinds are preserved: a `current()` written in a chain stays
//! `current()` (a read of the enclosing iteration's own element), while
//! operator-introduced element reads carry `each()` (a read over any
//! element). Consumers that only care about the element family collapse
//! the two through [`Path::canonical`].
//!
//! Extraction runs on declared expressions, before elimination.
//! Under-reporting here would poison the dependency graph built on
//! top, so anything without an extraction rule (`GroupBy`) fails
//! loudly instead.

use std::collections::{BTreeSet, HashMap};

use crate::error::RewriteError;
use crate::expr::{Expr, Param, SeqOp};
use crate::path::{Path, Step};
use crate::value::Value;

/// Extracts the abstract paths read by `expr`.
///
/// Free parameters are data roots. A top-level lambda's parameters are
/// treated as roots as well, so both bare bodies and whole lambdas
/// extract the same set.
pub fn extract_dependencies(expr: &Expr) -> Result<BTreeSet<Path>, RewriteError> {
    let mut ex = Extractor {
        deps: BTreeSet::new(),
        scopes: HashMap::new(),
    };
    let body = match expr {
        Expr::Lambda { body, .. } => body.as_ref(),
        other => other,
    };
    ex.flush(body)?;
    Ok(ex.deps)
}

struct Extractor {
    deps: BTreeSet<Path>,
    /// Sequence-lambda bindings: parameter id to the element path it
    /// stands for, or `None` for opaque bindings (fold accumulators).
    scopes: HashMap<u32, Option<Path>>,
}

impl Extractor {
    fn add(&mut self, path: Path) {
        self.deps.insert(path);
    }

    /// Extracts `expr`; if it is path-shaped, records the path as read.
    fn flush(&mut self, expr: &Expr) -> Result<(), RewriteError> {
        if let Some(path) = self.extract(expr)? {
            self.add(path);
        }
        Ok(())
    }

    /// Walks `expr`, recording reads. Returns the path `expr` denotes
    /// when it is chain-shaped in the current scope, so callers can
    /// keep extending the chain instead of flushing a prefix.
    fn extract(&mut self, expr: &Expr) -> Result<Option<Path>, RewriteError> {
        match expr {
            Expr::Param(p) => match self.scopes.get(&p.id) {
                Some(binding) => Ok(binding.clone()),
                None => Ok(Some(Path::new(p.clone(), Vec::new()))),
            },
            Expr::Const(_) => Ok(None),

            Expr::Member { object, name } => Ok(self
                .extract(object)?
                .map(|p| extend(p, Step::Field(name.clone())))),
            Expr::Index { object, key } => match key.as_ref() {
                Expr::Const(Value::Int(i)) => {
                    Ok(self.extract(object)?.map(|p| extend(p, Step::At(*i))))
                }
                Expr::Const(Value::Text(s)) => Ok(self
                    .extract(object)?
                    .map(|p| extend(p, Step::Key(s.clone())))),
                computed => {
                    // Computed key: the array itself is read, plus
                    // whatever the key expression reads.
                    self.flush(object)?;
                    self.flush(computed)?;
                    Ok(None)
                }
            },
            Expr::Length(object) => {
                // Reading a length is a read of the array.
                self.flush(object)?;
                Ok(None)
            }

            Expr::Each(object) => Ok(self.extract(object)?.map(|p| extend(p, Step::Each))),
            Expr::Current(object) => Ok(self.extract(object)?.map(|p| extend(p, Step::Current))),
            Expr::TemplateIndex(object) => Ok(self
                .extract(object)?
                .map(|p| extend(p, Step::TemplateIndex))),
            Expr::CurrentIndex(object) => {
                // Iteration position only: no element field is read. A
                // trailing element marker on the object collapses; the
                // index belongs to that same hop.
                match self.extract(object)? {
                    Some(mut p) => {
                        if matches!(p.steps.last(), Some(Step::Each | Step::Current)) {
                            p.steps.pop();
                        }
                        self.add(extend(p, Step::CurrentIndex));
                    }
                    None => {}
                }
                Ok(None)
            }

            Expr::Seq { op, source, args } => self.extract_seq(*op, source, args),

            Expr::Call { args, .. } => {
                for arg in args {
                    self.flush(arg)?;
                }
                Ok(None)
            }
            Expr::Binary { left, right, .. } => {
                self.flush(left)?;
                self.flush(right)?;
                Ok(None)
            }
            Expr::Unary { operand, .. } => {
                self.flush(operand)?;
                Ok(None)
            }
            Expr::Cond {
                test,
                if_true,
                if_false,
            } => {
                self.flush(test)?;
                self.flush(if_true)?;
                self.flush(if_false)?;
                Ok(None)
            }
            Expr::NewRecord { fields } => {
                for (_, f) in fields {
                    self.flush(f)?;
                }
                Ok(None)
            }
            Expr::NewList { items } => {
                for item in items {
                    self.flush(item)?;
                }
                Ok(None)
            }
            Expr::Lambda { params, body } => {
                let saved = self.bind(params, vec![None; params.len()]);
                self.flush(body)?;
                self.restore(params, saved);
                Ok(None)
            }

            // Lowered forms: reads flow through values and lengths;
            // assignment targets are writes, not reads.
            Expr::Block { exprs, .. } => {
                for e in exprs {
                    self.flush(e)?;
                }
                Ok(None)
            }
            Expr::Assign { value, .. } => {
                self.flush(value)?;
                Ok(None)
            }
            Expr::For { length, body, .. } => {
                self.flush(length)?;
                self.flush(body)?;
                Ok(None)
            }
            Expr::Append { value, .. } => {
                self.flush(value)?;
                Ok(None)
            }
            Expr::Break | Expr::Fail { .. } => Ok(None),
        }
    }

    fn extract_seq(
        &mut self,
        op: SeqOp,
        source: &Expr,
        args: &[Expr],
    ) -> Result<Option<Path>, RewriteError> {
        if op == SeqOp::GroupBy {
            return Err(RewriteError::UnsupportedOperator {
                op: op.name().to_string(),
            });
        }

        let source_path = self.extract(source)?;
        // The operand sequence itself is a read.
        if let Some(p) = &source_path {
            self.add(p.clone());
        }
        let element = source_path.as_ref().map(|p| extend(p.clone(), Step::Each));

        match op {
            SeqOp::Where => {
                self.lambda_body(op, args.first(), &[element.clone()])?;
                Ok(source_path)
            }
            SeqOp::Select => {
                let body_path = self.lambda_body(op, args.first(), &[element])?;
                Ok(body_path)
            }
            SeqOp::SelectMany => {
                let body_path = self.lambda_body(op, args.first(), &[element])?;
                Ok(body_path)
            }
            SeqOp::First | SeqOp::FirstOrDefault | SeqOp::Single | SeqOp::SingleOrDefault => {
                if let Some(pred) = args.first() {
                    self.lambda_body(op, Some(pred), &[element.clone()])?;
                }
                Ok(element)
            }
            SeqOp::Any | SeqOp::All | SeqOp::Count => {
                if let Some(pred) = args.first() {
                    self.lambda_body(op, Some(pred), &[element])?;
                }
                Ok(None)
            }
            SeqOp::Sum => {
                if let Some(sel) = args.first() {
                    self.lambda_body(op, Some(sel), &[element])?;
                }
                Ok(None)
            }
            SeqOp::Aggregate => {
                let mut it = args.iter();
                if let Some(seed) = it.next() {
                    self.flush(seed)?;
                }
                if let Some(func) = it.next() {
                    // Accumulator binds opaquely, the element binds to
                    // the scoped path.
                    self.lambda_body(op, Some(func), &[None, element])?;
                }
                Ok(None)
            }
            SeqOp::Contains => {
                if let Some(value) = args.first() {
                    self.flush(value)?;
                }
                Ok(None)
            }
            SeqOp::GroupBy => unreachable!("rejected above"),
        }
    }

    /// Extracts a lambda body with its parameters bound to the given
    /// element paths (or opaquely). Returns the body's own path when
    /// it is chain-shaped, for `Select`/`SelectMany` result chaining.
    fn lambda_body(
        &mut self,
        op: SeqOp,
        lam: Option<&Expr>,
        bindings: &[Option<Path>],
    ) -> Result<Option<Path>, RewriteError> {
        let lam = lam.ok_or_else(|| RewriteError::ExpectedLambda {
            op: op.name().to_string(),
        })?;
        match lam {
            Expr::Lambda { params, body } if params.len() == bindings.len() => {
                let saved = self.bind(params, bindings.to_vec());
                let body_path = self.extract(body)?;
                if body_path.is_none() {
                    // Already flushed piecewise during extraction.
                } else if matches!(op, SeqOp::Select | SeqOp::SelectMany) {
                    // The chain continues through the selector result;
                    // the caller decides what becomes a leaf.
                } else if let Some(p) = &body_path {
                    self.add(p.clone());
                }
                self.restore(params, saved);
                Ok(body_path)
            }
            Expr::Lambda { params, .. } => Err(RewriteError::LambdaArity {
                op: op.name().to_string(),
                expected: bindings.len(),
                got: params.len(),
            }),
            _ => Err(RewriteError::ExpectedLambda {
                op: op.name().to_string(),
            }),
        }
    }

    fn bind(
        &mut self,
        params: &[Param],
        bindings: Vec<Option<Path>>,
    ) -> Vec<Option<Option<Path>>> {
        params
            .iter()
            .zip(bindings)
            .map(|(p, b)| self.scopes.insert(p.id, b))
            .collect()
    }

    fn restore(&mut self, params: &[Param], saved: Vec<Option<Option<Path>>>) {
        for (p, prev) in params.iter().zip(saved) {
            match prev {
                Some(b) => {
                    self.scopes.insert(p.id, b);
                }
                None => {
                    self.scopes.remove(&p.id);
                }
            }
        }
    }
}

fn extend(mut path: Path, step: Step) -> Path {
    path.steps.push(step);
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(expr: &Expr) -> Vec<String> {
        extract_dependencies(expr)
            .unwrap()
            .into_iter()
            .map(|p| p.to_string())
            .collect()
    }

    #[test]
    fn chain_contributes_leaf_only() {
        let expr = Expr::param(0, "a").field("B").field("C");
        assert_eq!(paths(&expr), vec!["a.B.C"]);
    }

    #[test]
    fn binary_flushes_both_sides() {
        let expr = Expr::param(0, "a")
            .field("X")
            .gt(Expr::param(0, "a").field("Y"));
        assert_eq!(paths(&expr), vec!["a.X", "a.Y"]);
    }

    #[test]
    fn constants_contribute_nothing() {
        let expr = Expr::param(0, "a").field("X").gt(Expr::int(5));
        assert_eq!(paths(&expr), vec!["a.X"]);
    }

    #[test]
    fn where_scopes_lambda_under_each() {
        let pred = Expr::lambda(
            vec![Param::new(5, "x")],
            Expr::param(5, "x").field("P").gt(Expr::int(0)),
        );
        let expr = Expr::param(0, "a").field("Items").where_(pred).count(None);
        let got = paths(&expr);
        assert!(got.contains(&"a.Items".to_string()), "{:?}", got);
        assert!(got.contains(&"a.Items.each().P".to_string()), "{:?}", got);
    }

    #[test]
    fn first_result_chains_into_leaf() {
        let expr = Expr::param(0, "a")
            .field("Items")
            .first_or_default(None)
            .field("X");
        let got = paths(&expr);
        assert!(got.contains(&"a.Items.each().X".to_string()), "{:?}", got);
    }

    #[test]
    fn current_marker_survives_extraction() {
        let expr = Expr::param(0, "a").field("B").current().field("Z");
        assert_eq!(paths(&expr), vec!["a.B.current().Z"]);
    }

    #[test]
    fn current_index_marks_the_hop_not_the_element() {
        let expr = Expr::param(0, "a").field("B").current().current_index();
        assert_eq!(paths(&expr), vec!["a.B.current_index()"]);

        let bare = Expr::param(0, "a").field("B").current_index();
        assert_eq!(paths(&bare), vec!["a.B.current_index()"]);
    }

    #[test]
    fn construction_unions_argument_deps() {
        let expr = Expr::NewRecord {
            fields: vec![
                ("x".to_string(), Expr::param(0, "a").field("X")),
                ("y".to_string(), Expr::param(0, "a").field("Y")),
            ],
        };
        assert_eq!(paths(&expr), vec!["a.X", "a.Y"]);
    }

    #[test]
    fn group_by_fails_extraction() {
        let expr = Expr::seq(
            SeqOp::GroupBy,
            Expr::param(0, "a").field("Items"),
            vec![],
        );
        assert!(matches!(
            extract_dependencies(&expr),
            Err(RewriteError::UnsupportedOperator { .. })
        ));
    }

    #[test]
    fn aggregate_binds_accumulator_opaquely() {
        let func = Expr::lambda(
            vec![Param::new(5, "acc"), Param::new(6, "x")],
            Expr::param(5, "acc").add(Expr::param(6, "x").field("V")),
        );
        let expr = Expr::param(0, "a")
            .field("Items")
            .aggregate(Expr::int(0), func);
        let got = paths(&expr);
        assert!(got.contains(&"a.Items".to_string()));
        assert!(got.contains(&"a.Items.each().V".to_string()));
        // The accumulator itself must not read as a root.
        assert_eq!(got.len(), 2, "{:?}", got);
    }

    #[test]
    fn select_sum_reads_selected_leaves() {
        let sel = Expr::lambda(vec![Param::new(5, "x")], Expr::param(5, "x").field("D"));
        let expr = Expr::param(0, "a").field("Items").select(sel).sum(None);
        let got = paths(&expr);
        assert!(got.contains(&"a.Items.each().D".to_string()), "{:?}", got);
    }
}
