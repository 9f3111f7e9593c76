//! Lambda composition.
//!
//! `merge` chains a `Root→Mid` lambda with a `Mid→Leaf` lambda into a
//! single `Root→Leaf` lambda by parameter substitution.
//! `merge_from_two_roots` combines two lambdas over independent roots
//! into one two-parameter lambda.

use crate::error::RewriteError;
use crate::expr::{BinOp, Expr};
use crate::subst::{rename_binders, substitute};

/// Composes `a: Root→Mid` with `b: Mid→Leaf` into `Root→Leaf`.
///
/// When `b` is the identity lambda, `a` is returned unchanged. Binders
/// inside `b` that collide with ids from `a` are renamed first.
pub fn merge(a: &Expr, b: &Expr) -> Result<Expr, RewriteError> {
    let (a_params, a_body) = unpack_unary(a, "merge")?;
    if b.is_identity_lambda() {
        return Ok(a.clone());
    }
    let (b_params, b_body) = unpack_unary(b, "merge")?;

    let mut next = a.max_param_id().max(b.max_param_id()) + 1;
    let mut body = b_body.clone();
    for p in &a_params {
        if p.id != b_params[0].id {
            body = rename_binders(&body, p.id, &mut next);
        }
    }
    let body = substitute(&body, b_params[0].id, &a_body);
    Ok(Expr::Lambda {
        params: a_params,
        body: Box::new(body),
    })
}

/// Combines two single-parameter lambdas over independent roots into
/// one two-parameter lambda whose body joins both bodies with `op`.
pub fn merge_from_two_roots(a: &Expr, b: &Expr, op: BinOp) -> Result<Expr, RewriteError> {
    let (a_params, a_body) = unpack_unary(a, "merge_from_two_roots")?;
    let (b_params, b_body) = unpack_unary(b, "merge_from_two_roots")?;

    let mut b_body = b_body;
    let mut b_param = b_params[0].clone();
    if b_param.id == a_params[0].id {
        // Same id on independent roots: give b's root a fresh identity.
        let mut next = a.max_param_id().max(b.max_param_id()) + 1;
        let fresh_id = next;
        next += 1;
        let fresh = crate::expr::Param::new(fresh_id, b_param.name.clone());
        b_body = substitute(&b_body, b_param.id, &Expr::Param(fresh.clone()));
        b_body = rename_binders(&b_body, b_param.id, &mut next);
        b_param = fresh;
    }

    Ok(Expr::Lambda {
        params: vec![a_params[0].clone(), b_param],
        body: Box::new(Expr::binary(op, a_body, b_body)),
    })
}

fn unpack_unary(
    expr: &Expr,
    op: &str,
) -> Result<(Vec<crate::expr::Param>, Expr), RewriteError> {
    match expr {
        Expr::Lambda { params, body } if params.len() == 1 => {
            Ok((params.clone(), body.as_ref().clone()))
        }
        Expr::Lambda { params, .. } => Err(RewriteError::LambdaArity {
            op: op.to_string(),
            expected: 1,
            got: params.len(),
        }),
        _ => Err(RewriteError::ExpectedLambda { op: op.to_string() }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Param;

    #[test]
    fn merge_chains_paths() {
        // a: |x| x.B    b: |m| m.C    =>    |x| x.B.C
        let a = Expr::lambda(vec![Param::new(0, "x")], Expr::param(0, "x").field("B"));
        let b = Expr::lambda(vec![Param::new(1, "m")], Expr::param(1, "m").field("C"));
        let merged = merge(&a, &b).unwrap();
        assert_eq!(
            merged,
            Expr::lambda(vec![Param::new(0, "x")], Expr::param(0, "x").field("B").field("C"))
        );
    }

    #[test]
    fn merge_identity_returns_left_unchanged() {
        let a = Expr::lambda(vec![Param::new(0, "x")], Expr::param(0, "x").field("B"));
        let ident = Expr::lambda(vec![Param::new(1, "m")], Expr::param(1, "m"));
        assert_eq!(merge(&a, &ident).unwrap(), a);
    }

    #[test]
    fn merge_rejects_non_lambda() {
        let a = Expr::param(0, "x").field("B");
        let b = Expr::lambda(vec![Param::new(1, "m")], Expr::param(1, "m").field("C"));
        assert!(matches!(
            merge(&a, &b),
            Err(RewriteError::ExpectedLambda { .. })
        ));
    }

    #[test]
    fn two_roots_produce_two_parameter_lambda() {
        let a = Expr::lambda(
            vec![Param::new(0, "src")],
            Expr::param(0, "src").field("X").gt(Expr::int(0)),
        );
        let b = Expr::lambda(
            vec![Param::new(0, "dst")],
            Expr::param(0, "dst").field("Y").gt(Expr::int(1)),
        );
        let merged = merge_from_two_roots(&a, &b, BinOp::And).unwrap();
        match &merged {
            Expr::Lambda { params, body } => {
                assert_eq!(params.len(), 2);
                assert_eq!(params[0].id, 0);
                assert_ne!(params[1].id, 0, "second root must get its own identity");
                match body.as_ref() {
                    Expr::Binary { op: BinOp::And, .. } => {}
                    other => panic!("expected And, got {:?}", other),
                }
            }
            other => panic!("expected lambda, got {:?}", other),
        }
    }
}
