//! Eliminated forms evaluate to the same results as the operators they
//! replace, including the empty-sequence defaults and the data-shape
//! faults the operators document.

use graft_core::{eliminate, Expr, Param, Value};
use graft_eval::{EvalError, Interp};

fn run(body: Expr, data: Value) -> Result<Value, EvalError> {
    let lowered = eliminate(&body).unwrap().expr;
    let lambda = Expr::lambda(vec![Param::new(0, "a")], lowered);
    let mut args = [data];
    Interp::new().eval_lambda(&lambda, &mut args)
}

fn items(values: &[i64]) -> Value {
    Value::list(
        values
            .iter()
            .map(|v| Value::record([("V", Value::Int(*v))]))
            .collect::<Vec<_>>(),
    )
}

fn source() -> Expr {
    Expr::param(0, "a").field("Items")
}

fn v_of(id: u32) -> Expr {
    Expr::lambda(
        vec![Param::new(id, "x")],
        Expr::param(id, "x").field("V"),
    )
}

fn v_gt(id: u32, threshold: i64) -> Expr {
    Expr::lambda(
        vec![Param::new(id, "x")],
        Expr::param(id, "x").field("V").gt(Expr::int(threshold)),
    )
}

fn data(values: &[i64]) -> Value {
    Value::record([("Items", items(values))])
}

#[test]
fn where_select_chain_matches_direct_evaluation() {
    let body = source().where_(v_gt(5, 0)).select(Expr::lambda(
        vec![Param::new(6, "x")],
        Expr::param(6, "x").field("V").mul(Expr::int(2)),
    ));
    let out = run(body, data(&[3, -1, 5])).unwrap();
    assert_eq!(out, Value::list([Value::Int(6), Value::Int(10)]));
}

#[test]
fn sum_and_count_accumulate() {
    let sum = source().sum(Some(v_of(5)));
    assert_eq!(run(sum, data(&[1, 2, 3])).unwrap(), Value::Int(6));

    let count = source().count(Some(v_gt(5, 1)));
    assert_eq!(run(count, data(&[1, 2, 3])).unwrap(), Value::Int(2));

    let empty_sum = source().sum(Some(v_of(5)));
    assert_eq!(run(empty_sum, data(&[])).unwrap(), Value::Int(0));
}

#[test]
fn any_and_all_short_circuit_results() {
    let any = source().any_(Some(v_gt(5, 10)));
    assert_eq!(run(any, data(&[1, 11])).unwrap(), Value::Bool(true));

    let none = source().any_(Some(v_gt(5, 100)));
    assert_eq!(run(none, data(&[1, 11])).unwrap(), Value::Bool(false));

    let all = source().all_(v_gt(5, 0));
    assert_eq!(run(all, data(&[1, 2])).unwrap(), Value::Bool(true));

    let not_all = source().all_(v_gt(5, 1));
    assert_eq!(run(not_all, data(&[1, 2])).unwrap(), Value::Bool(false));

    // Vacuous truth over the empty sequence.
    let vacuous = source().all_(v_gt(5, 100));
    assert_eq!(run(vacuous, data(&[])).unwrap(), Value::Bool(true));
}

#[test]
fn first_or_default_yields_match_or_null() {
    let found = source().first_or_default(Some(v_gt(5, 1)));
    assert_eq!(
        run(found, data(&[1, 2, 3])).unwrap(),
        Value::record([("V", Value::Int(2))])
    );

    let empty = source().first_or_default(Some(v_gt(5, 1)));
    assert_eq!(run(empty, data(&[])).unwrap(), Value::Null);

    let filtered_out = source().first_or_default(Some(v_gt(5, 100)));
    assert_eq!(run(filtered_out, data(&[1, 2])).unwrap(), Value::Null);
}

#[test]
fn first_on_empty_faults() {
    let first = source().first(None);
    assert!(matches!(
        run(first, data(&[])),
        Err(EvalError::InvalidOperation { .. })
    ));
}

#[test]
fn single_semantics() {
    let single = source().single(Some(v_gt(5, 2)));
    assert_eq!(
        run(single.clone(), data(&[1, 2, 3])).unwrap(),
        Value::record([("V", Value::Int(3))])
    );

    // More than one match is ambiguous.
    assert!(matches!(
        run(single.clone(), data(&[3, 4])),
        Err(EvalError::InvalidOperation { .. })
    ));

    // Zero matches fault without the default form...
    assert!(matches!(
        run(single, data(&[1])),
        Err(EvalError::InvalidOperation { .. })
    ));

    // ...and yield Null with it.
    let or_default = source().single_or_default(Some(v_gt(5, 2)));
    assert_eq!(run(or_default.clone(), data(&[1])).unwrap(), Value::Null);
    assert!(matches!(
        run(or_default, data(&[3, 4])),
        Err(EvalError::InvalidOperation { .. })
    ));
}

#[test]
fn aggregate_folds_from_the_seed() {
    let fold = source().aggregate(
        Expr::int(100),
        Expr::lambda(
            vec![Param::new(5, "acc"), Param::new(6, "x")],
            Expr::param(5, "acc").add(Expr::param(6, "x").field("V")),
        ),
    );
    assert_eq!(run(fold.clone(), data(&[1, 2, 3])).unwrap(), Value::Int(106));
    assert_eq!(run(fold, data(&[])).unwrap(), Value::Int(100));
}

#[test]
fn contains_probes_by_equality() {
    let body = source().select(v_of(5)).contains(Expr::int(2));
    assert_eq!(run(body.clone(), data(&[1, 2])).unwrap(), Value::Bool(true));
    assert_eq!(run(body, data(&[1, 3])).unwrap(), Value::Bool(false));
}

#[test]
fn select_many_flattens_across_children() {
    let bs = Expr::param(0, "a").field("Bs");
    let body = bs
        .select_many(Expr::lambda(
            vec![Param::new(5, "b")],
            Expr::param(5, "b").field("Ds"),
        ))
        .sum(None);
    let data = Value::record([(
        "Bs",
        Value::list([
            Value::record([("Ds", Value::list([Value::Int(1), Value::Int(2)]))]),
            Value::record([("Ds", Value::list([Value::Int(3)]))]),
            Value::record([("Ds", Value::Null)]),
        ]),
    )]);
    assert_eq!(run(body, data).unwrap(), Value::Int(6));
}

#[test]
fn nested_operator_inside_a_predicate() {
    let bs = Expr::param(0, "a").field("Bs");
    let body = bs
        .where_(Expr::lambda(
            vec![Param::new(5, "b")],
            Expr::param(5, "b").field("Ds").any_(Some(Expr::lambda(
                vec![Param::new(6, "d")],
                Expr::param(6, "d").gt(Expr::int(2)),
            ))),
        ))
        .count(None);
    let data = Value::record([(
        "Bs",
        Value::list([
            Value::record([("Ds", Value::list([Value::Int(1), Value::Int(2)]))]),
            Value::record([("Ds", Value::list([Value::Int(3)]))]),
        ]),
    )]);
    assert_eq!(run(body, data).unwrap(), Value::Int(1));
}

#[test]
fn null_source_behaves_as_empty() {
    let no_items = Value::record([("Other", Value::Int(1))]);
    assert_eq!(
        run(source().count(None), no_items.clone()).unwrap(),
        Value::Int(0)
    );
    assert_eq!(
        run(source().first_or_default(None), no_items).unwrap(),
        Value::Null
    );
}
