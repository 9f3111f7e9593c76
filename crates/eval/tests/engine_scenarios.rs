//! End-to-end scenarios: declare rules through the builder DSL, build
//! the plan, compile artifacts, run them over real data trees.

use graft_core::{Expr, Value};
use graft_eval::{Engine, Recording};
use graft_plan::{ExecutionPlan, RuleSet};

/// `B[]` elements carry `Z` and a nested `C.D[]` of `{S, Z}` pairs.
fn nested_rules() -> RuleSet {
    let mut rules = RuleSet::new("root");
    let root = rules.root();
    rules
        .go_to(root.field("B").each(), |b| {
            let b_elem = b.root();
            b.go_to(b_elem.clone().field("C").field("D").each(), |d| {
                let d_elem = d.root();
                d.target(d_elem.clone().field("S"))
                    .nullify_if(b_elem.clone().field("Z").gt(d_elem.field("Z")))
            })?;
            let b_elem = b.root();
            b.target(b_elem.clone().field("Z"))
                .nullify_if(b_elem.field("Z").lt(Expr::int(0)))
        })
        .unwrap();
    rules
}

fn d(s: &str, z: i64) -> Value {
    Value::record([("S", Value::Text(s.to_string())), ("Z", Value::Int(z))])
}

fn b(z: Value, ds: Vec<Value>) -> Value {
    Value::record([("Z", z), ("C", Value::record([("D", Value::list(ds))]))])
}

#[test]
fn nested_nullify_scenario() {
    let plan = ExecutionPlan::build(&nested_rules()).unwrap();
    // Nullifying B.Z must run before the rule that reads it.
    assert_eq!(plan.mutation_steps()[0].target.to_string(), "root.B.each().Z");

    let engine = Engine::new();
    let mutator = engine.compile_mutator(&plan).unwrap();

    let mut data = Value::record([(
        "B",
        Value::list([
            b(Value::Int(5), vec![d("keep", 9), d("drop", 3)]),
            b(Value::Int(-2), vec![d("keep", -5)]),
        ]),
    )]);
    mutator.apply(&mut data).unwrap();

    let expected = Value::record([(
        "B",
        Value::list([
            b(Value::Int(5), vec![d("keep", 9), {
                Value::record([("S", Value::Null), ("Z", Value::Int(3))])
            }]),
            // Z went Null first, so Null > -5 is false and S survives.
            b(Value::Null, vec![d("keep", -5)]),
        ]),
    )]);
    assert_eq!(data, expected);
}

#[test]
fn nested_nullify_tolerates_sparse_data() {
    let plan = ExecutionPlan::build(&nested_rules()).unwrap();
    let mutator = Engine::new().compile_mutator(&plan).unwrap();

    // Zero-length arrays, null elements, missing subtrees.
    for data in [
        Value::record([("B", Value::list([]))]),
        Value::record([("B", Value::Null)]),
        Value::record([(
            "B",
            Value::list([Value::Null, b(Value::Int(1), vec![])]),
        )]),
        Value::Null,
    ] {
        let mut copy = data.clone();
        mutator.apply(&mut copy).unwrap();
    }
}

#[test]
fn mutation_is_idempotent() {
    let plan = ExecutionPlan::build(&nested_rules()).unwrap();
    let mutator = Engine::new().compile_mutator(&plan).unwrap();

    let mut once = Value::record([(
        "B",
        Value::list([
            b(Value::Int(7), vec![d("a", 1), d("b", 9)]),
            b(Value::Int(-1), vec![d("c", 0)]),
        ]),
    )]);
    mutator.apply(&mut once).unwrap();
    let mut twice = once.clone();
    mutator.apply(&mut twice).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn structurally_identical_rules_share_one_compiled_function() {
    let engine = Engine::new();

    let build = |threshold: i64| {
        let mut rules = RuleSet::new("root");
        let root = rules.root();
        rules
            .target(root.clone().field("X"))
            .nullify_if(root.field("X").gt(Expr::int(threshold)))
            .unwrap();
        ExecutionPlan::build(&rules).unwrap()
    };

    let m5 = engine.compile_mutator(&build(5)).unwrap();
    let m99 = engine.compile_mutator(&build(99)).unwrap();
    assert_eq!(engine.cache().len(), 1);

    // Shared shape, distinct captured thresholds.
    let mut low = Value::record([("X", Value::Int(50))]);
    m5.apply(&mut low).unwrap();
    assert_eq!(low.field("X"), Value::Null);

    let mut high = Value::record([("X", Value::Int(50))]);
    m99.apply(&mut high).unwrap();
    assert_eq!(high.field("X"), Value::Int(50));
}

#[test]
fn recording_session_observes_and_bypasses() {
    let engine = Engine::new();
    let plan = ExecutionPlan::build(&nested_rules()).unwrap();

    {
        let session = Recording::start();
        let mutator = engine.compile_mutator(&plan).unwrap();
        assert!(engine.cache().is_empty(), "recording must bypass the cache");
        assert_eq!(session.compiled().len(), 2);

        let mut data = Value::record([(
            "B",
            Value::list([b(Value::Int(1), vec![d("s", 5)])]),
        )]);
        mutator.apply(&mut data).unwrap();
        let executed = session.executed();
        assert!(executed.contains(&"root.B.each().Z".to_string()));
        assert!(executed.contains(&"root.B.each().C.D.each().S".to_string()));
    }

    // Detached: compilation now populates the shared cache.
    engine.compile_mutator(&plan).unwrap();
    assert_eq!(engine.cache().len(), 2);
}

#[test]
fn validator_priorities_and_disable() {
    let mut rules = RuleSet::new("root");
    let root = rules.root();
    rules
        .go_to(root.field("Items").each(), |item| {
            let elem = item.root();
            item.target(elem.clone().field("Name")).required("name is missing")?;
            item.target(elem.clone().field("Name")).invalid_if(
                elem.clone().field("Flag"),
                "flagged name",
                10,
            )?;
            item.target(elem.clone())
                .disabled_if(elem.field("Skip"))
        })
        .unwrap();

    let plan = ExecutionPlan::build(&rules).unwrap();
    let validator = Engine::new().compile_validator(&plan).unwrap();

    let item = |name: Value, flag: bool, skip: bool| {
        Value::record([
            ("Name", name),
            ("Flag", Value::Bool(flag)),
            ("Skip", Value::Bool(skip)),
        ])
    };
    let data = Value::record([(
        "Items",
        Value::list([
            // Missing name and flagged: required (priority 0) wins.
            item(Value::Null, true, false),
            item(Value::Text("ok".to_string()), false, false),
            // Flagged only.
            item(Value::Text("x".to_string()), true, false),
            // Disabled subtree swallows its failures.
            item(Value::Null, true, true),
        ]),
    )]);

    let tree = validator.validate(&data).unwrap();
    assert_eq!(tree.len(), 2);
    assert_eq!(
        tree.get("root.Items[0].Name").unwrap().message,
        "name is missing"
    );
    assert_eq!(
        tree.get("root.Items[2].Name").unwrap().message,
        "flagged name"
    );
    assert!(tree.get("root.Items[3].Name").is_none());
    assert!(!tree.is_valid());

    let clean = Value::record([("Items", Value::list([]))]);
    assert!(validator.validate(&clean).unwrap().is_valid());
}

#[test]
fn converter_builds_and_merges() {
    let mut rules = RuleSet::converter("src", "dst");
    let dest = rules.root();
    let source = rules.source().unwrap();
    rules
        .go_to_from(
            dest.clone().field("Items").each(),
            source.clone().field("Rows").each(),
            |scope| {
                let d = scope.root();
                let s = scope.source().unwrap();
                scope.target(d.clone().field("X")).set(s.clone().field("V"))?;
                scope.target(d.field("N")).set(s.current_index())
            },
        )
        .unwrap();
    rules
        .target(dest.field("Count"))
        .set(source.field("Rows").length())
        .unwrap();

    let plan = ExecutionPlan::build(&rules).unwrap();
    let converter = Engine::new().compile_converter(&plan).unwrap();

    let src = Value::record([(
        "Rows",
        Value::list([
            Value::record([("V", Value::Int(10))]),
            Value::record([("V", Value::Int(20))]),
        ]),
    )]);
    let fresh = converter.convert(&src).unwrap();
    let expected_items = Value::list([
        Value::record([("N", Value::Int(0)), ("X", Value::Int(10))]),
        Value::record([("N", Value::Int(1)), ("X", Value::Int(20))]),
    ]);
    assert_eq!(fresh.field("Items"), expected_items);
    assert_eq!(fresh.field("Count"), Value::Int(2));

    // Merge form: untargeted fields survive.
    let mut dest = Value::record([("Kept", Value::Text("yes".to_string()))]);
    converter.convert_into(&src, &mut dest).unwrap();
    assert_eq!(dest.field("Kept"), Value::Text("yes".to_string()));
    assert_eq!(dest.field("Items"), expected_items);
}
