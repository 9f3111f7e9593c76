//! Dependency analysis and graph ordering.
//!
//! Element-scope checks run per mutator: a dependency that reaches a
//! sibling element of an array the target iterates, any-element access
//! over that array, or the whole array itself cannot be compiled into
//! a per-element function and is rejected. Dangling `current()` hops
//! in dependencies bind the target's iterations in positional order;
//! foreign-root bindings pair source arrays to target hops, and two
//! distinct arrays paired to one hop are rejected at build time.
//!
//! Ordering is Kahn's algorithm over writer mutators with a
//! declaration-order queue: deterministic, producers before consumers,
//! cycles aborted with the stuck targets named.

use std::collections::BTreeSet;

use graft_core::{Path, Step};

use crate::error::PlanError;

// ──────────────────────────────────────────────
// Element-scope analysis
// ──────────────────────────────────────────────

/// Prefix path of every array the target iterates, one per
/// `each()` / `template_index()` hop, in order.
pub(crate) fn iterated_arrays(target: &Path) -> Vec<Path> {
    target
        .steps
        .iter()
        .enumerate()
        .filter(|(_, step)| matches!(step, Step::Each | Step::TemplateIndex))
        .map(|(i, _)| Path::new(target.root.clone(), target.steps[..i].to_vec()))
        .collect()
}

fn step_match(a: &Step, b: &Step) -> bool {
    match (a, b) {
        (Step::Field(x), Step::Field(y)) => x == y,
        (Step::Key(x), Step::Key(y)) => x == y,
        (Step::At(x), Step::At(y)) => x == y,
        (a, b) => {
            (a.is_abstract() && b.is_array_hop()) || (a.is_array_hop() && b.is_abstract())
        }
    }
}

fn steps_match(a: &[Step], b: &[Step]) -> bool {
    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| step_match(x, y))
}

fn external(target: &Path, dependency: &Path) -> PlanError {
    PlanError::ExternalDependency {
        target: target.to_string(),
        dependency: dependency.to_string(),
    }
}

/// Rejects dependencies a per-element compiled function cannot have:
/// for every array the target iterates, a same-root dependency that
/// reads the whole array, a sibling element by literal index, or any
/// element abstractly.
pub(crate) fn check_element_scope(
    target: &Path,
    deps: &BTreeSet<Path>,
) -> Result<(), PlanError> {
    let arrays = iterated_arrays(target);
    for dep in deps {
        if dep.root.id != target.root.id {
            continue;
        }
        for array in &arrays {
            let n = array.steps.len();
            if dep.steps.len() == n && steps_match(&array.steps, &dep.steps) {
                return Err(external(target, dep));
            }
            if dep.steps.len() > n
                && steps_match(&array.steps, &dep.steps[..n])
                && matches!(
                    dep.steps[n],
                    Step::At(_) | Step::Each | Step::TemplateIndex
                )
            {
                return Err(external(target, dep));
            }
        }
    }
    Ok(())
}

/// Pairs each target iteration with the source array its dangling
/// `current()` dependencies bind, if any.
///
/// A `current()` hop with no enclosing `each()` in its own path binds
/// the target's iterations in positional order. Same-root bindings
/// must address the target's own iterated array; foreign-root bindings
/// pair a source array to the hop, and two distinct arrays paired to
/// one hop raise [`PlanError::MultipleSourceArrays`].
pub(crate) fn hop_bindings(
    target: &Path,
    deps: &BTreeSet<Path>,
) -> Result<Vec<Option<Path>>, PlanError> {
    let own_arrays = iterated_arrays(target);
    let mut foreign: Vec<Option<Path>> = vec![None; own_arrays.len()];

    for dep in deps {
        let mut saw_each = false;
        let mut ordinal = 0usize;
        for (pos, step) in dep.steps.iter().enumerate() {
            match step {
                Step::Each | Step::TemplateIndex => saw_each = true,
                Step::Current | Step::CurrentIndex if !saw_each => {
                    if ordinal >= own_arrays.len() {
                        return Err(PlanError::Path(
                            graft_core::PathError::DanglingCurrent {
                                position: pos,
                                path: dep.to_string(),
                            },
                        ));
                    }
                    let prefix = Path::new(dep.root.clone(), dep.steps[..pos].to_vec());
                    if dep.root.id == target.root.id {
                        if !steps_match(&own_arrays[ordinal].steps, &prefix.steps) {
                            return Err(external(target, dep));
                        }
                    } else {
                        match &foreign[ordinal] {
                            None => foreign[ordinal] = Some(prefix),
                            Some(existing) if steps_match(&existing.steps, &prefix.steps) => {}
                            Some(existing) => {
                                return Err(PlanError::MultipleSourceArrays {
                                    target: target.to_string(),
                                    sources: vec![existing.to_string(), prefix.to_string()],
                                })
                            }
                        }
                    }
                    ordinal += 1;
                }
                _ => {}
            }
        }
    }
    Ok(foreign)
}

// ──────────────────────────────────────────────
// Topological ordering
// ──────────────────────────────────────────────

pub(crate) struct GraphNode {
    pub seq: usize,
    pub target: Path,
    pub dependencies: BTreeSet<Path>,
}

/// Orders writer mutators so every producer runs before its consumers.
///
/// Edge `i -> j` when `j`'s target overlaps a dependency of `i`. A
/// mutator reading its own target is not a cycle: conditional
/// self-writes (nullify-when) are ordinary. Ties break by declaration
/// sequence, so the order is reproducible across runs.
pub(crate) fn topo_sort(nodes: &[GraphNode]) -> Result<Vec<usize>, PlanError> {
    let n = nodes.len();
    let mut prereqs: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if nodes[i]
                .dependencies
                .iter()
                .any(|dep| nodes[j].target.overlaps(dep))
            {
                prereqs[i].insert(j);
            }
        }
    }

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut indegree: Vec<usize> = vec![0; n];
    for (i, ps) in prereqs.iter().enumerate() {
        indegree[i] = ps.len();
        for &j in ps {
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<(usize, usize)> = (0..n)
        .filter(|&i| indegree[i] == 0)
        .map(|i| (nodes[i].seq, i))
        .collect();
    let mut order = Vec::with_capacity(n);
    while let Some((_, i)) = ready.pop_first() {
        order.push(i);
        for &k in &dependents[i] {
            indegree[k] -= 1;
            if indegree[k] == 0 {
                ready.insert((nodes[k].seq, k));
            }
        }
    }

    if order.len() < n {
        let mut stuck: Vec<&GraphNode> =
            (0..n).filter(|i| !order.contains(i)).map(|i| &nodes[i]).collect();
        stuck.sort_by_key(|node| node.seq);
        return Err(PlanError::CyclicDependency {
            paths: stuck.iter().map(|node| node.target.to_string()).collect(),
        });
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::Param;

    fn p(steps: Vec<Step>) -> Path {
        Path::new(Param::new(0, "a"), steps)
    }

    fn field(name: &str) -> Step {
        Step::Field(name.to_string())
    }

    fn node(seq: usize, target: Path, deps: Vec<Path>) -> GraphNode {
        GraphNode {
            seq,
            target,
            dependencies: deps.into_iter().collect(),
        }
    }

    #[test]
    fn sibling_literal_index_is_external() {
        let target = p(vec![field("B"), Step::Each, field("Z")]);
        let deps: BTreeSet<Path> =
            [p(vec![field("B"), Step::At(2), field("Z")])].into_iter().collect();
        assert!(matches!(
            check_element_scope(&target, &deps),
            Err(PlanError::ExternalDependency { .. })
        ));
    }

    #[test]
    fn whole_array_read_is_external() {
        let target = p(vec![field("B"), Step::Each, field("Z")]);
        // The bare array read a Sum over the iterated array leaves behind.
        let deps: BTreeSet<Path> = [p(vec![field("B")])].into_iter().collect();
        assert!(matches!(
            check_element_scope(&target, &deps),
            Err(PlanError::ExternalDependency { .. })
        ));
    }

    #[test]
    fn any_element_read_over_iterated_array_is_external() {
        let target = p(vec![field("B"), Step::Each, field("Z")]);
        let deps: BTreeSet<Path> =
            [p(vec![field("B"), Step::Each, field("V")])].into_iter().collect();
        assert!(matches!(
            check_element_scope(&target, &deps),
            Err(PlanError::ExternalDependency { .. })
        ));
    }

    #[test]
    fn own_element_read_is_fine() {
        let target = p(vec![field("B"), Step::Each, field("Z")]);
        let deps: BTreeSet<Path> = [
            p(vec![field("B"), Step::Current, field("V")]),
            p(vec![field("C"), Step::Each, field("W")]),
        ]
        .into_iter()
        .collect();
        assert!(check_element_scope(&target, &deps).is_ok());
    }

    #[test]
    fn same_root_binding_must_address_own_array() {
        let target = p(vec![field("B"), Step::Each, field("Z")]);
        let deps: BTreeSet<Path> =
            [p(vec![field("C"), Step::Current, field("V")])].into_iter().collect();
        assert!(matches!(
            hop_bindings(&target, &deps),
            Err(PlanError::ExternalDependency { .. })
        ));
    }

    #[test]
    fn foreign_binding_pairs_source_array() {
        let target = p(vec![field("Items"), Step::Each, field("X")]);
        let dep = Path::new(
            Param::new(9, "src"),
            vec![field("Rows"), Step::Current, field("V")],
        );
        let deps: BTreeSet<Path> = [dep].into_iter().collect();
        let bindings = hop_bindings(&target, &deps).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].as_ref().unwrap().to_string(), "src.Rows");
    }

    #[test]
    fn two_source_arrays_on_one_hop_rejected() {
        let target = p(vec![field("Items"), Step::Each, field("X")]);
        let deps: BTreeSet<Path> = [
            Path::new(
                Param::new(9, "src"),
                vec![field("Rows"), Step::Current, field("V")],
            ),
            Path::new(
                Param::new(9, "src"),
                vec![field("Cols"), Step::Current, field("W")],
            ),
        ]
        .into_iter()
        .collect();
        assert!(matches!(
            hop_bindings(&target, &deps),
            Err(PlanError::MultipleSourceArrays { .. })
        ));
    }

    #[test]
    fn excess_dangling_current_rejected() {
        let target = p(vec![field("B"), field("Z")]);
        let deps: BTreeSet<Path> =
            [p(vec![field("B"), Step::Current, field("V")])].into_iter().collect();
        assert!(matches!(
            hop_bindings(&target, &deps),
            Err(PlanError::Path(_))
        ));
    }

    #[test]
    fn topo_orders_producers_first() {
        // 0 reads what 1 writes; 1 reads what 2 writes.
        let nodes = vec![
            node(
                0,
                p(vec![field("A")]),
                vec![p(vec![field("B")])],
            ),
            node(
                1,
                p(vec![field("B")]),
                vec![p(vec![field("C")])],
            ),
            node(2, p(vec![field("C")]), vec![]),
        ];
        assert_eq!(topo_sort(&nodes).unwrap(), vec![2, 1, 0]);
    }

    #[test]
    fn ties_break_by_declaration_order() {
        let nodes = vec![
            node(0, p(vec![field("A")]), vec![]),
            node(1, p(vec![field("B")]), vec![]),
            node(2, p(vec![field("C")]), vec![]),
        ];
        assert_eq!(topo_sort(&nodes).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn self_dependency_is_not_a_cycle() {
        let nodes = vec![node(
            0,
            p(vec![field("B"), Step::Each, field("Z")]),
            vec![p(vec![field("B"), Step::Current, field("Z")])],
        )];
        assert_eq!(topo_sort(&nodes).unwrap(), vec![0]);
    }

    #[test]
    fn cycle_names_the_stuck_targets() {
        let nodes = vec![
            node(0, p(vec![field("A")]), vec![p(vec![field("B")])]),
            node(1, p(vec![field("B")]), vec![p(vec![field("A")])]),
            node(2, p(vec![field("C")]), vec![]),
        ];
        match topo_sort(&nodes) {
            Err(PlanError::CyclicDependency { paths }) => {
                assert_eq!(paths, vec!["a.A".to_string(), "a.B".to_string()]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }
}
