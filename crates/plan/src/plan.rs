//! Execution-plan construction.
//!
//! The orchestrator over the core transforms: per mutator it extracts
//! dependencies, runs the element-scope and source-binding checks,
//! assembles the resolved loop-based body, then orders the writers
//! through the dependency graph. Every configuration-shape error
//! surfaces here, in the one-time build.

use std::collections::BTreeSet;

use serde::Serialize;

use graft_core::{extract_dependencies, Expr, Param, Path};

use crate::assemble::assemble_step;
use crate::config::RuleSet;
use crate::error::PlanError;
use crate::graph::{check_element_scope, hop_bindings, topo_sort, GraphNode};
use crate::mutator::MutatorAction;

/// One planned step: a mutator with its derived dependencies and the
/// resolved loop-based lambda a backend compiles.
#[derive(Debug, Clone)]
pub struct PlanStep {
    pub seq: usize,
    pub target: Path,
    pub action: MutatorAction,
    pub dependencies: BTreeSet<Path>,
    /// `Lambda` over the plan's root parameters. Writers assign their
    /// target in place; validators evaluate to the list of hit index
    /// vectors.
    pub body: Expr,
}

/// An ordered, cycle-free execution plan for one rule set.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    root: Param,
    source: Option<Param>,
    mutation_steps: Vec<PlanStep>,
    validation_steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Derives the plan: dependencies, scope checks, assembly,
    /// dependency-graph ordering. Fails fast on any configuration
    /// shape problem.
    pub fn build(rules: &RuleSet) -> Result<ExecutionPlan, PlanError> {
        let root = rules.root_param().clone();
        let source = rules.source_param().cloned();
        let params: Vec<Param> = source
            .iter()
            .cloned()
            .chain(std::iter::once(root.clone()))
            .collect();

        let mut writers: Vec<PlanStep> = Vec::new();
        let mut validators: Vec<PlanStep> = Vec::new();
        for m in rules.mutators() {
            let mut dependencies: BTreeSet<Path> = BTreeSet::new();
            for condition in &m.conditions {
                dependencies.extend(extract_dependencies(condition)?);
            }
            if let MutatorAction::Set(value) = &m.action {
                dependencies.extend(extract_dependencies(value)?);
            }

            check_element_scope(&m.target, &dependencies)?;
            let bindings = hop_bindings(&m.target, &dependencies)?;
            let body = assemble_step(&params, m, &bindings)?;

            let step = PlanStep {
                seq: m.seq,
                target: m.target.clone(),
                action: m.action.clone(),
                dependencies,
                body,
            };
            if m.action.writes() {
                writers.push(step);
            } else {
                validators.push(step);
            }
        }

        let nodes: Vec<GraphNode> = writers
            .iter()
            .map(|step| GraphNode {
                seq: step.seq,
                target: step.target.clone(),
                dependencies: step.dependencies.clone(),
            })
            .collect();
        let order = topo_sort(&nodes)?;
        let mutation_steps = order.into_iter().map(|i| writers[i].clone()).collect();

        Ok(ExecutionPlan {
            root,
            source,
            mutation_steps,
            validation_steps: validators,
        })
    }

    pub fn root(&self) -> &Param {
        &self.root
    }

    pub fn source(&self) -> Option<&Param> {
        self.source.as_ref()
    }

    /// The lambda parameter list every step body closes over:
    /// `[source, root]` for converter plans, `[root]` otherwise.
    pub fn params(&self) -> Vec<Param> {
        self.source
            .iter()
            .cloned()
            .chain(std::iter::once(self.root.clone()))
            .collect()
    }

    /// Writer steps in dependency order: producers before consumers,
    /// ties by declaration.
    pub fn mutation_steps(&self) -> &[PlanStep] {
        &self.mutation_steps
    }

    /// Validator steps in declaration order.
    pub fn validation_steps(&self) -> &[PlanStep] {
        &self.validation_steps
    }

    /// Serializable summary for diagnostics and fixtures.
    pub fn report(&self) -> PlanReport {
        let summarize = |steps: &[PlanStep]| {
            steps
                .iter()
                .map(|step| StepSummary {
                    seq: step.seq,
                    target: step.target.to_string(),
                    dependencies: step.dependencies.iter().map(Path::to_string).collect(),
                })
                .collect()
        };
        PlanReport {
            mutation_order: summarize(&self.mutation_steps),
            validation_order: summarize(&self.validation_steps),
        }
    }
}

/// Plain summary of a built plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanReport {
    pub mutation_order: Vec<StepSummary>,
    pub validation_order: Vec<StepSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepSummary {
    pub seq: usize,
    pub target: String,
    pub dependencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::{Expr, Param};

    #[test]
    fn producers_run_before_consumers() {
        let mut rules = RuleSet::new("data");
        let root = rules.root();
        // Declared consumer-first; the plan must flip them.
        rules
            .target(root.clone().field("Total"))
            .set(root.clone().field("Net").add(root.clone().field("Tax")))
            .unwrap();
        rules
            .target(root.clone().field("Net"))
            .set(root.field("Gross").mul(Expr::int(2)))
            .unwrap();

        let plan = ExecutionPlan::build(&rules).unwrap();
        let targets: Vec<String> = plan
            .mutation_steps()
            .iter()
            .map(|s| s.target.to_string())
            .collect();
        assert_eq!(targets, vec!["data.Net", "data.Total"]);
    }

    #[test]
    fn rebuild_is_deterministic() {
        let build = || {
            let mut rules = RuleSet::new("data");
            let root = rules.root();
            rules.target(root.clone().field("A")).set(Expr::int(1)).unwrap();
            rules
                .target(root.clone().field("B"))
                .set(root.clone().field("A"))
                .unwrap();
            rules
                .target(root.clone().field("C"))
                .set(root.field("A"))
                .unwrap();
            ExecutionPlan::build(&rules).unwrap().report()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn cycle_fails_the_build() {
        let mut rules = RuleSet::new("data");
        let root = rules.root();
        rules
            .target(root.clone().field("A"))
            .set(root.clone().field("B"))
            .unwrap();
        rules
            .target(root.clone().field("B"))
            .set(root.field("A"))
            .unwrap();
        assert!(matches!(
            ExecutionPlan::build(&rules),
            Err(PlanError::CyclicDependency { .. })
        ));
    }

    #[test]
    fn sibling_read_fails_the_build() {
        let mut rules = RuleSet::new("data");
        let root = rules.root();
        rules
            .target(root.clone().field("B").each().field("Z"))
            .set(root.field("B").at(0).field("Z"))
            .unwrap();
        assert!(matches!(
            ExecutionPlan::build(&rules),
            Err(PlanError::ExternalDependency { .. })
        ));
    }

    #[test]
    fn whole_array_aggregate_inside_element_fails_the_build() {
        let mut rules = RuleSet::new("data");
        let root = rules.root();
        let sum = root.clone().field("B").sum(Some(Expr::lambda(
            vec![Param::new(50, "x")],
            Expr::param(50, "x").field("V"),
        )));
        rules
            .target(root.field("B").each().field("Z"))
            .set(sum)
            .unwrap();
        assert!(matches!(
            ExecutionPlan::build(&rules),
            Err(PlanError::ExternalDependency { .. })
        ));
    }

    #[test]
    fn validators_keep_declaration_order() {
        let mut rules = RuleSet::new("data");
        let root = rules.root();
        rules
            .target(root.clone().field("A"))
            .invalid_if(Expr::boolean(true), "second", 10)
            .unwrap();
        rules.target(root.field("A")).required("first").unwrap();

        let plan = ExecutionPlan::build(&rules).unwrap();
        assert_eq!(plan.validation_steps().len(), 2);
        assert_eq!(plan.validation_steps()[0].seq, 0);
        assert_eq!(plan.validation_steps()[1].seq, 1);
        assert!(plan.mutation_steps().is_empty());
    }

    #[test]
    fn converter_plan_carries_both_params() {
        let mut rules = RuleSet::converter("src", "dst");
        let dest = rules.root();
        let source = rules.source().unwrap();
        rules
            .target(dest.field("Items").each().field("X"))
            .set(source.field("Rows").current().field("V"))
            .unwrap();

        let plan = ExecutionPlan::build(&rules).unwrap();
        let params = plan.params();
        assert_eq!(params.len(), 2);
        assert_eq!(params[0].name, "src");
        assert_eq!(params[1].name, "dst");
    }
}
