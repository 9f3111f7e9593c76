//! The compiled validation artifact.
//!
//! Validator steps evaluate to lists of hit index vectors; this module
//! maps each hit back to the concrete resolved path it addresses,
//! drops results under disabled subtrees, and applies priority-wins
//! per path (lowest number wins, ties by declaration order).

use std::collections::BTreeMap;

use serde::Serialize;

use graft_core::{Path, Step, Value};
use graft_plan::MutatorAction;

use crate::engine::CompiledStep;
use crate::error::EvalError;
use crate::interp::Interp;
use crate::record;

/// One surviving validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFinding {
    pub message: String,
    pub priority: i32,
    pub seq: usize,
}

/// Validation results keyed by concrete resolved path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ValidationTree {
    findings: BTreeMap<String, ValidationFinding>,
}

impl ValidationTree {
    pub fn is_valid(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ValidationFinding> {
        self.findings.get(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValidationFinding)> {
        self.findings.iter()
    }
}

/// A validation function over one data tree.
pub struct CompiledValidator {
    interp: Interp,
    steps: Vec<CompiledStep>,
}

impl CompiledValidator {
    pub(crate) fn new(interp: Interp, steps: Vec<CompiledStep>) -> CompiledValidator {
        CompiledValidator { interp, steps }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn validate(&self, data: &Value) -> Result<ValidationTree, EvalError> {
        // Disable steps first: they mark subtrees inert for everything
        // that follows, regardless of declaration interleaving.
        let mut disabled: Vec<Path> = Vec::new();
        for step in &self.steps {
            if matches!(step.action, MutatorAction::Disable) {
                for indices in self.run(step, data)? {
                    disabled.push(concrete_path(&step.target, &indices));
                }
            }
        }

        let mut findings: BTreeMap<String, ValidationFinding> = BTreeMap::new();
        for step in &self.steps {
            let (message, priority) = match &step.action {
                MutatorAction::Required { message } => (message, 0),
                MutatorAction::Invalid { message, priority } => (message, *priority),
                _ => continue,
            };
            for indices in self.run(step, data)? {
                let path = concrete_path(&step.target, &indices);
                if disabled.iter().any(|d| is_prefix(d, &path)) {
                    continue;
                }
                let key = path.to_string();
                match findings.get(&key) {
                    Some(existing) if (existing.priority, existing.seq) <= (priority, step.seq) => {}
                    _ => {
                        findings.insert(
                            key,
                            ValidationFinding {
                                message: message.clone(),
                                priority,
                                seq: step.seq,
                            },
                        );
                    }
                }
            }
        }
        Ok(ValidationTree { findings })
    }

    /// Invokes one step and decodes its hit index vectors.
    fn run(&self, step: &CompiledStep, data: &Value) -> Result<Vec<Vec<i64>>, EvalError> {
        let mut args = step.slot_args(&self.interp)?;
        args.push(data.clone());
        let out = (step.func)(&mut args)?;
        record::note_executed(&step.target.to_string());

        let Value::List(hits) = out else {
            return Err(EvalError::TypeError {
                message: format!("validator step produced {}", out.type_name()),
            });
        };
        hits.into_iter()
            .map(|hit| match hit {
                Value::List(indices) => indices
                    .into_iter()
                    .map(|v| match v {
                        Value::Int(i) => Ok(i),
                        other => Err(EvalError::TypeError {
                            message: format!("hit index of type {}", other.type_name()),
                        }),
                    })
                    .collect(),
                other => Err(EvalError::TypeError {
                    message: format!("hit of type {}", other.type_name()),
                }),
            })
            .collect()
    }
}

/// Substitutes concrete indices for the target's array hops.
fn concrete_path(target: &Path, indices: &[i64]) -> Path {
    let mut steps = Vec::with_capacity(target.steps.len());
    let mut k = 0usize;
    let mut last = 0i64;
    for step in &target.steps {
        steps.push(match step {
            Step::Each | Step::TemplateIndex => {
                let i = indices.get(k).copied().unwrap_or(-1);
                k += 1;
                last = i;
                Step::At(i)
            }
            Step::Current => Step::At(last),
            other => other.clone(),
        });
    }
    Path::new(target.root.clone(), steps)
}

fn is_prefix(prefix: &Path, path: &Path) -> bool {
    prefix.root.id == path.root.id
        && prefix.steps.len() <= path.steps.len()
        && prefix.steps == path.steps[..prefix.steps.len()]
}
