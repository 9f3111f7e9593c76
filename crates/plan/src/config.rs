//! The declarative configuration surface.
//!
//! A [`RuleSet`] collects mutator declarations through a builder DSL:
//! `set.target(path).when(cond).set(value)` and friends. Sub-scopes
//! open with [`RuleSet::go_to`]: declarations made against the
//! sub-scope's placeholder root are rebased onto the destination path
//! through the alias machinery when the scope closes.
//!
//! A two-root set built with [`RuleSet::converter`] targets the
//! destination tree while reading the source tree; `go_to_from` opens
//! a sub-scope over both at once.

use graft_core::{resolve_aliases, Alias, Expr, Param, Path};

use crate::error::PlanError;
use crate::mutator::{check_priority, MutatorAction, MutatorDecl};

/// An ordered collection of declared rules over one data root
/// (or a source/destination pair).
#[derive(Debug, Clone)]
pub struct RuleSet {
    root: Param,
    source: Option<Param>,
    next_id: u32,
    mutators: Vec<MutatorDecl>,
}

impl RuleSet {
    /// A single-root set: rules mutate and validate one tree.
    pub fn new(root_name: &str) -> RuleSet {
        RuleSet {
            root: Param::new(0, root_name),
            source: None,
            next_id: 1,
            mutators: Vec::new(),
        }
    }

    /// A two-root set for conversion: rules target the destination
    /// tree and may read the source tree.
    pub fn converter(source_name: &str, dest_name: &str) -> RuleSet {
        RuleSet {
            root: Param::new(1, dest_name),
            source: Some(Param::new(0, source_name)),
            next_id: 2,
            mutators: Vec::new(),
        }
    }

    /// The root parameter as an expression, for building target and
    /// condition chains.
    pub fn root(&self) -> Expr {
        Expr::Param(self.root.clone())
    }

    pub fn root_param(&self) -> &Param {
        &self.root
    }

    /// The source parameter as an expression, present on converter
    /// sets.
    pub fn source(&self) -> Option<Expr> {
        self.source.clone().map(Expr::Param)
    }

    pub fn source_param(&self) -> Option<&Param> {
        self.source.as_ref()
    }

    pub fn mutators(&self) -> &[MutatorDecl] {
        &self.mutators
    }

    /// Starts a rule against a target path.
    pub fn target(&mut self, target: Expr) -> Rule<'_> {
        Rule {
            set: self,
            target,
            conditions: Vec::new(),
        }
    }

    /// Opens a sub-scope rooted at `dest`. Declarations made inside
    /// the closure against the sub-scope's root are rebased onto
    /// `dest` when the closure returns.
    pub fn go_to<F>(&mut self, dest: Expr, f: F) -> Result<(), PlanError>
    where
        F: FnOnce(&mut RuleSet) -> Result<(), PlanError>,
    {
        let placeholder = self.alloc("scope");
        let mut child = RuleSet {
            root: placeholder.clone(),
            source: self.source.clone(),
            next_id: self.next_id,
            mutators: Vec::new(),
        };
        f(&mut child)?;
        self.next_id = child.next_id;
        let read = Alias::new(placeholder.clone(), reading_form(&dest));
        self.absorb(child.mutators, &[Alias::new(placeholder, dest)], &[read])
    }

    /// Opens a converter sub-scope: the sub-scope's root placeholder
    /// rebases onto `dest` and its source placeholder onto `source`.
    pub fn go_to_from<F>(&mut self, dest: Expr, source: Expr, f: F) -> Result<(), PlanError>
    where
        F: FnOnce(&mut RuleSet) -> Result<(), PlanError>,
    {
        let dest_placeholder = self.alloc("scope");
        let source_placeholder = self.alloc("from");
        let mut child = RuleSet {
            root: dest_placeholder.clone(),
            source: Some(source_placeholder.clone()),
            next_id: self.next_id,
            mutators: Vec::new(),
        };
        f(&mut child)?;
        self.next_id = child.next_id;
        let reads = [
            Alias::new(dest_placeholder.clone(), reading_form(&dest)),
            Alias::new(source_placeholder.clone(), reading_form(&source)),
        ];
        self.absorb(
            child.mutators,
            &[
                Alias::new(dest_placeholder, dest),
                Alias::new(source_placeholder, source),
            ],
            &reads,
        )
    }

    fn alloc(&mut self, name: &str) -> Param {
        let id = self.next_id;
        self.next_id += 1;
        Param::new(id, name.to_string())
    }

    /// Rebasing is position-sensitive: target chains take the
    /// destination as declared (its `each()` hops stay iterations),
    /// while conditions and values take its reading form, where every
    /// `each()` becomes `current()` -- a read of the element the
    /// enclosing iteration is visiting, not of every element.
    fn absorb(
        &mut self,
        mutators: Vec<MutatorDecl>,
        write_aliases: &[Alias],
        read_aliases: &[Alias],
    ) -> Result<(), PlanError> {
        for m in mutators {
            let target = resolve_aliases(&m.target.to_expr(), write_aliases);
            let conditions = m
                .conditions
                .iter()
                .map(|c| resolve_aliases(c, read_aliases))
                .collect();
            let action = match m.action {
                MutatorAction::Set(value) => {
                    MutatorAction::Set(resolve_aliases(&value, read_aliases))
                }
                other => other,
            };
            self.push(target, conditions, action)?;
        }
        Ok(())
    }

    fn push(
        &mut self,
        target: Expr,
        conditions: Vec<Expr>,
        action: MutatorAction,
    ) -> Result<(), PlanError> {
        let path = Path::from_expr(&target)?;
        path.validate()?;
        let seq = self.mutators.len();
        self.mutators.push(MutatorDecl {
            seq,
            target: path,
            conditions,
            action,
        });
        Ok(())
    }
}

/// The reading form of a path expression: every `each()` along the
/// chain becomes `current()`.
fn reading_form(expr: &Expr) -> Expr {
    match expr {
        Expr::Each(object) => Expr::Current(Box::new(reading_form(object))),
        Expr::Current(object) => Expr::Current(Box::new(reading_form(object))),
        Expr::CurrentIndex(object) => Expr::CurrentIndex(Box::new(reading_form(object))),
        Expr::TemplateIndex(object) => Expr::TemplateIndex(Box::new(reading_form(object))),
        Expr::Member { object, name } => Expr::Member {
            object: Box::new(reading_form(object)),
            name: name.clone(),
        },
        Expr::Index { object, key } => Expr::Index {
            object: Box::new(reading_form(object)),
            key: key.clone(),
        },
        other => other.clone(),
    }
}

/// An in-flight rule declaration; terminal methods record it on the
/// owning set.
pub struct Rule<'a> {
    set: &'a mut RuleSet,
    target: Expr,
    conditions: Vec<Expr>,
}

impl Rule<'_> {
    /// Adds a conjoined condition.
    pub fn when(mut self, condition: Expr) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Write `value` into the target when the conditions hold.
    pub fn set(self, value: Expr) -> Result<(), PlanError> {
        let Rule {
            set,
            target,
            conditions,
        } = self;
        set.push(target, conditions, MutatorAction::Set(value))
    }

    /// Write `Null` into the target when `condition` (and any earlier
    /// conditions) hold.
    pub fn nullify_if(mut self, condition: Expr) -> Result<(), PlanError> {
        self.conditions.push(condition);
        let Rule {
            set,
            target,
            conditions,
        } = self;
        set.push(target, conditions, MutatorAction::Nullify)
    }

    /// Mark the target subtree validation-inert when `condition` holds.
    pub fn disabled_if(mut self, condition: Expr) -> Result<(), PlanError> {
        self.conditions.push(condition);
        let Rule {
            set,
            target,
            conditions,
        } = self;
        set.push(target, conditions, MutatorAction::Disable)
    }

    /// The target must be present: null or empty fails validation.
    pub fn required(self, message: &str) -> Result<(), PlanError> {
        let Rule {
            set,
            target,
            conditions,
        } = self;
        set.push(
            target,
            conditions,
            MutatorAction::Required {
                message: message.to_string(),
            },
        )
    }

    /// The target is invalid when `condition` holds, reported with
    /// `message` at `priority` (0 = highest, ties by declaration
    /// order).
    pub fn invalid_if(
        mut self,
        condition: Expr,
        message: &str,
        priority: i32,
    ) -> Result<(), PlanError> {
        check_priority(priority)?;
        self.conditions.push(condition);
        let Rule {
            set,
            target,
            conditions,
        } = self;
        set.push(
            target,
            conditions,
            MutatorAction::Invalid {
                message: message.to_string(),
                priority,
            },
        )
    }
}
