//! Expression tree model.
//!
//! One closed sum type covers every node kind the engine rewrites:
//! access chains with abstract array placeholders, tagged sequence
//! operators, scalar operators, construction, lambdas, and the
//! imperative loop forms the eliminator lowers into. Transforms match
//! it exhaustively, so adding a node kind is a compile-time-checked
//! exercise across the whole crate.
//!
//! Nodes are immutable once constructed and freely cloned; rewrites
//! build new trees rather than mutating in place.

use serde::Serialize;

use crate::value::Value;

// ──────────────────────────────────────────────
// Parameters
// ──────────────────────────────────────────────

/// A bound variable: a lambda parameter, a block local, or a loop index.
///
/// `id` carries identity everywhere; `name` is cosmetic except under
/// strict structural comparison.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Param {
    pub id: u32,
    pub name: String,
}

impl Param {
    pub fn new(id: u32, name: impl Into<String>) -> Param {
        Param {
            id,
            name: name.into(),
        }
    }
}

// ──────────────────────────────────────────────
// Operator tags
// ──────────────────────────────────────────────

/// Known sequence operators, tagged so rewriters can dispatch on them.
/// Anything else a host exposes goes through `Expr::Call` as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SeqOp {
    Select,
    SelectMany,
    Where,
    First,
    FirstOrDefault,
    Single,
    SingleOrDefault,
    Any,
    All,
    Sum,
    Count,
    Aggregate,
    Contains,
    GroupBy,
}

impl SeqOp {
    pub fn name(&self) -> &'static str {
        match self {
            SeqOp::Select => "Select",
            SeqOp::SelectMany => "SelectMany",
            SeqOp::Where => "Where",
            SeqOp::First => "First",
            SeqOp::FirstOrDefault => "FirstOrDefault",
            SeqOp::Single => "Single",
            SeqOp::SingleOrDefault => "SingleOrDefault",
            SeqOp::Any => "Any",
            SeqOp::All => "All",
            SeqOp::Sum => "Sum",
            SeqOp::Count => "Count",
            SeqOp::Aggregate => "Aggregate",
            SeqOp::Contains => "Contains",
            SeqOp::GroupBy => "GroupBy",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnOp {
    Not,
    Neg,
    /// True for `Null`, the empty string, and the empty list. Produced
    /// by the null-propagation extender's guards.
    IsNullOrEmpty,
}

// ──────────────────────────────────────────────
// Expression nodes
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Expr {
    /// A bound parameter, block local, or loop index.
    Param(Param),
    /// `object.name`
    Member { object: Box<Expr>, name: String },
    /// `object[key]` -- key is usually a constant or a loop index.
    Index { object: Box<Expr>, key: Box<Expr> },
    /// `object.len()`
    Length(Box<Expr>),

    /// Abstract marker: an iterated array position, introducing an
    /// index variable scoped to the remainder of the chain.
    Each(Box<Expr>),
    /// Abstract marker: the element bound by the nearest enclosing
    /// `Each` at matching depth.
    Current(Box<Expr>),
    /// Abstract marker: the literal index bound by the nearest
    /// enclosing `Each`.
    CurrentIndex(Box<Expr>),
    /// Shape-only placeholder index, not bound to any iteration.
    TemplateIndex(Box<Expr>),

    /// A known sequence operator applied to a source sequence.
    Seq {
        op: SeqOp,
        source: Box<Expr>,
        args: Vec<Expr>,
    },
    /// An opaque externally-defined call, dispatched through the host
    /// function table at execution time.
    Call { function: String, args: Vec<Expr> },

    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Cond {
        test: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    Const(Value),

    NewRecord { fields: Vec<(String, Expr)> },
    NewList { items: Vec<Expr> },

    Lambda { params: Vec<Param>, body: Box<Expr> },

    // Imperative forms, produced by the eliminator and plan assembly.
    /// A scope introducing locals; evaluates to its last expression.
    Block { vars: Vec<Param>, exprs: Vec<Expr> },
    /// Write `value` into `target` (a local or an access chain).
    Assign { target: Box<Expr>, value: Box<Expr> },
    /// `for index in 0..length { body }`
    For {
        index: Param,
        length: Box<Expr>,
        body: Box<Expr>,
    },
    /// Exit the innermost enclosing `For`.
    Break,
    /// Push `value` onto the list held by `list` (a local).
    Append { list: Box<Expr>, value: Box<Expr> },
    /// Invalid-operation failure surfaced at execution time. Produced
    /// for data-shape violations such as `Single` with no match.
    Fail { message: String },
}

impl Expr {
    // ── Leaf constructors ────────────────────────────────────────────

    pub fn param(id: u32, name: impl Into<String>) -> Expr {
        Expr::Param(Param::new(id, name))
    }

    pub fn constant(value: Value) -> Expr {
        Expr::Const(value)
    }

    pub fn int(v: i64) -> Expr {
        Expr::Const(Value::Int(v))
    }

    pub fn text(v: impl Into<String>) -> Expr {
        Expr::Const(Value::Text(v.into()))
    }

    pub fn boolean(v: bool) -> Expr {
        Expr::Const(Value::Bool(v))
    }

    pub fn null() -> Expr {
        Expr::Const(Value::Null)
    }

    pub fn lambda(params: Vec<Param>, body: Expr) -> Expr {
        Expr::Lambda {
            params,
            body: Box::new(body),
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            function: function.into(),
            args,
        }
    }

    // ── Chain builders ───────────────────────────────────────────────

    pub fn field(self, name: impl Into<String>) -> Expr {
        Expr::Member {
            object: Box::new(self),
            name: name.into(),
        }
    }

    pub fn at(self, index: i64) -> Expr {
        Expr::Index {
            object: Box::new(self),
            key: Box::new(Expr::int(index)),
        }
    }

    pub fn key(self, key: impl Into<String>) -> Expr {
        Expr::Index {
            object: Box::new(self),
            key: Box::new(Expr::text(key)),
        }
    }

    pub fn index_by(self, key: Expr) -> Expr {
        Expr::Index {
            object: Box::new(self),
            key: Box::new(key),
        }
    }

    pub fn length(self) -> Expr {
        Expr::Length(Box::new(self))
    }

    pub fn each(self) -> Expr {
        Expr::Each(Box::new(self))
    }

    pub fn current(self) -> Expr {
        Expr::Current(Box::new(self))
    }

    pub fn current_index(self) -> Expr {
        Expr::CurrentIndex(Box::new(self))
    }

    pub fn template_index(self) -> Expr {
        Expr::TemplateIndex(Box::new(self))
    }

    // ── Operator builders ────────────────────────────────────────────

    pub fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn gt(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Gt, self, other)
    }

    pub fn ge(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Ge, self, other)
    }

    pub fn lt(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Lt, self, other)
    }

    pub fn le(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Le, self, other)
    }

    pub fn eq_(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Eq, self, other)
    }

    pub fn ne_(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Ne, self, other)
    }

    pub fn and_(self, other: Expr) -> Expr {
        Expr::binary(BinOp::And, self, other)
    }

    pub fn or_(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Or, self, other)
    }

    pub fn add(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Add, self, other)
    }

    pub fn sub(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Sub, self, other)
    }

    pub fn mul(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Mul, self, other)
    }

    pub fn div(self, other: Expr) -> Expr {
        Expr::binary(BinOp::Div, self, other)
    }

    pub fn not_(self) -> Expr {
        Expr::Unary {
            op: UnOp::Not,
            operand: Box::new(self),
        }
    }

    pub fn cond(test: Expr, if_true: Expr, if_false: Expr) -> Expr {
        Expr::Cond {
            test: Box::new(test),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    // ── Sequence operator builders ───────────────────────────────────

    pub fn seq(op: SeqOp, source: Expr, args: Vec<Expr>) -> Expr {
        Expr::Seq {
            op,
            source: Box::new(source),
            args,
        }
    }

    pub fn select(self, selector: Expr) -> Expr {
        Expr::seq(SeqOp::Select, self, vec![selector])
    }

    pub fn select_many(self, selector: Expr) -> Expr {
        Expr::seq(SeqOp::SelectMany, self, vec![selector])
    }

    pub fn where_(self, predicate: Expr) -> Expr {
        Expr::seq(SeqOp::Where, self, vec![predicate])
    }

    pub fn first(self, predicate: Option<Expr>) -> Expr {
        Expr::seq(SeqOp::First, self, predicate.into_iter().collect())
    }

    pub fn first_or_default(self, predicate: Option<Expr>) -> Expr {
        Expr::seq(SeqOp::FirstOrDefault, self, predicate.into_iter().collect())
    }

    pub fn single(self, predicate: Option<Expr>) -> Expr {
        Expr::seq(SeqOp::Single, self, predicate.into_iter().collect())
    }

    pub fn single_or_default(self, predicate: Option<Expr>) -> Expr {
        Expr::seq(
            SeqOp::SingleOrDefault,
            self,
            predicate.into_iter().collect(),
        )
    }

    pub fn any_(self, predicate: Option<Expr>) -> Expr {
        Expr::seq(SeqOp::Any, self, predicate.into_iter().collect())
    }

    pub fn all_(self, predicate: Expr) -> Expr {
        Expr::seq(SeqOp::All, self, vec![predicate])
    }

    pub fn sum(self, selector: Option<Expr>) -> Expr {
        Expr::seq(SeqOp::Sum, self, selector.into_iter().collect())
    }

    pub fn count(self, predicate: Option<Expr>) -> Expr {
        Expr::seq(SeqOp::Count, self, predicate.into_iter().collect())
    }

    pub fn aggregate(self, seed: Expr, accumulator: Expr) -> Expr {
        Expr::seq(SeqOp::Aggregate, self, vec![seed, accumulator])
    }

    pub fn contains(self, value: Expr) -> Expr {
        Expr::seq(SeqOp::Contains, self, vec![value])
    }

    // ── Structure helpers ────────────────────────────────────────────

    /// True for `|x| x` of any arity-one lambda.
    pub fn is_identity_lambda(&self) -> bool {
        match self {
            Expr::Lambda { params, body } if params.len() == 1 => {
                matches!(body.as_ref(), Expr::Param(p) if *p == params[0])
            }
            _ => false,
        }
    }

    /// Pre-order traversal over this node and every descendant.
    pub fn walk(&self, visitor: &mut dyn FnMut(&Expr)) {
        visitor(self);
        match self {
            Expr::Param(_) | Expr::Const(_) | Expr::Break | Expr::Fail { .. } => {}
            Expr::Member { object, .. }
            | Expr::Length(object)
            | Expr::Each(object)
            | Expr::Current(object)
            | Expr::CurrentIndex(object)
            | Expr::TemplateIndex(object) => object.walk(visitor),
            Expr::Index { object, key } => {
                object.walk(visitor);
                key.walk(visitor);
            }
            Expr::Seq { source, args, .. } => {
                source.walk(visitor);
                for arg in args {
                    arg.walk(visitor);
                }
            }
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.walk(visitor);
                }
            }
            Expr::Binary { left, right, .. } => {
                left.walk(visitor);
                right.walk(visitor);
            }
            Expr::Unary { operand, .. } => operand.walk(visitor),
            Expr::Cond {
                test,
                if_true,
                if_false,
            } => {
                test.walk(visitor);
                if_true.walk(visitor);
                if_false.walk(visitor);
            }
            Expr::NewRecord { fields } => {
                for (_, f) in fields {
                    f.walk(visitor);
                }
            }
            Expr::NewList { items } => {
                for item in items {
                    item.walk(visitor);
                }
            }
            Expr::Lambda { body, .. } => body.walk(visitor),
            Expr::Block { exprs, .. } => {
                for e in exprs {
                    e.walk(visitor);
                }
            }
            Expr::Assign { target, value } => {
                target.walk(visitor);
                value.walk(visitor);
            }
            Expr::For { length, body, .. } => {
                length.walk(visitor);
                body.walk(visitor);
            }
            Expr::Append { list, value } => {
                list.walk(visitor);
                value.walk(visitor);
            }
        }
    }

    /// Largest parameter id mentioned anywhere in the tree, binder or
    /// use. Fresh ids are allocated above this.
    pub fn max_param_id(&self) -> u32 {
        let mut max = 0u32;
        self.walk(&mut |e| {
            let seen = match e {
                Expr::Param(p) => Some(p.id),
                Expr::Lambda { params, .. } => params.iter().map(|p| p.id).max(),
                Expr::Block { vars, .. } => vars.iter().map(|p| p.id).max(),
                Expr::For { index, .. } => Some(index.id),
                _ => None,
            };
            if let Some(id) = seen {
                if id > max {
                    max = id;
                }
            }
        });
        max
    }
}
