//! Tree-walking evaluator over the runtime value model.
//!
//! Stands behind the [`Backend`](crate::backend::Backend) seam where
//! an external native-code generator would otherwise plug in. The
//! evaluator is lenient where null-extended code expects it: missing
//! fields, out-of-range indices, and `Null` operands degrade to `Null`
//! (comparisons to `false`) instead of faulting. What does fault is a
//! genuine contract violation: `Fail` nodes from eliminated operators,
//! unknown host functions, and type errors.
//!
//! Non-integer numerics are `Decimal` throughout; `Int` operands
//! promote when mixed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use rust_decimal::Decimal;

use graft_core::{BinOp, Expr, UnOp, Value};

use crate::error::EvalError;

// ──────────────────────────────────────────────
// Host functions
// ──────────────────────────────────────────────

pub type HostFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Registry of opaque externally-defined functions dispatched by
/// `Expr::Call` nodes.
#[derive(Clone, Default)]
pub struct HostFunctions {
    table: BTreeMap<String, HostFn>,
}

impl HostFunctions {
    pub fn new() -> HostFunctions {
        HostFunctions {
            table: BTreeMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, f: F)
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.table.insert(name.to_string(), Arc::new(f));
    }

    fn get(&self, name: &str) -> Option<&HostFn> {
        self.table.get(name)
    }
}

// ──────────────────────────────────────────────
// Evaluator
// ──────────────────────────────────────────────

/// Control flow out of a subexpression: a value, or a `Break` escaping
/// to the nearest enclosing loop.
enum Flow {
    Value(Value),
    Break,
}

struct Env {
    vars: HashMap<u32, Value>,
}

enum Acc {
    Field(String),
    At(i64),
}

#[derive(Clone)]
pub struct Interp {
    host: Arc<HostFunctions>,
}

impl Interp {
    pub fn new() -> Interp {
        Interp {
            host: Arc::new(HostFunctions::new()),
        }
    }

    pub fn with_host(host: Arc<HostFunctions>) -> Interp {
        Interp { host }
    }

    /// Applies a lambda to `args`. Parameters bind positionally; after
    /// evaluation the (possibly mutated) parameter values are written
    /// back into `args`, which is how compiled mutators update their
    /// data root in place.
    pub fn eval_lambda(&self, lambda: &Expr, args: &mut [Value]) -> Result<Value, EvalError> {
        let (params, body) = match lambda {
            Expr::Lambda { params, body } => (params, body.as_ref()),
            _ => {
                return Err(EvalError::TypeError {
                    message: "expected a lambda".to_string(),
                })
            }
        };
        if params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                expected: params.len(),
                got: args.len(),
            });
        }

        let mut env = Env {
            vars: HashMap::new(),
        };
        for (p, a) in params.iter().zip(args.iter()) {
            env.vars.insert(p.id, a.clone());
        }
        let out = self.eval(body, &mut env)?;
        for (p, a) in params.iter().zip(args.iter_mut()) {
            if let Some(v) = env.vars.remove(&p.id) {
                *a = v;
            }
        }
        Ok(match out {
            Flow::Value(v) => v,
            Flow::Break => Value::Null,
        })
    }

    /// Evaluates an expression with no bound parameters, e.g. an
    /// extracted canonical slot.
    pub fn eval_closed(&self, expr: &Expr) -> Result<Value, EvalError> {
        let mut env = Env {
            vars: HashMap::new(),
        };
        match self.eval(expr, &mut env)? {
            Flow::Value(v) => Ok(v),
            Flow::Break => Ok(Value::Null),
        }
    }

    fn eval(&self, expr: &Expr, env: &mut Env) -> Result<Flow, EvalError> {
        match expr {
            Expr::Param(p) => env
                .vars
                .get(&p.id)
                .cloned()
                .map(Flow::Value)
                .ok_or_else(|| EvalError::UnboundParameter {
                    name: p.name.clone(),
                }),
            Expr::Member { object, name } => {
                Ok(Flow::Value(self.eval_value(object, env)?.field(name)))
            }
            Expr::Index { object, key } => {
                let object = self.eval_value(object, env)?;
                let key = self.eval_value(key, env)?;
                Ok(Flow::Value(index_value(&object, &key)))
            }
            Expr::Length(object) => {
                Ok(Flow::Value(Value::Int(self.eval_value(object, env)?.len())))
            }

            Expr::Each(_) => Err(placeholder("each()")),
            Expr::Current(_) => Err(placeholder("current()")),
            Expr::CurrentIndex(_) => Err(placeholder("current_index()")),
            Expr::TemplateIndex(_) => Err(placeholder("template_index()")),
            Expr::Seq { op, .. } => Err(EvalError::UnloweredOperator {
                op: op.name().to_string(),
            }),

            Expr::Call { function, args } => {
                let mut argv = Vec::with_capacity(args.len());
                for arg in args {
                    argv.push(self.eval_value(arg, env)?);
                }
                let f = self
                    .host
                    .get(function)
                    .ok_or_else(|| EvalError::UnknownFunction {
                        name: function.clone(),
                    })?;
                Ok(Flow::Value(f(&argv)?))
            }

            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, env),
            Expr::Unary { op, operand } => {
                let v = self.eval_value(operand, env)?;
                Ok(Flow::Value(eval_unary(*op, v)?))
            }
            Expr::Cond {
                test,
                if_true,
                if_false,
            } => {
                let test = truthy(&self.eval_value(test, env)?)?;
                if test {
                    self.eval(if_true, env)
                } else {
                    self.eval(if_false, env)
                }
            }
            Expr::Const(v) => Ok(Flow::Value(v.clone())),

            Expr::NewRecord { fields } => {
                let mut out = BTreeMap::new();
                for (name, field) in fields {
                    out.insert(name.clone(), self.eval_value(field, env)?);
                }
                Ok(Flow::Value(Value::Record(out)))
            }
            Expr::NewList { items } => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(self.eval_value(item, env)?);
                }
                Ok(Flow::Value(Value::List(out)))
            }

            Expr::Lambda { .. } => Err(EvalError::TypeError {
                message: "lambda is not a runtime value".to_string(),
            }),

            Expr::Block { vars, exprs } => {
                for v in vars {
                    env.vars.insert(v.id, Value::Null);
                }
                let mut last = Value::Null;
                let mut broke = false;
                for e in exprs {
                    match self.eval(e, env)? {
                        Flow::Value(v) => last = v,
                        Flow::Break => {
                            broke = true;
                            break;
                        }
                    }
                }
                for v in vars {
                    env.vars.remove(&v.id);
                }
                Ok(if broke { Flow::Break } else { Flow::Value(last) })
            }
            Expr::Assign { target, value } => {
                let value = self.eval_value(value, env)?;
                self.assign(target, value, env)?;
                Ok(Flow::Value(Value::Null))
            }
            Expr::For {
                index,
                length,
                body,
            } => {
                let n = match self.eval_value(length, env)? {
                    Value::Int(n) => n.max(0),
                    Value::Null => 0,
                    other => {
                        return Err(EvalError::TypeError {
                            message: format!("loop length of type {}", other.type_name()),
                        })
                    }
                };
                for i in 0..n {
                    env.vars.insert(index.id, Value::Int(i));
                    match self.eval(body, env)? {
                        Flow::Break => break,
                        Flow::Value(_) => {}
                    }
                }
                env.vars.remove(&index.id);
                Ok(Flow::Value(Value::Null))
            }
            Expr::Break => Ok(Flow::Break),
            Expr::Append { list, value } => {
                let value = self.eval_value(value, env)?;
                match list.as_ref() {
                    Expr::Param(p) => {
                        let slot = env.vars.entry(p.id).or_insert(Value::Null);
                        match slot {
                            Value::List(items) => items.push(value),
                            Value::Null => *slot = Value::List(vec![value]),
                            other => {
                                return Err(EvalError::TypeError {
                                    message: format!("append to {}", other.type_name()),
                                })
                            }
                        }
                        Ok(Flow::Value(Value::Null))
                    }
                    _ => Err(EvalError::TypeError {
                        message: "append target must be a local".to_string(),
                    }),
                }
            }
            Expr::Fail { message } => Err(EvalError::InvalidOperation {
                message: message.clone(),
            }),
        }
    }

    /// Evaluates a subexpression in a value position, where a stray
    /// `Break` has nothing to escape to.
    fn eval_value(&self, expr: &Expr, env: &mut Env) -> Result<Value, EvalError> {
        match self.eval(expr, env)? {
            Flow::Value(v) => Ok(v),
            Flow::Break => Err(EvalError::TypeError {
                message: "break outside a loop".to_string(),
            }),
        }
    }

    fn eval_binary(
        &self,
        op: BinOp,
        left: &Expr,
        right: &Expr,
        env: &mut Env,
    ) -> Result<Flow, EvalError> {
        match op {
            // Lazy operators short-circuit; `Null` reads as false.
            BinOp::And => {
                if !truthy(&self.eval_value(left, env)?)? {
                    return Ok(Flow::Value(Value::Bool(false)));
                }
                let r = truthy(&self.eval_value(right, env)?)?;
                Ok(Flow::Value(Value::Bool(r)))
            }
            BinOp::Or => {
                if truthy(&self.eval_value(left, env)?)? {
                    return Ok(Flow::Value(Value::Bool(true)));
                }
                let r = truthy(&self.eval_value(right, env)?)?;
                Ok(Flow::Value(Value::Bool(r)))
            }
            _ => {
                let l = self.eval_value(left, env)?;
                let r = self.eval_value(right, env)?;
                Ok(Flow::Value(apply_binary(op, l, r)?))
            }
        }
    }

    fn assign(&self, target: &Expr, value: Value, env: &mut Env) -> Result<(), EvalError> {
        let mut accs: Vec<Acc> = Vec::new();
        let mut node = target;
        let root = loop {
            match node {
                Expr::Param(p) => break p,
                Expr::Member { object, name } => {
                    accs.push(Acc::Field(name.clone()));
                    node = object;
                }
                Expr::Index { object, key } => {
                    match self.eval_value(key, env)? {
                        Value::Int(i) => accs.push(Acc::At(i)),
                        Value::Text(k) => accs.push(Acc::Field(k)),
                        other => {
                            return Err(EvalError::TypeError {
                                message: format!("index key of type {}", other.type_name()),
                            })
                        }
                    }
                    node = object;
                }
                _ => {
                    return Err(EvalError::TypeError {
                        message: "assignment target is not a place".to_string(),
                    })
                }
            }
        };
        accs.reverse();
        let slot = env.vars.entry(root.id).or_insert(Value::Null);
        write_place(slot, &accs, value);
        Ok(())
    }
}

impl Default for Interp {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes `value` at the end of an accessor chain, creating records
/// and growing lists along the way. A negative index write is a no-op.
fn write_place(slot: &mut Value, accs: &[Acc], value: Value) {
    let Some((first, rest)) = accs.split_first() else {
        *slot = value;
        return;
    };
    match first {
        Acc::Field(name) => {
            if !matches!(slot, Value::Record(_)) {
                *slot = Value::Record(BTreeMap::new());
            }
            let Value::Record(fields) = slot else {
                unreachable!()
            };
            write_place(
                fields.entry(name.clone()).or_insert(Value::Null),
                rest,
                value,
            );
        }
        Acc::At(i) => {
            if *i < 0 {
                return;
            }
            if !matches!(slot, Value::List(_)) {
                *slot = Value::List(Vec::new());
            }
            let Value::List(items) = slot else {
                unreachable!()
            };
            let idx = *i as usize;
            if items.len() <= idx {
                items.resize(idx + 1, Value::Null);
            }
            write_place(&mut items[idx], rest, value);
        }
    }
}

fn placeholder(marker: &str) -> EvalError {
    EvalError::PlaceholderAtRuntime {
        marker: marker.to_string(),
    }
}

fn index_value(object: &Value, key: &Value) -> Value {
    match key {
        Value::Int(i) => object.at(*i),
        Value::Text(k) => object.field(k),
        _ => Value::Null,
    }
}

fn truthy(v: &Value) -> Result<bool, EvalError> {
    v.as_bool_lenient().ok_or_else(|| EvalError::TypeError {
        message: format!("condition of type {}", v.type_name()),
    })
}

fn as_decimal(v: &Value) -> Option<Decimal> {
    match v {
        Value::Int(i) => Some(Decimal::from(*i)),
        Value::Decimal(d) => Some(*d),
        _ => None,
    }
}

fn apply_binary(op: BinOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match op {
        BinOp::Eq => Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => Ok(Value::Bool(!values_equal(&l, &r))),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => compare(op, &l, &r),
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => arith(op, &l, &r),
        BinOp::And | BinOp::Or => unreachable!("lazy operators handled by the caller"),
    }
}

fn values_equal(l: &Value, r: &Value) -> bool {
    match (as_decimal(l), as_decimal(r)) {
        (Some(a), Some(b)) => a == b,
        _ => l == r,
    }
}

/// Ordering comparisons: `Null` on either side degrades to `false`,
/// numerics promote, text compares lexicographically.
fn compare(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if matches!(l, Value::Null) || matches!(r, Value::Null) {
        return Ok(Value::Bool(false));
    }
    let ordering = match (l, r) {
        (Value::Text(a), Value::Text(b)) => a.cmp(b),
        _ => match (as_decimal(l), as_decimal(r)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => {
                return Err(EvalError::TypeError {
                    message: format!("cannot compare {} to {}", l.type_name(), r.type_name()),
                })
            }
        },
    };
    let result = match op {
        BinOp::Lt => ordering.is_lt(),
        BinOp::Le => ordering.is_le(),
        BinOp::Gt => ordering.is_gt(),
        BinOp::Ge => ordering.is_ge(),
        _ => unreachable!(),
    };
    Ok(Value::Bool(result))
}

/// Arithmetic: `Null` propagates, `Int` pairs stay integral, mixed
/// numerics promote to `Decimal`, text concatenates under `Add`.
fn arith(op: BinOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if matches!(l, Value::Null) || matches!(r, Value::Null) {
        return Ok(Value::Null);
    }
    if let (Value::Text(a), Value::Text(b)) = (l, r) {
        if op == BinOp::Add {
            return Ok(Value::Text(format!("{}{}", a, b)));
        }
    }
    if let (Value::Int(a), Value::Int(b)) = (l, r) {
        let out = match op {
            BinOp::Add => a.checked_add(*b),
            BinOp::Sub => a.checked_sub(*b),
            BinOp::Mul => a.checked_mul(*b),
            BinOp::Div => {
                if *b == 0 {
                    return Err(EvalError::InvalidOperation {
                        message: "division by zero".to_string(),
                    });
                }
                a.checked_div(*b)
            }
            _ => unreachable!(),
        };
        return out.map(Value::Int).ok_or_else(|| EvalError::Overflow {
            message: format!("{} over Int", op_name(op)),
        });
    }
    match (as_decimal(l), as_decimal(r)) {
        (Some(a), Some(b)) => {
            let out = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div => {
                    if b.is_zero() {
                        return Err(EvalError::InvalidOperation {
                            message: "division by zero".to_string(),
                        });
                    }
                    a.checked_div(b)
                }
                _ => unreachable!(),
            };
            out.map(Value::Decimal).ok_or_else(|| EvalError::Overflow {
                message: format!("{} over Decimal", op_name(op)),
            })
        }
        _ => Err(EvalError::TypeError {
            message: format!(
                "cannot apply {} to {} and {}",
                op_name(op),
                l.type_name(),
                r.type_name()
            ),
        }),
    }
}

fn op_name(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "add",
        BinOp::Sub => "subtract",
        BinOp::Mul => "multiply",
        BinOp::Div => "divide",
        _ => "compare",
    }
}

fn eval_unary(op: UnOp, v: Value) -> Result<Value, EvalError> {
    match op {
        UnOp::Not => Ok(Value::Bool(!truthy(&v)?)),
        UnOp::Neg => match v {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => i.checked_neg().map(Value::Int).ok_or_else(|| {
                EvalError::Overflow {
                    message: "negate over Int".to_string(),
                }
            }),
            Value::Decimal(d) => Ok(Value::Decimal(-d)),
            other => Err(EvalError::TypeError {
                message: format!("cannot negate {}", other.type_name()),
            }),
        },
        UnOp::IsNullOrEmpty => Ok(Value::Bool(v.is_null_or_empty())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use graft_core::Param;

    fn run(lambda: &Expr, args: &mut [Value]) -> Value {
        Interp::new().eval_lambda(lambda, args).unwrap()
    }

    fn unary_lambda(body: Expr) -> Expr {
        Expr::lambda(vec![Param::new(0, "a")], body)
    }

    #[test]
    fn chains_degrade_to_null() {
        let body = Expr::param(0, "a").field("B").field("Missing");
        let lambda = unary_lambda(body);
        let mut args = [Value::record([("B", Value::record([("C", Value::Int(1))]))])];
        assert_eq!(run(&lambda, &mut args), Value::Null);

        let mut null_args = [Value::Null];
        assert_eq!(run(&lambda, &mut null_args), Value::Null);
    }

    #[test]
    fn null_comparisons_are_false_and_lazy_ops_lenient() {
        let body = Expr::param(0, "a")
            .field("X")
            .gt(Expr::int(0))
            .and_(Expr::param(0, "a").field("Flag"));
        let lambda = unary_lambda(body);
        let mut args = [Value::Null];
        assert_eq!(run(&lambda, &mut args), Value::Bool(false));
    }

    #[test]
    fn assignment_vivifies_records_and_lists() {
        let target = Expr::param(0, "a").field("B").at(2).field("X");
        let lambda = unary_lambda(Expr::Assign {
            target: Box::new(target),
            value: Box::new(Expr::int(7)),
        });
        let mut args = [Value::Null];
        run(&lambda, &mut args);
        let expected = Value::record([(
            "B",
            Value::list([
                Value::Null,
                Value::Null,
                Value::record([("X", Value::Int(7))]),
            ]),
        )]);
        assert_eq!(args[0], expected);
    }

    #[test]
    fn for_loop_with_break() {
        // sum the first two elements, then break
        let acc = Param::new(1, "acc");
        let i = Param::new(2, "i");
        let body = Expr::Block {
            vars: vec![acc.clone()],
            exprs: vec![
                Expr::Assign {
                    target: Box::new(Expr::Param(acc.clone())),
                    value: Box::new(Expr::int(0)),
                },
                Expr::For {
                    index: i.clone(),
                    length: Box::new(Expr::param(0, "a").length()),
                    body: Box::new(Expr::cond(
                        Expr::Param(i.clone()).ge(Expr::int(2)),
                        Expr::Break,
                        Expr::Assign {
                            target: Box::new(Expr::Param(acc.clone())),
                            value: Box::new(
                                Expr::Param(acc.clone())
                                    .add(Expr::param(0, "a").index_by(Expr::Param(i))),
                            ),
                        },
                    )),
                },
                Expr::Param(acc),
            ],
        };
        let lambda = unary_lambda(body);
        let mut args = [Value::list([
            Value::Int(10),
            Value::Int(20),
            Value::Int(40),
        ])];
        assert_eq!(run(&lambda, &mut args), Value::Int(30));
    }

    #[test]
    fn fail_surfaces_as_invalid_operation() {
        let lambda = unary_lambda(Expr::Fail {
            message: "bad shape".to_string(),
        });
        let mut args = [Value::Null];
        let err = Interp::new().eval_lambda(&lambda, &mut args).unwrap_err();
        assert_eq!(
            err,
            EvalError::InvalidOperation {
                message: "bad shape".to_string()
            }
        );
    }

    #[test]
    fn host_functions_dispatch_by_name() {
        let mut host = HostFunctions::new();
        host.register("double", |args| match args {
            [Value::Int(i)] => Ok(Value::Int(i * 2)),
            _ => Err(EvalError::TypeError {
                message: "double expects one Int".to_string(),
            }),
        });
        let interp = Interp::with_host(Arc::new(host));
        let lambda = unary_lambda(Expr::call("double", vec![Expr::param(0, "a")]));
        let mut args = [Value::Int(21)];
        assert_eq!(interp.eval_lambda(&lambda, &mut args).unwrap(), Value::Int(42));

        let missing = unary_lambda(Expr::call("triple", vec![Expr::param(0, "a")]));
        assert!(matches!(
            Interp::new().eval_lambda(&missing, &mut [Value::Int(1)]),
            Err(EvalError::UnknownFunction { .. })
        ));
    }

    #[test]
    fn mixed_numerics_promote_to_decimal() {
        let body = Expr::param(0, "a").mul(Expr::constant(Value::Decimal(
            Decimal::new(25, 1), // 2.5
        )));
        let lambda = unary_lambda(body);
        let mut args = [Value::Int(4)];
        assert_eq!(
            run(&lambda, &mut args),
            Value::Decimal(Decimal::new(100, 1))
        );
    }

    #[test]
    fn unlowered_operator_is_an_error() {
        let body = Expr::param(0, "a").count(None);
        let lambda = unary_lambda(body);
        assert!(matches!(
            Interp::new().eval_lambda(&lambda, &mut [Value::Null]),
            Err(EvalError::UnloweredOperator { .. })
        ));
    }
}
