//! Structural equivalence.
//!
//! Compares two expression trees ignoring parameter identity: bound
//! parameters match positionally through their binders, free
//! parameters pair up by first use. `strict` additionally requires
//! parameter names to agree; `distinguish_each_and_current` controls
//! whether the `each()` and `current()` markers are interchangeable.
//!
//! This is the comparison the compiled-function cache falls back to on
//! a hash-bucket collision.

use crate::expr::{Expr, Param};

/// Structural equality with configurable parameter-name and
/// marker-distinction strictness.
pub fn equivalent(
    e1: &Expr,
    e2: &Expr,
    strict: bool,
    distinguish_each_and_current: bool,
) -> bool {
    let mut cmp = Cmp {
        strict,
        distinguish: distinguish_each_and_current,
        bound: Vec::new(),
        free: Vec::new(),
    };
    cmp.eq(e1, e2)
}

struct Cmp {
    strict: bool,
    distinguish: bool,
    /// Binder pairs currently in scope, innermost last.
    bound: Vec<(u32, u32)>,
    /// Free parameter pairs, in order of first use.
    free: Vec<(u32, u32)>,
}

impl Cmp {
    fn params_match(&mut self, p1: &Param, p2: &Param) -> bool {
        if self.strict && p1.name != p2.name {
            return false;
        }
        for (a, b) in self.bound.iter().rev() {
            if *a == p1.id || *b == p2.id {
                return *a == p1.id && *b == p2.id;
            }
        }
        for (a, b) in &self.free {
            if *a == p1.id || *b == p2.id {
                return *a == p1.id && *b == p2.id;
            }
        }
        self.free.push((p1.id, p2.id));
        true
    }

    fn bind_all(&mut self, ps1: &[Param], ps2: &[Param]) -> Option<usize> {
        if ps1.len() != ps2.len() {
            return None;
        }
        if self.strict
            && ps1
                .iter()
                .zip(ps2.iter())
                .any(|(a, b)| a.name != b.name)
        {
            return None;
        }
        let mark = self.bound.len();
        for (a, b) in ps1.iter().zip(ps2.iter()) {
            self.bound.push((a.id, b.id));
        }
        Some(mark)
    }

    fn unbind(&mut self, mark: usize) {
        self.bound.truncate(mark);
    }

    fn eq(&mut self, e1: &Expr, e2: &Expr) -> bool {
        match (e1, e2) {
            (Expr::Param(p1), Expr::Param(p2)) => self.params_match(p1, p2),
            (
                Expr::Member {
                    object: o1,
                    name: n1,
                },
                Expr::Member {
                    object: o2,
                    name: n2,
                },
            ) => n1 == n2 && self.eq(o1, o2),
            (
                Expr::Index {
                    object: o1,
                    key: k1,
                },
                Expr::Index {
                    object: o2,
                    key: k2,
                },
            ) => self.eq(o1, o2) && self.eq(k1, k2),
            (Expr::Length(o1), Expr::Length(o2)) => self.eq(o1, o2),
            (Expr::Each(o1), Expr::Each(o2)) => self.eq(o1, o2),
            (Expr::Current(o1), Expr::Current(o2)) => self.eq(o1, o2),
            (Expr::Each(o1), Expr::Current(o2)) | (Expr::Current(o1), Expr::Each(o2))
                if !self.distinguish =>
            {
                self.eq(o1, o2)
            }
            (Expr::CurrentIndex(o1), Expr::CurrentIndex(o2)) => self.eq(o1, o2),
            (Expr::TemplateIndex(o1), Expr::TemplateIndex(o2)) => self.eq(o1, o2),
            (
                Expr::Seq {
                    op: op1,
                    source: s1,
                    args: a1,
                },
                Expr::Seq {
                    op: op2,
                    source: s2,
                    args: a2,
                },
            ) => {
                op1 == op2
                    && a1.len() == a2.len()
                    && self.eq(s1, s2)
                    && a1.iter().zip(a2.iter()).all(|(x, y)| self.eq(x, y))
            }
            (
                Expr::Call {
                    function: f1,
                    args: a1,
                },
                Expr::Call {
                    function: f2,
                    args: a2,
                },
            ) => {
                f1 == f2
                    && a1.len() == a2.len()
                    && a1.iter().zip(a2.iter()).all(|(x, y)| self.eq(x, y))
            }
            (
                Expr::Binary {
                    op: op1,
                    left: l1,
                    right: r1,
                },
                Expr::Binary {
                    op: op2,
                    left: l2,
                    right: r2,
                },
            ) => op1 == op2 && self.eq(l1, l2) && self.eq(r1, r2),
            (
                Expr::Unary {
                    op: op1,
                    operand: o1,
                },
                Expr::Unary {
                    op: op2,
                    operand: o2,
                },
            ) => op1 == op2 && self.eq(o1, o2),
            (
                Expr::Cond {
                    test: t1,
                    if_true: a1,
                    if_false: b1,
                },
                Expr::Cond {
                    test: t2,
                    if_true: a2,
                    if_false: b2,
                },
            ) => self.eq(t1, t2) && self.eq(a1, a2) && self.eq(b1, b2),
            (Expr::Const(v1), Expr::Const(v2)) => v1 == v2,
            (Expr::NewRecord { fields: f1 }, Expr::NewRecord { fields: f2 }) => {
                f1.len() == f2.len()
                    && f1
                        .iter()
                        .zip(f2.iter())
                        .all(|((n1, e1), (n2, e2))| n1 == n2 && self.eq(e1, e2))
            }
            (Expr::NewList { items: i1 }, Expr::NewList { items: i2 }) => {
                i1.len() == i2.len()
                    && i1.iter().zip(i2.iter()).all(|(x, y)| self.eq(x, y))
            }
            (
                Expr::Lambda {
                    params: p1,
                    body: b1,
                },
                Expr::Lambda {
                    params: p2,
                    body: b2,
                },
            ) => match self.bind_all(p1, p2) {
                Some(mark) => {
                    let ok = self.eq(b1, b2);
                    self.unbind(mark);
                    ok
                }
                None => false,
            },
            (
                Expr::Block {
                    vars: v1,
                    exprs: x1,
                },
                Expr::Block {
                    vars: v2,
                    exprs: x2,
                },
            ) => match self.bind_all(v1, v2) {
                Some(mark) => {
                    let ok = x1.len() == x2.len()
                        && x1.iter().zip(x2.iter()).all(|(a, b)| self.eq(a, b));
                    self.unbind(mark);
                    ok
                }
                None => false,
            },
            (
                Expr::Assign {
                    target: t1,
                    value: v1,
                },
                Expr::Assign {
                    target: t2,
                    value: v2,
                },
            ) => self.eq(t1, t2) && self.eq(v1, v2),
            (
                Expr::For {
                    index: i1,
                    length: l1,
                    body: b1,
                },
                Expr::For {
                    index: i2,
                    length: l2,
                    body: b2,
                },
            ) => {
                if self.strict && i1.name != i2.name {
                    return false;
                }
                if !self.eq(l1, l2) {
                    return false;
                }
                self.bound.push((i1.id, i2.id));
                let ok = self.eq(b1, b2);
                self.bound.pop();
                ok
            }
            (Expr::Break, Expr::Break) => true,
            (Expr::Append { list: l1, value: v1 }, Expr::Append { list: l2, value: v2 }) => {
                self.eq(l1, l2) && self.eq(v1, v2)
            }
            (Expr::Fail { message: m1 }, Expr::Fail { message: m2 }) => m1 == m2,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Param;

    #[test]
    fn parameter_identity_is_positional() {
        let e1 = Expr::lambda(vec![Param::new(0, "x")], Expr::param(0, "x").field("F"));
        let e2 = Expr::lambda(vec![Param::new(9, "y")], Expr::param(9, "y").field("F"));
        assert!(equivalent(&e1, &e2, false, true));
        // Strict mode also compares names.
        assert!(!equivalent(&e1, &e2, true, true));
    }

    #[test]
    fn free_parameters_pair_by_first_use() {
        let e1 = Expr::param(1, "a").field("X").add(Expr::param(1, "a").field("Y"));
        let e2 = Expr::param(7, "b").field("X").add(Expr::param(7, "b").field("Y"));
        assert!(equivalent(&e1, &e2, false, true));

        // Two distinct roots on one side cannot pair with one root on
        // the other.
        let e3 = Expr::param(7, "b").field("X").add(Expr::param(8, "c").field("Y"));
        assert!(!equivalent(&e1, &e3, false, true));
    }

    #[test]
    fn each_current_distinction_flag() {
        let e1 = Expr::param(0, "a").field("B").each().field("Z");
        let e2 = Expr::param(0, "a").field("B").current().field("Z");
        assert!(equivalent(&e1, &e2, false, false));
        assert!(!equivalent(&e1, &e2, false, true));
    }

    #[test]
    fn constants_compare_by_value() {
        assert!(equivalent(&Expr::int(3), &Expr::int(3), true, true));
        assert!(!equivalent(&Expr::int(3), &Expr::int(4), true, true));
    }
}
