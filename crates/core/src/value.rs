//! Runtime value model for tree-shaped data.
//!
//! Every object graph the engine operates on is a `Value` tree: records
//! with named fields, lists, and scalar leaves. All non-integer numerics
//! use `rust_decimal::Decimal` -- never `f64`.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

// ──────────────────────────────────────────────
// Runtime values
// ──────────────────────────────────────────────

/// A node in a tree-shaped object graph.
///
/// `Null` doubles as "absent": a missing record field, an unset nullable
/// scalar, and the default produced by short-circuited access chains are
/// all `Null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(Decimal),
    Text(String),
    Record(BTreeMap<String, Value>),
    List(Vec<Value>),
}

impl Value {
    /// Returns a human-readable type name for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Decimal(_) => "Decimal",
            Value::Text(_) => "Text",
            Value::Record(_) => "Record",
            Value::List(_) => "List",
        }
    }

    /// True for `Null`, the empty string, and the empty list.
    ///
    /// This is the emptiness notion used by short-circuiting access
    /// chains: any of these anywhere along a chain degrades the whole
    /// expression to `Null` instead of faulting.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// Lenient boolean view: `Null` reads as `false`, a real `Bool`
    /// reads as itself. Anything else is `None`.
    pub fn as_bool_lenient(&self) -> Option<bool> {
        match self {
            Value::Null => Some(false),
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Builds a record from field pairs. Test and fixture helper.
    pub fn record<I, K>(fields: I) -> Value
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| (k.into(), v))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    /// Builds a list value.
    pub fn list<I: IntoIterator<Item = Value>>(items: I) -> Value {
        Value::List(items.into_iter().collect())
    }

    /// Shared field lookup: `Null` on a missing field or non-record.
    pub fn field(&self, name: &str) -> Value {
        match self {
            Value::Record(fields) => fields.get(name).cloned().unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    /// Shared element lookup: `Null` when out of range or non-list.
    pub fn at(&self, index: i64) -> Value {
        match self {
            Value::List(items) if index >= 0 => {
                items.get(index as usize).cloned().unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    }

    /// List length; `Null` and non-lists count as zero elements.
    pub fn len(&self) -> i64 {
        match self {
            Value::List(items) => items.len() as i64,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_and_empty_detection() {
        assert!(Value::Null.is_null_or_empty());
        assert!(Value::Text(String::new()).is_null_or_empty());
        assert!(Value::List(vec![]).is_null_or_empty());
        assert!(!Value::Int(0).is_null_or_empty());
        assert!(!Value::Text("x".to_string()).is_null_or_empty());
    }

    #[test]
    fn lenient_bool() {
        assert_eq!(Value::Null.as_bool_lenient(), Some(false));
        assert_eq!(Value::Bool(true).as_bool_lenient(), Some(true));
        assert_eq!(Value::Int(1).as_bool_lenient(), None);
    }

    #[test]
    fn field_and_index_degrade_to_null() {
        let rec = Value::record([("a", Value::Int(1))]);
        assert_eq!(rec.field("a"), Value::Int(1));
        assert_eq!(rec.field("missing"), Value::Null);
        assert_eq!(Value::Null.field("a"), Value::Null);

        let list = Value::list([Value::Int(10), Value::Int(20)]);
        assert_eq!(list.at(1), Value::Int(20));
        assert_eq!(list.at(5), Value::Null);
        assert_eq!(list.at(-1), Value::Null);
        assert_eq!(list.len(), 2);
        assert_eq!(Value::Null.len(), 0);
    }
}
