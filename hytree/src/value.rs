//! Runtime values produced by evaluating a code tree.
use std::sync::Arc;

use strum::{EnumIs, EnumTryAs};

use crate::node::Node;

/// A lambda closed over the bindings visible where it was evaluated.
#[derive(Debug, Clone)]
pub struct Closure {
    /// The `Lambda` node.
    pub lambda: Node,
    /// Captured parameter bindings, innermost last.
    pub captured: Arc<[(Node, Value)]>,
}

/// A runtime value. `Null` inhabits every nullable and reference type.
#[derive(Debug, Clone, Default, EnumIs, EnumTryAs)]
pub enum Value {
    #[default]
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    /// A quoted tree, kept as data.
    Tree(Node),
    Closure(Arc<Closure>),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tree(a), Value::Tree(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Tree(node) => write!(f, "quote({})", node.kind_name()),
            Value::Closure(_) => write!(f, "<closure>"),
        }
    }
}
