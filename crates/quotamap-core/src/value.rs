//! Values stored in budgeted containers.
//!
//! Containers are the only recursive kind and appear here as a handle into the
//! owning `Quota` arena; every other kind is priced without looking inside it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::id::ContainerId;

/// Mapping key: text or integer. Integer keys sort before text keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl Key {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Key::Int(i) => Some(*i),
            Key::Str(_) => None,
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Int(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::Str(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::Str(v)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Engine-native handle kinds. They have a fixed, non-recursive cost.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpaqueKind {
    Function,
    Userdata,
    LightUserdata,
    Thread,
    /// A kind the estimator has no price for.
    Other(String),
}

impl OpaqueKind {
    pub fn name(&self) -> &str {
        match self {
            OpaqueKind::Function => "function",
            OpaqueKind::Userdata => "userdata",
            OpaqueKind::LightUserdata => "lightuserdata",
            OpaqueKind::Thread => "thread",
            OpaqueKind::Other(name) => name,
        }
    }
}

/// An opaque engine value: a kind plus the host's identity for it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Opaque {
    pub kind: OpaqueKind,
    pub handle: u64,
}

impl Opaque {
    pub fn new(kind: OpaqueKind, handle: u64) -> Self {
        Self { kind, handle }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Value {
    #[default]
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    Opaque(Opaque),
    Table(ContainerId),
}

impl Value {
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_table(&self) -> Option<ContainerId> {
        match self {
            Value::Table(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Integer(_) | Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Opaque(o) => o.kind.name(),
            Value::Table(_) => "table",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<ContainerId> for Value {
    fn from(v: ContainerId) -> Self {
        Value::Table(v)
    }
}

impl From<Opaque> for Value {
    fn from(v: Opaque) -> Self {
        Value::Opaque(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_keys_sort_before_text_keys() {
        let mut keys = vec![Key::from("b"), Key::from(2), Key::from("a"), Key::from(1)];
        keys.sort();
        assert_eq!(
            keys,
            vec![Key::Int(1), Key::Int(2), Key::from("a"), Key::from("b")]
        );
    }

    #[test]
    fn kind_names() {
        assert_eq!(Value::from(1.5).kind_name(), "number");
        assert_eq!(Value::from(ContainerId::new(0, 0)).kind_name(), "table");
        let o = Opaque::new(OpaqueKind::Other("cdata".into()), 9);
        assert_eq!(Value::from(o).kind_name(), "cdata");
    }
}
