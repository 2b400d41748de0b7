//! Untracked, plain copies of container graphs.
//!
//! A `PlainGraph` owns its tables in a flat vector and refers to them by index,
//! so shared substructure stays shared and cycles need no special casing.
//! It is the output of `Quota::clone_raw` and the input of `Quota::import`.

use serde::{Deserialize, Serialize};

use crate::value::{Key, Opaque, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlainValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    Str(String),
    Opaque(Opaque),
    /// Index into `PlainGraph::tables`.
    Table(usize),
}

impl PlainValue {
    /// Convert a non-container value. Containers have no plain form on their own.
    pub fn from_scalar(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Nil => PlainValue::Nil,
            Value::Bool(b) => PlainValue::Bool(*b),
            Value::Integer(i) => PlainValue::Integer(*i),
            Value::Number(n) => PlainValue::Number(*n),
            Value::Str(s) => PlainValue::Str(s.clone()),
            Value::Opaque(o) => PlainValue::Opaque(o.clone()),
            Value::Table(_) => return None,
        })
    }

    /// Inverse of `from_scalar`; `None` for table references.
    pub fn to_scalar(&self) -> Option<Value> {
        Some(match self {
            PlainValue::Nil => Value::Nil,
            PlainValue::Bool(b) => Value::Bool(*b),
            PlainValue::Integer(i) => Value::Integer(*i),
            PlainValue::Number(n) => Value::Number(*n),
            PlainValue::Str(s) => Value::Str(s.clone()),
            PlainValue::Opaque(o) => Value::Opaque(o.clone()),
            PlainValue::Table(_) => return None,
        })
    }

    pub fn as_table(&self) -> Option<usize> {
        match self {
            PlainValue::Table(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for PlainValue {
    fn from(v: &str) -> Self {
        PlainValue::Str(v.to_string())
    }
}

impl From<i64> for PlainValue {
    fn from(v: i64) -> Self {
        PlainValue::Integer(v)
    }
}

impl From<bool> for PlainValue {
    fn from(v: bool) -> Self {
        PlainValue::Bool(v)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlainTable {
    pub entries: Vec<(Key, PlainValue)>,
}

impl PlainTable {
    pub fn get(&self, key: &Key) -> Option<&PlainValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlainGraph {
    pub root: PlainValue,
    pub tables: Vec<PlainTable>,
}

impl Default for PlainGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PlainGraph {
    /// Graph whose root is a single empty table at index 0.
    pub fn new() -> Self {
        Self {
            root: PlainValue::Table(0),
            tables: vec![PlainTable::default()],
        }
    }

    /// Graph holding one scalar and no tables.
    pub fn scalar(value: PlainValue) -> Self {
        Self {
            root: value,
            tables: Vec::new(),
        }
    }

    pub fn add_table(&mut self) -> usize {
        self.tables.push(PlainTable::default());
        self.tables.len() - 1
    }

    /// Append an entry to table `table`. Returns false if the index is unknown.
    pub fn push_entry(&mut self, table: usize, key: impl Into<Key>, value: PlainValue) -> bool {
        match self.tables.get_mut(table) {
            Some(t) => {
                t.entries.push((key.into(), value));
                true
            }
            None => false,
        }
    }

    pub fn table(&self, index: usize) -> Option<&PlainTable> {
        self.tables.get(index)
    }

    pub fn root_table(&self) -> Option<&PlainTable> {
        self.root.as_table().and_then(|i| self.tables.get(i))
    }
}
