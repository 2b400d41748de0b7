//! Size estimator: value -> approximate byte cost.
//!
//! Constant time and never recursive. Container bodies are priced by the
//! graph walker in `quotamap-mem`, which adds `entry_cost` per entry on top of
//! the container header returned here.

use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::config::CostConfig;
use crate::error::{QuotaError, Result};
use crate::value::{Key, OpaqueKind, Value};

/// Kinds already reported as unpriced in this process.
static REPORTED_KINDS: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Record an unpriced kind. Returns true the first time a kind is seen.
fn report_unsupported(kind: &str) -> bool {
    let first = match REPORTED_KINDS.lock() {
        Ok(mut seen) => seen.insert(kind.to_string()),
        // A poisoned set only loses dedup; still report.
        Err(poisoned) => poisoned.into_inner().insert(kind.to_string()),
    };
    if first {
        tracing::warn!(kind, "unsupported value kind priced at 0 bytes");
    }
    first
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CostModel {
    costs: CostConfig,
    strict: bool,
}

impl Default for CostModel {
    fn default() -> Self {
        Self::new(CostConfig::default(), false)
    }
}

impl CostModel {
    pub fn new(costs: CostConfig, strict: bool) -> Self {
        Self { costs, strict }
    }

    pub fn costs(&self) -> &CostConfig {
        &self.costs
    }

    /// Cost of a single value. A container is priced at its header only.
    pub fn cost(&self, value: &Value) -> u64 {
        match value {
            Value::Nil => 0,
            Value::Bool(_) => self.costs.boolean,
            Value::Integer(_) | Value::Number(_) => self.costs.number,
            Value::Str(s) => s.len() as u64,
            Value::Opaque(o) => self.opaque_cost(&o.kind),
            Value::Table(_) => self.costs.table_header,
        }
    }

    fn opaque_cost(&self, kind: &OpaqueKind) -> u64 {
        match kind {
            OpaqueKind::Function => self.costs.function,
            OpaqueKind::Userdata => self.costs.userdata,
            OpaqueKind::LightUserdata => self.costs.light_userdata,
            OpaqueKind::Thread => self.costs.thread,
            OpaqueKind::Other(name) => {
                report_unsupported(name);
                0
            }
        }
    }

    /// Refuse unpriced kinds when the model is strict; otherwise accept all.
    pub fn admit(&self, value: &Value) -> Result<()> {
        match value {
            Value::Opaque(o) if self.strict => match &o.kind {
                OpaqueKind::Other(name) => Err(QuotaError::UnsupportedValueKind(name.clone())),
                _ => Ok(()),
            },
            _ => Ok(()),
        }
    }

    pub fn key_cost(&self, key: &Key) -> u64 {
        match key {
            Key::Int(_) => self.costs.int_key,
            Key::Str(s) => s.len() as u64,
        }
    }

    pub fn header(&self) -> u64 {
        self.costs.table_header
    }

    /// Cost of a value stored in an entry. A container reference is free; its
    /// body is charged once when absorbed.
    pub fn stored_cost(&self, value: &Value) -> u64 {
        match value {
            Value::Table(_) => 0,
            other => self.cost(other),
        }
    }

    /// Cost of one live mapping entry.
    pub fn entry_cost(&self, key: &Key, value: &Value) -> u64 {
        self.costs.entry_overhead + self.key_cost(key) + self.stored_cost(value)
    }
}
