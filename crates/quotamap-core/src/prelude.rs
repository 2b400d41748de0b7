//! Convenient re-exports for downstream crates.

pub use crate::config::{CostConfig, QuotaConfig, ShrinkPolicy};
pub use crate::cost::CostModel;
pub use crate::error::{QuotaError, Result};
pub use crate::hash::Hash256;
pub use crate::id::{BudgetId, ContainerId};
pub use crate::plain::{PlainGraph, PlainTable, PlainValue};
pub use crate::value::{Key, Opaque, OpaqueKind, Value};
