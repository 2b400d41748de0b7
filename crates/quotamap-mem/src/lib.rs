#![forbid(unsafe_code)]
//! quotamap-mem: the quota-enforcing container arena.
//!
//! A [`Quota`] owns every nested container, the registry that records which
//! budget owns each tracked one and how often it is embedded, and the budgets
//! themselves. Writes are priced by walking the graph they pull in or drop,
//! checked against the writer and every budget it is attached to, and then
//! committed or discarded as a whole.
//!
//! Cost constants and value kinds live in `quotamap-core`.

pub mod arena;
pub mod budget;
pub mod policy;
pub mod quota;
pub mod registry;
pub mod shared;
pub mod tracking;
pub mod walker;

pub use arena::Table;
pub use budget::{BudgetState, BudgetStats};
pub use policy::{Overflow, OverflowAction, OverflowCallback, OverflowPolicy, DEFAULT_TEMPLATE};
pub use quota::{Mode, Position, Quota};
pub use shared::SharedQuota;
pub use tracking::PeakTracker;
