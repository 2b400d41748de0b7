//! Overflow policy: what a budget does when a write would exceed its limit.

use std::fmt;

use quotamap_core::id::{BudgetId, ContainerId};

use crate::quota::Quota;

pub const DEFAULT_TEMPLATE: &str = "budget {budget} exceeded: {size} + {delta} bytes > {max} bytes";

/// Details of a rejected write, handed to callbacks and used to render messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overflow {
    /// Budget the write was addressed to.
    pub budget: BudgetId,
    /// Budget whose maximum would be exceeded (the writer or one it is attached to).
    pub limit_budget: BudgetId,
    /// Container the write targeted.
    pub container: ContainerId,
    /// Size delta the write would have applied.
    pub requested: u64,
    /// Effective size of `limit_budget` before the write.
    pub size: u64,
    pub max: u64,
}

impl Overflow {
    /// Fill `{budget}`, `{limit_budget}`, `{container}`, `{size}`, `{delta}` and
    /// `{max}` placeholders.
    pub fn render(&self, template: &str) -> String {
        template
            .replace("{budget}", &self.budget.get().to_string())
            .replace("{limit_budget}", &self.limit_budget.get().to_string())
            .replace("{container}", &self.container.to_string())
            .replace("{size}", &self.size.to_string())
            .replace("{delta}", &self.requested.to_string())
            .replace("{max}", &self.max.to_string())
    }
}

/// Callback verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowAction {
    /// Surface `QuotaExceeded` to the caller.
    Reject,
    /// Report success with a zero delta; nothing was written.
    Suppress,
}

pub type OverflowCallback = Box<dyn FnMut(&mut Quota, &Overflow) -> OverflowAction + Send>;

pub enum OverflowPolicy {
    /// Reject with a message rendered from this template.
    Message(String),
    /// Run after the write has been rolled back; may mutate the quota.
    Callback(OverflowCallback),
}

impl OverflowPolicy {
    pub fn message(template: impl Into<String>) -> Self {
        OverflowPolicy::Message(template.into())
    }

    pub fn callback<F>(f: F) -> Self
    where
        F: FnMut(&mut Quota, &Overflow) -> OverflowAction + Send + 'static,
    {
        OverflowPolicy::Callback(Box::new(f))
    }
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Message(DEFAULT_TEMPLATE.to_string())
    }
}

impl fmt::Debug for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverflowPolicy::Message(t) => f.debug_tuple("Message").field(t).finish(),
            OverflowPolicy::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}
