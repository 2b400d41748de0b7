//! Budget records held by a `Quota`.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use quotamap_core::id::{BudgetId, ContainerId};

use crate::policy::OverflowPolicy;
use crate::tracking::PeakTracker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetState {
    Active,
    /// Terminal. The record stays so later calls report use-after-destroy.
    Destroyed,
}

#[derive(Debug)]
pub(crate) struct Budget {
    pub(crate) root: ContainerId,
    /// Cost of everything this budget owns; attached budgets are summed on demand.
    pub(crate) own_size: u64,
    pub(crate) max_size: u64,
    pub(crate) policy: OverflowPolicy,
    /// Set while the callback is out of `policy` being run.
    pub(crate) policy_in_flight: bool,
    /// Budgets this one contributes its size to.
    pub(crate) attached_to: BTreeSet<BudgetId>,
    /// Budgets contributing their size to this one.
    pub(crate) attached_from: BTreeSet<BudgetId>,
    pub(crate) state: BudgetState,
    pub(crate) tracker: PeakTracker,
}

impl Budget {
    pub(crate) fn new(root: ContainerId, max_size: u64, policy: OverflowPolicy) -> Self {
        Self {
            root,
            own_size: 0,
            max_size,
            policy,
            policy_in_flight: false,
            attached_to: BTreeSet::new(),
            attached_from: BTreeSet::new(),
            state: BudgetState::Active,
            tracker: PeakTracker::new(),
        }
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state == BudgetState::Active
    }
}

/// Point-in-time snapshot of a budget's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetStats {
    pub id: BudgetId,
    pub state: BudgetState,
    pub own_size: u64,
    pub effective_size: u64,
    pub max_size: u64,
    pub peak_size: u64,
    pub containers: usize,
    pub writes: u64,
    pub rejections: u64,
    pub attached_to: usize,
    pub attached_from: usize,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_serialize_with_snake_case_state() {
        let stats = BudgetStats {
            id: BudgetId::new(2),
            state: BudgetState::Destroyed,
            own_size: 0,
            effective_size: 0,
            max_size: 100,
            peak_size: 64,
            containers: 0,
            writes: 3,
            rejections: 1,
            attached_to: 0,
            attached_from: 0,
            version: "test".into(),
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["state"], "destroyed");
        assert_eq!(json["peak_size"], 64);
    }
}
