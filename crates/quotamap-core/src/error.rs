use thiserror::Error;

use crate::id::{BudgetId, ContainerId};

/// Canonical result for quotamap.
pub type Result<T> = std::result::Result<T, QuotaError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuotaError {
    /// A write would push an effective size past a maximum. Nothing was applied.
    #[error("{message}")]
    QuotaExceeded {
        budget: BudgetId,
        limit_budget: BudgetId,
        requested: u64,
        size: u64,
        max: u64,
        message: String,
    },

    #[error("container {container} is not owned by {budget}")]
    InvalidOwnership {
        budget: BudgetId,
        container: ContainerId,
    },

    #[error("{0} has been destroyed")]
    UseAfterDestroy(BudgetId),

    #[error("unsupported value kind '{0}'")]
    UnsupportedValueKind(String),

    #[error("unknown or reclaimed container {0}")]
    UnknownContainer(ContainerId),

    #[error("unknown budget {0}")]
    UnknownBudget(BudgetId),

    #[error("container {0} is tracked; write through its budget")]
    AlreadyTracked(ContainerId),

    #[error("position {position} out of range for sequence of length {len}")]
    InvalidPosition { position: i64, len: usize },

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl QuotaError {
    /// Overflow is the only expected, recoverable failure; everything else is
    /// a caller bug.
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, QuotaError::QuotaExceeded { .. })
    }
}

impl From<serde_json::Error> for QuotaError {
    fn from(e: serde_json::Error) -> Self {
        QuotaError::Config(e.to_string())
    }
}
