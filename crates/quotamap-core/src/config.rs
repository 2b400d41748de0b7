//! Quota configuration that callers can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{QuotaError, Result};

/// What `set_maximum_size` does with a limit below the current effective size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkPolicy {
    /// Accept the new limit; only future growth is blocked.
    #[default]
    BlockGrowth,
    /// Refuse a limit below the current effective size.
    Refuse,
}

impl ShrinkPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block_growth" | "block-growth" => Some(ShrinkPolicy::BlockGrowth),
            "refuse" => Some(ShrinkPolicy::Refuse),
            _ => None,
        }
    }
}

/// Per-kind prices used by the size estimator. All values are bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    /// Fixed bookkeeping cost added for every mapping entry.
    pub entry_overhead: u64,
    /// Header cost of a nested container body.
    pub table_header: u64,
    pub number: u64,
    pub boolean: u64,
    pub int_key: u64,
    pub function: u64,
    pub userdata: u64,
    pub light_userdata: u64,
    pub thread: u64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            entry_overhead: 16,
            table_header: 40,
            number: 8,
            boolean: 1,
            int_key: 8,
            function: 32,
            userdata: 16,
            light_userdata: 8,
            thread: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub costs: CostConfig,

    /// Fail writes carrying an unpriced value kind instead of charging zero.
    pub strict_kinds: bool,

    pub shrink_policy: ShrinkPolicy,

    /// Maximum used by callers that create budgets without an explicit limit.
    pub default_max_bytes: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            costs: CostConfig::default(),
            strict_kinds: false,
            shrink_policy: ShrinkPolicy::BlockGrowth,
            default_max_bytes: 1024 * 1024, // 1 MiB default
        }
    }
}

impl QuotaConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `QUOTAMAP_ENTRY_OVERHEAD`: per-entry overhead in bytes
    /// - `QUOTAMAP_TABLE_HEADER`: container header in bytes
    /// - `QUOTAMAP_NUMBER_COST`: cost of a number
    /// - `QUOTAMAP_BOOLEAN_COST`: cost of a boolean
    /// - `QUOTAMAP_INT_KEY_COST`: cost of an integer key
    /// - `QUOTAMAP_STRICT_KINDS`: `true`/`1` to reject unpriced kinds
    /// - `QUOTAMAP_SHRINK_POLICY`: `block_growth` or `refuse`
    /// - `QUOTAMAP_DEFAULT_MAX`: default budget maximum in bytes
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_u64("QUOTAMAP_ENTRY_OVERHEAD") {
            cfg.costs.entry_overhead = v;
        }

        if let Some(v) = env_u64("QUOTAMAP_TABLE_HEADER") {
            cfg.costs.table_header = v;
        }

        if let Some(v) = env_u64("QUOTAMAP_NUMBER_COST") {
            cfg.costs.number = v;
        }

        if let Some(v) = env_u64("QUOTAMAP_BOOLEAN_COST") {
            cfg.costs.boolean = v;
        }

        if let Some(v) = env_u64("QUOTAMAP_INT_KEY_COST") {
            cfg.costs.int_key = v;
        }

        if let Ok(s) = std::env::var("QUOTAMAP_STRICT_KINDS") {
            cfg.strict_kinds = matches!(s.trim(), "1" | "true" | "yes");
        }

        if let Ok(s) = std::env::var("QUOTAMAP_SHRINK_POLICY") {
            if let Some(p) = ShrinkPolicy::parse(&s) {
                cfg.shrink_policy = p;
            }
        }

        if let Some(v) = env_u64("QUOTAMAP_DEFAULT_MAX") {
            cfg.default_max_bytes = v;
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_max_bytes == 0 {
            return Err(QuotaError::Config(
                "default_max_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse::<u64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: QuotaConfig =
            serde_json::from_str(r#"{"costs":{"entry_overhead":4},"shrink_policy":"refuse"}"#)
                .unwrap();
        assert_eq!(cfg.costs.entry_overhead, 4);
        assert_eq!(cfg.costs.table_header, 40);
        assert_eq!(cfg.shrink_policy, ShrinkPolicy::Refuse);
        assert!(!cfg.strict_kinds);
    }

    #[test]
    fn zero_default_max_is_rejected() {
        let cfg = QuotaConfig {
            default_max_bytes: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(QuotaConfig::default().validate().is_ok());
    }

    #[test]
    fn shrink_policy_parses_both_spellings() {
        assert_eq!(
            ShrinkPolicy::parse("Block-Growth"),
            Some(ShrinkPolicy::BlockGrowth)
        );
        assert_eq!(ShrinkPolicy::parse(" refuse "), Some(ShrinkPolicy::Refuse));
        assert_eq!(ShrinkPolicy::parse("evict"), None);
    }
}
