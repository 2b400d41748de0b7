//! YAML scenarios: a set of named budgets and a list of steps replayed against
//! one `Quota`.
//!
//! Example:
//! ```yaml
//! config: { shrink_policy: refuse }
//! budgets:
//!   - { name: a, max: 100 }
//!   - { name: b, max: 60, message: "b is full: {size} + {delta} > {max}" }
//! steps:
//!   - { op: set, budget: a, key: items, value: [1, 2, 3] }
//!   - { op: insert, budget: a, path: [items], position: 1, value: "x" }
//!   - { op: set, budget: a, key: big, value: "xxxxxxxxxxxxxxxxxxxxxxxx", dry_run: true }
//!   - { op: attach, budget: a, to: b }
//!   - { op: destroy, budget: a }
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;

use quotamap_core::config::{QuotaConfig, ShrinkPolicy};
use quotamap_core::error::QuotaError;
use quotamap_core::id::{BudgetId, ContainerId};
use quotamap_core::value::{Key, Value};
use quotamap_mem::{BudgetStats, Mode, OverflowAction, OverflowPolicy, Position, Quota};

use crate::json::{to_json, to_plain};

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("scenario parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("budget '{0}' is declared twice")]
    DuplicateBudget(String),

    #[error("step {step}: unknown budget '{name}'")]
    UnknownBudget { step: usize, name: String },

    #[error(transparent)]
    Quota(#[from] QuotaError),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    pub entry_overhead: Option<u64>,
    pub table_header: Option<u64>,
    pub int_key: Option<u64>,
    pub strict_kinds: Option<bool>,
    pub shrink_policy: Option<ShrinkPolicy>,
    pub default_max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetDef {
    pub name: String,
    /// Falls back to `default_max_bytes`.
    #[serde(default)]
    pub max: Option<u64>,
    #[serde(default)]
    pub message: Option<String>,
    /// Install a callback that swallows overflows instead of rejecting.
    #[serde(default)]
    pub suppress: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyDef {
    Int(i64),
    Str(String),
}

impl From<&KeyDef> for Key {
    fn from(k: &KeyDef) -> Self {
        match k {
            KeyDef::Int(i) => Key::Int(*i),
            KeyDef::Str(s) => Key::Str(s.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Step {
    Set {
        budget: String,
        #[serde(default)]
        path: Vec<KeyDef>,
        key: KeyDef,
        #[serde(default)]
        value: Json,
        #[serde(default)]
        dry_run: bool,
    },
    Insert {
        budget: String,
        #[serde(default)]
        path: Vec<KeyDef>,
        /// 1-based; omitted means append.
        #[serde(default)]
        position: Option<i64>,
        #[serde(default)]
        value: Json,
        #[serde(default)]
        dry_run: bool,
    },
    Remove {
        budget: String,
        #[serde(default)]
        path: Vec<KeyDef>,
        #[serde(default)]
        position: Option<i64>,
        #[serde(default)]
        dry_run: bool,
    },
    Attach {
        budget: String,
        to: String,
    },
    /// Without `from`, detach from everything.
    Detach {
        budget: String,
        #[serde(default)]
        from: Option<String>,
    },
    Resize {
        budget: String,
        max: u64,
    },
    Destroy {
        budget: String,
    },
}

impl Step {
    fn budgets(&self) -> Vec<&str> {
        match self {
            Step::Set { budget, .. }
            | Step::Insert { budget, .. }
            | Step::Remove { budget, .. }
            | Step::Resize { budget, .. }
            | Step::Destroy { budget } => vec![budget.as_str()],
            Step::Attach { budget, to } => vec![budget.as_str(), to.as_str()],
            Step::Detach { budget, from } => {
                let mut v = vec![budget.as_str()];
                v.extend(from.as_deref());
                v
            }
        }
    }

    fn label(&self) -> String {
        match self {
            Step::Set { budget, key, dry_run, .. } => {
                format!("set {budget}[{}]{}", Key::from(key), dry(*dry_run))
            }
            Step::Insert { budget, position, dry_run, .. } => {
                format!("insert {budget} @{}{}", pos(*position), dry(*dry_run))
            }
            Step::Remove { budget, position, dry_run, .. } => {
                format!("remove {budget} @{}{}", pos(*position), dry(*dry_run))
            }
            Step::Attach { budget, to } => format!("attach {budget} -> {to}"),
            Step::Detach { budget, from: Some(f) } => format!("detach {budget} -> {f}"),
            Step::Detach { budget, from: None } => format!("detach {budget} from all"),
            Step::Resize { budget, max } => format!("resize {budget} to {max}"),
            Step::Destroy { budget } => format!("destroy {budget}"),
        }
    }
}

fn dry(dry_run: bool) -> &'static str {
    if dry_run {
        " (dry run)"
    } else {
        ""
    }
}

fn pos(position: Option<i64>) -> String {
    position.map_or_else(|| "end".to_string(), |p| p.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub config: ScenarioConfig,
    pub budgets: Vec<BudgetDef>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// Parse and cross-check a scenario: budget names are unique and every step
/// names a declared budget.
pub fn parse_scenario(src: &str) -> Result<Scenario, ScenarioError> {
    let scenario: Scenario = serde_yaml::from_str(src)?;
    let mut names = HashMap::new();
    for b in &scenario.budgets {
        if names.insert(b.name.as_str(), ()).is_some() {
            return Err(ScenarioError::DuplicateBudget(b.name.clone()));
        }
    }
    for (i, step) in scenario.steps.iter().enumerate() {
        for name in step.budgets() {
            if !names.contains_key(name) {
                return Err(ScenarioError::UnknownBudget {
                    step: i + 1,
                    name: name.to_string(),
                });
            }
        }
    }
    Ok(scenario)
}

pub fn apply_scenario_config(cfg: &mut QuotaConfig, doc: &ScenarioConfig) {
    if let Some(v) = doc.entry_overhead {
        cfg.costs.entry_overhead = v;
    }
    if let Some(v) = doc.table_header {
        cfg.costs.table_header = v;
    }
    if let Some(v) = doc.int_key {
        cfg.costs.int_key = v;
    }
    if let Some(v) = doc.strict_kinds {
        cfg.strict_kinds = v;
    }
    if let Some(v) = doc.shrink_policy {
        cfg.shrink_policy = v;
    }
    if let Some(v) = doc.default_max_bytes {
        cfg.default_max_bytes = v;
    }
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: usize,
    pub label: String,
    /// Size delta, or the error the step failed with.
    pub result: Result<i64, QuotaError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BudgetReport {
    pub name: String,
    pub stats: BudgetStats,
    /// Root contents, absent once destroyed.
    pub contents: Option<Json>,
}

#[derive(Debug, Clone)]
pub struct Report {
    pub outcomes: Vec<StepOutcome>,
    pub budgets: Vec<BudgetReport>,
}

/// Replay every step. Quota errors are recorded per step and do not stop the run.
pub fn run_scenario(scenario: &Scenario, config: QuotaConfig) -> Result<Report, ScenarioError> {
    let mut quota = Quota::new(config)?;
    let mut ids: HashMap<String, BudgetId> = HashMap::new();
    for def in &scenario.budgets {
        let max = def.max.unwrap_or(quota.config().default_max_bytes);
        let policy = if def.suppress {
            OverflowPolicy::callback(|_, _| OverflowAction::Suppress)
        } else if let Some(m) = &def.message {
            OverflowPolicy::message(m.clone())
        } else {
            OverflowPolicy::default()
        };
        let id = quota.create_budget(max, policy)?;
        ids.insert(def.name.clone(), id);
    }

    let mut outcomes = Vec::with_capacity(scenario.steps.len());
    for (i, step) in scenario.steps.iter().enumerate() {
        let result = apply_step(&mut quota, &ids, step);
        tracing::debug!(step = i + 1, ok = result.is_ok(), "scenario step");
        outcomes.push(StepOutcome {
            step: i + 1,
            label: step.label(),
            result,
        });
    }

    let mut budgets = Vec::with_capacity(scenario.budgets.len());
    for def in &scenario.budgets {
        let id = lookup(&ids, &def.name)?;
        let contents = match quota.clone_raw(id, None) {
            Ok(graph) => Some(to_json(&graph)),
            Err(_) => None,
        };
        budgets.push(BudgetReport {
            name: def.name.clone(),
            stats: quota.stats(id)?,
            contents,
        });
    }
    Ok(Report { outcomes, budgets })
}

fn lookup(ids: &HashMap<String, BudgetId>, name: &str) -> Result<BudgetId, QuotaError> {
    ids.get(name)
        .copied()
        .ok_or_else(|| QuotaError::Config(format!("unknown budget '{name}'")))
}

fn mode(dry_run: bool) -> Mode {
    if dry_run {
        Mode::DryRun
    } else {
        Mode::Commit
    }
}

fn position(p: Option<i64>) -> Position {
    p.map_or(Position::End, Position::At)
}

/// Follow `path` from the budget root; every hop must land on a container.
fn resolve(quota: &Quota, budget: BudgetId, path: &[KeyDef]) -> Result<ContainerId, QuotaError> {
    let mut cur = quota.root(budget)?;
    for k in path {
        let key = Key::from(k);
        cur = match quota.get(cur, &key)? {
            Some(Value::Table(id)) => *id,
            _ => {
                return Err(QuotaError::Config(format!(
                    "path key {key} does not name a container"
                )))
            }
        };
    }
    Ok(cur)
}

fn build(quota: &mut Quota, value: &Json) -> Result<Value, QuotaError> {
    quota.import(&to_plain(value))
}

fn apply_step(
    quota: &mut Quota,
    ids: &HashMap<String, BudgetId>,
    step: &Step,
) -> Result<i64, QuotaError> {
    match step {
        Step::Set {
            budget,
            path,
            key,
            value,
            dry_run,
        } => {
            let b = lookup(ids, budget)?;
            let target = resolve(quota, b, path)?;
            let v = build(quota, value)?;
            let result = quota.set_in(b, target, key, v.clone(), mode(*dry_run));
            discard_unused(quota, &v);
            result
        }
        Step::Insert {
            budget,
            path,
            position: p,
            value,
            dry_run,
        } => {
            let b = lookup(ids, budget)?;
            let target = resolve(quota, b, path)?;
            let v = build(quota, value)?;
            let result = quota.insert(b, target, position(*p), v.clone(), mode(*dry_run));
            discard_unused(quota, &v);
            result
        }
        Step::Remove {
            budget,
            path,
            position: p,
            dry_run,
        } => {
            let b = lookup(ids, budget)?;
            let target = resolve(quota, b, path)?;
            quota.remove(b, target, position(*p), mode(*dry_run))
        }
        Step::Attach { budget, to } => {
            quota.attach_to(lookup(ids, budget)?, lookup(ids, to)?)?;
            Ok(0)
        }
        Step::Detach { budget, from } => {
            let b = lookup(ids, budget)?;
            match from {
                Some(f) => quota.detach_from(b, lookup(ids, f)?)?,
                None => quota.detach_from_all(b)?,
            }
            Ok(0)
        }
        Step::Resize { budget, max } => {
            quota.set_maximum_size(lookup(ids, budget)?, *max)?;
            Ok(0)
        }
        Step::Destroy { budget } => {
            quota.destroy(lookup(ids, budget)?)?;
            Ok(0)
        }
    }
}

/// Free an imported graph that was not absorbed (rejected or dry-run write).
fn discard_unused(quota: &mut Quota, value: &Value) {
    let Value::Table(root) = value else {
        return;
    };
    if quota.is_tracked_container(*root) || !quota.contains(*root) {
        return;
    }
    let mut stack = vec![*root];
    while let Some(id) = stack.pop() {
        if quota.is_tracked_container(id) || !quota.contains(id) {
            continue;
        }
        if let Ok(entries) = quota.entries(id) {
            stack.extend(entries.filter_map(|(_, v)| v.as_table()));
        }
        let _ = quota.discard(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
budgets:
  - { name: a, max: 150 }
steps:
  - { op: set, budget: a, key: name, value: "x" }
  - { op: set, budget: a, key: big, value: "xxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx" }
  - { op: set, budget: a, key: list, value: [1, 2] }
  - { op: insert, budget: a, path: [list], position: 1, value: 0 }
  - { op: remove, budget: a, path: [list] }
"#;

    #[test]
    fn parse_rejects_unknown_budget_names() {
        let src = "budgets: [{ name: a, max: 10 }]\nsteps: [{ op: destroy, budget: b }]";
        assert!(matches!(
            parse_scenario(src),
            Err(ScenarioError::UnknownBudget { step: 1, .. })
        ));
    }

    #[test]
    fn parse_rejects_duplicate_budgets() {
        let src = "budgets: [{ name: a }, { name: a }]";
        assert!(matches!(
            parse_scenario(src),
            Err(ScenarioError::DuplicateBudget(_))
        ));
    }

    #[test]
    fn run_records_deltas_and_rejections() {
        let scenario = parse_scenario(SCENARIO).unwrap();
        let report = run_scenario(&scenario, QuotaConfig::default()).unwrap();

        let results: Vec<_> = report.outcomes.iter().map(|o| o.result.clone()).collect();
        // "name" + "x"
        assert_eq!(results[0], Ok(16 + 4 + 1));
        assert!(results[1].as_ref().unwrap_err().is_quota_exceeded());
        // entry "list" + header + two int entries of 8 + 8
        assert_eq!(results[2], Ok(16 + 4 + 40 + 2 * (16 + 8 + 8)));
        assert!(results[3].as_ref().unwrap_err().is_quota_exceeded());
        assert_eq!(results[4], Ok(-(16 + 8 + 8)));

        let a = &report.budgets[0];
        assert_eq!(a.stats.own_size, 21 + 124 - 32);
        assert_eq!(
            a.contents,
            Some(serde_json::json!({"name": "x", "list": [1]}))
        );
    }

    #[test]
    fn scenario_config_overrides_defaults() {
        let mut cfg = QuotaConfig::default();
        let doc = ScenarioConfig {
            table_header: Some(0),
            shrink_policy: Some(ShrinkPolicy::Refuse),
            ..Default::default()
        };
        apply_scenario_config(&mut cfg, &doc);
        assert_eq!(cfg.costs.table_header, 0);
        assert_eq!(cfg.shrink_policy, ShrinkPolicy::Refuse);
        assert_eq!(cfg.costs.entry_overhead, 16);
    }
}
