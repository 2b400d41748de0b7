//! `Quota`: the container arena, its registry, and every budget drawing on it.
//!
//! All writes follow the same protocol:
//! 1. validate the budget, the target container and the value kind;
//! 2. price the write against a [`Staged`] registry view (absorb new
//!    containers, release overwritten ones);
//! 3. check the delta against the writer and every budget it is attached to;
//! 4. commit the staged registry edits, the table write and the size ledger
//!    together, or drop them all.
//!
//! Nothing between 1 and 4 touches shared state, so a rejected write or a
//! dry run is invisible afterwards.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info, trace, warn};

use quotamap_core::config::{QuotaConfig, ShrinkPolicy};
use quotamap_core::cost::CostModel;
use quotamap_core::error::{QuotaError, Result};
use quotamap_core::hash::{digest_graph, Hash256};
use quotamap_core::id::{BudgetId, ContainerId};
use quotamap_core::plain::PlainGraph;
use quotamap_core::value::{Key, Value};

use crate::arena::{Arena, Table};
use crate::budget::{Budget, BudgetState, BudgetStats};
use crate::policy::{Overflow, OverflowAction, OverflowPolicy, DEFAULT_TEMPLATE};
use crate::registry::{Changes, Registry, Staged};
use crate::walker;

/// Whether a write is applied or only priced and validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Commit,
    DryRun,
}

/// 1-based sequence position for `insert`/`remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Position {
    #[default]
    End,
    At(i64),
}

pub struct Quota {
    config: QuotaConfig,
    model: CostModel,
    arena: Arena,
    registry: Registry,
    budgets: Vec<Budget>,
}

impl Default for Quota {
    fn default() -> Self {
        Self::build(QuotaConfig::default())
    }
}

impl Quota {
    pub fn new(config: QuotaConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: QuotaConfig) -> Self {
        let model = CostModel::new(config.costs.clone(), config.strict_kinds);
        Self {
            config,
            model,
            arena: Arena::new(),
            registry: Registry::new(),
            budgets: Vec::new(),
        }
    }

    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.model
    }

    // ----- budgets -----

    /// Create a budget with an empty root container.
    pub fn create_budget(&mut self, max_size: u64, policy: OverflowPolicy) -> Result<BudgetId> {
        if max_size == 0 {
            return Err(QuotaError::InvalidLimit(
                "maximum size must be positive".to_string(),
            ));
        }
        let id = BudgetId::new(self.budgets.len() as u64);
        let root = self.arena.alloc();
        self.registry.register_root(root, id);
        self.budgets.push(Budget::new(root, max_size, policy));
        debug!(budget = %id, max_size, "budget created");
        Ok(id)
    }

    /// Create a budget limited to `config.default_max_bytes` with the default message.
    pub fn create_default_budget(&mut self) -> Result<BudgetId> {
        self.create_budget(self.config.default_max_bytes, OverflowPolicy::default())
    }

    fn budget(&self, id: BudgetId) -> Result<&Budget> {
        self.budgets
            .get(id.get() as usize)
            .ok_or(QuotaError::UnknownBudget(id))
    }

    fn active(&self, id: BudgetId) -> Result<&Budget> {
        let b = self.budget(id)?;
        if !b.is_active() {
            return Err(QuotaError::UseAfterDestroy(id));
        }
        Ok(b)
    }

    fn active_mut(&mut self, id: BudgetId) -> Result<&mut Budget> {
        let b = self
            .budgets
            .get_mut(id.get() as usize)
            .ok_or(QuotaError::UnknownBudget(id))?;
        if !b.is_active() {
            return Err(QuotaError::UseAfterDestroy(id));
        }
        Ok(b)
    }

    pub fn is_valid_budget(&self, id: BudgetId) -> bool {
        self.active(id).is_ok()
    }

    pub fn root(&self, budget: BudgetId) -> Result<ContainerId> {
        Ok(self.active(budget)?.root)
    }

    /// Own size: everything this budget's graph is charged for.
    pub fn current_size(&self, budget: BudgetId) -> Result<u64> {
        Ok(self.budget(budget)?.own_size)
    }

    /// Own size plus the own sizes of every budget attached to this one,
    /// transitively, each counted once.
    pub fn effective_size(&self, budget: BudgetId) -> Result<u64> {
        self.budget(budget)?;
        Ok(self.effective_size_of(budget))
    }

    pub fn maximum_size(&self, budget: BudgetId) -> Result<u64> {
        Ok(self.budget(budget)?.max_size)
    }

    /// Change the limit. Never evicts; see `ShrinkPolicy` for limits below the
    /// current effective size.
    pub fn set_maximum_size(&mut self, budget: BudgetId, max_size: u64) -> Result<()> {
        if max_size == 0 {
            return Err(QuotaError::InvalidLimit(
                "maximum size must be positive".to_string(),
            ));
        }
        self.active(budget)?;
        let effective = self.effective_size_of(budget);
        if self.config.shrink_policy == ShrinkPolicy::Refuse && max_size < effective {
            return Err(QuotaError::InvalidLimit(format!(
                "{max_size} is below the current effective size {effective}"
            )));
        }
        self.active_mut(budget)?.max_size = max_size;
        Ok(())
    }

    pub fn set_policy(&mut self, budget: BudgetId, policy: OverflowPolicy) -> Result<()> {
        let b = self.active_mut(budget)?;
        b.policy = policy;
        b.policy_in_flight = false;
        Ok(())
    }

    pub fn is_over_limit(&self, budget: BudgetId) -> Result<bool> {
        let b = self.budget(budget)?;
        Ok(self.effective_size_of(budget) > b.max_size)
    }

    pub fn attached_to(&self, budget: BudgetId) -> Result<Vec<BudgetId>> {
        Ok(self.budget(budget)?.attached_to.iter().copied().collect())
    }

    pub fn attached_from(&self, budget: BudgetId) -> Result<Vec<BudgetId>> {
        Ok(self.budget(budget)?.attached_from.iter().copied().collect())
    }

    pub fn stats(&self, budget: BudgetId) -> Result<BudgetStats> {
        let b = self.budget(budget)?;
        Ok(BudgetStats {
            id: budget,
            state: b.state,
            own_size: b.own_size,
            effective_size: self.effective_size_of(budget),
            max_size: b.max_size,
            peak_size: b.tracker.peak(),
            containers: self.registry.owned_by(budget).len(),
            writes: b.tracker.writes(),
            rejections: b.tracker.rejections(),
            attached_to: b.attached_to.len(),
            attached_from: b.attached_from.len(),
            version: quotamap_core::VERSION.to_string(),
        })
    }

    /// Recompute the own size of `budget` from its registered containers.
    pub fn recount(&self, budget: BudgetId) -> Result<u64> {
        let root = self.budget(budget)?.root;
        let mut total = 0u64;
        for id in self.registry.owned_by(budget) {
            let Some(table) = self.arena.get(id) else {
                continue;
            };
            if id != root {
                total += self.model.header();
            }
            for (key, value) in table.iter() {
                total += self.model.entry_cost(key, value);
            }
        }
        Ok(total)
    }

    // ----- introspection -----

    pub fn is_tracked_container(&self, id: ContainerId) -> bool {
        self.arena.contains(id) && self.registry.entry(id).is_some()
    }

    pub fn owner_of(&self, id: ContainerId) -> Option<BudgetId> {
        self.registry.lookup_owner(id)
    }

    pub fn refcount_of(&self, id: ContainerId) -> usize {
        self.registry.refcount_of(id)
    }

    /// Estimated cost of `value`. With `recursive`, a container is priced as the
    /// bodies of everything reachable from it, each once.
    pub fn size_of(&self, value: &Value, recursive: bool) -> Result<u64> {
        match value {
            Value::Table(id) if recursive => walker::body_size(&self.arena, &self.model, *id),
            other => Ok(self.model.cost(other)),
        }
    }

    pub fn live_containers(&self) -> usize {
        self.arena.live_count()
    }

    // ----- untracked containers and reads -----

    /// Allocate an empty, untracked container.
    pub fn table(&mut self) -> ContainerId {
        self.arena.alloc()
    }

    fn ensure_untracked(&self, id: ContainerId) -> Result<()> {
        if !self.arena.contains(id) {
            return Err(QuotaError::UnknownContainer(id));
        }
        if self.registry.entry(id).is_some() {
            return Err(QuotaError::AlreadyTracked(id));
        }
        Ok(())
    }

    /// Write into an untracked container. Returns the previous value.
    pub fn raw_set(
        &mut self,
        id: ContainerId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        self.ensure_untracked(id)?;
        let table = self
            .arena
            .get_mut(id)
            .ok_or(QuotaError::UnknownContainer(id))?;
        Ok(table.put(key.into(), value.into()))
    }

    /// Append to the sequence part of an untracked container.
    pub fn raw_push(&mut self, id: ContainerId, value: impl Into<Value>) -> Result<()> {
        self.ensure_untracked(id)?;
        let value = value.into();
        let table = self
            .arena
            .get_mut(id)
            .ok_or(QuotaError::UnknownContainer(id))?;
        if !value.is_nil() {
            let at = table.border() + 1;
            table.insert_at(at, value);
        }
        Ok(())
    }

    /// Materialize a plain graph as untracked containers.
    pub fn import(&mut self, graph: &PlainGraph) -> Result<Value> {
        walker::import(&mut self.arena, graph)
    }

    /// Free an untracked container.
    pub fn discard(&mut self, id: ContainerId) -> Result<()> {
        self.ensure_untracked(id)?;
        self.arena.free(id);
        Ok(())
    }

    pub fn contains(&self, id: ContainerId) -> bool {
        self.arena.contains(id)
    }

    fn table_ref(&self, id: ContainerId) -> Result<&Table> {
        self.arena.get(id).ok_or(QuotaError::UnknownContainer(id))
    }

    pub fn get(&self, id: ContainerId, key: &Key) -> Result<Option<&Value>> {
        Ok(self.table_ref(id)?.get(key))
    }

    /// Sequence length (border) of a container.
    pub fn len(&self, id: ContainerId) -> Result<usize> {
        Ok(self.table_ref(id)?.border())
    }

    pub fn entry_count(&self, id: ContainerId) -> Result<usize> {
        Ok(self.table_ref(id)?.entry_count())
    }

    /// Entries ordered by key: integer keys first, then text keys.
    pub fn entries(&self, id: ContainerId) -> Result<impl Iterator<Item = (&Key, &Value)> + '_> {
        Ok(self.table_ref(id)?.iter())
    }

    /// Deep, untracked copy of `target` (default: the budget root).
    pub fn clone_raw(&self, budget: BudgetId, target: Option<ContainerId>) -> Result<PlainGraph> {
        let target = match target {
            Some(t) => t,
            None => self.active(budget)?.root,
        };
        self.check_target(budget, target)?;
        walker::clone_graph(&self.arena, target)
    }

    /// Stable digest of the graph reachable from any live container.
    pub fn digest(&self, id: ContainerId) -> Result<Hash256> {
        let graph = walker::clone_graph(&self.arena, id)?;
        digest_graph(&graph)
    }

    // ----- mutations -----

    /// Set `key` in the budget root.
    pub fn set(
        &mut self,
        budget: BudgetId,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<i64> {
        let root = self.root(budget)?;
        self.set_in(budget, root, key, value, Mode::Commit)
    }

    /// Set `key` in `target`; `Nil` removes the entry. Returns the size delta.
    pub fn set_in(
        &mut self,
        budget: BudgetId,
        target: ContainerId,
        key: impl Into<Key>,
        value: impl Into<Value>,
        mode: Mode,
    ) -> Result<i64> {
        let key = key.into();
        let value = value.into();
        self.check_target(budget, target)?;
        self.model.admit(&value)?;
        let old = self
            .table_ref(target)?
            .get(&key)
            .cloned()
            .unwrap_or_default();
        if old.is_nil() && value.is_nil() {
            return Ok(0);
        }

        let (delta, changes) = {
            let mut staged = Staged::new(&self.registry);
            let mut delta: i64 = 0;
            if !value.is_nil() {
                delta += self.model.entry_cost(&key, &value) as i64;
                if let Value::Table(c) = &value {
                    delta += self.embed(&mut staged, budget, *c)? as i64;
                }
            }
            if !old.is_nil() {
                delta -= self.model.entry_cost(&key, &old) as i64;
                if let Value::Table(c) = &old {
                    delta -= self.unembed(&mut staged, *c, target) as i64;
                }
            }
            (delta, staged.into_changes())
        };

        self.commit(budget, target, delta, mode, changes, move |t| {
            t.put(key, value);
        })
    }

    /// Append to the budget root's sequence.
    pub fn push(&mut self, budget: BudgetId, value: impl Into<Value>) -> Result<i64> {
        let root = self.root(budget)?;
        self.insert(budget, root, Position::End, value, Mode::Commit)
    }

    /// Insert into the sequence part of `target`, shifting later positions up.
    /// Inserting `Nil` is a zero-delta no-op.
    pub fn insert(
        &mut self,
        budget: BudgetId,
        target: ContainerId,
        position: Position,
        value: impl Into<Value>,
        mode: Mode,
    ) -> Result<i64> {
        let value = value.into();
        self.check_target(budget, target)?;
        self.model.admit(&value)?;
        let border = self.table_ref(target)?.border();
        let at = match position {
            Position::End => border + 1,
            Position::At(p) if p >= 1 && p as u64 <= border as u64 + 1 => p as usize,
            Position::At(p) => {
                return Err(QuotaError::InvalidPosition {
                    position: p,
                    len: border,
                })
            }
        };
        if value.is_nil() {
            return Ok(0);
        }

        let key = Key::Int(border as i64 + 1);
        let (delta, changes) = {
            let mut staged = Staged::new(&self.registry);
            let mut delta = self.model.entry_cost(&key, &value) as i64;
            if let Value::Table(c) = &value {
                delta += self.embed(&mut staged, budget, *c)? as i64;
            }
            (delta, staged.into_changes())
        };

        self.commit(budget, target, delta, mode, changes, move |t| {
            t.insert_at(at, value);
        })
    }

    /// Remove the last element of the budget root's sequence.
    pub fn pop(&mut self, budget: BudgetId) -> Result<i64> {
        let root = self.root(budget)?;
        self.remove(budget, root, Position::End, Mode::Commit)
    }

    /// Remove a sequence element of `target`, shifting later positions down.
    /// Never rejected by the quota: the delta is never positive.
    pub fn remove(
        &mut self,
        budget: BudgetId,
        target: ContainerId,
        position: Position,
        mode: Mode,
    ) -> Result<i64> {
        self.check_target(budget, target)?;
        let table = self.table_ref(target)?;
        let border = table.border();
        let at = match position {
            Position::End if border == 0 => return Ok(0),
            Position::End => border,
            Position::At(p) if p >= 1 && p as u64 <= border as u64 => p as usize,
            Position::At(p) => {
                return Err(QuotaError::InvalidPosition {
                    position: p,
                    len: border,
                })
            }
        };
        let key = Key::Int(at as i64);
        let old = table.get(&key).cloned().unwrap_or_default();

        let (delta, changes) = {
            let mut staged = Staged::new(&self.registry);
            let mut delta = -(self.model.entry_cost(&key, &old) as i64);
            if let Value::Table(c) = &old {
                delta -= self.unembed(&mut staged, *c, target) as i64;
            }
            (delta, staged.into_changes())
        };

        self.commit(budget, target, delta, mode, changes, move |t| {
            t.remove_at(at);
        })
    }

    fn check_target(&self, budget: BudgetId, target: ContainerId) -> Result<()> {
        self.active(budget)?;
        if !self.arena.contains(target) {
            return Err(QuotaError::UnknownContainer(target));
        }
        match self.registry.lookup_owner(target) {
            Some(owner) if owner == budget => Ok(()),
            _ => Err(QuotaError::InvalidOwnership {
                budget,
                container: target,
            }),
        }
    }

    /// Stage one more embedding of `c` in `budget`; returns newly charged cost.
    fn embed(&self, staged: &mut Staged<'_>, budget: BudgetId, c: ContainerId) -> Result<u64> {
        match staged.entry(c) {
            Some(e) if e.owner == budget => {
                staged.inc_ref(c);
                Ok(0)
            }
            Some(_) => Err(QuotaError::InvalidOwnership {
                budget,
                container: c,
            }),
            None => walker::absorb(
                &self.arena,
                staged,
                &self.model,
                c,
                budget,
                &mut HashSet::new(),
            ),
        }
    }

    /// Stage the loss of one embedding of `c`; returns reclaimed cost.
    fn unembed(&self, staged: &mut Staged<'_>, c: ContainerId, target: ContainerId) -> u64 {
        match staged.dec_ref(c) {
            Some(e) if e.refcount == 0 && !e.pinned && c != target => walker::release(
                &self.arena,
                staged,
                &self.model,
                c,
                Some(target),
                &mut HashSet::new(),
            ),
            _ => 0,
        }
    }

    fn commit(
        &mut self,
        budget: BudgetId,
        target: ContainerId,
        delta: i64,
        mode: Mode,
        changes: Changes,
        write: impl FnOnce(&mut Table),
    ) -> Result<i64> {
        if delta > 0 {
            if let Some(overflow) = self.find_overflow(budget, target, delta as u64) {
                drop(changes);
                return self.reject(overflow);
            }
        }
        if mode == Mode::DryRun {
            return Ok(delta);
        }

        self.registry.apply(&changes);
        if let Some(table) = self.arena.get_mut(target) {
            write(table);
        }
        for id in changes.reclaimed() {
            self.arena.free(*id);
        }

        if let Some(b) = self.budgets.get_mut(budget.get() as usize) {
            b.own_size = apply_delta(b.own_size, delta);
            b.tracker.record_write(b.own_size);
            trace!(budget = %budget, delta, size = b.own_size, "write committed");
        }
        Ok(delta)
    }

    /// First budget, from the writer outwards along `attached_to`, whose limit
    /// the delta would break.
    fn find_overflow(&self, budget: BudgetId, target: ContainerId, delta: u64) -> Option<Overflow> {
        for limit in self.reach(budget, true) {
            let Some(b) = self.budgets.get(limit.get() as usize) else {
                continue;
            };
            if !b.is_active() {
                continue;
            }
            let size = self.effective_size_of(limit);
            if size.saturating_add(delta) > b.max_size {
                return Some(Overflow {
                    budget,
                    limit_budget: limit,
                    container: target,
                    requested: delta,
                    size,
                    max: b.max_size,
                });
            }
        }
        None
    }

    fn reject(&mut self, overflow: Overflow) -> Result<i64> {
        let idx = overflow.budget.get() as usize;
        info!(
            budget = %overflow.budget,
            limit = %overflow.limit_budget,
            requested = overflow.requested,
            size = overflow.size,
            max = overflow.max,
            "write rejected by quota"
        );
        let Some(b) = self.budgets.get_mut(idx) else {
            return Err(exceeded(&overflow, overflow.render(DEFAULT_TEMPLATE)));
        };
        b.tracker.record_rejection();

        match std::mem::take(&mut b.policy) {
            OverflowPolicy::Message(template) => {
                let message = overflow.render(&template);
                b.policy = OverflowPolicy::Message(template);
                Err(exceeded(&overflow, message))
            }
            OverflowPolicy::Callback(mut callback) => {
                b.policy_in_flight = true;
                let action = callback(self, &overflow);
                if let Some(b) = self.budgets.get_mut(idx) {
                    // A callback that installed a new policy wins.
                    if b.policy_in_flight {
                        b.policy = OverflowPolicy::Callback(callback);
                        b.policy_in_flight = false;
                    }
                }
                match action {
                    OverflowAction::Reject => {
                        Err(exceeded(&overflow, overflow.render(DEFAULT_TEMPLATE)))
                    }
                    OverflowAction::Suppress => Ok(0),
                }
            }
        }
    }

    // ----- attach graph -----

    /// Budgets reachable from `start` along `attached_to` (`forward`) or
    /// `attached_from`, including `start`, each once.
    fn reach(&self, start: BudgetId, forward: bool) -> Vec<BudgetId> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(cur) = queue.pop_front() {
            if !seen.insert(cur) {
                continue;
            }
            order.push(cur);
            if let Some(b) = self.budgets.get(cur.get() as usize) {
                let next = if forward {
                    &b.attached_to
                } else {
                    &b.attached_from
                };
                queue.extend(next.iter().copied());
            }
        }
        order
    }

    fn effective_size_of(&self, budget: BudgetId) -> u64 {
        self.reach(budget, false)
            .into_iter()
            .filter_map(|id| self.budgets.get(id.get() as usize))
            .map(|b| b.own_size)
            .sum()
    }

    /// Make `budget` contribute its size to `other`'s limit checks. Past writes
    /// are not re-validated; the next write on either side sees the new total.
    pub fn attach_to(&mut self, budget: BudgetId, other: BudgetId) -> Result<()> {
        self.active(budget)?;
        self.active(other)?;
        if budget == other {
            debug!(budget = %budget, "self-attach ignored");
            return Ok(());
        }
        self.active_mut(budget)?.attached_to.insert(other);
        self.active_mut(other)?.attached_from.insert(budget);
        debug!(budget = %budget, to = %other, "budget attached");

        for id in [budget, other] {
            if self.is_over_limit(id)? {
                warn!(
                    budget = %id,
                    effective = self.effective_size_of(id),
                    max = self.budget(id)?.max_size,
                    "attach left budget over its limit"
                );
            }
        }
        Ok(())
    }

    pub fn detach_from(&mut self, budget: BudgetId, other: BudgetId) -> Result<()> {
        self.active(budget)?;
        self.budget(other)?;
        self.active_mut(budget)?.attached_to.remove(&other);
        if let Some(o) = self.budgets.get_mut(other.get() as usize) {
            o.attached_from.remove(&budget);
        }
        debug!(budget = %budget, from = %other, "budget detached");
        Ok(())
    }

    pub fn detach_from_all(&mut self, budget: BudgetId) -> Result<()> {
        let targets = std::mem::take(&mut self.active_mut(budget)?.attached_to);
        for other in targets {
            if let Some(o) = self.budgets.get_mut(other.get() as usize) {
                o.attached_from.remove(&budget);
            }
        }
        Ok(())
    }

    /// Wipe the budget's whole container graph, cut every attach edge and mark
    /// it destroyed. Later calls on it fail with `UseAfterDestroy`.
    pub fn destroy(&mut self, budget: BudgetId) -> Result<()> {
        let root = self.active(budget)?.root;

        let mut visited = HashSet::new();
        let mut doomed =
            walker::wipe_order(&self.arena, &self.registry, root, budget, &mut visited);
        // Cycles cut off from the root are still charged here.
        for orphan in self.registry.owned_by(budget) {
            if !visited.contains(&orphan) {
                doomed.push(orphan);
            }
        }
        let wiped = doomed.len();
        for id in doomed {
            if let Some(table) = self.arena.get_mut(id) {
                table.clear();
            }
            self.registry.unregister(id);
            self.arena.free(id);
        }

        self.detach_from_all(budget)?;
        let sources = std::mem::take(&mut self.active_mut(budget)?.attached_from);
        for other in sources {
            if let Some(o) = self.budgets.get_mut(other.get() as usize) {
                o.attached_to.remove(&budget);
            }
        }

        let b = self.active_mut(budget)?;
        b.own_size = 0;
        b.state = BudgetState::Destroyed;
        debug!(budget = %budget, containers = wiped, "budget destroyed");
        Ok(())
    }
}

fn apply_delta(size: u64, delta: i64) -> u64 {
    if delta >= 0 {
        size.saturating_add(delta as u64)
    } else {
        size.saturating_sub(delta.unsigned_abs())
    }
}

fn exceeded(overflow: &Overflow, message: String) -> QuotaError {
    QuotaError::QuotaExceeded {
        budget: overflow.budget,
        limit_budget: overflow.limit_budget,
        requested: overflow.requested,
        size: overflow.size,
        max: overflow.max,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota_with_budget(max: u64) -> (Quota, BudgetId) {
        let mut q = Quota::default();
        let b = q.create_budget(max, OverflowPolicy::default()).unwrap();
        (q, b)
    }

    #[test]
    fn apply_delta_saturates() {
        assert_eq!(apply_delta(10, -4), 6);
        assert_eq!(apply_delta(3, -9), 0);
        assert_eq!(apply_delta(3, 9), 12);
    }

    #[test]
    fn zero_limit_is_refused() {
        let mut q = Quota::default();
        assert!(matches!(
            q.create_budget(0, OverflowPolicy::default()),
            Err(QuotaError::InvalidLimit(_))
        ));
    }

    #[test]
    fn root_is_pinned_and_free() {
        let (q, b) = quota_with_budget(100);
        let root = q.root(b).unwrap();
        assert_eq!(q.owner_of(root), Some(b));
        assert_eq!(q.refcount_of(root), 0);
        assert_eq!(q.current_size(b).unwrap(), 0);
        assert_eq!(q.recount(b).unwrap(), 0);
    }

    #[test]
    fn embedding_root_in_itself_never_reclaims_it() {
        let (mut q, b) = quota_with_budget(1_000);
        let root = q.root(b).unwrap();
        let d = q.set(b, "self", root).unwrap();
        assert_eq!(d, 16 + 4);
        assert_eq!(q.refcount_of(root), 1);

        q.set(b, "self", Value::Nil).unwrap();
        assert!(q.contains(root));
        assert_eq!(q.refcount_of(root), 0);
        assert_eq!(q.current_size(b).unwrap(), 0);
    }

    #[test]
    fn writing_into_an_orphan_cycle_keeps_the_target() {
        let (mut q, b) = quota_with_budget(10_000);
        let t = q.table();
        q.raw_set(t, "me", t).unwrap();
        q.set(b, "t", t).unwrap();
        assert_eq!(q.refcount_of(t), 2);

        // Drop the root's reference: t only references itself now.
        q.set(b, "t", Value::Nil).unwrap();
        assert_eq!(q.refcount_of(t), 1);

        // Clearing the self-reference must not reclaim the table being written.
        q.set_in(b, t, "me", Value::Nil, Mode::Commit).unwrap();
        assert!(q.contains(t));
        assert_eq!(q.current_size(b).unwrap(), q.recount(b).unwrap());
    }
}
