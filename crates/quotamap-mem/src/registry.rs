//! Container registry: owner and reference count per tracked container.
//!
//! Mutations never edit the registry directly. They run against a [`Staged`]
//! overlay and only the winning ones are applied with [`Registry::apply`], so a
//! rejected or dry-run write leaves every refcount untouched.

use std::collections::HashMap;

use quotamap_core::id::{BudgetId, ContainerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryEntry {
    pub owner: BudgetId,
    /// Live embeddings as an entry value. The budget->root link is not counted.
    pub refcount: usize,
    /// Budget roots are never reclaimed by refcount.
    pub pinned: bool,
}

#[derive(Debug, Default)]
pub struct Registry {
    entries: HashMap<ContainerId, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `id` for `owner` with a single embedding.
    pub fn register(&mut self, id: ContainerId, owner: BudgetId) {
        self.entries.insert(
            id,
            RegistryEntry {
                owner,
                refcount: 1,
                pinned: false,
            },
        );
    }

    /// Track a budget root: no embeddings yet, never reclaimed by refcount.
    pub fn register_root(&mut self, id: ContainerId, owner: BudgetId) {
        self.entries.insert(
            id,
            RegistryEntry {
                owner,
                refcount: 0,
                pinned: true,
            },
        );
    }

    pub fn unregister(&mut self, id: ContainerId) -> Option<RegistryEntry> {
        self.entries.remove(&id)
    }

    pub fn entry(&self, id: ContainerId) -> Option<RegistryEntry> {
        self.entries.get(&id).copied()
    }

    pub fn lookup_owner(&self, id: ContainerId) -> Option<BudgetId> {
        self.entries.get(&id).map(|e| e.owner)
    }

    /// Zero for containers that were never registered.
    pub fn refcount_of(&self, id: ContainerId) -> usize {
        self.entries.get(&id).map(|e| e.refcount).unwrap_or(0)
    }

    pub fn inc_ref(&mut self, id: ContainerId) {
        if let Some(e) = self.entries.get_mut(&id) {
            e.refcount += 1;
        }
    }

    /// Returns the new count, or `None` when `id` is not tracked.
    pub fn dec_ref(&mut self, id: ContainerId) -> Option<usize> {
        let e = self.entries.get_mut(&id)?;
        e.refcount = e.refcount.saturating_sub(1);
        Some(e.refcount)
    }

    /// Every container currently accounted to `owner`, in handle order.
    pub fn owned_by(&self, owner: BudgetId) -> Vec<ContainerId> {
        let mut ids: Vec<ContainerId> = self
            .entries
            .iter()
            .filter(|(_, e)| e.owner == owner)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Commit a staged overlay.
    pub fn apply(&mut self, changes: &Changes) {
        for (id, entry) in &changes.entries {
            match entry {
                Some(e) => {
                    self.entries.insert(*id, *e);
                }
                None => {
                    self.entries.remove(id);
                }
            }
        }
    }
}

/// Registry edits recorded by a [`Staged`] view, ready to commit.
#[derive(Debug, Default)]
pub struct Changes {
    entries: HashMap<ContainerId, Option<RegistryEntry>>,
    reclaimed: Vec<ContainerId>,
}

impl Changes {
    /// Containers whose slots must be freed once the write commits.
    pub fn reclaimed(&self) -> &[ContainerId] {
        &self.reclaimed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.reclaimed.is_empty()
    }
}

/// Copy-on-write view of a registry for one mutation.
pub struct Staged<'r> {
    base: &'r Registry,
    changes: Changes,
}

impl<'r> Staged<'r> {
    pub fn new(base: &'r Registry) -> Self {
        Self {
            base,
            changes: Changes::default(),
        }
    }

    pub fn entry(&self, id: ContainerId) -> Option<RegistryEntry> {
        match self.changes.entries.get(&id) {
            Some(staged) => *staged,
            None => self.base.entry(id),
        }
    }

    pub fn register(&mut self, id: ContainerId, owner: BudgetId) {
        self.changes.entries.insert(
            id,
            Some(RegistryEntry {
                owner,
                refcount: 1,
                pinned: false,
            }),
        );
    }

    pub fn unregister(&mut self, id: ContainerId) {
        self.changes.entries.insert(id, None);
    }

    pub fn inc_ref(&mut self, id: ContainerId) {
        if let Some(mut e) = self.entry(id) {
            e.refcount += 1;
            self.changes.entries.insert(id, Some(e));
        }
    }

    /// Returns the entry after decrementing, or `None` when `id` is not tracked.
    pub fn dec_ref(&mut self, id: ContainerId) -> Option<RegistryEntry> {
        let mut e = self.entry(id)?;
        e.refcount = e.refcount.saturating_sub(1);
        self.changes.entries.insert(id, Some(e));
        Some(e)
    }

    pub fn mark_reclaimed(&mut self, id: ContainerId) {
        self.changes.reclaimed.push(id);
    }

    pub fn into_changes(self) -> Changes {
        self.changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> (BudgetId, ContainerId, ContainerId) {
        (
            BudgetId::new(0),
            ContainerId::new(1, 0),
            ContainerId::new(2, 0),
        )
    }

    #[test]
    fn unknown_containers_have_no_owner() {
        let reg = Registry::new();
        let (_, a, _) = ids();
        assert_eq!(reg.lookup_owner(a), None);
        assert_eq!(reg.refcount_of(a), 0);
    }

    #[test]
    fn refcounts_move_with_inc_and_dec() {
        let mut reg = Registry::new();
        let (b, a, _) = ids();
        reg.register(a, b);
        reg.inc_ref(a);
        assert_eq!(reg.refcount_of(a), 2);
        assert_eq!(reg.dec_ref(a), Some(1));
        assert_eq!(reg.dec_ref(a), Some(0));
        assert_eq!(reg.dec_ref(ContainerId::new(9, 9)), None);
    }

    #[test]
    fn staged_edits_are_invisible_until_applied() {
        let mut reg = Registry::new();
        let (b, a, c) = ids();
        reg.register(a, b);

        let changes = {
            let mut staged = Staged::new(&reg);
            staged.inc_ref(a);
            staged.register(c, b);
            assert_eq!(staged.entry(a).map(|e| e.refcount), Some(2));
            assert_eq!(reg.refcount_of(a), 1);
            assert_eq!(reg.lookup_owner(c), None);
            staged.into_changes()
        };

        reg.apply(&changes);
        assert_eq!(reg.refcount_of(a), 2);
        assert_eq!(reg.lookup_owner(c), Some(b));
    }

    #[test]
    fn staged_unregister_removes_on_apply() {
        let mut reg = Registry::new();
        let (b, a, _) = ids();
        reg.register_root(a, b);
        let mut staged = Staged::new(&reg);
        staged.unregister(a);
        staged.mark_reclaimed(a);
        assert!(staged.entry(a).is_none());
        let changes = staged.into_changes();
        assert_eq!(changes.reclaimed(), &[a]);
        reg.apply(&changes);
        assert!(reg.is_empty());
    }
}
