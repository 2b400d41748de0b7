//! Slot arena holding every nested container of a `Quota`.
//!
//! Freed slots are reused through a free-list before the slot vector grows.
//! Each reuse bumps the slot generation, so handles to a reclaimed container
//! stop resolving instead of aliasing whatever moved in.

use std::collections::BTreeMap;

use quotamap_core::id::ContainerId;
use quotamap_core::value::{Key, Value};

/// One nested container: keyed entries ordered by key.
#[derive(Debug, Clone, Default)]
pub struct Table {
    entries: BTreeMap<Key, Value>,
}

impl Table {
    pub fn get(&self, key: &Key) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.entries.iter()
    }

    /// Number of entries, sequence or not.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Sequence border: largest `n` with integer keys `1..=n` all present.
    pub fn border(&self) -> usize {
        let mut n: i64 = 0;
        for key in self.entries.range(Key::Int(1)..) {
            match key.0 {
                Key::Int(i) if *i == n + 1 => n += 1,
                _ => break,
            }
        }
        n as usize
    }

    /// Store `value` under `key`; `Nil` removes the entry. Returns the old value.
    pub(crate) fn put(&mut self, key: Key, value: Value) -> Option<Value> {
        if value.is_nil() {
            self.entries.remove(&key)
        } else {
            self.entries.insert(key, value)
        }
    }

    /// Insert at sequence position `at`, shifting `at..=border` up by one.
    pub(crate) fn insert_at(&mut self, at: usize, value: Value) {
        let border = self.border();
        let mut i = border;
        while i >= at && i > 0 {
            if let Some(v) = self.entries.remove(&Key::Int(i as i64)) {
                self.entries.insert(Key::Int(i as i64 + 1), v);
            }
            i -= 1;
        }
        self.entries.insert(Key::Int(at as i64), value);
    }

    /// Remove sequence position `at`, shifting `at+1..=border` down by one.
    pub(crate) fn remove_at(&mut self, at: usize) -> Option<Value> {
        let border = self.border();
        let removed = self.entries.remove(&Key::Int(at as i64));
        for i in at + 1..=border {
            if let Some(v) = self.entries.remove(&Key::Int(i as i64)) {
                self.entries.insert(Key::Int(i as i64 - 1), v);
            }
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    table: Option<Table>,
}

#[derive(Debug, Default)]
pub struct Arena {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    total_allocations: usize,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an empty table and return a stable handle to it.
    pub fn alloc(&mut self) -> ContainerId {
        self.total_allocations += 1;
        if let Some(idx) = self.free_list.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.table = Some(Table::default());
            ContainerId::new(idx, slot.generation)
        } else {
            let idx = self.slots.len() as u32;
            self.slots.push(Slot {
                generation: 0,
                table: Some(Table::default()),
            });
            ContainerId::new(idx, 0)
        }
    }

    pub fn get(&self, id: ContainerId) -> Option<&Table> {
        self.slots
            .get(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.table.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ContainerId) -> Option<&mut Table> {
        self.slots
            .get_mut(id.index() as usize)
            .filter(|s| s.generation == id.generation())
            .and_then(|s| s.table.as_mut())
    }

    pub fn contains(&self, id: ContainerId) -> bool {
        self.get(id).is_some()
    }

    /// Release a slot. Returns false for a stale or unknown handle.
    pub(crate) fn free(&mut self, id: ContainerId) -> bool {
        match self.slots.get_mut(id.index() as usize) {
            Some(slot) if slot.generation == id.generation() && slot.table.is_some() => {
                slot.table = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free_list.push(id.index());
                true
            }
            _ => false,
        }
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.table.is_some()).count()
    }

    pub fn total_allocations(&self) -> usize {
        self.total_allocations
    }
}
