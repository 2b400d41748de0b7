//! Recursive graph walks over the container arena.
//!
//! All walks use an explicit worklist plus a visited set, so deep nesting does
//! not grow the call stack and cycles terminate.
//!
//! - `absorb`: start tracking a container graph and price it.
//! - `release`: drop embeddings and reclaim containers whose count hits zero.
//! - `clone_graph`: untracked plain copy, sharing preserved.
//! - `wipe_order`: every owned container, children first, for budget teardown.

use std::collections::{HashMap, HashSet, VecDeque};

use quotamap_core::cost::CostModel;
use quotamap_core::error::{QuotaError, Result};
use quotamap_core::id::{BudgetId, ContainerId};
use quotamap_core::plain::{PlainGraph, PlainTable, PlainValue};
use quotamap_core::value::Value;

use crate::arena::Arena;
use crate::registry::{Registry, Staged};

/// Register `id` (and every untracked container reachable from it) to `owner`
/// and return the body cost newly charged.
///
/// `id` gets one embedding. Reachable containers already tracked by `owner`
/// gain an embedding and no cost; containers tracked by another budget abort
/// the walk with `InvalidOwnership`.
pub fn absorb(
    arena: &Arena,
    staged: &mut Staged<'_>,
    model: &CostModel,
    id: ContainerId,
    owner: BudgetId,
    visited: &mut HashSet<ContainerId>,
) -> Result<u64> {
    if !visited.insert(id) {
        staged.inc_ref(id);
        return Ok(0);
    }
    staged.register(id, owner);

    let mut total = 0u64;
    let mut stack = vec![id];
    while let Some(cur) = stack.pop() {
        let table = arena.get(cur).ok_or(QuotaError::UnknownContainer(cur))?;
        total += model.header();
        for (key, value) in table.iter() {
            model.admit(value)?;
            total += model.entry_cost(key, value);
            let Value::Table(child) = value else {
                continue;
            };
            match staged.entry(*child) {
                Some(e) if e.owner == owner => staged.inc_ref(*child),
                Some(_) => {
                    return Err(QuotaError::InvalidOwnership {
                        budget: owner,
                        container: *child,
                    })
                }
                None => {
                    if !arena.contains(*child) {
                        return Err(QuotaError::UnknownContainer(*child));
                    }
                    visited.insert(*child);
                    staged.register(*child, owner);
                    stack.push(*child);
                }
            }
        }
    }
    Ok(total)
}

/// Reclaim `id` and every container whose last embedding it held. Returns the
/// reclaimed body cost. `protected` is never reclaimed (the table being
/// written to), and neither are pinned budget roots.
pub fn release(
    arena: &Arena,
    staged: &mut Staged<'_>,
    model: &CostModel,
    id: ContainerId,
    protected: Option<ContainerId>,
    visited: &mut HashSet<ContainerId>,
) -> u64 {
    let mut total = 0u64;
    let mut stack = vec![id];
    while let Some(cur) = stack.pop() {
        if !visited.insert(cur) {
            continue;
        }
        staged.unregister(cur);
        staged.mark_reclaimed(cur);
        let Some(table) = arena.get(cur) else {
            continue;
        };
        total += model.header();
        for (key, value) in table.iter() {
            total += model.entry_cost(key, value);
            let Value::Table(child) = value else {
                continue;
            };
            if let Some(e) = staged.dec_ref(*child) {
                if e.refcount == 0 && !e.pinned && Some(*child) != protected {
                    stack.push(*child);
                }
            }
        }
    }
    total
}

/// Deep-copy the graph rooted at `id` into an untracked [`PlainGraph`].
///
/// Tables are numbered in breadth-first order from the root (index 0), which
/// keeps the copy deterministic for hashing.
pub fn clone_graph(arena: &Arena, id: ContainerId) -> Result<PlainGraph> {
    let mut graph = PlainGraph {
        root: PlainValue::Table(0),
        tables: vec![PlainTable::default()],
    };
    let mut clone_map: HashMap<ContainerId, usize> = HashMap::new();
    clone_map.insert(id, 0);
    let mut queue = VecDeque::from([id]);

    while let Some(cur) = queue.pop_front() {
        let table = arena.get(cur).ok_or(QuotaError::UnknownContainer(cur))?;
        let Some(slot) = clone_map.get(&cur).copied() else {
            continue;
        };
        let mut entries = Vec::with_capacity(table.entry_count());
        for (key, value) in table.iter() {
            let plain = match value {
                Value::Table(child) => {
                    let idx = match clone_map.get(child) {
                        Some(idx) => *idx,
                        None => {
                            let idx = graph.add_table();
                            clone_map.insert(*child, idx);
                            queue.push_back(*child);
                            idx
                        }
                    };
                    PlainValue::Table(idx)
                }
                other => PlainValue::from_scalar(other).unwrap_or(PlainValue::Nil),
            };
            entries.push((key.clone(), plain));
        }
        graph.tables[slot].entries = entries;
    }
    Ok(graph)
}

/// Body cost of every container reachable from `id`, each counted once.
pub fn body_size(arena: &Arena, model: &CostModel, id: ContainerId) -> Result<u64> {
    let mut visited = HashSet::new();
    let mut stack = vec![id];
    let mut total = 0u64;
    while let Some(cur) = stack.pop() {
        if !visited.insert(cur) {
            continue;
        }
        let table = arena.get(cur).ok_or(QuotaError::UnknownContainer(cur))?;
        total += model.header();
        for (key, value) in table.iter() {
            total += model.entry_cost(key, value);
            if let Value::Table(child) = value {
                stack.push(*child);
            }
        }
    }
    Ok(total)
}

/// Containers owned by `owner` reachable from `root`, children before parents.
pub fn wipe_order(
    arena: &Arena,
    registry: &Registry,
    root: ContainerId,
    owner: BudgetId,
    visited: &mut HashSet<ContainerId>,
) -> Vec<ContainerId> {
    let mut order = Vec::new();
    // (container, children already pushed)
    let mut stack = vec![(root, false)];
    while let Some((cur, expanded)) = stack.pop() {
        if expanded {
            order.push(cur);
            continue;
        }
        if !visited.insert(cur) {
            continue;
        }
        stack.push((cur, true));
        let Some(table) = arena.get(cur) else {
            continue;
        };
        for (_, value) in table.iter() {
            if let Value::Table(child) = value {
                if registry.lookup_owner(*child) == Some(owner) && !visited.contains(child) {
                    stack.push((*child, false));
                }
            }
        }
    }
    order
}

/// Materialize a plain graph as untracked containers. Returns the root value.
pub fn import(arena: &mut Arena, graph: &PlainGraph) -> Result<Value> {
    let ids: Vec<ContainerId> = graph.tables.iter().map(|_| arena.alloc()).collect();
    let resolve = |v: &PlainValue| -> Result<Value> {
        match v {
            PlainValue::Table(i) => ids
                .get(*i)
                .copied()
                .map(Value::Table)
                .ok_or_else(|| QuotaError::Config(format!("plain graph has no table {i}"))),
            other => Ok(other.to_scalar().unwrap_or(Value::Nil)),
        }
    };

    let root = resolve(&graph.root);
    let mut filled = Vec::with_capacity(graph.tables.len());
    for (i, table) in graph.tables.iter().enumerate() {
        let mut entries = Vec::with_capacity(table.entries.len());
        for (key, value) in &table.entries {
            entries.push((key.clone(), resolve(value)));
        }
        filled.push((ids[i], entries));
    }

    let mut failure = root.as_ref().err().cloned();
    for (id, entries) in filled {
        for (key, value) in entries {
            match value {
                Ok(v) => {
                    if let Some(t) = arena.get_mut(id) {
                        t.put(key, v);
                    }
                }
                Err(e) => failure = failure.or(Some(e)),
            }
        }
    }

    if let Some(e) = failure {
        for id in ids {
            arena.free(id);
        }
        return Err(e);
    }
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotamap_core::value::Key;

    fn owner() -> BudgetId {
        BudgetId::new(0)
    }

    #[test]
    fn absorb_charges_shared_child_once() {
        let mut arena = Arena::new();
        let parent = arena.alloc();
        let child = arena.alloc();
        arena.get_mut(child).unwrap().put(Key::from("v"), Value::from("xyz"));
        let t = arena.get_mut(parent).unwrap();
        t.put(Key::from("a"), Value::Table(child));
        t.put(Key::from("b"), Value::Table(child));

        let registry = Registry::new();
        let model = CostModel::default();
        let mut staged = Staged::new(&registry);
        let total = absorb(&arena, &mut staged, &model, parent, owner(), &mut HashSet::new())
            .unwrap();

        // parent: header + 2 refs; child: header + one text entry
        assert_eq!(total, 40 + 2 * (16 + 1) + 40 + (16 + 1 + 3));
        assert_eq!(staged.entry(child).map(|e| e.refcount), Some(2));
        assert_eq!(staged.entry(parent).map(|e| e.refcount), Some(1));
    }

    #[test]
    fn absorb_and_release_terminate_on_self_cycle() {
        let mut arena = Arena::new();
        let t = arena.alloc();
        arena.get_mut(t).unwrap().put(Key::from("me"), Value::Table(t));

        let mut registry = Registry::new();
        let model = CostModel::default();
        let mut staged = Staged::new(&registry);
        let charged =
            absorb(&arena, &mut staged, &model, t, owner(), &mut HashSet::new()).unwrap();
        assert_eq!(charged, 40 + 16 + 2);
        assert_eq!(staged.entry(t).map(|e| e.refcount), Some(2));
        registry.apply(&staged.into_changes());

        let mut staged = Staged::new(&registry);
        let reclaimed = release(&arena, &mut staged, &model, t, None, &mut HashSet::new());
        assert_eq!(reclaimed, charged);
        assert!(staged.entry(t).is_none());
    }

    #[test]
    fn absorb_rejects_foreign_containers() {
        let mut arena = Arena::new();
        let parent = arena.alloc();
        let foreign = arena.alloc();
        arena
            .get_mut(parent)
            .unwrap()
            .put(Key::from("x"), Value::Table(foreign));

        let mut registry = Registry::new();
        registry.register(foreign, BudgetId::new(7));
        let mut staged = Staged::new(&registry);
        let err = absorb(
            &arena,
            &mut staged,
            &CostModel::default(),
            parent,
            owner(),
            &mut HashSet::new(),
        )
        .unwrap_err();
        assert!(matches!(err, QuotaError::InvalidOwnership { .. }));
    }

    #[test]
    fn clone_preserves_sharing_and_cycles() {
        let mut arena = Arena::new();
        let root = arena.alloc();
        let shared = arena.alloc();
        arena
            .get_mut(shared)
            .unwrap()
            .put(Key::from("back"), Value::Table(root));
        let t = arena.get_mut(root).unwrap();
        t.put(Key::from("a"), Value::Table(shared));
        t.put(Key::from("b"), Value::Table(shared));

        let g = clone_graph(&arena, root).unwrap();
        assert_eq!(g.tables.len(), 2);
        let r = g.root_table().unwrap();
        assert_eq!(r.get(&Key::from("a")), Some(&PlainValue::Table(1)));
        assert_eq!(r.get(&Key::from("b")), Some(&PlainValue::Table(1)));
        assert_eq!(
            g.tables[1].get(&Key::from("back")),
            Some(&PlainValue::Table(0))
        );
    }

    #[test]
    fn import_rebuilds_shared_tables() {
        let mut g = PlainGraph::new();
        let shared = g.add_table();
        g.push_entry(shared, 1, PlainValue::from("x"));
        g.push_entry(0, "a", PlainValue::Table(shared));
        g.push_entry(0, "b", PlainValue::Table(shared));

        let mut arena = Arena::new();
        let root = import(&mut arena, &g).unwrap().as_table().unwrap();
        let t = arena.get(root).unwrap();
        assert_eq!(t.get(&Key::from("a")), t.get(&Key::from("b")));
        assert_eq!(arena.live_count(), 2);
    }

    #[test]
    fn import_rejects_dangling_indices() {
        let mut g = PlainGraph::new();
        g.push_entry(0, "a", PlainValue::Table(5));
        let mut arena = Arena::new();
        assert!(import(&mut arena, &g).is_err());
        assert_eq!(arena.live_count(), 0);
    }
}
