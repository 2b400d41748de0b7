use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use quotamap_core::prelude::*;
use quotamap_mem::{Mode, OverflowPolicy, Position, Quota};

/// Untracked sequence of `n` small tables, each shared by the next.
fn make_graph(q: &mut Quota, n: usize) -> ContainerId {
    let list = q.table();
    let mut prev: Option<ContainerId> = None;
    for i in 0..n {
        let t = q.table();
        q.raw_set(t, "id", i as i64).unwrap();
        if let Some(p) = prev {
            q.raw_set(t, "prev", p).unwrap();
        }
        q.raw_push(list, t).unwrap();
        prev = Some(t);
    }
    list
}

fn bench_scalar_writes(c: &mut Criterion) {
    c.bench_function("set_scalar_1k", |b| {
        b.iter_batched(
            || {
                let mut q = Quota::default();
                let id = q.create_budget(1 << 30, OverflowPolicy::default()).unwrap();
                (q, id)
            },
            |(mut q, id)| {
                for i in 0..1_000_i64 {
                    q.set(id, i, "value").unwrap();
                }
                q
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_absorb_release(c: &mut Criterion) {
    c.bench_function("absorb_release_256", |b| {
        b.iter_batched(
            || {
                let mut q = Quota::default();
                let id = q.create_budget(1 << 30, OverflowPolicy::default()).unwrap();
                let list = make_graph(&mut q, 256);
                (q, id, list)
            },
            |(mut q, id, list)| {
                q.set(id, "g", list).unwrap();
                q.set(id, "g", Value::Nil).unwrap();
                q
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_dry_run_probe(c: &mut Criterion) {
    let mut q = Quota::default();
    let id = q.create_budget(1 << 30, OverflowPolicy::default()).unwrap();
    let root = q.root(id).unwrap();
    for i in 0..256_i64 {
        q.push(id, i).unwrap();
    }
    c.bench_function("insert_front_dry_run", |b| {
        b.iter(|| {
            q.insert(id, root, Position::At(1), "x", Mode::DryRun)
                .unwrap()
        })
    });
}

criterion_group!(
    quota,
    bench_scalar_writes,
    bench_absorb_release,
    bench_dry_run_probe
);
criterion_main!(quota);
