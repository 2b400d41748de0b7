//! Attach/detach aggregation tests

use quotamap_core::prelude::*;
use quotamap_mem::{OverflowPolicy, Quota};

fn budget(q: &mut Quota, max: u64) -> BudgetId {
    q.create_budget(max, OverflowPolicy::default())
        .expect("create budget")
}

/// Entry cost of a one-letter key holding `n` bytes of text.
fn text_entry(n: usize) -> u64 {
    16 + 1 + n as u64
}

#[test]
fn test_attached_budget_limits_the_writer() {
    let mut q = Quota::default();
    let a = budget(&mut q, 1_000);
    let b = budget(&mut q, 100);
    q.set(b, "x", "y".repeat(20).as_str()).unwrap();

    q.attach_to(a, b).unwrap();
    assert_eq!(q.effective_size(b).unwrap(), text_entry(20));

    q.set(a, "k", "z".repeat(40).as_str()).unwrap();
    assert_eq!(q.effective_size(b).unwrap(), text_entry(20) + text_entry(40));

    // A alone is far from its own maximum, but B is not.
    let err = q.set(a, "m", "w".repeat(10).as_str()).unwrap_err();
    match err {
        QuotaError::QuotaExceeded {
            budget,
            limit_budget,
            ..
        } => {
            assert_eq!(budget, a);
            assert_eq!(limit_budget, b);
        }
        other => panic!("unexpected error: {other}"),
    }

    q.detach_from(a, b).unwrap();
    assert!(q.set(a, "m", "w".repeat(10).as_str()).is_ok());
    assert_eq!(q.effective_size(b).unwrap(), text_entry(20));
}

#[test]
fn test_limits_propagate_transitively() {
    let mut q = Quota::default();
    let a = budget(&mut q, 10_000);
    let b = budget(&mut q, 10_000);
    let c = budget(&mut q, 50);
    q.attach_to(a, b).unwrap();
    q.attach_to(b, c).unwrap();

    q.set(a, "k", "0123456789").unwrap();
    assert_eq!(q.effective_size(c).unwrap(), text_entry(10));

    let err = q.set(a, "j", "0123456789").unwrap_err();
    assert!(matches!(
        err,
        QuotaError::QuotaExceeded { limit_budget, .. } if limit_budget == c
    ));
}

#[test]
fn test_attach_cycles_terminate() {
    let mut q = Quota::default();
    let a = budget(&mut q, 1_000);
    let b = budget(&mut q, 1_000);
    q.attach_to(a, b).unwrap();
    q.attach_to(b, a).unwrap();

    q.set(a, "k", "aaaa").unwrap();
    q.set(b, "k", "bb").unwrap();
    let total = text_entry(4) + text_entry(2);
    assert_eq!(q.effective_size(a).unwrap(), total);
    assert_eq!(q.effective_size(b).unwrap(), total);

    q.detach_from_all(a).unwrap();
    assert!(q.attached_to(a).unwrap().is_empty());
    assert_eq!(q.attached_from(a).unwrap(), vec![b]);
    assert_eq!(q.effective_size(a).unwrap(), total);
    assert_eq!(q.effective_size(b).unwrap(), text_entry(2));

    q.detach_from_all(b).unwrap();
    assert_eq!(q.effective_size(a).unwrap(), text_entry(4));
}

#[test]
fn test_attach_never_fails_past_writes() {
    let mut q = Quota::default();
    let a = budget(&mut q, 1_000);
    let b = budget(&mut q, 30);
    q.set(a, "k", "0123456789012345678901234567890123456789").unwrap();

    q.attach_to(a, b).unwrap();
    assert!(q.is_over_limit(b).unwrap());
    assert!(!q.is_over_limit(a).unwrap());
    assert_eq!(q.current_size(a).unwrap(), text_entry(40));

    // Shrinking writes still go through.
    assert!(q.set(a, "k", Value::Nil).is_ok());
    assert!(!q.is_over_limit(b).unwrap());
}

#[test]
fn test_self_attach_is_ignored() {
    let mut q = Quota::default();
    let a = budget(&mut q, 100);
    q.attach_to(a, a).unwrap();
    assert!(q.attached_to(a).unwrap().is_empty());
    q.set(a, "k", "v").unwrap();
    assert_eq!(q.effective_size(a).unwrap(), q.current_size(a).unwrap());
}

#[test]
fn test_destroy_cuts_every_attach_edge() {
    let mut q = Quota::default();
    let a = budget(&mut q, 1_000);
    let b = budget(&mut q, 1_000);
    let c = budget(&mut q, 1_000);
    q.attach_to(a, b).unwrap();
    q.attach_to(b, c).unwrap();
    q.set(b, "k", "v").unwrap();

    q.destroy(b).unwrap();
    assert!(q.attached_to(a).unwrap().is_empty());
    assert!(q.attached_from(c).unwrap().is_empty());
    assert_eq!(q.effective_size(c).unwrap(), 0);

    assert_eq!(q.attach_to(a, b), Err(QuotaError::UseAfterDestroy(b)));
    assert_eq!(q.attach_to(b, a), Err(QuotaError::UseAfterDestroy(b)));
}
