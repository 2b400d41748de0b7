//! Thread-shared handle to a `Quota`.
//!
//! One lock covers the whole arena, so every budget attached to another one is
//! always mutated under the same exclusion.

use std::sync::{Arc, Mutex};

use crate::quota::Quota;

#[derive(Clone, Default)]
pub struct SharedQuota {
    inner: Arc<Mutex<Quota>>,
}

impl SharedQuota {
    pub fn new(quota: Quota) -> Self {
        Self {
            inner: Arc::new(Mutex::new(quota)),
        }
    }

    /// Run `f` with exclusive access. A panic inside an earlier `with` does not
    /// wedge the quota: every write commits atomically, so the state behind a
    /// poisoned lock is still consistent.
    pub fn with<R>(&self, f: impl FnOnce(&mut Quota) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::OverflowPolicy;
    use std::thread;

    #[test]
    fn concurrent_writers_never_exceed_the_limit() {
        let shared = SharedQuota::default();
        let b = shared
            .with(|q| q.create_budget(1_000, OverflowPolicy::default()))
            .unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for i in 0..50 {
                        let key = format!("t{t}-{i}");
                        let _ = shared.with(|q| q.set(b, key.as_str(), 1_i64));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        shared.with(|q| {
            let size = q.current_size(b).unwrap();
            assert!(size <= 1_000);
            assert_eq!(size, q.recount(b).unwrap());
        });
    }
}
