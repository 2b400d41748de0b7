//! Lightweight peak/usage counters kept per budget.
//!
//! Keep this cheap. Callers can export `BudgetStats` to their own metrics stack.

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PeakTracker {
    peak_bytes: u64,
    writes: u64,
    rejections: u64,
}

impl PeakTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed write that left the budget at `used_bytes`.
    pub fn record_write(&mut self, used_bytes: u64) {
        self.writes += 1;
        if used_bytes > self.peak_bytes {
            self.peak_bytes = used_bytes;
        }
        tracing::trace!(used_bytes, peak = self.peak_bytes, "budget usage");
    }

    pub fn record_rejection(&mut self) {
        self.rejections += 1;
    }

    pub fn peak(&self) -> u64 {
        self.peak_bytes
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn rejections(&self) -> u64 {
        self.rejections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_only_moves_up() {
        let mut t = PeakTracker::new();
        t.record_write(10);
        t.record_write(30);
        t.record_write(5);
        t.record_rejection();
        assert_eq!(t.peak(), 30);
        assert_eq!(t.writes(), 3);
        assert_eq!(t.rejections(), 1);
    }
}
