use std::sync::atomic::{AtomicU64, Ordering};

/// Success counter compared against the target.
///
/// Seeded from the progress index at startup and only ever incremented after
/// a success is durably recorded.
#[derive(Debug)]
pub struct TargetCounter {
    target: u64,
    count: AtomicU64,
}

impl TargetCounter {
    pub fn new(target: u64, initial: u64) -> Self {
        Self {
            target,
            count: AtomicU64::new(initial),
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    pub fn get(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }

    /// Count one more success. Returns the new value.
    pub fn increment(&self) -> u64 {
        self.count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_reached(&self) -> bool {
        self.get() >= self.target
    }

    /// Successes still needed.
    pub fn remaining(&self) -> u64 {
        self.target.saturating_sub(self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_reaches_target() {
        let counter = TargetCounter::new(2, 0);
        assert!(!counter.is_reached());
        assert_eq!(counter.remaining(), 2);
        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.increment(), 2);
        assert!(counter.is_reached());
        assert_eq!(counter.remaining(), 0);
    }

    #[test]
    fn test_seeded_above_target() {
        let counter = TargetCounter::new(450, 800);
        assert!(counter.is_reached());
        assert_eq!(counter.remaining(), 0);
        assert_eq!(counter.target(), 450);
    }
}
