//! The resource sentinel: a test oracle, not a production lock.
//!
//! Acquisition is non-blocking. If a second acquirer arrives while the
//! sentinel is held, it panics immediately rather than queueing — two nodes
//! concurrently inside the critical section is exactly the correctness
//! violation the algorithm exists to prevent, so we fail hard instead of
//! masking it.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ResourceSentinel {
    acquired: AtomicBool,
}

impl ResourceSentinel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the sentinel, returning a guard that releases it on drop.
    ///
    /// # Panics
    ///
    /// Panics if the sentinel is already held. This is the only assertion
    /// path in the crate that is intentionally a hard crash: it models an
    /// invariant violation, not an error a caller can recover from.
    pub fn acquire(&self) -> SentinelGuard<'_> {
        if self
            .compare_exchange(false, true)
            .is_err()
        {
            panic!("resource sentinel already acquired: two nodes entered the critical section concurrently");
        }
        SentinelGuard { sentinel: self }
    }

    fn compare_exchange(&self, current: bool, new: bool) -> Result<bool, bool> {
        self.acquired
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

pub struct SentinelGuard<'a> {
    sentinel: &'a ResourceSentinel,
}

impl Drop for SentinelGuard<'_> {
    fn drop(&mut self) {
        self.sentinel.acquired.store(false, Ordering::Release);
    }
}
