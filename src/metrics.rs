//! Process-wide complexity counters.
//!
//! The Python reference used class-level integers (`CountComplx.countMsg`,
//! `CountComplx.countAskP`). Here a single struct of atomics is owned by the
//! supervisor and handed to every node by reference, so the increments stay
//! lock-free and the final ratio is sampled once at shutdown.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Counters {
    messages_sent: AtomicU64,
    requests_issued: AtomicU64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_issued(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns `(messages_sent, requests_issued)`, per the supervisor's
    /// `stop()` surface.
    pub fn snapshot(&self) -> (u64, u64) {
        (
            self.messages_sent.load(Ordering::Relaxed),
            self.requests_issued.load(Ordering::Relaxed),
        )
    }
}
