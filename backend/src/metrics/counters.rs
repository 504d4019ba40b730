use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Minimal counters for operational visibility of the reconciliation loop.
#[derive(Clone, Default)]
pub struct Counters {
    pub cycles: Arc<AtomicU64>,
    pub idle_cycles: Arc<AtomicU64>,
    pub skipped_cycles: Arc<AtomicU64>,

    pub orders_polled: Arc<AtomicU64>,

    // verdict outcomes
    pub verdicts_applied: Arc<AtomicU64>,
    pub verdicts_unchanged: Arc<AtomicU64>,
    pub verdicts_deferred: Arc<AtomicU64>,
    pub verdicts_failed: Arc<AtomicU64>,
    pub apply_errors: Arc<AtomicU64>,
}

impl Counters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}
