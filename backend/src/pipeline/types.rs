use crate::accrual::Verdict;
use crate::model::OrderNumber;

/// One order paired with what the accrual service said about it.
#[derive(Clone, Debug, PartialEq)]
pub struct ReconciliationResult {
    pub order: OrderNumber,
    pub verdict: Verdict,
}

/// Tally of one batch as seen by the Reconciler.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Results that reached the Reconciler.
    pub polled: usize,
    pub applied: usize,
    /// Resolved verdicts the ledger ignored (terminal or stale).
    pub unchanged: usize,
    pub deferred: usize,
    pub failed: usize,
    /// Resolved verdicts whose persistence failed.
    pub apply_errors: usize,
}

impl CycleReport {
    pub fn resolved(&self) -> usize {
        self.applied + self.unchanged + self.apply_errors
    }
}
