use async_trait::async_trait;

use crate::error::LedgerError;
use crate::model::{OrderNumber, OrderStatus, Points};

/// What a verdict did to stored state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The order moved forward; a PROCESSED move also credited the owner.
    Applied,
    /// Nothing was written: the order is unknown, already terminal, already
    /// in this status, or the verdict would move it backwards.
    Unchanged,
}

/// Storage seam used by the reconciliation pipeline.
///
/// Implementations own durability and must serialize concurrent writes to the
/// same order and balance. `apply_order_verdict` must be idempotent: applying
/// a terminal verdict to an order that is already terminal writes nothing.
#[async_trait]
pub trait OrderLedger: Send + Sync {
    /// Orders currently NEW, REGISTERED or PROCESSING, oldest upload first.
    async fn list_pending_orders(&self) -> Result<Vec<OrderNumber>, LedgerError>;

    /// One transaction: status/accrual update plus, for PROCESSED, the credit
    /// of `accrual` to the order's owner.
    async fn apply_order_verdict(
        &self,
        order: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> Result<ApplyOutcome, LedgerError>;
}
