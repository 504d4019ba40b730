//! Reconciliation pipeline for one batch of pending orders.
//!
//! ```text
//! orders ──► FetchStage (K workers) ──► collect ──► Reconciler ──► ledger
//! ```
//!
//! Stages talk only through channels. Cancellation reaches the fetch workers
//! and the collect forwarders; the Reconciler always drains what it was given.

pub mod collect;
pub mod fetch;
pub mod reconcile;
pub mod types;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, error};

pub use collect::collect;
pub use fetch::FetchStage;
pub use reconcile::Reconciler;
pub use types::{CycleReport, ReconciliationResult};

use crate::accrual::Scorer;
use crate::ledger::OrderLedger;
use crate::model::OrderNumber;

pub struct Pipeline<S: Scorer, L: OrderLedger + 'static> {
    fetch: FetchStage<S>,
    reconciler: Arc<Reconciler<L>>,
}

impl<S: Scorer, L: OrderLedger + 'static> Pipeline<S, L> {
    pub fn new(fetch: FetchStage<S>, reconciler: Reconciler<L>) -> Self {
        Self {
            fetch,
            reconciler: Arc::new(reconciler),
        }
    }

    /// Runs fetch, collect and reconcile over `orders` and waits for the
    /// Reconciler to finish.
    pub async fn run_batch(
        &self,
        orders: Vec<OrderNumber>,
        cancel: CancellationToken,
    ) -> CycleReport {
        let streams = self.fetch.spawn(orders, cancel.clone());
        let merged = collect(streams, cancel);

        let reconciler = self.reconciler.clone();
        let handle = tokio::spawn(
            async move { reconciler.run(merged).await }.instrument(Span::current()),
        );

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "reconciler task ended abnormally");
                CycleReport::default()
            }
        }
    }
}
