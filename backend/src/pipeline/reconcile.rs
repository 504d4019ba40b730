use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{Instrument, Span, debug, error, info};

use crate::accrual::Verdict;
use crate::ledger::{ApplyOutcome, OrderLedger};
use crate::logger::warn_if_slow;
use crate::metrics::Counters;
use crate::pipeline::types::{CycleReport, ReconciliationResult};

const SLOW_APPLY: Duration = Duration::from_millis(250);

/// Applies verdicts to the ledger, one transaction per order.
///
/// A failed write is logged and counted, never propagated: the order stays
/// pending in storage and is picked up again next cycle, while the rest of
/// the batch carries on. The Reconciler ignores cancellation and drains its
/// input until it closes, so anything that reached it gets persisted.
pub struct Reconciler<L: OrderLedger> {
    ledger: Arc<L>,
    counters: Counters,
    span: Span,
}

impl<L: OrderLedger> Reconciler<L> {
    pub fn new(ledger: Arc<L>, counters: Counters, span: Span) -> Self {
        Self {
            ledger,
            counters,
            span,
        }
    }

    pub async fn run(&self, rx: mpsc::Receiver<ReconciliationResult>) -> CycleReport {
        let span = self.span.clone();
        self.drain(rx).instrument(span).await
    }

    async fn drain(&self, mut rx: mpsc::Receiver<ReconciliationResult>) -> CycleReport {
        let mut report = CycleReport::default();

        while let Some(result) = rx.recv().await {
            report.polled += 1;
            Counters::incr(&self.counters.orders_polled);
            self.handle(result, &mut report).await;
        }

        info!(
            polled = report.polled,
            applied = report.applied,
            unchanged = report.unchanged,
            deferred = report.deferred,
            failed = report.failed,
            apply_errors = report.apply_errors,
            "reconciliation finished"
        );
        report
    }

    async fn handle(&self, result: ReconciliationResult, report: &mut CycleReport) {
        let ReconciliationResult { order, verdict } = result;

        let (status, accrual) = match verdict {
            Verdict::Resolved { status, accrual } => (status, accrual),
            Verdict::Deferred => {
                report.deferred += 1;
                Counters::incr(&self.counters.verdicts_deferred);
                debug!(%order, "verdict deferred");
                return;
            }
            Verdict::Failed(reason) => {
                report.failed += 1;
                Counters::incr(&self.counters.verdicts_failed);
                debug!(%order, %reason, "no verdict this cycle");
                return;
            }
        };

        let applied = warn_if_slow(
            "apply_order_verdict",
            SLOW_APPLY,
            self.ledger.apply_order_verdict(&order, status, accrual),
        )
        .await;

        match applied {
            Ok(ApplyOutcome::Applied) => {
                report.applied += 1;
                Counters::incr(&self.counters.verdicts_applied);
                info!(%order, %status, %accrual, "order updated");
            }
            Ok(ApplyOutcome::Unchanged) => {
                report.unchanged += 1;
                Counters::incr(&self.counters.verdicts_unchanged);
                debug!(%order, %status, "verdict left order unchanged");
            }
            Err(e) => {
                report.apply_errors += 1;
                Counters::incr(&self.counters.apply_errors);
                error!(%order, %status, error = %e, "failed to persist verdict");
            }
        }
    }
}
