//! Periodic driver of the reconciliation pipeline.
//!
//! Responsibilities:
//! - List pending orders once per cycle.
//! - Hand the batch to the pipeline and wait for it to finish.
//! - Sleep for the configured period, unless shutdown is requested.
//!
//! Non-responsibilities:
//! - Talking to the accrual service (fetch workers do this).
//! - Writing verdicts (the Reconciler does this).
//!
//! Liveness:
//! - A failed listing skips the cycle; the loop itself never exits on error.
//! - Cycles never overlap: the next one starts `period` after the previous
//!   one finished.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, info, warn};

use crate::accrual::Scorer;
use crate::ledger::OrderLedger;
use crate::logger::{CycleId, annotate_cycle, cycle_span, warn_if_slow};
use crate::metrics::Counters;
use crate::pipeline::{CycleReport, Pipeline};

const SLOW_LISTING: Duration = Duration::from_millis(500);

/// What a single cycle did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Pending orders could not be listed; nothing was attempted.
    Skipped,
    /// Nothing pending.
    Idle,
    Completed(CycleReport),
}

pub struct Scheduler<S: Scorer, L: OrderLedger + 'static> {
    ledger: Arc<L>,
    pipeline: Pipeline<S, L>,
    period: Duration,

    /// Observability counters (does not affect behavior).
    counters: Counters,
    span: Span,
}

impl<S: Scorer, L: OrderLedger + 'static> Scheduler<S, L> {
    pub fn new(
        ledger: Arc<L>,
        pipeline: Pipeline<S, L>,
        period: Duration,
        counters: Counters,
        span: Span,
    ) -> Self {
        Self {
            ledger,
            pipeline,
            period,
            counters,
            span,
        }
    }

    /// Runs exactly one cycle. `cancel` is the token for this cycle's
    /// pipeline; cancelling it cuts the batch short.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        let cycle_id = CycleId::new();
        let span = cycle_span(&cycle_id);
        self.cycle(cancel).instrument(span).await
    }

    async fn cycle(&self, cancel: &CancellationToken) -> CycleOutcome {
        Counters::incr(&self.counters.cycles);

        let listed = warn_if_slow(
            "list_pending_orders",
            SLOW_LISTING,
            self.ledger.list_pending_orders(),
        )
        .await;

        let orders = match listed {
            Ok(orders) => orders,
            Err(e) => {
                Counters::incr(&self.counters.skipped_cycles);
                warn!(error = %e, "could not list pending orders; skipping cycle");
                return CycleOutcome::Skipped;
            }
        };

        annotate_cycle(orders.len());
        if orders.is_empty() {
            Counters::incr(&self.counters.idle_cycles);
            debug!("no pending orders");
            return CycleOutcome::Idle;
        }

        let report = self.pipeline.run_batch(orders, cancel.clone()).await;
        CycleOutcome::Completed(report)
    }

    /// Runs cycles until `cancel` fires. Each cycle gets a child token so a
    /// shutdown also aborts the batch in flight.
    pub async fn run(&self, cancel: CancellationToken) {
        let span = self.span.clone();
        async {
            info!(period_ms = self.period.as_millis() as u64, "scheduler started");

            while !cancel.is_cancelled() {
                let cycle_cancel = cancel.child_token();
                self.run_cycle(&cycle_cancel).await;

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.period) => {}
                }
            }

            info!("scheduler stopped");
        }
        .instrument(span)
        .await
    }
}

/// Spawns the scheduler loop. The returned handle completes after `cancel`
/// fires and the current cycle has unwound.
pub fn spawn_scheduler<S, L>(scheduler: Scheduler<S, L>, cancel: CancellationToken) -> JoinHandle<()>
where
    S: Scorer,
    L: OrderLedger + 'static,
{
    tokio::spawn(async move { scheduler.run(cancel).await })
}
