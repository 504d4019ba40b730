//! Fetch Stage: asks the accrual service about every order in a batch.
//!
//! The batch is loaded into a work queue shared by a fixed pool of
//! workers, so at most `workers` requests are ever outstanding no matter how
//! large the backlog grows. Each worker owns its own output channel; the
//! Collect Stage merges them.
//!
//! Every suspension point of a worker races the cycle's cancellation token.
//! Once the token fires, no worker starts another call and in-flight calls
//! are abandoned.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug};

use crate::accrual::{Scorer, Verdict};
use crate::model::OrderNumber;
use crate::pipeline::types::ReconciliationResult;

/// Per-worker output buffer. Small on purpose: a slow Reconciler should hold
/// workers back rather than let results pile up in memory.
const WORKER_OUTPUT_CAPACITY: usize = 16;

type WorkQueue = Arc<Mutex<VecDeque<OrderNumber>>>;

pub struct FetchStage<S: Scorer> {
    scorer: Arc<S>,
    workers: usize,
    span: Span,
}

impl<S: Scorer> FetchStage<S> {
    pub fn new(scorer: Arc<S>, workers: usize, span: Span) -> Self {
        Self {
            scorer,
            workers: workers.max(1),
            span,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Starts `min(workers, orders.len())` workers and returns their output
    /// streams. An empty batch starts nothing and returns no streams.
    pub fn spawn(
        &self,
        orders: Vec<OrderNumber>,
        cancel: CancellationToken,
    ) -> Vec<mpsc::Receiver<ReconciliationResult>> {
        if orders.is_empty() {
            return Vec::new();
        }

        let pool = self.workers.min(orders.len());
        let queue: WorkQueue = Arc::new(Mutex::new(orders.into()));

        debug!(parent: &self.span, workers = pool, "fetch stage starting");

        (0..pool)
            .map(|worker_id| {
                let (tx, rx) = mpsc::channel(WORKER_OUTPUT_CAPACITY);
                let worker = FetchWorker {
                    worker_id,
                    scorer: self.scorer.clone(),
                    queue: queue.clone(),
                    out: tx,
                    cancel: cancel.clone(),
                };
                tokio::spawn(worker.run().instrument(self.span.clone()));
                rx
            })
            .collect()
    }
}

struct FetchWorker<S: Scorer> {
    worker_id: usize,
    scorer: Arc<S>,
    queue: WorkQueue,
    out: mpsc::Sender<ReconciliationResult>,
    cancel: CancellationToken,
}

impl<S: Scorer> FetchWorker<S> {
    async fn run(self) {
        let mut handled = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                next = next_order(&self.queue) => next,
            };
            let Some(order) = next else { break };

            let verdict = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                v = self.scorer.score(&order) => v,
            };

            if let Verdict::Failed(reason) = &verdict {
                debug!(worker = self.worker_id, %order, %reason, "accrual call failed");
            }

            let result = ReconciliationResult { order, verdict };
            let sent = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                sent = self.out.send(result) => sent,
            };
            if sent.is_err() {
                // Downstream hung up; nobody will read further results.
                break;
            }
            handled += 1;
        }

        debug!(
            worker = self.worker_id,
            handled,
            cancelled = self.cancel.is_cancelled(),
            "fetch worker finished"
        );
    }
}

/// `None` once the batch is exhausted.
async fn next_order(queue: &WorkQueue) -> Option<OrderNumber> {
    queue.lock().await.pop_front()
}
