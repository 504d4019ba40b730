use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, Span, debug, warn};

use crate::pipeline::types::ReconciliationResult;

const MERGED_CAPACITY: usize = 64;

/// Collect Stage: merges the per-worker streams into one, in arrival order.
///
/// One forwarder per stream runs in a `JoinSet`. The merged sender is held by
/// a supervisor task and dropped only after every forwarder has finished, so
/// the returned receiver closes exactly when all upstream work is done or
/// abandoned. No count of expected results is involved.
pub fn collect(
    streams: Vec<mpsc::Receiver<ReconciliationResult>>,
    cancel: CancellationToken,
) -> mpsc::Receiver<ReconciliationResult> {
    let (merged_tx, merged_rx) = mpsc::channel(MERGED_CAPACITY);
    if streams.is_empty() {
        return merged_rx;
    }

    let span = Span::current();
    let mut forwarders = JoinSet::new();
    for (stream_id, rx) in streams.into_iter().enumerate() {
        forwarders.spawn(
            forward(stream_id, rx, merged_tx.clone(), cancel.clone()).instrument(span.clone()),
        );
    }

    tokio::spawn(
        async move {
            while let Some(joined) = forwarders.join_next().await {
                if let Err(e) = joined {
                    warn!(error = %e, "collect forwarder ended abnormally");
                }
            }
            drop(merged_tx);
            debug!("collect stage drained");
        }
        .instrument(span),
    );

    merged_rx
}

async fn forward(
    stream_id: usize,
    mut rx: mpsc::Receiver<ReconciliationResult>,
    tx: mpsc::Sender<ReconciliationResult>,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => next,
        };
        let Some(result) = next else { break };

        if tx.send(result).await.is_err() {
            debug!(stream_id, "merged stream closed by consumer");
            break;
        }
    }
}
