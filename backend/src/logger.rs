use std::io::Write;
use std::time::Duration;

use tracing::{Span, field};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

/// Correlates every log line emitted during one reconciliation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleId(Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Keeps the subscriber's output flushed on shutdown. Hold it for the life of
/// the process.
#[must_use = "dropping the guard flushes and ends the logging lifecycle"]
pub struct TracingGuard {
    _private: (),
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        tracing::info!("logger shutting down");
        let _ = std::io::stdout().flush();
    }
}

pub fn init_tracing(json: bool) -> TracingGuard {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let base = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        // Includes timing when the span closes
        .with_span_events(fmt::format::FmtSpan::CLOSE);

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(base.pretty())
            .init();
    }

    TracingGuard { _private: () }
}

/// Span handed to a long-lived component at construction. Everything the
/// component logs is nested under it.
pub fn component_span(name: &'static str) -> Span {
    tracing::info_span!("component", name = %name)
}

pub fn cycle_span(cycle_id: &CycleId) -> Span {
    tracing::info_span!(
        "cycle",
        cycle_id = %cycle_id,
        pending = field::Empty
    )
}

/// Records the batch size on the current cycle span once it is known.
pub fn annotate_cycle(pending: usize) {
    Span::current().record("pending", pending);
}

pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = tokio::time::Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
