use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use loyalty::{
    accrual::AccrualClient,
    config::AppConfig,
    db::Db,
    ledger::SqlxLedger,
    logger::{component_span, init_tracing},
    metrics::Counters,
    pipeline::{FetchStage, Pipeline, Reconciler},
    scheduler::{Scheduler, spawn_scheduler},
};

/// Connects, then either rebuilds or migrates the schema.
async fn init_ledger(cfg: &AppConfig) -> anyhow::Result<Arc<SqlxLedger>> {
    let db = Db::connect(&cfg.database_uri, cfg.db_max_connections).await?;

    if cfg.reload_tables {
        tracing::warn!("reload requested; dropping and recreating all tables");
        db.reset().await?;
    } else {
        db.migrate().await?;
    }

    Ok(Arc::new(SqlxLedger::new(db.pool.clone())))
}

fn build_scheduler(
    cfg: &AppConfig,
    ledger: Arc<SqlxLedger>,
    counters: Counters,
) -> anyhow::Result<Scheduler<AccrualClient, SqlxLedger>> {
    let client = Arc::new(AccrualClient::new(
        cfg.accrual_base_url()?,
        cfg.request_timeout(),
    )?);

    let fetch = FetchStage::new(client.clone(), cfg.workers, component_span("fetch"));
    tracing::info!(
        accrual = client.base_url(),
        workers = fetch.workers(),
        "fetch stage configured"
    );

    let pipeline = Pipeline::new(
        fetch,
        Reconciler::new(ledger.clone(), counters.clone(), component_span("reconciler")),
    );

    Ok(Scheduler::new(
        ledger,
        pipeline,
        cfg.poll_interval(),
        counters,
        component_span("scheduler"),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::parse();
    cfg.validate()?;

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    let _guard = init_tracing(is_production);

    tracing::info!(
        poll_interval_ms = cfg.poll_interval_ms,
        "starting loyalty reconciler"
    );

    let ledger = init_ledger(&cfg).await?;
    let counters = Counters::default();
    let scheduler = build_scheduler(&cfg, ledger, counters.clone())?;

    let shutdown = CancellationToken::new();
    let handle = spawn_scheduler(scheduler, shutdown.clone());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");

    shutdown.cancel();
    if let Err(e) = handle.await {
        tracing::error!(error = %e, "scheduler task ended abnormally");
    }

    tracing::info!(
        cycles = Counters::get(&counters.cycles),
        verdicts_applied = Counters::get(&counters.verdicts_applied),
        apply_errors = Counters::get(&counters.apply_errors),
        "reconciler stopped"
    );

    Ok(())
}
