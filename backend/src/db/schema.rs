use anyhow::Context;
use sqlx::AnyPool;
use tracing::info;

/// Drop order matters only for readability; there are no FK constraints.
const TABLES: [&str; 4] = ["withdrawals", "balances", "orders", "users"];

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Users
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS users (
  user_id TEXT PRIMARY KEY,
  login TEXT NOT NULL UNIQUE,
  password_hash TEXT NOT NULL,
  created_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await
    .context("create users")?;

    // Orders
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS orders (
  number TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  status TEXT NOT NULL,
  accrual BIGINT NOT NULL DEFAULT 0,
  uploaded_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await
    .context("create orders")?;

    // Balances (amounts in hundredths of a point)
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS balances (
  user_id TEXT PRIMARY KEY,
  current BIGINT NOT NULL DEFAULT 0,
  withdrawn BIGINT NOT NULL DEFAULT 0
);
"#,
    )
    .execute(pool)
    .await
    .context("create balances")?;

    // Withdrawals
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS withdrawals (
  withdrawal_id TEXT PRIMARY KEY,
  user_id TEXT NOT NULL,
  order_number TEXT NOT NULL,
  sum BIGINT NOT NULL,
  processed_at_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await
    .context("create withdrawals")?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_orders_user ON orders(user_id);"#)
        .execute(pool)
        .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_withdrawals_user ON withdrawals(user_id);"#)
        .execute(pool)
        .await?;

    info!("schema is up to date");
    Ok(())
}

pub async fn drop_all(pool: &AnyPool) -> anyhow::Result<()> {
    for table in TABLES {
        sqlx::query(&format!("DROP TABLE IF EXISTS {table};"))
            .execute(pool)
            .await
            .with_context(|| format!("drop {table}"))?;
        info!(table, "table dropped");
    }
    Ok(())
}
