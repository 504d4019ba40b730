use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::{AnyPool, Row};
use tracing::{debug, info, instrument, warn};

use crate::error::LedgerError;
use crate::ledger::repository::{ApplyOutcome, OrderLedger};
use crate::model::{Balance, Order, OrderNumber, OrderStatus, Points, UserId, Withdrawal};

/// Result of a user submitting an order number for accrual.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderSubmission {
    Accepted,
    AlreadySubmitted,
}

/// SQLx-backed ledger over `AnyPool`.
///
/// Queries stick to `$n` placeholders and portable DDL so the same code runs
/// on SQLite and Postgres. Every multi-statement write is one transaction.
#[derive(Clone)]
pub struct SqlxLedger {
    pool: AnyPool,
}

impl SqlxLedger {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Creates a user together with a zeroed balance row.
    /// `password_hash` is stored as given; hashing happens upstream.
    #[instrument(skip_all, target = "ledger", fields(login = %login))]
    pub async fn register_user(
        &self,
        login: &str,
        password_hash: &str,
    ) -> Result<UserId, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query("SELECT user_id FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            tx.rollback().await?;
            return Err(LedgerError::LoginTaken(login.to_string()));
        }

        let user_id = UserId::new();
        sqlx::query(
            "INSERT INTO users (user_id, login, password_hash, created_at_ms) VALUES ($1, $2, $3, $4)",
        )
        .bind(user_id.to_string())
        .bind(login)
        .bind(password_hash)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, login))?;

        sqlx::query("INSERT INTO balances (user_id, current, withdrawn) VALUES ($1, 0, 0)")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(%user_id, "user registered");
        Ok(user_id)
    }

    pub async fn user_credentials(
        &self,
        login: &str,
    ) -> Result<Option<(UserId, String)>, LedgerError> {
        let row = sqlx::query("SELECT user_id, password_hash FROM users WHERE login = $1")
            .bind(login)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => {
                let user_id = parse_user_id(&r.try_get::<String, _>("user_id")?)?;
                Ok(Some((user_id, r.try_get("password_hash")?)))
            }
            None => Ok(None),
        }
    }

    /// Registers `order` as NEW for `user`. Resubmission by the owner is not
    /// an error; submission of another user's order is.
    #[instrument(skip_all, target = "ledger", fields(order = %order, user_id = %user))]
    pub async fn submit_order(
        &self,
        user: &UserId,
        order: &OrderNumber,
    ) -> Result<OrderSubmission, LedgerError> {
        let mut tx = self.pool.begin().await?;

        let owner = sqlx::query("SELECT user_id FROM orders WHERE number = $1")
            .bind(order.as_str())
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(r) = owner {
            let owner = parse_user_id(&r.try_get::<String, _>("user_id")?)?;
            tx.rollback().await?;
            return if owner == *user {
                Ok(OrderSubmission::AlreadySubmitted)
            } else {
                Err(LedgerError::OrderOwnedByAnotherUser(order.clone()))
            };
        }

        let known_user = sqlx::query("SELECT user_id FROM users WHERE user_id = $1")
            .bind(user.to_string())
            .fetch_optional(&mut *tx)
            .await?;
        if known_user.is_none() {
            tx.rollback().await?;
            return Err(LedgerError::UserNotFound(*user));
        }

        sqlx::query(
            "INSERT INTO orders (number, user_id, status, accrual, uploaded_at_ms) VALUES ($1, $2, $3, 0, $4)",
        )
        .bind(order.as_str())
        .bind(user.to_string())
        .bind(OrderStatus::New.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("order accepted");
        Ok(OrderSubmission::Accepted)
    }

    pub async fn order(&self, order: &OrderNumber) -> Result<Option<Order>, LedgerError> {
        let row = sqlx::query(
            "SELECT number, user_id, status, accrual, uploaded_at_ms FROM orders WHERE number = $1",
        )
        .bind(order.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_order).transpose()
    }

    /// All orders of `user`, newest first.
    pub async fn user_orders(&self, user: &UserId) -> Result<Vec<Order>, LedgerError> {
        let rows = sqlx::query(
            r#"
SELECT number, user_id, status, accrual, uploaded_at_ms
FROM orders
WHERE user_id = $1
ORDER BY uploaded_at_ms DESC, number DESC;
"#,
        )
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_order).collect()
    }

    pub async fn balance(&self, user: &UserId) -> Result<Balance, LedgerError> {
        let row = sqlx::query("SELECT current, withdrawn FROM balances WHERE user_id = $1")
            .bind(user.to_string())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(LedgerError::UserNotFound(*user))?;

        Ok(Balance {
            current: Points::from_hundredths(row.try_get("current")?),
            withdrawn: Points::from_hundredths(row.try_get("withdrawn")?),
        })
    }

    /// Debits `sum` from the user's balance against `order`. The debit and the
    /// withdrawal record commit together; an overdraft writes nothing.
    #[instrument(skip_all, target = "ledger", fields(order = %order, user_id = %user, sum = %sum))]
    pub async fn withdraw(
        &self,
        user: &UserId,
        order: &OrderNumber,
        sum: Points,
    ) -> Result<(), LedgerError> {
        if sum.hundredths() <= 0 {
            return Err(LedgerError::InvalidAmount(sum.to_string()));
        }

        let mut tx = self.pool.begin().await?;

        let debited = sqlx::query(
            r#"
UPDATE balances
SET current = current - $1, withdrawn = withdrawn + $2
WHERE user_id = $3 AND current >= $4;
"#,
        )
        .bind(sum.hundredths())
        .bind(sum.hundredths())
        .bind(user.to_string())
        .bind(sum.hundredths())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if debited == 0 {
            let exists = sqlx::query("SELECT user_id FROM balances WHERE user_id = $1")
                .bind(user.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            tx.rollback().await?;
            return match exists {
                Some(_) => {
                    debug!("balance is insufficient for withdrawal");
                    Err(LedgerError::InsufficientBalance)
                }
                None => Err(LedgerError::UserNotFound(*user)),
            };
        }

        sqlx::query(
            r#"
INSERT INTO withdrawals (withdrawal_id, user_id, order_number, sum, processed_at_ms)
VALUES ($1, $2, $3, $4, $5);
"#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user.to_string())
        .bind(order.as_str())
        .bind(sum.hundredths())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!("withdrawal recorded");
        Ok(())
    }

    /// All withdrawals of `user`, newest first.
    pub async fn withdrawals(&self, user: &UserId) -> Result<Vec<Withdrawal>, LedgerError> {
        let rows = sqlx::query(
            r#"
SELECT order_number, sum, processed_at_ms
FROM withdrawals
WHERE user_id = $1
ORDER BY processed_at_ms DESC;
"#,
        )
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(Withdrawal {
                    order: parse_order_number(&r.try_get::<String, _>("order_number")?)?,
                    sum: Points::from_hundredths(r.try_get("sum")?),
                    processed_at: millis_to_datetime(r.try_get("processed_at_ms")?)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OrderLedger for SqlxLedger {
    async fn list_pending_orders(&self) -> Result<Vec<OrderNumber>, LedgerError> {
        let rows = sqlx::query(
            r#"
SELECT number
FROM orders
WHERE status IN ($1, $2, $3)
ORDER BY uploaded_at_ms ASC, number ASC;
"#,
        )
        .bind(OrderStatus::New.as_str())
        .bind(OrderStatus::Registered.as_str())
        .bind(OrderStatus::Processing.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let raw: String = r.try_get("number")?;
            match OrderNumber::parse(&raw) {
                Ok(n) => out.push(n),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the listing
                    warn!(error = %e, "skipping malformed order row");
                }
            }
        }

        Ok(out)
    }

    #[instrument(skip_all, target = "ledger", fields(order = %order, status = %status, accrual = %accrual))]
    async fn apply_order_verdict(
        &self,
        order: &OrderNumber,
        status: OrderStatus,
        accrual: Points,
    ) -> Result<ApplyOutcome, LedgerError> {
        if accrual.hundredths() < 0 {
            return Err(LedgerError::InvalidAmount(accrual.to_string()));
        }

        let predecessors = status.predecessors();
        if predecessors.is_empty() {
            return Ok(ApplyOutcome::Unchanged);
        }

        let stored_accrual = if status == OrderStatus::Processed {
            accrual
        } else {
            Points::ZERO
        };

        // The status guard makes the UPDATE the serialization point: of two
        // racing writers only one can match a non-terminal row.
        let in_list = (0..predecessors.len())
            .map(|i| format!("${}", i + 4))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE orders SET status = $1, accrual = $2 WHERE number = $3 AND status IN ({in_list})"
        );

        let mut tx = self.pool.begin().await?;

        let mut query = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(stored_accrual.hundredths())
            .bind(order.as_str());
        for p in &predecessors {
            query = query.bind(p.as_str());
        }
        let updated = query.execute(&mut *tx).await?.rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            debug!("verdict does not advance the order; nothing written");
            return Ok(ApplyOutcome::Unchanged);
        }

        if status == OrderStatus::Processed && !stored_accrual.is_zero() {
            // BIGINT has no room past i64::MAX; SQLite would silently turn
            // the column into REAL instead of failing.
            let headroom = i64::MAX - stored_accrual.hundredths();
            let credited = sqlx::query(
                r#"
UPDATE balances
SET current = current + $1
WHERE user_id = (SELECT user_id FROM orders WHERE number = $2) AND current <= $3;
"#,
            )
            .bind(stored_accrual.hundredths())
            .bind(order.as_str())
            .bind(headroom)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if credited != 1 {
                let owner_balance = sqlx::query(
                    "SELECT current FROM balances WHERE user_id = (SELECT user_id FROM orders WHERE number = $1)",
                )
                .bind(order.as_str())
                .fetch_optional(&mut *tx)
                .await?;

                // Undo the status change too.
                tx.rollback().await?;
                return Err(match owner_balance {
                    Some(_) => LedgerError::InvalidAmount(format!(
                        "crediting {stored_accrual} to the owner of order {order} overflows the balance"
                    )),
                    None => LedgerError::CorruptRow(format!(
                        "no balance row for owner of order {order}"
                    )),
                });
            }
        }

        tx.commit().await?;
        debug!("verdict applied");
        Ok(ApplyOutcome::Applied)
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_order(r: &AnyRow) -> Result<Order, LedgerError> {
    let status_raw: String = r.try_get("status")?;
    Ok(Order {
        number: parse_order_number(&r.try_get::<String, _>("number")?)?,
        user_id: parse_user_id(&r.try_get::<String, _>("user_id")?)?,
        status: status_raw.parse().map_err(LedgerError::CorruptRow)?,
        accrual: Points::from_hundredths(r.try_get("accrual")?),
        uploaded_at: millis_to_datetime(r.try_get("uploaded_at_ms")?)?,
    })
}

fn parse_order_number(raw: &str) -> Result<OrderNumber, LedgerError> {
    OrderNumber::parse(raw).map_err(|e| LedgerError::CorruptRow(e.to_string()))
}

fn parse_user_id(raw: &str) -> Result<UserId, LedgerError> {
    raw.parse()
        .map_err(|_| LedgerError::CorruptRow(format!("invalid user_id: {raw}")))
}

fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| LedgerError::CorruptRow(format!("timestamp out of range: {ms}")))
}

fn map_unique_violation(e: sqlx::Error, login: &str) -> LedgerError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            LedgerError::LoginTaken(login.to_string())
        }
        _ => LedgerError::Database(e),
    }
}
