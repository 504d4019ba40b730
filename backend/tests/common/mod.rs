#![allow(dead_code)]

pub mod fake_accrual;

use std::path::PathBuf;

use loyalty::db::Db;
use loyalty::ledger::SqlxLedger;
use loyalty::model::{OrderNumber, UserId};
use uuid::Uuid;

/// Fresh, migrated in-memory SQLite database. The unique name keeps parallel
/// tests apart while shared cache lets every pooled connection see it.
pub async fn setup_db(max_connections: u32) -> Db {
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", Uuid::new_v4());
    let db = Db::connect(&conn_str, max_connections).await.unwrap();
    db.migrate().await.unwrap();
    db
}

/// File-backed SQLite database in the temp dir, so several pooled connections
/// really contend for the write lock. Call `remove_db_files` when done.
pub async fn setup_file_db(max_connections: u32) -> (Db, PathBuf) {
    let path = std::env::temp_dir().join(format!("loyalty-{}.db", Uuid::new_v4()));
    let conn_str = format!("sqlite://{}?mode=rwc", path.display());
    let db = Db::connect(&conn_str, max_connections).await.unwrap();
    db.migrate().await.unwrap();
    (db, path)
}

pub async fn remove_db_files(db: Db, path: PathBuf) {
    db.pool.close().await;
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

pub async fn setup_ledger() -> (Db, SqlxLedger) {
    let db = setup_db(5).await;
    let ledger = SqlxLedger::new(db.pool.clone());
    (db, ledger)
}

pub fn num(s: &str) -> OrderNumber {
    OrderNumber::parse(s).unwrap()
}

/// `count` distinct Luhn-valid order numbers: each prefix gets the check digit
/// that makes it valid.
pub fn order_numbers(count: usize) -> Vec<OrderNumber> {
    (1000..1000 + count as u64)
        .map(|prefix| {
            (0..10)
                .find_map(|d| OrderNumber::parse(&format!("{prefix}{d}")).ok())
                .unwrap()
        })
        .collect()
}

pub async fn user_with_orders(ledger: &SqlxLedger, login: &str, orders: &[OrderNumber]) -> UserId {
    let user = ledger.register_user(login, "hash").await.unwrap();
    for o in orders {
        ledger.submit_order(&user, o).await.unwrap();
    }
    user
}
