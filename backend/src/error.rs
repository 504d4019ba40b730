use thiserror::Error;

use crate::model::{OrderNumber, UserId};

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("login is already taken: {0}")]
    LoginTaken(String),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("order {0} was uploaded by another user")]
    OrderOwnedByAnotherUser(OrderNumber),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("corrupt row: {0}")]
    CorruptRow(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid network address: {0}")]
    InvalidAddress(String),

    #[error("worker pool size must be at least 1")]
    ZeroWorkers,

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,

    #[error("request timeout must be greater than zero")]
    ZeroRequestTimeout,
}
