pub mod accrual;
pub mod config;
pub mod db;
pub mod ledger;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod scheduler;

pub mod error;
pub mod logger;
