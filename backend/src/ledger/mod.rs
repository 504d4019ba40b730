pub mod repository;
pub mod repository_sqlx;

pub use repository::{ApplyOutcome, OrderLedger};
pub use repository_sqlx::{OrderSubmission, SqlxLedger};
