use serde::Deserialize;

use crate::model::{OrderNumber, OrderStatus, Points};

/// Outcome of asking the accrual service about one order.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    /// A definitive status. `accrual` is zero unless `status` is PROCESSED.
    Resolved { status: OrderStatus, accrual: Points },
    /// Rate limited or transiently unavailable; ask again next cycle.
    Deferred,
    /// Transport error, timeout or unusable body; ask again next cycle.
    Failed(String),
}

impl Verdict {
    pub fn invalid() -> Self {
        Verdict::Resolved {
            status: OrderStatus::Invalid,
            accrual: Points::ZERO,
        }
    }
}

/// Status vocabulary of the accrual service. It never reports NEW.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccrualStatus {
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl From<AccrualStatus> for OrderStatus {
    fn from(s: AccrualStatus) -> Self {
        match s {
            AccrualStatus::Registered => OrderStatus::Registered,
            AccrualStatus::Processing => OrderStatus::Processing,
            AccrualStatus::Invalid => OrderStatus::Invalid,
            AccrualStatus::Processed => OrderStatus::Processed,
        }
    }
}

/// Body of `200 OK` from `GET /api/orders/{number}`.
#[derive(Debug, Deserialize)]
pub struct AccrualResponse {
    /// Sent as a string by some deployments and as a number by others.
    pub order: serde_json::Value,
    pub status: AccrualStatus,
    #[serde(default)]
    pub accrual: Option<f64>,
}

impl AccrualResponse {
    pub fn refers_to(&self, order: &OrderNumber) -> bool {
        match &self.order {
            serde_json::Value::String(s) => s == order.as_str(),
            serde_json::Value::Number(n) => n.to_string() == order.as_str(),
            _ => false,
        }
    }
}
