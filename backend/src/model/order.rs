use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::points::Points;
use crate::model::UserId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderNumberError {
    #[error("order number is empty")]
    Empty,

    #[error("order number must contain only ASCII digits: {0}")]
    NotNumeric(String),

    #[error("order number fails the Luhn checksum: {0}")]
    Checksum(String),
}

/// A purchase reference submitted by a user.
///
/// Always a non-empty digit string that passes the Luhn checksum, so holding
/// one means it was validated at the boundary.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn parse(raw: &str) -> Result<Self, OrderNumberError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(OrderNumberError::Empty);
        }
        if !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(OrderNumberError::NotNumeric(raw.to_string()));
        }
        if !luhn_valid(raw) {
            return Err(OrderNumberError::Checksum(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderNumber {
    type Err = OrderNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl<'de> Deserialize<'de> for OrderNumber {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Luhn mod-10 check over an all-digit string.
fn luhn_valid(digits: &str) -> bool {
    let sum: u32 = digits
        .bytes()
        .rev()
        .enumerate()
        .map(|(i, b)| {
            let d = u32::from(b - b'0');
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    Registered,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    /// Statuses the reconciliation loop keeps polling.
    pub const PENDING: [OrderStatus; 3] = [
        OrderStatus::New,
        OrderStatus::Registered,
        OrderStatus::Processing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    /// Position on the path toward a terminal state.
    pub fn rank(&self) -> u8 {
        match self {
            OrderStatus::New => 0,
            OrderStatus::Registered => 1,
            OrderStatus::Processing => 2,
            OrderStatus::Invalid | OrderStatus::Processed => 3,
        }
    }

    /// Only strictly forward moves out of a non-terminal state are allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }

    /// Stored statuses from which `self` may be written.
    pub fn predecessors(&self) -> Vec<OrderStatus> {
        Self::PENDING
            .into_iter()
            .filter(|s| s.can_transition_to(*self))
            .collect()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(OrderStatus::New),
            "REGISTERED" => Ok(OrderStatus::Registered),
            "PROCESSING" => Ok(OrderStatus::Processing),
            "INVALID" => Ok(OrderStatus::Invalid),
            "PROCESSED" => Ok(OrderStatus::Processed),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Order {
    pub number: OrderNumber,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub accrual: Points,
    pub uploaded_at: DateTime<Utc>,
}
