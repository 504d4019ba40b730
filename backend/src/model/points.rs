use std::fmt;
use std::ops::{Add, Sub};

use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PointsError {
    #[error("points amount must be finite: {0}")]
    NotFinite(f64),

    #[error("points amount must not be negative: {0}")]
    Negative(f64),

    #[error("points amount out of range: {0}")]
    OutOfRange(f64),
}

/// Loyalty points, held as hundredths so credits and debits stay exact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Points(i64);

impl Points {
    pub const ZERO: Points = Points(0);

    pub fn from_hundredths(v: i64) -> Self {
        Self(v)
    }

    pub fn hundredths(&self) -> i64 {
        self.0
    }

    /// Converts a decimal amount as sent on the wire, rounding to two places.
    pub fn from_f64(v: f64) -> Result<Self, PointsError> {
        if !v.is_finite() {
            return Err(PointsError::NotFinite(v));
        }
        if v < 0.0 {
            return Err(PointsError::Negative(v));
        }
        let scaled = (v * 100.0).round();
        if scaled >= i64::MAX as f64 {
            return Err(PointsError::OutOfRange(v));
        }
        Ok(Self(scaled as i64))
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl Add for Points {
    type Output = Points;

    fn add(self, rhs: Self) -> Self::Output {
        Points(self.0 + rhs.0)
    }
}

impl Sub for Points {
    type Output = Points;

    fn sub(self, rhs: Self) -> Self::Output {
        Points(self.0 - rhs.0)
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Points {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}
