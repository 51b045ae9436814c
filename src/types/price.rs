use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Price(i64);  // Fixed-point with 2 decimal places

impl Price {
    const MULTIPLIER: i64 = 100;  // 10^2

    pub fn from_cents(value: i64) -> Self {
        Price(value)
    }

    pub fn to_cents(&self) -> i64 {
        self.0
    }

    pub fn from_f64(value: f64) -> Self {
        Price((value * Self::MULTIPLIER as f64).round() as i64)
    }

    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / Self::MULTIPLIER as f64
    }

    pub fn zero() -> Self {
        Price(0)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Add for Price {
    type Output = Price;
    fn add(self, other: Price) -> Price {
        Price(self.0 + other.0)
    }
}

impl Sub for Price {
    type Output = Price;
    fn sub(self, other: Price) -> Price {
        Price(self.0 - other.0)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / Self::MULTIPLIER, (self.0 % Self::MULTIPLIER).abs())
    }
}
