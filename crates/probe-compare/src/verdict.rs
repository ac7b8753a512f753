//! Threshold rule.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    /// `Pass` iff `coverage_pct >= threshold_pct`. Ties pass.
    pub fn from_coverage(coverage_pct: Decimal, threshold_pct: Decimal) -> Self {
        if coverage_pct >= threshold_pct {
            Self::Pass
        } else {
            Self::Fail
        }
    }

    pub fn is_pass(&self) -> bool {
        *self == Self::Pass
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// `numerator / denominator * 100` in exact decimal arithmetic.
///
/// An empty denominator is a vacuous 100%.
pub fn percentage(numerator: usize, denominator: usize) -> Decimal {
    if denominator == 0 {
        return Decimal::ONE_HUNDRED;
    }
    Decimal::from(numerator) * Decimal::ONE_HUNDRED / Decimal::from(denominator)
}
