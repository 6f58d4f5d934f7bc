//! Integer amount and round types
//!
//! Ledger values are whole base units held in a `u64`. All arithmetic is
//! checked; overflow surfaces as `None` and callers map it to an error.
//! `rust_decimal` is only used for reporting in whole units.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of decimal places between a base unit and a whole unit
pub const BASE_UNIT_DECIMALS: u32 = 6;

/// Value in base units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Amount = Amount(0);
    pub const MAX: Amount = Amount(u64::MAX);

    pub const fn new(units: u64) -> Self {
        Self(units)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Amount> {
        self.0.checked_mul(factor).map(Amount)
    }

    pub fn saturating_sub(self, other: Amount) -> Amount {
        Amount(self.0.saturating_sub(other.0))
    }

    /// Express the amount in whole units (base units / 10^decimals)
    pub fn to_units(&self, decimals: u32) -> Decimal {
        Decimal::from_i128_with_scale(self.0 as i128, decimals)
    }
}

impl From<u64> for Amount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::iter::Sum for Amount {
    /// Saturating sum. Sub-balance totals never approach `u64::MAX`.
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Self {
        iter.fold(Amount::ZERO, |acc, a| Amount(acc.0.saturating_add(a.0)))
    }
}

/// Logical ledger round
///
/// Monotonic counter supplied by the ledger. Deadlines are expressed in
/// rounds and compared against the value read during the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Round(u64);

impl Round {
    pub const GENESIS: Round = Round(0);

    pub const fn new(round: u64) -> Self {
        Self(round)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    pub fn checked_add(self, rounds: u64) -> Option<Round> {
        self.0.checked_add(rounds).map(Round)
    }

    pub fn saturating_add(self, rounds: u64) -> Round {
        Round(self.0.saturating_add(rounds))
    }

    /// Rounds elapsed since `earlier`, zero if `earlier` is in the future
    pub fn since(&self, earlier: Round) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for Round {
    fn from(round: u64) -> Self {
        Self(round)
    }
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
