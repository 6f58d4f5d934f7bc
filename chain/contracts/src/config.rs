//! Engine and ledger configuration
//!
//! Plain structs with `Default` values. Both can be loaded from JSON; missing
//! fields fall back to their defaults.

use custody_types::account::DEFAULT_RESERVE;
use custody_types::fee::FeeSchedule;
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};

/// Lottery phase windows, in rounds after contract creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LotteryWindows {
    /// Player 1 may join until `created + join_window`.
    pub join_window: u64,
    /// Player 0 may reveal until `created + reveal_window`.
    pub reveal_window: u64,
    /// Extra rounds player 1 gets after player 0's reveal deadline.
    pub reveal_extension: u64,
}

impl Default for LotteryWindows {
    fn default() -> Self {
        Self {
            join_window: 1_000,
            reveal_window: 2_000,
            reveal_extension: 10,
        }
    }
}

/// Configuration for the contract engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub lottery: LotteryWindows,
    /// Smallest deposit an HTLC accepts on top of the reserve.
    pub htlc_min_deposit: Amount,
    /// Maximum number of contracts on the call stack (top-level included).
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lottery: LotteryWindows::default(),
            htlc_min_deposit: Amount::new(1_000_000),
            max_call_depth: 4,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Configuration for the in-memory ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Minimum balance every open account must keep.
    pub reserve: Amount,
    /// Fee per transaction; application calls pool the fees of their inner
    /// transactions.
    pub base_fee: Amount,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            reserve: DEFAULT_RESERVE,
            base_fee: FeeSchedule::DEFAULT_BASE_FEE,
        }
    }
}

impl LedgerConfig {
    /// Zero-fee ledger, handy when exact balances matter.
    pub fn without_fees() -> Self {
        Self {
            base_fee: Amount::ZERO,
            ..Self::default()
        }
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.base_fee)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.lottery.join_window, 1_000);
        assert_eq!(config.lottery.reveal_window, 2_000);
        assert_eq!(config.lottery.reveal_extension, 10);
        assert_eq!(config.htlc_min_deposit, Amount::new(1_000_000));
    }

    #[test]
    fn test_engine_partial_json() {
        let config = EngineConfig::from_json(r#"{"lottery": {"join_window": 5}}"#).unwrap();
        assert_eq!(config.lottery.join_window, 5);
        assert_eq!(config.lottery.reveal_window, 2_000);
        assert_eq!(config.max_call_depth, 4);
    }

    #[test]
    fn test_ledger_json() {
        let config = LedgerConfig::from_json(r#"{"base_fee": 0}"#).unwrap();
        assert_eq!(config, LedgerConfig::without_fees());
        assert_eq!(config.reserve, Amount::new(100_000));
    }

    #[test]
    fn test_bad_json_rejected() {
        assert!(EngineConfig::from_json("{\"max_call_depth\": -1}").is_err());
    }
}
