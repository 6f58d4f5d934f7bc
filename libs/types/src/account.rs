//! Ledger account model
//!
//! Accounts are owned by the ledger. Contract logic only reads balances and
//! reserves through [`AccountModel`]; balances change when the ledger
//! settles payments.

use crate::errors::LedgerError;
use crate::ids::Identity;
use crate::numeric::Amount;
use serde::{Deserialize, Serialize};

/// Minimum balance a contract account must retain unless it is closed
pub const DEFAULT_RESERVE: Amount = Amount::new(100_000);

/// Read-only view of ledger accounts
pub trait AccountModel {
    /// Current balance of an account. Unknown accounts hold zero.
    fn account_balance(&self, id: &Identity) -> Amount;

    /// Minimum balance the account must keep while open
    fn reserve_of(&self, id: &Identity) -> Amount;
}

/// Single ledger account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: Identity,
    pub balance: Amount,
}

impl Account {
    pub fn new(address: Identity) -> Self {
        Self {
            address,
            balance: Amount::ZERO,
        }
    }

    pub fn with_balance(address: Identity, balance: Amount) -> Self {
        Self { address, balance }
    }

    /// Credit the account
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        Ok(())
    }

    /// Debit the account, failing when the balance cannot cover it
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: self.address.clone(),
                required: amount,
                available: self.balance,
            })?;
        Ok(())
    }

    /// Balance above the reserve, zero if the account sits below it
    pub fn spendable(&self, reserve: Amount) -> Amount {
        self.balance.saturating_sub(reserve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credit_and_debit() {
        let mut account = Account::new(Identity::user("alice"));
        account.credit(Amount::new(500)).unwrap();
        account.debit(Amount::new(200)).unwrap();
        assert_eq!(account.balance, Amount::new(300));
    }

    #[test]
    fn test_debit_insufficient() {
        let mut account = Account::with_balance(Identity::user("alice"), Amount::new(50));
        let err = account.debit(Amount::new(51)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
        assert_eq!(account.balance, Amount::new(50));
    }

    #[test]
    fn test_credit_overflow() {
        let mut account = Account::with_balance(Identity::user("alice"), Amount::MAX);
        assert_eq!(account.credit(Amount::new(1)), Err(LedgerError::Overflow));
    }

    #[test]
    fn test_spendable_above_reserve() {
        let account = Account::with_balance(Identity::user("app"), Amount::new(150_000));
        assert_eq!(account.spendable(DEFAULT_RESERVE), Amount::new(50_000));
        let poor = Account::with_balance(Identity::user("app"), Amount::new(10));
        assert_eq!(poor.spendable(DEFAULT_RESERVE), Amount::ZERO);
    }
}
