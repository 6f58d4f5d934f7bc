//! Payment action builder (pay-or-close)
//!
//! A contract account must keep its reserve while it is open. A payment that
//! would leave less than the reserve behind is turned into a full close that
//! sweeps the whole balance to the recipient.

use custody_types::ids::Identity;
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::EngineError;

/// How a payment leaves the paying account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    /// Exactly `amount` moves; the account stays open
    Partial,
    /// The whole balance moves; the account is closed
    Close,
}

/// Outgoing transfer emitted by a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAction {
    pub from: Identity,
    pub to: Identity,
    pub amount: Amount,
    pub kind: TransferKind,
}

/// Decide how `amount` leaves an account holding `balance`.
///
/// Returns `None` for a zero amount. A close carries the full balance.
pub fn plan_transfer(balance: Amount, reserve: Amount, amount: Amount) -> Option<(TransferKind, Amount)> {
    if amount.is_zero() {
        return None;
    }
    let remaining = balance.saturating_sub(amount);
    if remaining < reserve {
        Some((TransferKind::Close, balance))
    } else {
        Some((TransferKind::Partial, amount))
    }
}

/// Payments out of one contract account during a single transition.
///
/// Tracks a running balance so successive payments are each planned against
/// what is actually left.
#[derive(Debug, Clone)]
pub struct Payouts {
    account: Identity,
    balance: Amount,
    reserve: Amount,
    closed: bool,
    actions: Vec<PaymentAction>,
}

impl Payouts {
    pub fn new(account: Identity, balance: Amount, reserve: Amount) -> Self {
        Self {
            account,
            balance,
            reserve,
            closed: false,
            actions: Vec::new(),
        }
    }

    /// Pay `amount` to `to`, closing the account if the reserve would be
    /// breached. Returns the transfer kind, or `None` when nothing moved.
    pub fn pay_or_close(&mut self, to: &Identity, amount: Amount) -> Result<Option<TransferKind>, EngineError> {
        if amount.is_zero() {
            return Ok(None);
        }
        if self.closed || amount > self.balance {
            return Err(EngineError::InsufficientReserve {
                required: amount,
                available: self.balance,
            });
        }
        let Some((kind, moved)) = plan_transfer(self.balance, self.reserve, amount) else {
            return Ok(None);
        };
        self.record(to, moved, kind);
        Ok(Some(kind))
    }

    /// Sweep the whole balance to `to` and close the account.
    pub fn close(&mut self, to: &Identity) -> Result<Amount, EngineError> {
        if self.closed {
            return Err(EngineError::InsufficientReserve {
                required: self.reserve,
                available: Amount::ZERO,
            });
        }
        let swept = self.balance;
        self.record(to, swept, TransferKind::Close);
        Ok(swept)
    }

    fn record(&mut self, to: &Identity, amount: Amount, kind: TransferKind) {
        debug!(from = %self.account, to = %to, amount = amount.value(), ?kind, "payment planned");
        self.balance = self.balance.saturating_sub(amount);
        if kind == TransferKind::Close {
            self.closed = true;
        }
        self.actions.push(PaymentAction {
            from: self.account.clone(),
            to: to.clone(),
            amount,
            kind,
        });
    }

    pub fn account(&self) -> &Identity {
        &self.account
    }

    /// Balance left after the payments planned so far
    pub fn balance(&self) -> Amount {
        self.balance
    }

    pub fn reserve(&self) -> Amount {
        self.reserve
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn actions(&self) -> &[PaymentAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<PaymentAction> {
        self.actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESERVE: Amount = Amount::new(100_000);

    fn payouts(balance: u64) -> Payouts {
        Payouts::new(Identity::user("contract"), Amount::new(balance), RESERVE)
    }

    #[test]
    fn test_plan_zero_amount() {
        assert_eq!(plan_transfer(Amount::new(500_000), RESERVE, Amount::ZERO), None);
    }

    #[test]
    fn test_plan_partial_keeps_reserve() {
        assert_eq!(
            plan_transfer(Amount::new(500_000), RESERVE, Amount::new(400_000)),
            Some((TransferKind::Partial, Amount::new(400_000)))
        );
    }

    #[test]
    fn test_plan_close_below_reserve() {
        assert_eq!(
            plan_transfer(Amount::new(500_000), RESERVE, Amount::new(400_001)),
            Some((TransferKind::Close, Amount::new(500_000)))
        );
    }

    #[test]
    fn test_running_balance_turns_second_payment_into_close() {
        let mut p = payouts(300_000);
        let bob = Identity::user("bob");
        assert_eq!(p.pay_or_close(&bob, Amount::new(150_000)).unwrap(), Some(TransferKind::Partial));
        assert_eq!(p.balance(), Amount::new(150_000));
        assert_eq!(p.pay_or_close(&bob, Amount::new(100_000)).unwrap(), Some(TransferKind::Close));
        assert!(p.is_closed());
        assert_eq!(p.actions()[1].amount, Amount::new(150_000));
    }

    #[test]
    fn test_payment_after_close_fails() {
        let mut p = payouts(300_000);
        let bob = Identity::user("bob");
        assert_eq!(p.close(&bob).unwrap(), Amount::new(300_000));
        assert!(matches!(
            p.pay_or_close(&bob, Amount::new(1)),
            Err(EngineError::InsufficientReserve { .. })
        ));
        assert!(p.close(&bob).is_err());
        // Zero payments remain no-ops
        assert_eq!(p.pay_or_close(&bob, Amount::ZERO).unwrap(), None);
    }

    #[test]
    fn test_overdraw_rejected() {
        let mut p = payouts(200_000);
        assert!(p.pay_or_close(&Identity::user("bob"), Amount::new(200_001)).is_err());
        assert!(p.actions().is_empty());
    }
}
