//! Vault — time-delayed withdrawals with a recovery key
//!
//! Implements the custody flow:
//! - Anyone may deposit float
//! - The owner requests a withdrawal to a receiver
//! - After `wait_time` rounds the owner finalizes it
//! - The recovery identity may cancel a pending request at any time
//!
//! `Idle → withdraw → Req → finalize | cancel → Idle`. A finalize that
//! has to sweep the account moves the vault to `Closed`.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::clock::ensure_reached;
use crate::errors::{AuthError, EngineError};
use crate::payment::TransferKind;
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultParams {
    pub recovery: Identity,
    /// Rounds between request and finalize
    pub wait_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultAction {
    Deposit,
    Withdraw { amount: Amount, receiver: Identity },
    Finalize,
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultView {
    Phase,
    /// Amount of the pending request, zero when idle
    PendingAmount,
    PendingReceiver,
    /// Earliest round at which the pending request can be finalized
    FinalizeAfter,
    Recovery,
}

/// Withdrawal waiting for its delay to elapse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWithdrawal {
    pub amount: Amount,
    pub receiver: Identity,
    pub requested_at: Round,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    roles: RoleBindings,
    wait_time: u64,
    pending: Option<PendingWithdrawal>,
    closed: bool,
}

impl Vault {
    pub fn pending(&self) -> Option<&PendingWithdrawal> {
        self.pending.as_ref()
    }

    fn finalize_after(&self, pending: &PendingWithdrawal) -> Result<Round, EngineError> {
        pending
            .requested_at
            .checked_add(self.wait_time)
            .ok_or(EngineError::Overflow)
    }

    fn take_pending(&mut self, action: &VaultAction) -> Result<PendingWithdrawal, EngineError> {
        let phase = self.phase();
        self.pending
            .take()
            .ok_or_else(|| EngineError::wrong_phase(phase, Self::action_name(action)))
    }
}

impl Archetype for Vault {
    const NAME: &'static str = "vault";

    type Params = VaultParams;
    type Action = VaultAction;
    type View = VaultView;

    fn create(params: VaultParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        require_address(&params.recovery, "recovery")?;
        Ok(Self {
            roles: RoleBindings::new()
                .with(Role::Owner, tx.caller().clone())
                .with(Role::Recovery, params.recovery),
            wait_time: params.wait_time,
            pending: None,
            closed: false,
        })
    }

    fn phase(&self) -> &'static str {
        if self.closed {
            "Closed"
        } else if self.pending.is_some() {
            "Req"
        } else {
            "Idle"
        }
    }

    fn is_terminal(&self) -> bool {
        self.closed
    }

    fn action_name(action: &VaultAction) -> &'static str {
        match action {
            VaultAction::Deposit => "deposit",
            VaultAction::Withdraw { .. } => "withdraw",
            VaultAction::Finalize => "finalize",
            VaultAction::Cancel => "cancel",
        }
    }

    fn authorize(&self, action: &VaultAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            VaultAction::Deposit => Ok(()),
            VaultAction::Withdraw { .. } | VaultAction::Finalize => self.roles.require(Role::Owner, ctx.caller()),
            VaultAction::Cancel => self.roles.require(Role::Recovery, ctx.caller()),
        }
    }

    fn apply(&mut self, action: VaultAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match &action {
            VaultAction::Deposit => require_value(tx.attached(), "deposit")?,
            VaultAction::Withdraw { amount, receiver } => {
                if self.pending.is_some() {
                    return Err(EngineError::wrong_phase(self.phase(), Self::action_name(&action)));
                }
                require_address(receiver, "receiver")?;
                if amount.is_zero() || *amount > tx.balance() {
                    return Err(EngineError::invalid_amount(format!(
                        "withdrawal must be in 1..={}, got {}",
                        tx.balance(),
                        amount
                    )));
                }
                self.pending = Some(PendingWithdrawal {
                    amount: *amount,
                    receiver: receiver.clone(),
                    requested_at: tx.now(),
                });
            }
            VaultAction::Finalize => {
                let pending = self.take_pending(&action)?;
                ensure_reached(tx.now(), self.finalize_after(&pending)?)?;
                if tx.pay_or_close(&pending.receiver, pending.amount)? == Some(TransferKind::Close) {
                    self.closed = true;
                }
            }
            VaultAction::Cancel => {
                self.take_pending(&action)?;
            }
        }
        Ok(())
    }

    fn read(&self, view: &VaultView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            VaultView::Phase => ViewValue::Phase(self.phase().to_string()),
            VaultView::PendingAmount => {
                ViewValue::Amount(self.pending.as_ref().map(|p| p.amount).unwrap_or(Amount::ZERO))
            }
            VaultView::PendingReceiver => {
                ViewValue::MaybeIdentity(self.pending.as_ref().map(|p| p.receiver.clone()))
            }
            VaultView::FinalizeAfter => match &self.pending {
                Some(pending) => ViewValue::Round(self.finalize_after(pending)?),
                None => ViewValue::Unit,
            },
            VaultView::Recovery => ViewValue::MaybeIdentity(self.roles.holder(Role::Recovery).cloned()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{alice, bob, carol, TestEngine, RESERVE};
    use custody_types::ids::ContractId;

    fn setup(engine: &mut TestEngine, float: u64) -> ContractId {
        engine
            .create(
                &alice(),
                RESERVE.checked_add(Amount::new(float)).unwrap(),
                VaultParams {
                    recovery: carol(),
                    wait_time: 5,
                },
            )
            .unwrap()
            .contract
    }

    fn withdraw(amount: u64) -> VaultAction {
        VaultAction::Withdraw {
            amount: Amount::new(amount),
            receiver: bob(),
        }
    }

    #[test]
    fn test_cancel_by_recovery() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 500_000);
        engine.call(id, &alice(), Amount::ZERO, withdraw(200_000)).unwrap();
        let receipt = engine.call(id, &carol(), Amount::ZERO, VaultAction::Cancel).unwrap();
        assert_eq!(receipt.phase, "Idle");
        assert!(receipt.payments.is_empty());
    }

    #[test]
    fn test_cancel_requires_recovery() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 500_000);
        engine.call(id, &alice(), Amount::ZERO, withdraw(200_000)).unwrap();
        let err = engine.call(id, &alice(), Amount::ZERO, VaultAction::Cancel).unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
    }

    #[test]
    fn test_cancel_when_idle_is_wrong_phase() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 500_000);
        let err = engine.call(id, &carol(), Amount::ZERO, VaultAction::Cancel).unwrap_err();
        assert!(matches!(err, EngineError::WrongPhase { .. }));
    }

    #[test]
    fn test_second_request_while_pending_rejected() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 500_000);
        engine.call(id, &alice(), Amount::ZERO, withdraw(100_000)).unwrap();
        let err = engine.call(id, &alice(), Amount::ZERO, withdraw(100_000)).unwrap_err();
        assert!(matches!(err, EngineError::WrongPhase { .. }));
    }

    #[test]
    fn test_withdraw_more_than_balance_rejected() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 50_000);
        let err = engine.call(id, &alice(), Amount::ZERO, withdraw(150_001)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
        let err = engine.call(id, &alice(), Amount::ZERO, withdraw(0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
    }

    #[test]
    fn test_full_sweep_closes_vault() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 50_000);
        engine.call(id, &alice(), Amount::ZERO, withdraw(150_000)).unwrap();
        engine.advance(5);
        let receipt = engine.call(id, &alice(), Amount::ZERO, VaultAction::Finalize).unwrap();
        assert_eq!(receipt.phase, "Closed");
        assert_eq!(receipt.payments[0].kind, TransferKind::Close);
        let err = engine.call(id, &bob(), Amount::new(10), VaultAction::Deposit).unwrap_err();
        assert!(matches!(err, EngineError::WrongPhase { .. }));
    }

    #[test]
    fn test_anyone_can_deposit() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine, 0);
        engine.call(id, &bob(), Amount::new(70_000), VaultAction::Deposit).unwrap();
        assert_eq!(engine.balance(&Identity::contract(id)), Amount::new(170_000));
    }
}
