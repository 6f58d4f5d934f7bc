//! Escrow — buyer deposits the price, then either releases it to the seller
//! or the seller refunds it.
//!
//! `WaitDeposit → deposit → WaitRecipient → pay | refund → Closed`

use custody_types::ids::Identity;
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};

use super::{require_address, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowPhase {
    WaitDeposit,
    WaitRecipient,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowParams {
    /// Must be the creator
    pub seller: Identity,
    pub buyer: Identity,
    pub price: Amount,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowAction {
    /// Buyer attaches exactly the price
    Deposit,
    /// Buyer releases the funds to the seller
    Pay,
    /// Seller returns the funds to the buyer
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscrowView {
    Phase,
    Price,
    Seller,
    Buyer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    roles: RoleBindings,
    price: Amount,
    phase: EscrowPhase,
}

impl Escrow {
    fn holder(&self, role: Role) -> Result<Identity, EngineError> {
        self.roles
            .holder(role)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role }))
    }

    fn expect_phase(&self, expected: EscrowPhase, action: &EscrowAction) -> Result<(), EngineError> {
        if self.phase != expected {
            return Err(EngineError::wrong_phase(self.phase(), Self::action_name(action)));
        }
        Ok(())
    }
}

impl Archetype for Escrow {
    const NAME: &'static str = "escrow";

    type Params = EscrowParams;
    type Action = EscrowAction;
    type View = EscrowView;

    fn create(params: EscrowParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        if tx.caller() != &params.seller {
            return Err(AuthError::MissingRole {
                caller: tx.caller().clone(),
                role: Role::Seller,
            }
            .into());
        }
        require_address(&params.buyer, "buyer")?;
        if params.buyer == params.seller {
            return Err(EngineError::invalid_argument("buyer and seller must differ"));
        }
        if params.price.is_zero() {
            return Err(EngineError::invalid_amount("price must be positive"));
        }
        Ok(Self {
            roles: RoleBindings::new()
                .with(Role::Seller, params.seller)
                .with(Role::Buyer, params.buyer),
            price: params.price,
            phase: EscrowPhase::WaitDeposit,
        })
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            EscrowPhase::WaitDeposit => "WaitDeposit",
            EscrowPhase::WaitRecipient => "WaitRecipient",
            EscrowPhase::Closed => "Closed",
        }
    }

    fn is_terminal(&self) -> bool {
        self.phase == EscrowPhase::Closed
    }

    fn action_name(action: &EscrowAction) -> &'static str {
        match action {
            EscrowAction::Deposit => "deposit",
            EscrowAction::Pay => "pay",
            EscrowAction::Refund => "refund",
        }
    }

    fn authorize(&self, action: &EscrowAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            EscrowAction::Deposit | EscrowAction::Pay => self.roles.require(Role::Buyer, ctx.caller()),
            EscrowAction::Refund => self.roles.require(Role::Seller, ctx.caller()),
        }
    }

    fn apply(&mut self, action: EscrowAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            EscrowAction::Deposit => {
                self.expect_phase(EscrowPhase::WaitDeposit, &action)?;
                if tx.attached() != self.price {
                    return Err(EngineError::invalid_amount(format!(
                        "deposit must equal the price {}, got {}",
                        self.price,
                        tx.attached()
                    )));
                }
                self.phase = EscrowPhase::WaitRecipient;
            }
            EscrowAction::Pay => {
                self.expect_phase(EscrowPhase::WaitRecipient, &action)?;
                tx.close_to(&self.holder(Role::Seller)?)?;
                self.phase = EscrowPhase::Closed;
            }
            EscrowAction::Refund => {
                self.expect_phase(EscrowPhase::WaitRecipient, &action)?;
                tx.close_to(&self.holder(Role::Buyer)?)?;
                self.phase = EscrowPhase::Closed;
            }
        }
        Ok(())
    }

    fn read(&self, view: &EscrowView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            EscrowView::Phase => ViewValue::Phase(self.phase().to_string()),
            EscrowView::Price => ViewValue::Amount(self.price),
            EscrowView::Seller => ViewValue::MaybeIdentity(self.roles.holder(Role::Seller).cloned()),
            EscrowView::Buyer => ViewValue::MaybeIdentity(self.roles.holder(Role::Buyer).cloned()),
        })
    }

    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        match self.phase {
            EscrowPhase::WaitRecipient => self.price,
            _ => Amount::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{alice, bob, carol, TestEngine, RESERVE};

    fn setup(engine: &mut TestEngine) -> custody_types::ids::ContractId {
        engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(100_000),
                },
            )
            .unwrap()
            .contract
    }

    #[test]
    fn test_create_requires_seller() {
        let mut engine = TestEngine::funded();
        let err = engine
            .create(
                &carol(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(100_000),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
    }

    #[test]
    fn test_deposit_wrong_amount() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine
            .call(id, &bob(), Amount::new(99_999), EscrowAction::Deposit)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
    }

    #[test]
    fn test_only_buyer_deposits() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine
            .call(id, &carol(), Amount::new(100_000), EscrowAction::Deposit)
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
    }

    #[test]
    fn test_refund_returns_price_to_buyer() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let before = engine.balance(&bob());
        engine.call(id, &bob(), Amount::new(100_000), EscrowAction::Deposit).unwrap();
        let receipt = engine.call(id, &alice(), Amount::ZERO, EscrowAction::Refund).unwrap();

        assert_eq!(receipt.phase, "Closed");
        // The buyer also receives the reserve swept by the close
        assert_eq!(engine.balance(&bob()), before.checked_add(RESERVE).unwrap());
    }

    #[test]
    fn test_pay_before_deposit_is_wrong_phase() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine.call(id, &bob(), Amount::ZERO, EscrowAction::Pay).unwrap_err();
        assert!(matches!(err, EngineError::WrongPhase { .. }));
    }
}
