//! Payment splitter — deposits shared among fixed payees by share weight
//!
//! `Open → close → Closed`
//!
//! Anyone may `receive` value. Each payee may `release` what it is due:
//! its share of everything ever received, minus what it already got. The
//! admin may `close` once no payee is due anything, sweeping the reserve
//! and rounding dust back to itself.

use std::collections::BTreeMap;

use custody_types::ids::Identity;
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::payment::TransferKind;
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payee {
    pub account: Identity,
    pub shares: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitterParams {
    pub payees: Vec<Payee>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitterAction {
    Receive,
    Release,
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitterView {
    Phase,
    Shares(Identity),
    Released(Identity),
    Releasable(Identity),
    TotalReceived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSplitter {
    roles: RoleBindings,
    shares: BTreeMap<Identity, u64>,
    total_shares: u64,
    released: BTreeMap<Identity, Amount>,
    total_released: Amount,
    closed: bool,
}

impl PaymentSplitter {
    pub fn shares_of(&self, payee: &Identity) -> u64 {
        self.shares.get(payee).copied().unwrap_or(0)
    }

    pub fn released_to(&self, payee: &Identity) -> Amount {
        self.released.get(payee).copied().unwrap_or(Amount::ZERO)
    }

    /// Everything ever received, given the custody currently above the reserve
    fn total_received(&self, available: Amount) -> Result<Amount, EngineError> {
        available
            .checked_add(self.total_released)
            .ok_or(EngineError::Overflow)
    }

    /// `received * shares / total_shares - released`, never above `available`
    fn releasable(&self, payee: &Identity, available: Amount) -> Result<Amount, EngineError> {
        if self.total_shares == 0 {
            return Ok(Amount::ZERO);
        }
        let received = self.total_received(available)?;
        let entitled = u128::from(received.value()) * u128::from(self.shares_of(payee)) / u128::from(self.total_shares);
        // entitled <= received because shares_of <= total_shares
        let entitled = Amount::new(entitled as u64);
        Ok(entitled.saturating_sub(self.released_to(payee)))
    }
}

impl Archetype for PaymentSplitter {
    const NAME: &'static str = "payment_splitter";

    type Params = SplitterParams;
    type Action = SplitterAction;
    type View = SplitterView;

    fn create(params: SplitterParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        if params.payees.is_empty() {
            return Err(EngineError::invalid_argument("at least one payee is required"));
        }
        let mut shares = BTreeMap::new();
        let mut total_shares = 0u64;
        for payee in params.payees {
            require_address(&payee.account, "payee")?;
            if payee.shares == 0 {
                return Err(EngineError::invalid_argument(format!("payee {} has no shares", payee.account)));
            }
            total_shares = total_shares.checked_add(payee.shares).ok_or(EngineError::Overflow)?;
            if shares.insert(payee.account.clone(), payee.shares).is_some() {
                return Err(EngineError::invalid_argument(format!("payee {} listed twice", payee.account)));
            }
        }
        Ok(Self {
            roles: RoleBindings::new().with(Role::Owner, tx.caller().clone()),
            shares,
            total_shares,
            released: BTreeMap::new(),
            total_released: Amount::ZERO,
            closed: false,
        })
    }

    fn phase(&self) -> &'static str {
        if self.closed {
            "Closed"
        } else {
            "Open"
        }
    }

    fn is_terminal(&self) -> bool {
        self.closed
    }

    fn action_name(action: &SplitterAction) -> &'static str {
        match action {
            SplitterAction::Receive => "receive",
            SplitterAction::Release => "release",
            SplitterAction::Close => "close",
        }
    }

    fn authorize(&self, action: &SplitterAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            SplitterAction::Receive => Ok(()),
            SplitterAction::Release => {
                if !self.shares.contains_key(ctx.caller()) {
                    return Err(AuthError::ineligible(ctx.caller(), "not a payee"));
                }
                Ok(())
            }
            SplitterAction::Close => self.roles.require(Role::Owner, ctx.caller()),
        }
    }

    fn apply(&mut self, action: SplitterAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        let available = tx.balance().saturating_sub(tx.reserve());
        match action {
            SplitterAction::Receive => require_value(tx.attached(), "payment")?,
            SplitterAction::Release => {
                let payee = tx.caller().clone();
                let due = self.releasable(&payee, available)?;
                if due.is_zero() {
                    return Err(EngineError::invalid_amount(format!("{payee} is not due a payment")));
                }
                let released = self.released_to(&payee).checked_add(due).ok_or(EngineError::Overflow)?;
                self.released.insert(payee.clone(), released);
                self.total_released = self.total_released.checked_add(due).ok_or(EngineError::Overflow)?;
                if tx.pay_or_close(&payee, due)? == Some(TransferKind::Close) {
                    self.closed = true;
                }
            }
            SplitterAction::Close => {
                for payee in self.shares.keys() {
                    if !self.releasable(payee, available)?.is_zero() {
                        return Err(EngineError::invalid_argument(format!("{payee} still has a payment due")));
                    }
                }
                let admin = self
                    .roles
                    .holder(Role::Owner)
                    .cloned()
                    .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role: Role::Owner }))?;
                tx.close_to(&admin)?;
                self.closed = true;
            }
        }
        Ok(())
    }

    fn read(&self, view: &SplitterView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        let available = self.owed(ctx);
        Ok(match view {
            SplitterView::Phase => ViewValue::Phase(self.phase().to_string()),
            SplitterView::Shares(payee) => ViewValue::Number(self.shares_of(payee)),
            SplitterView::Released(payee) => ViewValue::Amount(self.released_to(payee)),
            SplitterView::Releasable(payee) => ViewValue::Amount(self.releasable(payee, available)?),
            SplitterView::TotalReceived => ViewValue::Amount(self.total_received(available)?),
        })
    }

    fn owed(&self, ctx: &ReadContext<'_>) -> Amount {
        ctx.balance().saturating_sub(ctx.reserve())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{alice, bob, carol, dave, TestEngine, RESERVE, STARTING_BALANCE};
    use custody_types::ids::ContractId;

    fn setup(engine: &mut TestEngine) -> ContractId {
        engine
            .create(
                &alice(),
                RESERVE,
                SplitterParams {
                    payees: vec![
                        Payee { account: bob(), shares: 70 },
                        Payee { account: carol(), shares: 30 },
                    ],
                },
            )
            .unwrap()
            .contract
    }

    fn releasable(engine: &TestEngine, id: ContractId, payee: Identity) -> Amount {
        engine
            .read(id, &alice(), SplitterView::Releasable(payee))
            .unwrap()
            .as_amount()
            .unwrap()
    }

    #[test]
    fn test_release_by_share() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine.call(id, &dave(), Amount::new(1_000_000), SplitterAction::Receive).unwrap();
        assert_eq!(releasable(&engine, id, bob()), Amount::new(700_000));
        assert_eq!(releasable(&engine, id, carol()), Amount::new(300_000));

        let receipt = engine.call(id, &bob(), Amount::ZERO, SplitterAction::Release).unwrap();
        assert_eq!(receipt.payments[0].amount, Amount::new(700_000));
        assert_eq!(receipt.payments[0].kind, TransferKind::Partial);
        assert_eq!(releasable(&engine, id, bob()), Amount::ZERO);
        assert_eq!(releasable(&engine, id, carol()), Amount::new(300_000));
    }

    #[test]
    fn test_later_deposits_counted_against_history() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine.call(id, &dave(), Amount::new(100_000), SplitterAction::Receive).unwrap();
        engine.call(id, &bob(), Amount::ZERO, SplitterAction::Release).unwrap();
        engine.call(id, &dave(), Amount::new(100_000), SplitterAction::Receive).unwrap();

        // 70% of 200_000, minus the 70_000 already released
        assert_eq!(releasable(&engine, id, bob()), Amount::new(70_000));
        assert_eq!(releasable(&engine, id, carol()), Amount::new(60_000));
        assert_eq!(
            engine.read(id, &alice(), SplitterView::TotalReceived).unwrap(),
            ViewValue::Amount(Amount::new(200_000))
        );
    }

    #[test]
    fn test_nothing_due_rejected() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine.call(id, &bob(), Amount::ZERO, SplitterAction::Release).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount { .. }));
        let err = engine.call(id, &dave(), Amount::ZERO, SplitterAction::Release).unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(AuthError::Ineligible { .. })));
    }

    #[test]
    fn test_close_after_everyone_paid() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine.call(id, &dave(), Amount::new(1_001), SplitterAction::Receive).unwrap();
        let err = engine.call(id, &alice(), Amount::ZERO, SplitterAction::Close).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));

        engine.call(id, &bob(), Amount::ZERO, SplitterAction::Release).unwrap();
        engine.call(id, &carol(), Amount::ZERO, SplitterAction::Release).unwrap();
        // 700 + 300 released, one unit of dust stays behind
        let receipt = engine.call(id, &alice(), Amount::ZERO, SplitterAction::Close).unwrap();
        assert_eq!(receipt.phase, "Closed");
        assert_eq!(receipt.payments[0].kind, TransferKind::Close);
        assert_eq!(receipt.payments[0].amount, RESERVE.checked_add(Amount::new(1)).unwrap());
        assert_eq!(engine.balance(&bob()), STARTING_BALANCE.checked_add(Amount::new(700)).unwrap());
    }

    #[test]
    fn test_invalid_payee_lists() {
        let mut engine = TestEngine::funded();
        let duplicate = SplitterParams {
            payees: vec![Payee { account: bob(), shares: 1 }, Payee { account: bob(), shares: 2 }],
        };
        let err = engine.create(&alice(), RESERVE, duplicate).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));

        let zero_shares = SplitterParams {
            payees: vec![Payee { account: bob(), shares: 0 }],
        };
        let err = engine.create(&alice(), RESERVE, zero_shares).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));

        let err = engine.create(&alice(), RESERVE, SplitterParams { payees: vec![] }).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }
}
