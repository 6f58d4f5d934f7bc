//! Wallet — owner-controlled float with one-shot payment orders
//!
//! The owner records transactions up front and executes each one exactly
//! once. Anyone may top up the float. `withdraw` closes the account to the
//! owner.

use std::collections::BTreeMap;

use custody_types::ids::Identity;
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::payment::TransferKind;
use crate::security::{OneShotGuard, Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WalletParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletAction {
    Deposit,
    /// Record a payment order; the new id is returned as the action output
    CreateTransaction {
        to: Identity,
        value: Amount,
        memo: String,
    },
    ExecuteTransaction { id: u64 },
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletView {
    Phase,
    TransactionCount,
    IsExecuted(u64),
    Memo(u64),
}

/// Recorded payment order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub to: Identity,
    pub value: Amount,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    roles: RoleBindings,
    transactions: BTreeMap<u64, WalletTransaction>,
    next_id: u64,
    executed: OneShotGuard,
    closed: bool,
}

impl Wallet {
    pub fn transaction(&self, id: u64) -> Option<&WalletTransaction> {
        self.transactions.get(&id)
    }
}

impl Archetype for Wallet {
    const NAME: &'static str = "wallet";

    type Params = WalletParams;
    type Action = WalletAction;
    type View = WalletView;

    fn create(_params: WalletParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        Ok(Self {
            roles: RoleBindings::new().with(Role::Owner, tx.caller().clone()),
            transactions: BTreeMap::new(),
            next_id: 0,
            executed: OneShotGuard::new(),
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

    fn action_name(action: &WalletAction) -> &'static str {
        match action {
            WalletAction::Deposit => "deposit",
            WalletAction::CreateTransaction { .. } => "create_transaction",
            WalletAction::ExecuteTransaction { .. } => "execute_transaction",
            WalletAction::Withdraw => "withdraw",
        }
    }

    fn authorize(&self, action: &WalletAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            WalletAction::Deposit => Ok(()),
            _ => self.roles.require(Role::Owner, ctx.caller()),
        }
    }

    fn apply(&mut self, action: WalletAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            WalletAction::Deposit => require_value(tx.attached(), "deposit")?,
            WalletAction::CreateTransaction { to, value, memo } => {
                require_address(&to, "recipient")?;
                require_value(value, "transaction value")?;
                let id = self.next_id;
                self.next_id = id.checked_add(1).ok_or(EngineError::Overflow)?;
                self.transactions.insert(id, WalletTransaction { to, value, memo });
                tx.set_output(ViewValue::Number(id));
            }
            WalletAction::ExecuteTransaction { id } => {
                let order = self
                    .transactions
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| EngineError::invalid_argument(format!("unknown transaction {id}")))?;
                if !self.executed.consume(id) {
                    return Err(EngineError::AlreadyProcessed {
                        what: format!("transaction {id}"),
                    });
                }
                if tx.pay_or_close(&order.to, order.value)? == Some(TransferKind::Close) {
                    self.closed = true;
                }
            }
            WalletAction::Withdraw => {
                let owner = self
                    .roles
                    .holder(Role::Owner)
                    .cloned()
                    .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role: Role::Owner }))?;
                tx.close_to(&owner)?;
                self.closed = true;
            }
        }
        Ok(())
    }

    fn read(&self, view: &WalletView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            WalletView::Phase => ViewValue::Phase(self.phase().to_string()),
            WalletView::TransactionCount => ViewValue::Number(self.next_id),
            WalletView::IsExecuted(id) => ViewValue::Bool(self.executed.is_used(*id)),
            WalletView::Memo(id) => match self.transactions.get(id) {
                Some(order) => ViewValue::Text(order.memo.clone()),
                None => return Err(EngineError::invalid_argument(format!("unknown transaction {id}"))),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{alice, bob, carol, TestEngine, RESERVE};
    use custody_types::ids::ContractId;

    fn setup(engine: &mut TestEngine) -> ContractId {
        engine
            .create(&alice(), RESERVE.checked_add(Amount::new(500_000)).unwrap(), WalletParams::default())
            .unwrap()
            .contract
    }

    fn order(value: u64) -> WalletAction {
        WalletAction::CreateTransaction {
            to: bob(),
            value: Amount::new(value),
            memo: "rent".into(),
        }
    }

    #[test]
    fn test_transaction_ids_are_sequential() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let first = engine.call(id, &alice(), Amount::ZERO, order(10)).unwrap();
        let second = engine.call(id, &alice(), Amount::ZERO, order(20)).unwrap();
        assert_eq!(first.output, Some(ViewValue::Number(0)));
        assert_eq!(second.output, Some(ViewValue::Number(1)));
    }

    #[test]
    fn test_execute_once() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine.call(id, &alice(), Amount::ZERO, order(200_000)).unwrap();

        let receipt = engine
            .call(id, &alice(), Amount::ZERO, WalletAction::ExecuteTransaction { id: 0 })
            .unwrap();
        assert_eq!(receipt.payments[0].to, bob());
        assert_eq!(receipt.payments[0].amount, Amount::new(200_000));

        let err = engine
            .call(id, &alice(), Amount::ZERO, WalletAction::ExecuteTransaction { id: 0 })
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyProcessed { .. }));
    }

    #[test]
    fn test_unknown_transaction() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine
            .call(id, &alice(), Amount::ZERO, WalletAction::ExecuteTransaction { id: 7 })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }

    #[test]
    fn test_only_owner_orders_payments() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine.call(id, &carol(), Amount::ZERO, order(10)).unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
        engine.call(id, &carol(), Amount::new(10), WalletAction::Deposit).unwrap();
    }

    #[test]
    fn test_withdraw_closes_wallet() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let receipt = engine.call(id, &alice(), Amount::ZERO, WalletAction::Withdraw).unwrap();
        assert_eq!(receipt.phase, "Closed");
        assert_eq!(receipt.payments[0].amount, Amount::new(600_000));
        let err = engine.call(id, &carol(), Amount::new(10), WalletAction::Deposit).unwrap_err();
        assert!(matches!(err, EngineError::WrongPhase { .. }));
    }
}
