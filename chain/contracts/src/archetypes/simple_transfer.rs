//! Simple transfer — owner-funded float drawn down by one recipient
//!
//! `Open → withdraw_all → Closed`
//!
//! The owner tops the account up with `deposit`. The recipient pulls any
//! amount up to what sits above the reserve with `withdraw`, or sweeps the
//! whole account with `withdraw_all`.

use custody_types::ids::Identity;
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::payment::TransferKind;
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleTransferParams {
    pub recipient: Identity,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleTransferAction {
    Deposit,
    Withdraw { amount: Amount },
    WithdrawAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimpleTransferView {
    Phase,
    Recipient,
    /// Value the recipient can still withdraw without closing the account
    Available,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleTransfer {
    roles: RoleBindings,
    closed: bool,
}

impl SimpleTransfer {
    fn recipient(&self) -> Result<Identity, EngineError> {
        self.roles
            .holder(Role::Receiver)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role: Role::Receiver }))
    }
}

impl Archetype for SimpleTransfer {
    const NAME: &'static str = "simple_transfer";

    type Params = SimpleTransferParams;
    type Action = SimpleTransferAction;
    type View = SimpleTransferView;

    fn create(params: SimpleTransferParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        require_address(&params.recipient, "recipient")?;
        Ok(Self {
            roles: RoleBindings::new()
                .with(Role::Owner, tx.caller().clone())
                .with(Role::Receiver, params.recipient),
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

    fn action_name(action: &SimpleTransferAction) -> &'static str {
        match action {
            SimpleTransferAction::Deposit => "deposit",
            SimpleTransferAction::Withdraw { .. } => "withdraw",
            SimpleTransferAction::WithdrawAll => "withdraw_all",
        }
    }

    fn authorize(&self, action: &SimpleTransferAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            SimpleTransferAction::Deposit => self.roles.require(Role::Owner, ctx.caller()),
            SimpleTransferAction::Withdraw { .. } | SimpleTransferAction::WithdrawAll => {
                self.roles.require(Role::Receiver, ctx.caller())
            }
        }
    }

    fn apply(&mut self, action: SimpleTransferAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            SimpleTransferAction::Deposit => require_value(tx.attached(), "deposit")?,
            SimpleTransferAction::Withdraw { amount } => {
                require_value(amount, "withdrawal")?;
                let available = tx.balance().saturating_sub(tx.reserve());
                if amount > available {
                    return Err(EngineError::invalid_amount(format!(
                        "withdrawal {amount} exceeds available {available}"
                    )));
                }
                let recipient = self.recipient()?;
                if tx.pay_or_close(&recipient, amount)? == Some(TransferKind::Close) {
                    self.closed = true;
                }
            }
            SimpleTransferAction::WithdrawAll => {
                let recipient = self.recipient()?;
                tx.close_to(&recipient)?;
                self.closed = true;
            }
        }
        Ok(())
    }

    fn read(&self, view: &SimpleTransferView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            SimpleTransferView::Phase => ViewValue::Phase(self.phase().to_string()),
            SimpleTransferView::Recipient => ViewValue::Identity(self.recipient()?),
            SimpleTransferView::Available => ViewValue::Amount(self.owed(ctx)),
        })
    }

    fn owed(&self, ctx: &ReadContext<'_>) -> Amount {
        ctx.balance().saturating_sub(ctx.reserve())
    }
}
