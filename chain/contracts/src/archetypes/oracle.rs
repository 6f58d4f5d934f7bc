//! Exchange-rate oracle read by price bets through a nested call.

use custody_types::ids::Identity;
use serde::{Deserialize, Serialize};

use super::{require_address, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleParams {
    pub rate: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleAction {
    SetRate { rate: u64 },
    TransferOwnership { new_owner: Identity },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleView {
    ExchangeRate,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    roles: RoleBindings,
    rate: u64,
}

impl Oracle {
    pub fn from_params(owner: &Identity, params: OracleParams) -> Self {
        Self {
            roles: RoleBindings::new().with(Role::Owner, owner.clone()),
            rate: params.rate,
        }
    }

    pub fn rate(&self) -> u64 {
        self.rate
    }
}

impl Archetype for Oracle {
    const NAME: &'static str = "oracle";

    type Params = OracleParams;
    type Action = OracleAction;
    type View = OracleView;

    fn create(params: OracleParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        Ok(Self::from_params(tx.caller(), params))
    }

    fn phase(&self) -> &'static str {
        "Active"
    }

    fn action_name(action: &OracleAction) -> &'static str {
        match action {
            OracleAction::SetRate { .. } => "set_rate",
            OracleAction::TransferOwnership { .. } => "transfer_ownership",
        }
    }

    fn authorize(&self, _action: &OracleAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        self.roles.require(Role::Owner, ctx.caller())
    }

    fn apply(&mut self, action: OracleAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            OracleAction::SetRate { rate } => self.rate = rate,
            OracleAction::TransferOwnership { new_owner } => {
                require_address(&new_owner, "new owner")?;
                if !self.roles.transfer(Role::Owner, tx.caller(), new_owner) {
                    return Err(AuthError::MissingRole {
                        caller: tx.caller().clone(),
                        role: Role::Owner,
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn read(&self, view: &OracleView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            OracleView::ExchangeRate => ViewValue::Number(self.rate),
            OracleView::Owner => ViewValue::MaybeIdentity(self.roles.holder(Role::Owner).cloned()),
        })
    }
}
