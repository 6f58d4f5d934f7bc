//! Hash time-locked contract
//!
//! The creator locks a deposit behind `keccak256(secret)`. Revealing the
//! secret returns everything to the owner; once `delay` rounds have passed
//! without a reveal, the verifier may claim it instead.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::{require_address, Archetype, ViewValue};
use crate::clock::ensure_passed;
use crate::commitment::{Digest32, HashLock};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HtlcParams {
    pub verifier: Identity,
    pub hash: Digest32,
    /// Rounds after creation before the verifier may claim
    pub delay: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcAction {
    Reveal { secret: Vec<u8> },
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HtlcView {
    Phase,
    Hash,
    Deposit,
    TimeoutAfter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Htlc {
    roles: RoleBindings,
    lock: HashLock,
    deposit: Amount,
    timeout_after: Round,
    closed: bool,
}

impl Htlc {
    fn settle(&mut self, role: Role, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        let to = self
            .roles
            .holder(role)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role }))?;
        tx.close_to(&to)?;
        self.closed = true;
        Ok(())
    }
}

impl Archetype for Htlc {
    const NAME: &'static str = "htlc";

    type Params = HtlcParams;
    type Action = HtlcAction;
    type View = HtlcView;

    fn create(params: HtlcParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        require_address(&params.verifier, "verifier")?;
        let deposit = tx.attached().saturating_sub(tx.reserve());
        let minimum = tx.config().htlc_min_deposit;
        if deposit < minimum {
            return Err(EngineError::invalid_amount(format!(
                "deposit above the reserve must be at least {minimum}, got {deposit}"
            )));
        }
        let timeout_after = tx.now().checked_add(params.delay).ok_or(EngineError::Overflow)?;
        Ok(Self {
            roles: RoleBindings::new()
                .with(Role::Owner, tx.caller().clone())
                .with(Role::Verifier, params.verifier),
            lock: HashLock::new(params.hash),
            deposit,
            timeout_after,
            closed: false,
        })
    }

    fn phase(&self) -> &'static str {
        if self.closed {
            "Closed"
        } else {
            "Locked"
        }
    }

    fn is_terminal(&self) -> bool {
        self.closed
    }

    fn action_name(action: &HtlcAction) -> &'static str {
        match action {
            HtlcAction::Reveal { .. } => "reveal",
            HtlcAction::Timeout => "timeout",
        }
    }

    fn authorize(&self, action: &HtlcAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            HtlcAction::Reveal { .. } => self.roles.require(Role::Owner, ctx.caller()),
            HtlcAction::Timeout => self.roles.require(Role::Verifier, ctx.caller()),
        }
    }

    fn apply(&mut self, action: HtlcAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            HtlcAction::Reveal { secret } => {
                self.lock.open(&secret)?;
                self.settle(Role::Owner, tx)
            }
            HtlcAction::Timeout => {
                ensure_passed(tx.now(), self.timeout_after)?;
                self.settle(Role::Verifier, tx)
            }
        }
    }

    fn read(&self, view: &HtlcView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            HtlcView::Phase => ViewValue::Phase(self.phase().to_string()),
            HtlcView::Hash => ViewValue::Digest(self.lock.hash),
            HtlcView::Deposit => ViewValue::Amount(self.deposit),
            HtlcView::TimeoutAfter => ViewValue::Round(self.timeout_after),
        })
    }

    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        if self.closed {
            Amount::ZERO
        } else {
            self.deposit
        }
    }
}
