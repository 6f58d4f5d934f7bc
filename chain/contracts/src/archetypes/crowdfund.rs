//! Crowdfund — pooled donations released to a receiver if the goal is met
//!
//! - Anyone donates while the round is at or before `end_donate`
//! - After the deadline, a met goal lets the receiver withdraw the pool once
//! - A missed goal lets every past donor reclaim their own contribution
//!
//! `Open → withdraw → Settled`. Both phases accept reads; `Settled` accepts
//! a replayed `withdraw` that pays nothing.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::clock::{ensure_not_after, ensure_passed};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdfundPhase {
    Open,
    Settled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrowdfundParams {
    pub receiver: Identity,
    pub goal: Amount,
    /// Last round at which donations are accepted
    pub end_donate: Round,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdfundAction {
    Donate,
    Withdraw,
    Reclaim,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrowdfundView {
    Phase,
    Total,
    DonatedBy(Identity),
    Goal,
    Deadline,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Crowdfund {
    roles: RoleBindings,
    goal: Amount,
    end_donate: Round,
    total_donated: Amount,
    phase: CrowdfundPhase,
}

impl Crowdfund {
    pub fn total_donated(&self) -> Amount {
        self.total_donated
    }

    fn goal_met(&self) -> bool {
        self.total_donated >= self.goal
    }

    fn receiver(&self) -> Result<Identity, EngineError> {
        self.roles
            .holder(Role::Receiver)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role: Role::Receiver }))
    }
}

impl Archetype for Crowdfund {
    const NAME: &'static str = "crowdfund";

    type Params = CrowdfundParams;
    type Action = CrowdfundAction;
    type View = CrowdfundView;

    fn create(params: CrowdfundParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        require_address(&params.receiver, "receiver")?;
        require_value(params.goal, "goal")?;
        Ok(Self {
            roles: RoleBindings::new()
                .with(Role::Creator, tx.caller().clone())
                .with(Role::Receiver, params.receiver),
            goal: params.goal,
            end_donate: params.end_donate,
            total_donated: Amount::ZERO,
            phase: CrowdfundPhase::Open,
        })
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            CrowdfundPhase::Open => "Open",
            CrowdfundPhase::Settled => "Settled",
        }
    }

    fn action_name(action: &CrowdfundAction) -> &'static str {
        match action {
            CrowdfundAction::Donate => "donate",
            CrowdfundAction::Withdraw => "withdraw",
            CrowdfundAction::Reclaim => "reclaim",
        }
    }

    fn authorize(&self, action: &CrowdfundAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            CrowdfundAction::Donate => Ok(()),
            CrowdfundAction::Withdraw => self.roles.require(Role::Receiver, ctx.caller()),
            CrowdfundAction::Reclaim => {
                if !ctx.has_sub_balance(ctx.caller()) {
                    return Err(AuthError::ineligible(ctx.caller(), "only past donors can reclaim"));
                }
                Ok(())
            }
        }
    }

    fn apply(&mut self, action: CrowdfundAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            CrowdfundAction::Donate => {
                if self.phase != CrowdfundPhase::Open {
                    return Err(EngineError::wrong_phase(self.phase(), Self::action_name(&action)));
                }
                ensure_not_after(tx.now(), self.end_donate)?;
                require_value(tx.attached(), "donation")?;
                let donor = tx.caller().clone();
                let donation = tx.attached();
                tx.credit_sub_balance(&donor, donation)?;
                self.total_donated = self
                    .total_donated
                    .checked_add(donation)
                    .ok_or(EngineError::Overflow)?;
            }
            CrowdfundAction::Withdraw => {
                if self.phase == CrowdfundPhase::Settled {
                    return Ok(());
                }
                ensure_passed(tx.now(), self.end_donate)?;
                if !self.goal_met() {
                    return Err(EngineError::wrong_phase("GoalMissed", Self::action_name(&action)));
                }
                let mut pooled = Amount::ZERO;
                for (donor, held) in tx.participants() {
                    pooled = pooled.checked_add(held).ok_or(EngineError::Overflow)?;
                    tx.take_sub_balance(&donor);
                }
                tx.pay_or_close(&self.receiver()?, pooled)?;
                self.total_donated = Amount::ZERO;
                self.phase = CrowdfundPhase::Settled;
            }
            CrowdfundAction::Reclaim => {
                if self.phase == CrowdfundPhase::Settled || self.goal_met() {
                    let phase = if self.phase == CrowdfundPhase::Settled { self.phase() } else { "GoalMet" };
                    return Err(EngineError::wrong_phase(phase, Self::action_name(&action)));
                }
                ensure_passed(tx.now(), self.end_donate)?;
                let donor = tx.caller().clone();
                let held = tx.take_sub_balance(&donor);
                tx.pay_or_close(&donor, held)?;
                self.total_donated = self.total_donated.saturating_sub(held);
            }
        }
        Ok(())
    }

    fn read(&self, view: &CrowdfundView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            CrowdfundView::Phase => ViewValue::Phase(self.phase().to_string()),
            CrowdfundView::Total => ViewValue::Amount(self.total_donated),
            CrowdfundView::DonatedBy(donor) => ViewValue::Amount(ctx.sub_balance(donor)),
            CrowdfundView::Goal => ViewValue::Amount(self.goal),
            CrowdfundView::Deadline => ViewValue::Round(self.end_donate),
        })
    }

    fn owed(&self, ctx: &ReadContext<'_>) -> Amount {
        ctx.sub_balance_total()
    }
}
