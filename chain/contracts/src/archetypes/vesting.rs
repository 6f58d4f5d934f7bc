//! Vesting — linear release of a deposit to a beneficiary
//!
//! `Waiting → init → Vesting`. Once vesting, `release` may be called by
//! anyone and always pays the beneficiary.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VestingParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VestingAction {
    /// Creator attaches the deposit and fixes the schedule
    Init {
        beneficiary: Identity,
        start: Round,
        duration: u64,
    },
    Release,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VestingView {
    Phase,
    Vested,
    Releasable,
    Released,
    Total,
    Beneficiary,
}

/// Linear schedule fixed at `init`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub start: Round,
    pub duration: u64,
    pub total: Amount,
}

impl Schedule {
    /// Amount vested at round `now`, clamped to `[0, total]`.
    pub fn vested_at(&self, now: Round) -> Amount {
        if now < self.start {
            return Amount::ZERO;
        }
        let elapsed = now.since(self.start);
        if elapsed >= self.duration {
            return self.total;
        }
        let ramp = u128::from(self.total.value()) * u128::from(elapsed) / u128::from(self.duration);
        // ramp < total because elapsed < duration
        Amount::new(ramp as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vesting {
    roles: RoleBindings,
    schedule: Option<Schedule>,
    released: Amount,
}

impl Vesting {
    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    fn vested_at(&self, now: Round) -> Amount {
        self.schedule.map(|s| s.vested_at(now)).unwrap_or(Amount::ZERO)
    }

    fn releasable_at(&self, now: Round) -> Amount {
        self.vested_at(now).saturating_sub(self.released)
    }
}

impl Archetype for Vesting {
    const NAME: &'static str = "vesting";

    type Params = VestingParams;
    type Action = VestingAction;
    type View = VestingView;

    fn create(_params: VestingParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        Ok(Self {
            roles: RoleBindings::new().with(Role::Creator, tx.caller().clone()),
            schedule: None,
            released: Amount::ZERO,
        })
    }

    fn phase(&self) -> &'static str {
        if self.schedule.is_some() {
            "Vesting"
        } else {
            "Waiting"
        }
    }

    fn action_name(action: &VestingAction) -> &'static str {
        match action {
            VestingAction::Init { .. } => "init",
            VestingAction::Release => "release",
        }
    }

    fn authorize(&self, action: &VestingAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            VestingAction::Init { .. } => self.roles.require(Role::Creator, ctx.caller()),
            VestingAction::Release => Ok(()),
        }
    }

    fn apply(&mut self, action: VestingAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            VestingAction::Init {
                beneficiary,
                start,
                duration,
            } => {
                if self.schedule.is_some() {
                    return Err(EngineError::wrong_phase(self.phase(), "init"));
                }
                require_address(&beneficiary, "beneficiary")?;
                require_value(tx.attached(), "vesting deposit")?;
                self.roles.bind(Role::Beneficiary, beneficiary);
                self.schedule = Some(Schedule {
                    start,
                    duration,
                    total: tx.attached(),
                });
            }
            VestingAction::Release => {
                if self.schedule.is_none() {
                    return Err(EngineError::wrong_phase(self.phase(), "release"));
                }
                let beneficiary = self
                    .roles
                    .holder(Role::Beneficiary)
                    .cloned()
                    .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role: Role::Beneficiary }))?;
                let amount = self.releasable_at(tx.now());
                tx.pay_or_close(&beneficiary, amount)?;
                self.released = self.released.checked_add(amount).ok_or(EngineError::Overflow)?;
            }
        }
        Ok(())
    }

    fn read(&self, view: &VestingView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        let now = ctx.now();
        Ok(match view {
            VestingView::Phase => ViewValue::Phase(self.phase().to_string()),
            VestingView::Vested => ViewValue::Amount(self.vested_at(now)),
            VestingView::Releasable => ViewValue::Amount(self.releasable_at(now)),
            VestingView::Released => ViewValue::Amount(self.released),
            VestingView::Total => ViewValue::Amount(self.schedule.map(|s| s.total).unwrap_or(Amount::ZERO)),
            VestingView::Beneficiary => ViewValue::MaybeIdentity(self.roles.holder(Role::Beneficiary).cloned()),
        })
    }

    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        self.schedule
            .map(|s| s.total.saturating_sub(self.released))
            .unwrap_or(Amount::ZERO)
    }
}
