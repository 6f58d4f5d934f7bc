//! Bet — two-party wager settled by an oracle
//!
//! `Created → join1 → Joined1 → join2 → Joined2 → win → Closed`
//!
//! Once the deadline has passed, either party may call `timeout`: the
//! opponent's stake (if any) is returned and the rest closes to the owner.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::{require_address, require_value, Archetype, ViewValue};
use crate::clock::{ensure_not_after, ensure_passed};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetPhase {
    Created,
    Joined1,
    Joined2,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetParams {
    pub oracle: Identity,
    /// Rounds after creation during which the opponent may join
    pub timeout: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetAction {
    Join1 { opponent: Identity },
    Join2,
    Win { winner: Identity },
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BetView {
    Phase,
    Wager,
    Deadline,
    Opponent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bet {
    roles: RoleBindings,
    deadline: Round,
    wager: Amount,
    phase: BetPhase,
}

impl Bet {
    fn holder(&self, role: Role) -> Result<Identity, EngineError> {
        self.roles
            .holder(role)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role }))
    }

    fn expect_phase(&self, expected: BetPhase, action: &BetAction) -> Result<(), EngineError> {
        if self.phase != expected {
            return Err(EngineError::wrong_phase(self.phase(), Self::action_name(action)));
        }
        Ok(())
    }
}

impl Archetype for Bet {
    const NAME: &'static str = "bet";

    type Params = BetParams;
    type Action = BetAction;
    type View = BetView;

    fn create(params: BetParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        require_address(&params.oracle, "oracle")?;
        let deadline = tx.now().checked_add(params.timeout).ok_or(EngineError::Overflow)?;
        Ok(Self {
            roles: RoleBindings::new()
                .with(Role::Owner, tx.caller().clone())
                .with(Role::Oracle, params.oracle),
            deadline,
            wager: Amount::ZERO,
            phase: BetPhase::Created,
        })
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            BetPhase::Created => "Created",
            BetPhase::Joined1 => "Joined1",
            BetPhase::Joined2 => "Joined2",
            BetPhase::Closed => "Closed",
        }
    }

    fn is_terminal(&self) -> bool {
        self.phase == BetPhase::Closed
    }

    fn action_name(action: &BetAction) -> &'static str {
        match action {
            BetAction::Join1 { .. } => "join1",
            BetAction::Join2 => "join2",
            BetAction::Win { .. } => "win",
            BetAction::Timeout => "timeout",
        }
    }

    fn authorize(&self, action: &BetAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            BetAction::Join1 { opponent } => {
                self.roles.require(Role::Owner, ctx.caller())?;
                if opponent == ctx.caller() {
                    return Err(AuthError::ineligible(ctx.caller(), "cannot bet against yourself"));
                }
                Ok(())
            }
            BetAction::Join2 => self.roles.require(Role::Opponent, ctx.caller()),
            BetAction::Win { .. } => self.roles.require(Role::Oracle, ctx.caller()),
            BetAction::Timeout => self.roles.require_any(&[Role::Owner, Role::Opponent], ctx.caller()),
        }
    }

    fn apply(&mut self, action: BetAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            BetAction::Join1 { ref opponent } => {
                self.expect_phase(BetPhase::Created, &action)?;
                require_address(opponent, "opponent")?;
                require_value(tx.attached(), "stake")?;
                self.roles.bind(Role::Opponent, opponent.clone());
                self.wager = tx.attached();
                self.phase = BetPhase::Joined1;
            }
            BetAction::Join2 => {
                self.expect_phase(BetPhase::Joined1, &action)?;
                ensure_not_after(tx.now(), self.deadline)?;
                if tx.attached() != self.wager {
                    return Err(EngineError::invalid_amount(format!(
                        "stake must equal the wager {}, got {}",
                        self.wager,
                        tx.attached()
                    )));
                }
                self.phase = BetPhase::Joined2;
            }
            BetAction::Win { ref winner } => {
                self.expect_phase(BetPhase::Joined2, &action)?;
                let owner = self.holder(Role::Owner)?;
                let opponent = self.holder(Role::Opponent)?;
                if *winner != owner && *winner != opponent {
                    return Err(EngineError::invalid_argument(format!("{winner} is not a party to this bet")));
                }
                tx.close_to(winner)?;
                self.phase = BetPhase::Closed;
            }
            BetAction::Timeout => {
                if self.phase == BetPhase::Closed {
                    return Err(EngineError::wrong_phase(self.phase(), "timeout"));
                }
                ensure_passed(tx.now(), self.deadline)?;
                if self.phase == BetPhase::Joined2 {
                    tx.pay_or_close(&self.holder(Role::Opponent)?, self.wager)?;
                }
                if !tx.is_closed() {
                    tx.close_to(&self.holder(Role::Owner)?)?;
                }
                self.phase = BetPhase::Closed;
            }
        }
        Ok(())
    }

    fn read(&self, view: &BetView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            BetView::Phase => ViewValue::Phase(self.phase().to_string()),
            BetView::Wager => ViewValue::Amount(self.wager),
            BetView::Deadline => ViewValue::Round(self.deadline),
            BetView::Opponent => ViewValue::MaybeIdentity(self.roles.holder(Role::Opponent).cloned()),
        })
    }

    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        match self.phase {
            BetPhase::Joined1 => self.wager,
            BetPhase::Joined2 => self.wager.checked_mul(2).unwrap_or(Amount::MAX),
            BetPhase::Created | BetPhase::Closed => Amount::ZERO,
        }
    }
}
