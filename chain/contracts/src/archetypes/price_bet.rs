//! Price bet — a player wagers that an oracle reports a given rate
//!
//! The owner funds the pot at creation. A single player matches it with
//! `join`. Before the deadline the player may claim everything with `win`,
//! which reads the oracle's current rate through a nested call and succeeds
//! only if it equals the agreed rate. From the deadline on, the owner takes
//! everything back with `timeout`.

use custody_types::ids::{ContractId, Identity};
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::oracle::OracleView;
use super::{Archetype, ViewValue};
use crate::clock::{ensure_before, ensure_reached};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceBetPhase {
    Open,
    Joined,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBetParams {
    /// Oracle contract queried by `win`
    pub oracle: ContractId,
    pub deadline: Round,
    /// Rate the player bets on
    pub rate: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceBetAction {
    Join,
    Win,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceBetView {
    Phase,
    Pot,
    Player,
    Oracle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBet {
    roles: RoleBindings,
    oracle: ContractId,
    deadline: Round,
    rate: u64,
    pot: Amount,
    phase: PriceBetPhase,
}

impl PriceBet {
    fn holder(&self, role: Role) -> Result<Identity, EngineError> {
        self.roles
            .holder(role)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role }))
    }
}

impl Archetype for PriceBet {
    const NAME: &'static str = "price_bet";

    type Params = PriceBetParams;
    type Action = PriceBetAction;
    type View = PriceBetView;

    fn create(params: PriceBetParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        let pot = tx.attached().saturating_sub(tx.reserve());
        if pot.is_zero() {
            return Err(EngineError::invalid_amount("initial pot must be attached above the reserve"));
        }
        Ok(Self {
            roles: RoleBindings::new().with(Role::Owner, tx.caller().clone()),
            oracle: params.oracle,
            deadline: params.deadline,
            rate: params.rate,
            pot,
            phase: PriceBetPhase::Open,
        })
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            PriceBetPhase::Open => "Open",
            PriceBetPhase::Joined => "Joined",
            PriceBetPhase::Closed => "Closed",
        }
    }

    fn is_terminal(&self) -> bool {
        self.phase == PriceBetPhase::Closed
    }

    fn action_name(action: &PriceBetAction) -> &'static str {
        match action {
            PriceBetAction::Join => "join",
            PriceBetAction::Win => "win",
            PriceBetAction::Timeout => "timeout",
        }
    }

    fn authorize(&self, action: &PriceBetAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            PriceBetAction::Join => Ok(()),
            PriceBetAction::Win => self.roles.require(Role::Player, ctx.caller()),
            PriceBetAction::Timeout => self.roles.require(Role::Owner, ctx.caller()),
        }
    }

    fn apply(&mut self, action: PriceBetAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            PriceBetAction::Join => {
                if self.phase != PriceBetPhase::Open {
                    return Err(EngineError::wrong_phase(self.phase(), "join"));
                }
                if tx.attached() != self.pot {
                    return Err(EngineError::invalid_amount(format!(
                        "stake must equal the pot {}, got {}",
                        self.pot,
                        tx.attached()
                    )));
                }
                self.roles.bind(Role::Player, tx.caller().clone());
                self.phase = PriceBetPhase::Joined;
            }
            PriceBetAction::Win => {
                ensure_before(tx.now(), self.deadline)?;
                let reported = tx.read_nested(self.oracle, OracleView::ExchangeRate.into())?;
                let Some(rate) = reported.as_number() else {
                    return Err(EngineError::invalid_argument("oracle did not report a number"));
                };
                if rate != self.rate {
                    return Err(EngineError::invalid_argument(format!(
                        "oracle rate {rate} does not match the bet rate {}",
                        self.rate
                    )));
                }
                tx.close_to(&self.holder(Role::Player)?)?;
                self.phase = PriceBetPhase::Closed;
            }
            PriceBetAction::Timeout => {
                ensure_reached(tx.now(), self.deadline)?;
                tx.close_to(&self.holder(Role::Owner)?)?;
                self.phase = PriceBetPhase::Closed;
            }
        }
        Ok(())
    }

    fn read(&self, view: &PriceBetView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            PriceBetView::Phase => ViewValue::Phase(self.phase().to_string()),
            PriceBetView::Pot => ViewValue::Amount(self.pot),
            PriceBetView::Player => ViewValue::MaybeIdentity(self.roles.holder(Role::Player).cloned()),
            PriceBetView::Oracle => ViewValue::Contract(self.oracle),
        })
    }

    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        match self.phase {
            PriceBetPhase::Open => self.pot,
            PriceBetPhase::Joined => self.pot.checked_mul(2).unwrap_or(Amount::MAX),
            PriceBetPhase::Closed => Amount::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetypes::oracle::{OracleAction, OracleParams};
    use crate::testkit::{alice, bob, carol, TestEngine, RESERVE};

    const POT: Amount = Amount::new(400_000);

    fn setup(engine: &mut TestEngine, bet_rate: u64) -> (ContractId, ContractId) {
        let oracle = engine
            .create(&carol(), RESERVE, OracleParams { rate: 10 })
            .unwrap()
            .contract;
        let bet = engine
            .create(
                &alice(),
                RESERVE.checked_add(POT).unwrap(),
                PriceBetParams {
                    oracle,
                    deadline: Round::new(50),
                    rate: bet_rate,
                },
            )
            .unwrap()
            .contract;
        engine.call(bet, &bob(), POT, PriceBetAction::Join).unwrap();
        (oracle, bet)
    }

    #[test]
    fn test_second_join_rejected() {
        let mut engine = TestEngine::funded();
        let (_, bet) = setup(&mut engine, 10);
        let err = engine.call(bet, &carol(), POT, PriceBetAction::Join).unwrap_err();
        assert!(matches!(err, EngineError::WrongPhase { .. }));
    }

    #[test]
    fn test_win_when_rate_matches() {
        let mut engine = TestEngine::funded();
        let (_, bet) = setup(&mut engine, 10);
        let receipt = engine.call(bet, &bob(), Amount::ZERO, PriceBetAction::Win).unwrap();
        assert_eq!(receipt.phase, "Closed");
        assert_eq!(receipt.payments[0].to, bob());
        assert_eq!(receipt.payments[0].amount, Amount::new(900_000));
        // payment plus the nested oracle read
        assert_eq!(receipt.transaction.triggered.len(), 2);
    }

    #[test]
    fn test_win_rejected_on_rate_mismatch() {
        let mut engine = TestEngine::funded();
        let (oracle, bet) = setup(&mut engine, 10);
        engine
            .call(oracle, &carol(), Amount::ZERO, OracleAction::SetRate { rate: 9 })
            .unwrap();
        let err = engine.call(bet, &bob(), Amount::ZERO, PriceBetAction::Win).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
        assert_eq!(engine.record(&bet).unwrap().phase(), "Joined");
    }

    #[test]
    fn test_timeout_at_deadline() {
        let mut engine = TestEngine::funded();
        let (_, bet) = setup(&mut engine, 10);
        engine.advance(48);
        let err = engine.call(bet, &alice(), Amount::ZERO, PriceBetAction::Timeout).unwrap_err();
        assert!(err.is_retryable_later());

        engine.advance(1);
        let err = engine.call(bet, &bob(), Amount::ZERO, PriceBetAction::Win).unwrap_err();
        assert!(matches!(err, EngineError::DeadlinePassed { .. }));
        let receipt = engine.call(bet, &alice(), Amount::ZERO, PriceBetAction::Timeout).unwrap();
        assert_eq!(receipt.payments[0].to, alice());
    }
}
