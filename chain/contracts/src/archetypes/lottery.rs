//! Lottery — two-player commit/reveal game
//!
//! Each player commits to `keccak256(secret)` with an equal stake, then both
//! reveal. Every waiting phase has an escape that closes the account to the
//! player who is not at fault once the relevant window has elapsed.
//!
//! ```text
//! Join0 → join0 → Join1 → join1 → Reveal0 → reveal0 → Reveal1 → reveal1 → Win → win → End
//!                   │                 │                   │
//!          redeem0_nojoin1   redeem1_noreveal0   redeem0_noreveal1 ──────────────→ End
//! ```
//!
//! The winner is picked from the parity of the combined secret lengths.
//! Either player can choose their secret length after seeing nothing but a
//! hash, and the second revealer already knows the first secret, so this is
//! not a fair source of randomness. It is kept unchanged and logged.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{require_value, Archetype, ViewValue};
use crate::clock::{ensure_not_after, ensure_passed};
use crate::commitment::{Digest32, HashLock};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryPhase {
    Join0,
    Join1,
    Reveal0,
    Reveal1,
    Win,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LotteryParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryAction {
    Join0 { hash: Digest32 },
    Join1 { hash: Digest32 },
    Reveal0 { secret: Vec<u8> },
    Reveal1 { secret: Vec<u8> },
    Win,
    Redeem0NoJoin1,
    Redeem1NoReveal0,
    Redeem0NoReveal1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LotteryView {
    Phase,
    Bet,
    EndJoin,
    EndReveal,
    Player0,
    Player1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lottery {
    roles: RoleBindings,
    end_join: Round,
    end_reveal: Round,
    reveal_extension: u64,
    bet: Amount,
    hash0: Option<HashLock>,
    hash1: Option<HashLock>,
    secret0: Vec<u8>,
    secret1: Vec<u8>,
    phase: LotteryPhase,
}

impl Lottery {
    fn holder(&self, role: Role) -> Result<Identity, EngineError> {
        self.roles
            .holder(role)
            .cloned()
            .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role }))
    }

    fn expect_phase(&self, expected: LotteryPhase, action: &LotteryAction) -> Result<(), EngineError> {
        if self.phase != expected {
            return Err(EngineError::wrong_phase(self.phase(), Self::action_name(action)));
        }
        Ok(())
    }

    fn reveal_deadline(&self) -> Round {
        self.end_reveal.saturating_add(self.reveal_extension)
    }

    fn lock(lock: &Option<HashLock>) -> Result<&HashLock, EngineError> {
        lock.as_ref()
            .ok_or_else(|| EngineError::invalid_argument("no commitment recorded"))
    }

    /// Player 0 wins on an even combined secret length.
    fn winner(&self) -> Result<Identity, EngineError> {
        let combined = self.secret0.len() + self.secret1.len();
        warn!(
            combined_length = combined,
            "lottery winner chosen from secret length parity; players can bias this"
        );
        if combined % 2 == 0 {
            self.holder(Role::Player0)
        } else {
            self.holder(Role::Player1)
        }
    }

    fn redeem(&mut self, role: Role, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        tx.close_to(&self.holder(role)?)?;
        self.phase = LotteryPhase::End;
        Ok(())
    }
}

impl Archetype for Lottery {
    const NAME: &'static str = "lottery";

    type Params = LotteryParams;
    type Action = LotteryAction;
    type View = LotteryView;

    fn create(_params: LotteryParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        let windows = tx.config().lottery;
        let now = tx.now();
        Ok(Self {
            roles: RoleBindings::new().with(Role::Creator, tx.caller().clone()),
            end_join: now.checked_add(windows.join_window).ok_or(EngineError::Overflow)?,
            end_reveal: now.checked_add(windows.reveal_window).ok_or(EngineError::Overflow)?,
            reveal_extension: windows.reveal_extension,
            bet: Amount::ZERO,
            hash0: None,
            hash1: None,
            secret0: Vec::new(),
            secret1: Vec::new(),
            phase: LotteryPhase::Join0,
        })
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            LotteryPhase::Join0 => "Join0",
            LotteryPhase::Join1 => "Join1",
            LotteryPhase::Reveal0 => "Reveal0",
            LotteryPhase::Reveal1 => "Reveal1",
            LotteryPhase::Win => "Win",
            LotteryPhase::End => "End",
        }
    }

    fn is_terminal(&self) -> bool {
        self.phase == LotteryPhase::End
    }

    fn action_name(action: &LotteryAction) -> &'static str {
        match action {
            LotteryAction::Join0 { .. } => "join0",
            LotteryAction::Join1 { .. } => "join1",
            LotteryAction::Reveal0 { .. } => "reveal0",
            LotteryAction::Reveal1 { .. } => "reveal1",
            LotteryAction::Win => "win",
            LotteryAction::Redeem0NoJoin1 => "redeem0_nojoin1",
            LotteryAction::Redeem1NoReveal0 => "redeem1_noreveal0",
            LotteryAction::Redeem0NoReveal1 => "redeem0_noreveal1",
        }
    }

    fn authorize(&self, action: &LotteryAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        let caller = ctx.caller();
        match action {
            LotteryAction::Join0 { .. } | LotteryAction::Win => Ok(()),
            LotteryAction::Join1 { .. } => {
                if self.roles.is(Role::Player0, caller) {
                    return Err(AuthError::ineligible(caller, "player 0 cannot also join as player 1"));
                }
                Ok(())
            }
            LotteryAction::Reveal0 { .. } | LotteryAction::Redeem0NoJoin1 | LotteryAction::Redeem0NoReveal1 => {
                self.roles.require(Role::Player0, caller)
            }
            LotteryAction::Reveal1 { .. } | LotteryAction::Redeem1NoReveal0 => self.roles.require(Role::Player1, caller),
        }
    }

    fn apply(&mut self, action: LotteryAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match &action {
            LotteryAction::Join0 { hash } => {
                self.expect_phase(LotteryPhase::Join0, &action)?;
                require_value(tx.attached(), "stake")?;
                self.roles.bind(Role::Player0, tx.caller().clone());
                self.hash0 = Some(HashLock::new(*hash));
                self.bet = tx.attached();
                self.phase = LotteryPhase::Join1;
            }
            LotteryAction::Join1 { hash } => {
                self.expect_phase(LotteryPhase::Join1, &action)?;
                ensure_not_after(tx.now(), self.end_join)?;
                if Self::lock(&self.hash0)?.hash == *hash {
                    return Err(EngineError::invalid_argument("commitment must differ from player 0's"));
                }
                if tx.attached() != self.bet {
                    return Err(EngineError::invalid_amount(format!(
                        "stake must equal the bet {}, got {}",
                        self.bet,
                        tx.attached()
                    )));
                }
                self.roles.bind(Role::Player1, tx.caller().clone());
                self.hash1 = Some(HashLock::new(*hash));
                self.phase = LotteryPhase::Reveal0;
            }
            LotteryAction::Reveal0 { secret } => {
                self.expect_phase(LotteryPhase::Reveal0, &action)?;
                ensure_not_after(tx.now(), self.end_reveal)?;
                Self::lock(&self.hash0)?.open(secret)?;
                self.secret0 = secret.clone();
                self.phase = LotteryPhase::Reveal1;
            }
            LotteryAction::Reveal1 { secret } => {
                self.expect_phase(LotteryPhase::Reveal1, &action)?;
                ensure_not_after(tx.now(), self.reveal_deadline())?;
                Self::lock(&self.hash1)?.open(secret)?;
                self.secret1 = secret.clone();
                self.phase = LotteryPhase::Win;
            }
            LotteryAction::Win => {
                self.expect_phase(LotteryPhase::Win, &action)?;
                let winner = self.winner()?;
                tx.close_to(&winner)?;
                self.phase = LotteryPhase::End;
            }
            LotteryAction::Redeem0NoJoin1 => {
                self.expect_phase(LotteryPhase::Join1, &action)?;
                ensure_passed(tx.now(), self.end_join)?;
                self.redeem(Role::Player0, tx)?;
            }
            LotteryAction::Redeem1NoReveal0 => {
                self.expect_phase(LotteryPhase::Reveal0, &action)?;
                ensure_passed(tx.now(), self.end_reveal)?;
                self.redeem(Role::Player1, tx)?;
            }
            LotteryAction::Redeem0NoReveal1 => {
                self.expect_phase(LotteryPhase::Reveal1, &action)?;
                ensure_passed(tx.now(), self.reveal_deadline())?;
                self.redeem(Role::Player0, tx)?;
            }
        }
        Ok(())
    }

    fn read(&self, view: &LotteryView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            LotteryView::Phase => ViewValue::Phase(self.phase().to_string()),
            LotteryView::Bet => ViewValue::Amount(self.bet),
            LotteryView::EndJoin => ViewValue::Round(self.end_join),
            LotteryView::EndReveal => ViewValue::Round(self.end_reveal),
            LotteryView::Player0 => ViewValue::MaybeIdentity(self.roles.holder(Role::Player0).cloned()),
            LotteryView::Player1 => ViewValue::MaybeIdentity(self.roles.holder(Role::Player1).cloned()),
        })
    }

    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        match self.phase {
            LotteryPhase::Join1 => self.bet,
            LotteryPhase::Reveal0 | LotteryPhase::Reveal1 | LotteryPhase::Win => {
                self.bet.checked_mul(2).unwrap_or(Amount::MAX)
            }
            LotteryPhase::Join0 | LotteryPhase::End => Amount::ZERO,
        }
    }
}
