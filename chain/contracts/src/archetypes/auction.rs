//! Auction — open ascending bids with per-bidder sub-balances
//!
//! `WaitStart → start → WaitClosing → bid* → end → Closed`
//!
//! Every bid is held in the bidder's sub-balance. A new bid first refunds
//! the caller's own previous bid. Outbid leaders are refunded right away
//! under [`RefundPolicy::Immediate`], or pull their funds with `withdraw`
//! under [`RefundPolicy::Deferred`]. At `end` the winning bid goes to the
//! seller and every remaining losing bid is returned.

use custody_types::ids::Identity;
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use super::{Archetype, ViewValue};
use crate::clock::{ensure_before, ensure_reached};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

/// When an outbid leader gets their bid back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RefundPolicy {
    /// Refunded inside the outbidding transition
    #[default]
    Immediate,
    /// Kept in the sub-balance until the bidder calls `withdraw`
    Deferred,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionPhase {
    WaitStart,
    WaitClosing,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuctionParams {
    /// A first bid must exceed this
    pub starting_bid: Amount,
    #[serde(default)]
    pub refund_policy: RefundPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionAction {
    Start { duration: u64 },
    Bid,
    Withdraw,
    End,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionView {
    Phase,
    HighestBid,
    HighestBidder,
    BidOf(Identity),
    EndTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    roles: RoleBindings,
    policy: RefundPolicy,
    phase: AuctionPhase,
    end_time: Option<Round>,
    highest_bid: Amount,
    highest_bidder: Option<Identity>,
}

impl Auction {
    fn expect_phase(&self, expected: AuctionPhase, action: &AuctionAction) -> Result<(), EngineError> {
        if self.phase != expected {
            return Err(EngineError::wrong_phase(self.phase(), Self::action_name(action)));
        }
        Ok(())
    }

    fn end_time(&self) -> Result<Round, EngineError> {
        self.end_time
            .ok_or_else(|| EngineError::wrong_phase(self.phase(), "bid"))
    }

    fn refund(tx: &mut Transition<'_>, bidder: &Identity) -> Result<Amount, EngineError> {
        let held = tx.take_sub_balance(bidder);
        tx.pay_or_close(bidder, held)?;
        Ok(held)
    }
}

impl Archetype for Auction {
    const NAME: &'static str = "auction";

    type Params = AuctionParams;
    type Action = AuctionAction;
    type View = AuctionView;

    fn create(params: AuctionParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        Ok(Self {
            roles: RoleBindings::new().with(Role::Seller, tx.caller().clone()),
            policy: params.refund_policy,
            phase: AuctionPhase::WaitStart,
            end_time: None,
            highest_bid: params.starting_bid,
            highest_bidder: None,
        })
    }

    fn phase(&self) -> &'static str {
        match self.phase {
            AuctionPhase::WaitStart => "WaitStart",
            AuctionPhase::WaitClosing => "WaitClosing",
            AuctionPhase::Closed => "Closed",
        }
    }

    fn is_terminal(&self) -> bool {
        self.phase == AuctionPhase::Closed
    }

    fn action_name(action: &AuctionAction) -> &'static str {
        match action {
            AuctionAction::Start { .. } => "start",
            AuctionAction::Bid => "bid",
            AuctionAction::Withdraw => "withdraw",
            AuctionAction::End => "end",
        }
    }

    fn authorize(&self, action: &AuctionAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            AuctionAction::Start { .. } | AuctionAction::End => self.roles.require(Role::Seller, ctx.caller()),
            AuctionAction::Bid => Ok(()),
            AuctionAction::Withdraw => {
                if self.highest_bidder.as_ref() == Some(ctx.caller()) {
                    return Err(AuthError::ineligible(ctx.caller(), "highest bidder cannot withdraw"));
                }
                Ok(())
            }
        }
    }

    fn apply(&mut self, action: AuctionAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            AuctionAction::Start { duration } => {
                self.expect_phase(AuctionPhase::WaitStart, &action)?;
                let end = tx.now().checked_add(duration).ok_or(EngineError::Overflow)?;
                self.end_time = Some(end);
                self.phase = AuctionPhase::WaitClosing;
            }
            AuctionAction::Bid => {
                self.expect_phase(AuctionPhase::WaitClosing, &action)?;
                ensure_before(tx.now(), self.end_time()?)?;
                if tx.attached() <= self.highest_bid {
                    return Err(EngineError::invalid_amount(format!(
                        "bid {} must exceed highest bid {}",
                        tx.attached(),
                        self.highest_bid
                    )));
                }
                let bidder = tx.caller().clone();
                Self::refund(tx, &bidder)?;
                if self.policy == RefundPolicy::Immediate {
                    if let Some(leader) = self.highest_bidder.clone().filter(|leader| *leader != bidder) {
                        Self::refund(tx, &leader)?;
                    }
                }
                let bid = tx.attached();
                tx.set_sub_balance(&bidder, bid);
                self.highest_bid = bid;
                self.highest_bidder = Some(bidder);
            }
            AuctionAction::Withdraw => {
                self.expect_phase(AuctionPhase::WaitClosing, &action)?;
                let caller = tx.caller().clone();
                Self::refund(tx, &caller)?;
            }
            AuctionAction::End => {
                self.expect_phase(AuctionPhase::WaitClosing, &action)?;
                ensure_reached(tx.now(), self.end_time()?)?;
                let seller = self
                    .roles
                    .holder(Role::Seller)
                    .cloned()
                    .ok_or(EngineError::NotAuthorized(AuthError::Unbound { role: Role::Seller }))?;
                if let Some(winner) = &self.highest_bidder {
                    let winning = tx.take_sub_balance(winner);
                    tx.pay_or_close(&seller, winning)?;
                }
                for (bidder, held) in tx.participants() {
                    if !held.is_zero() {
                        Self::refund(tx, &bidder)?;
                    }
                }
                self.phase = AuctionPhase::Closed;
            }
        }
        Ok(())
    }

    fn read(&self, view: &AuctionView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            AuctionView::Phase => ViewValue::Phase(self.phase().to_string()),
            AuctionView::HighestBid => ViewValue::Amount(self.highest_bid),
            AuctionView::HighestBidder => ViewValue::MaybeIdentity(self.highest_bidder.clone()),
            AuctionView::BidOf(bidder) => ViewValue::Amount(ctx.sub_balance(bidder)),
            AuctionView::EndTime => match self.end_time {
                Some(end) => ViewValue::Round(end),
                None => ViewValue::Unit,
            },
        })
    }

    fn owed(&self, ctx: &ReadContext<'_>) -> Amount {
        ctx.sub_balance_total()
    }
}
