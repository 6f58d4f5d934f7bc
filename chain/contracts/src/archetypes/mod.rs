//! Contract archetypes
//!
//! Each archetype is a tagged-variant state machine: a phase enum, roles
//! bound at creation, an immutable parameter struct and a few mutable
//! fields. `apply` is a match over `(phase, action)`.
//!
//! The registry macro at the bottom of this file generates the closed
//! [`ContractState`], [`CreateParams`], [`Action`] and [`View`] enums and
//! dispatches to the matching [`Archetype`] implementation.

use custody_types::ids::{ContractId, Identity};
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};

use crate::commitment::Digest32;
use crate::errors::{AuthError, EngineError};
use crate::transition::{ReadContext, Transition};

pub mod auction;
pub mod bet;
pub mod crowdfund;
pub mod escrow;
pub mod factory;
pub mod htlc;
pub mod identity_registry;
pub mod lottery;
pub mod oracle;
pub mod payment_splitter;
pub mod price_bet;
pub mod product;
pub mod simple_transfer;
pub mod vault;
pub mod vesting;
pub mod wallet;

/// Behaviour shared by every archetype
pub trait Archetype: Sized {
    const NAME: &'static str;

    type Params;
    type Action;
    type View;

    /// Build the initial state. Runs inside the creation transition, so the
    /// attached value and the creator are available from `tx`.
    fn create(params: Self::Params, tx: &mut Transition<'_>) -> Result<Self, EngineError>;

    fn phase(&self) -> &'static str;

    /// Terminal phases reject every action.
    fn is_terminal(&self) -> bool {
        false
    }

    fn action_name(action: &Self::Action) -> &'static str;

    /// Role check for `(action, caller)`. Pure.
    fn authorize(&self, action: &Self::Action, ctx: &ReadContext<'_>) -> Result<(), AuthError>;

    /// Phase, deadline and amount checks, then the mutation and payments.
    fn apply(&mut self, action: Self::Action, tx: &mut Transition<'_>) -> Result<(), EngineError>;

    fn read(&self, view: &Self::View, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError>;

    /// Value the contract currently owes to participants
    fn owed(&self, _ctx: &ReadContext<'_>) -> Amount {
        Amount::ZERO
    }
}

/// Result of a view or of an action that returns a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ViewValue {
    Unit,
    Bool(bool),
    Number(u64),
    Amount(Amount),
    Round(Round),
    Identity(Identity),
    MaybeIdentity(Option<Identity>),
    Contract(ContractId),
    Text(String),
    Digest(Digest32),
    Phase(String),
}

impl ViewValue {
    pub fn as_amount(&self) -> Option<Amount> {
        match self {
            Self::Amount(amount) => Some(*amount),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_contract(&self) -> Option<ContractId> {
        match self {
            Self::Contract(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_identity(&self) -> Option<&Identity> {
        match self {
            Self::Identity(id) => Some(id),
            Self::MaybeIdentity(id) => id.as_ref(),
            _ => None,
        }
    }
}

/// Reject a zero identity passed as an argument.
pub(crate) fn require_address(who: &Identity, what: &str) -> Result<(), EngineError> {
    if who.is_zero() {
        return Err(EngineError::invalid_argument(format!("{what} must not be the zero address")));
    }
    Ok(())
}

/// Reject a zero attached value.
pub(crate) fn require_value(attached: Amount, what: &str) -> Result<(), EngineError> {
    if attached.is_zero() {
        return Err(EngineError::invalid_amount(format!("{what} must be positive")));
    }
    Ok(())
}

macro_rules! archetype_registry {
    ($($variant:ident($state:ty, $params:ty, $action:ty, $view:ty)),+ $(,)?) => {
        /// State of any contract instance
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(tag = "archetype", content = "state", rename_all = "snake_case")]
        pub enum ContractState {
            $($variant($state),)+
        }

        /// Creation parameters, one variant per archetype
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum CreateParams {
            $($variant($params),)+
        }

        /// Action request, one variant per archetype
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum Action {
            $($variant($action),)+
        }

        /// View request, one variant per archetype
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum View {
            $($variant($view),)+
        }

        $(
            impl From<$params> for CreateParams {
                fn from(params: $params) -> Self {
                    CreateParams::$variant(params)
                }
            }

            impl From<$action> for Action {
                fn from(action: $action) -> Self {
                    Action::$variant(action)
                }
            }

            impl From<$view> for View {
                fn from(view: $view) -> Self {
                    View::$variant(view)
                }
            }
        )+

        impl CreateParams {
            pub fn archetype(&self) -> &'static str {
                match self {
                    $(CreateParams::$variant(_) => <$state as Archetype>::NAME,)+
                }
            }
        }

        impl Action {
            pub fn archetype(&self) -> &'static str {
                match self {
                    $(Action::$variant(_) => <$state as Archetype>::NAME,)+
                }
            }

            pub fn name(&self) -> &'static str {
                match self {
                    $(Action::$variant(action) => <$state as Archetype>::action_name(action),)+
                }
            }
        }

        impl View {
            pub fn archetype(&self) -> &'static str {
                match self {
                    $(View::$variant(_) => <$state as Archetype>::NAME,)+
                }
            }
        }

        impl ContractState {
            pub fn create(params: CreateParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
                match params {
                    $(CreateParams::$variant(params) => {
                        Ok(ContractState::$variant(<$state as Archetype>::create(params, tx)?))
                    })+
                }
            }

            pub fn archetype(&self) -> &'static str {
                match self {
                    $(ContractState::$variant(_) => <$state as Archetype>::NAME,)+
                }
            }

            pub fn phase(&self) -> &'static str {
                match self {
                    $(ContractState::$variant(state) => state.phase(),)+
                }
            }

            pub fn is_terminal(&self) -> bool {
                match self {
                    $(ContractState::$variant(state) => state.is_terminal(),)+
                }
            }

            pub fn authorize(&self, action: &Action, ctx: &ReadContext<'_>) -> Result<(), EngineError> {
                match (self, action) {
                    $((ContractState::$variant(state), Action::$variant(action)) => {
                        state.authorize(action, ctx).map_err(EngineError::from)
                    })+
                    _ => Err(self.unsupported(action.name())),
                }
            }

            pub fn apply(&mut self, action: Action, tx: &mut Transition<'_>) -> Result<(), EngineError> {
                match (self, action) {
                    $((ContractState::$variant(state), Action::$variant(action)) => state.apply(action, tx),)+
                    (state, action) => Err(state.unsupported(action.name())),
                }
            }

            pub fn read(&self, view: &View, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
                match (self, view) {
                    $((ContractState::$variant(state), View::$variant(view)) => state.read(view, ctx),)+
                    _ => Err(self.unsupported(view.archetype())),
                }
            }

            pub fn owed(&self, ctx: &ReadContext<'_>) -> Amount {
                match self {
                    $(ContractState::$variant(state) => state.owed(ctx),)+
                }
            }

            fn unsupported(&self, action: &str) -> EngineError {
                EngineError::UnsupportedAction {
                    archetype: self.archetype().to_string(),
                    action: action.to_string(),
                }
            }
        }
    };
}

archetype_registry! {
    Escrow(escrow::Escrow, escrow::EscrowParams, escrow::EscrowAction, escrow::EscrowView),
    Vault(vault::Vault, vault::VaultParams, vault::VaultAction, vault::VaultView),
    Auction(auction::Auction, auction::AuctionParams, auction::AuctionAction, auction::AuctionView),
    Crowdfund(crowdfund::Crowdfund, crowdfund::CrowdfundParams, crowdfund::CrowdfundAction, crowdfund::CrowdfundView),
    Vesting(vesting::Vesting, vesting::VestingParams, vesting::VestingAction, vesting::VestingView),
    Bet(bet::Bet, bet::BetParams, bet::BetAction, bet::BetView),
    Lottery(lottery::Lottery, lottery::LotteryParams, lottery::LotteryAction, lottery::LotteryView),
    IdentityRegistry(
        identity_registry::IdentityRegistry,
        identity_registry::RegistryParams,
        identity_registry::RegistryAction,
        identity_registry::RegistryView
    ),
    Wallet(wallet::Wallet, wallet::WalletParams, wallet::WalletAction, wallet::WalletView),
    Htlc(htlc::Htlc, htlc::HtlcParams, htlc::HtlcAction, htlc::HtlcView),
    Oracle(oracle::Oracle, oracle::OracleParams, oracle::OracleAction, oracle::OracleView),
    PriceBet(price_bet::PriceBet, price_bet::PriceBetParams, price_bet::PriceBetAction, price_bet::PriceBetView),
    Factory(factory::Factory, factory::FactoryParams, factory::FactoryAction, factory::FactoryView),
    Product(product::Product, product::ProductParams, product::ProductAction, product::ProductView),
    SimpleTransfer(
        simple_transfer::SimpleTransfer,
        simple_transfer::SimpleTransferParams,
        simple_transfer::SimpleTransferAction,
        simple_transfer::SimpleTransferView
    ),
    PaymentSplitter(
        payment_splitter::PaymentSplitter,
        payment_splitter::SplitterParams,
        payment_splitter::SplitterAction,
        payment_splitter::SplitterView
    ),
}
