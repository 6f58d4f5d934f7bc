//! Contract-specific error types
//!
//! Every rejected action is atomic: no state, sub-balance or ledger change
//! survives an `Err`.

use custody_types::errors::LedgerError;
use custody_types::ids::{ContractId, Identity};
use custody_types::numeric::{Amount, Round};
use thiserror::Error;

use crate::security::Role;

/// Authorization failures raised by the role resolver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuthError {
    #[error("Caller {caller} does not hold role {role:?}")]
    MissingRole { caller: Identity, role: Role },

    #[error("Role {role:?} is not bound yet")]
    Unbound { role: Role },

    #[error("Caller {caller} is not eligible: {reason}")]
    Ineligible { caller: Identity, reason: String },
}

impl AuthError {
    pub fn ineligible(caller: &Identity, reason: impl Into<String>) -> Self {
        Self::Ineligible {
            caller: caller.clone(),
            reason: reason.into(),
        }
    }
}

/// Engine-level error returned by `create`, `call` and `read`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Action {action} not allowed in phase {phase}")]
    WrongPhase { phase: String, action: String },

    #[error("Not authorized: {0}")]
    NotAuthorized(#[from] AuthError),

    #[error("Deadline not reached: round {now}, deadline {deadline}")]
    DeadlineNotReached { deadline: Round, now: Round },

    #[error("Deadline passed: round {now}, deadline {deadline}")]
    DeadlinePassed { deadline: Round, now: Round },

    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },

    #[error("Insufficient reserve: required {required}, available {available}")]
    InsufficientReserve { required: Amount, available: Amount },

    #[error("Already processed: {what}")]
    AlreadyProcessed { what: String },

    #[error("Nested call into {contract} failed: {source}")]
    NestedCallFailed {
        contract: ContractId,
        source: Box<EngineError>,
    },

    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    #[error("Unknown contract: {contract}")]
    UnknownContract { contract: ContractId },

    #[error("Action {action} not supported by {archetype}")]
    UnsupportedAction { archetype: String, action: String },

    #[error("Reentrancy detected: {contract} is already executing")]
    Reentrancy { contract: ContractId },

    #[error("Ledger rejected settlement: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Arithmetic overflow")]
    Overflow,
}

impl EngineError {
    pub fn wrong_phase(phase: &str, action: &str) -> Self {
        Self::WrongPhase {
            phase: phase.to_string(),
            action: action.to_string(),
        }
    }

    pub fn invalid_amount(reason: impl Into<String>) -> Self {
        Self::InvalidAmount {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn nested(contract: ContractId, source: EngineError) -> Self {
        Self::NestedCallFailed {
            contract,
            source: Box::new(source),
        }
    }

    /// `true` when the same action may succeed unchanged at a later round.
    ///
    /// Only an unreached deadline qualifies; every other error is permanent
    /// for the given state.
    pub fn is_retryable_later(&self) -> bool {
        match self {
            Self::DeadlineNotReached { .. } => true,
            Self::NestedCallFailed { source, .. } => source.is_retryable_later(),
            _ => false,
        }
    }

    /// Short stable name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WrongPhase { .. } => "wrong_phase",
            Self::NotAuthorized(_) => "not_authorized",
            Self::DeadlineNotReached { .. } => "deadline_not_reached",
            Self::DeadlinePassed { .. } => "deadline_passed",
            Self::InvalidAmount { .. } => "invalid_amount",
            Self::InsufficientReserve { .. } => "insufficient_reserve",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::NestedCallFailed { .. } => "nested_call_failed",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::UnknownContract { .. } => "unknown_contract",
            Self::UnsupportedAction { .. } => "unsupported_action",
            Self::Reentrancy { .. } => "reentrancy",
            Self::Ledger(_) => "ledger",
            Self::Overflow => "overflow",
        }
    }
}
