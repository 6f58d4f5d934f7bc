//! Contract events
//!
//! Immutable records appended by the engine after a transition has been
//! settled by the ledger. Rejected actions emit nothing.

use custody_types::ids::{ContractId, Identity, TxId};
use custody_types::numeric::Round;
use serde::{Deserialize, Serialize};

use crate::payment::PaymentAction;

/// New contract instance (top-level or spawned by another contract)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCreated {
    pub contract: ContractId,
    pub archetype: String,
    pub creator: Identity,
    pub round: Round,
    pub tx_id: TxId,
}

/// Accepted action on an existing contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionApplied {
    pub contract: ContractId,
    pub action: String,
    pub caller: Identity,
    /// Phase after the transition
    pub phase: String,
    pub round: Round,
    pub tx_id: TxId,
}

/// Outgoing transfer settled as part of a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEmitted {
    pub contract: ContractId,
    pub payment: PaymentAction,
    pub tx_id: TxId,
}

/// Enum wrapper for all contract events, enabling uniform handling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContractEvent {
    Created(ContractCreated),
    ActionApplied(ActionApplied),
    PaymentEmitted(PaymentEmitted),
}

impl ContractEvent {
    pub fn contract(&self) -> ContractId {
        match self {
            Self::Created(e) => e.contract,
            Self::ActionApplied(e) => e.contract,
            Self::PaymentEmitted(e) => e.contract,
        }
    }
}
