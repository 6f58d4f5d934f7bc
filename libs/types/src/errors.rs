//! Error types for the ledger layer
//!
//! Raised by ledger implementations when a settlement cannot be applied or
//! a receipt cannot be found during cost reconstruction.

use crate::ids::{Identity, TxId};
use crate::numeric::Amount;
use thiserror::Error;

/// Ledger-level error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Insufficient funds in {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: Identity,
        required: Amount,
        available: Amount,
    },

    #[error("Transfer would leave {account} below its reserve of {reserve}")]
    BelowReserve { account: Identity, reserve: Amount },

    #[error("Unknown transaction: {tx_id}")]
    UnknownTransaction { tx_id: TxId },

    #[error("Arithmetic overflow in ledger accounting")]
    Overflow,
}
