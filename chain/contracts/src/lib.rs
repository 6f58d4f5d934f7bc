//! Custodial state-machine contracts
//!
//! A family of small contracts that hold value on behalf of participants and
//! release it only through explicit, role-checked, deadline-checked
//! transitions. Every transition is atomic: either the state change, the
//! attached payment and all outgoing payments settle together on the ledger,
//! or nothing happens.
//!
//! # Modules
//! - `engine`: Create / call / read pipeline, custody reports
//! - `archetypes`: Escrow, vault, auction, crowdfund, vesting, bet, lottery,
//!   identity registry, wallet, HTLC, oracle, price bet, factory, product,
//!   simple transfer and payment splitter
//! - `transition`: Execution context, sub-balances, nested calls
//! - `payment`: Pay-or-close payment builder
//! - `ledger`: Ledger interface and the in-memory ledger
//! - `store`: Contract records, sub-balances, snapshots
//! - `security`: Role bindings, one-shot guards, call stack
//! - `clock`: Round-based deadline checks
//! - `commitment`: Hash locks, delegation keys, digests
//! - `accounting`: Fee totals across operations
//! - `config`: Engine and ledger configuration
//! - `events`: Contract events
//! - `errors`: Engine and authorization errors
//!
//! # Version
//! v0.1.0

pub mod accounting;
pub mod archetypes;
pub mod clock;
pub mod commitment;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod payment;
pub mod security;
pub mod store;
pub mod transition;

#[cfg(test)]
pub(crate) mod testkit;

/// Store snapshot format version; bump when a persisted record changes shape
pub const STATE_FORMAT_VERSION: u32 = 1;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::archetypes::{Action, ContractState, CreateParams, View, ViewValue};
    pub use crate::config::{EngineConfig, LedgerConfig, LotteryWindows};
    pub use crate::engine::{ActionReceipt, CustodyReport, Engine};
    pub use crate::errors::{AuthError, EngineError};
    pub use crate::events::ContractEvent;
    pub use crate::ledger::{Ledger, MemoryLedger, Submission};
    pub use crate::payment::{PaymentAction, TransferKind};
    pub use crate::security::Role;
    pub use custody_types::prelude::*;
}
