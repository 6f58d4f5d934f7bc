//! Types library for the custodial contract engine
//!
//! Core type definitions shared by the ledger layer and the contract engine:
//! identities, integer amounts and rounds, the account model, and
//! transaction receipts with fee reconstruction.
//!
//! # Modules
//! - `ids`: Unique identifiers (ContractId, TxId, GroupId, Identity)
//! - `numeric`: Integer base-unit amounts and ledger rounds
//! - `account`: Ledger accounts and the read-only account model
//! - `fee`: Transaction receipts, fee schedule, total cost reconstruction
//! - `errors`: Ledger error taxonomy

pub mod account;
pub mod errors;
pub mod fee;
pub mod ids;
pub mod numeric;

// Library version constant
pub const LIB_VERSION: &str = "1.0.0";

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::account::*;
    pub use crate::errors::*;
    pub use crate::fee::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
}
