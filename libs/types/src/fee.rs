//! Transaction receipts and fee accounting
//!
//! A logical operation may fan out into several ledger transactions:
//! - an atomic group (attached payment + application call)
//! - inner transactions triggered by the application (payouts, nested calls)
//!
//! [`total_cost`] reconstructs what the operation cost from the receipts.

use crate::errors::LedgerError;
use crate::ids::{GroupId, Identity, TxId};
use crate::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Kind of ledger transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    /// Value transfer
    Payment,
    /// Application call (top-level or nested)
    AppCall,
    /// Contract creation
    AppCreate,
}

/// Receipt returned by the ledger for a settled transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub id: TxId,
    pub kind: TxKind,
    pub sender: Identity,
    pub fee: Amount,
    pub group: Option<GroupId>,
    pub round: Round,
    /// Inner transactions this one triggered
    pub triggered: Vec<TxId>,
}

/// Flat fee schedule with inner-transaction fee pooling
///
/// The outer application call pays one base fee for itself and one for every
/// inner transaction it triggers; inner transactions carry a zero fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub base_fee: Amount,
}

impl FeeSchedule {
    pub const DEFAULT_BASE_FEE: Amount = Amount::new(1_000);

    pub fn new(base_fee: Amount) -> Self {
        Self { base_fee }
    }

    /// Fee charged to a plain payment
    pub fn payment_fee(&self) -> Amount {
        self.base_fee
    }

    /// Fee charged to an application call that triggers `inner` transactions
    pub fn app_call_fee(&self, inner: usize) -> Option<Amount> {
        let count = (inner as u64).checked_add(1)?;
        self.base_fee.checked_mul(count)
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BASE_FEE)
    }
}

/// Lookup of settled receipts
pub trait ReceiptSource {
    fn receipt(&self, id: &TxId) -> Option<&TransactionReceipt>;

    /// Every top-level member of an atomic group
    fn group_members(&self, group: &GroupId) -> Vec<TxId>;
}

/// Total cost of the logical operation containing `id`
///
/// Grouped transactions cost the sum over all group members; each member
/// adds the fees of everything it transitively triggered. Each receipt is
/// counted at most once.
pub fn total_cost<S: ReceiptSource + ?Sized>(source: &S, id: &TxId) -> Result<Amount, LedgerError> {
    operation_receipts(source, id)?
        .iter()
        .try_fold(Amount::ZERO, |total, receipt| total.checked_add(receipt.fee))
        .ok_or(LedgerError::Overflow)
}

/// Every receipt belonging to the logical operation containing `id`
pub fn operation_receipts<'a, S: ReceiptSource + ?Sized>(
    source: &'a S,
    id: &TxId,
) -> Result<Vec<&'a TransactionReceipt>, LedgerError> {
    let receipt = source
        .receipt(id)
        .ok_or(LedgerError::UnknownTransaction { tx_id: *id })?;

    let mut pending: Vec<TxId> = match &receipt.group {
        Some(group) => source.group_members(group),
        None => vec![*id],
    };
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    while let Some(next) = pending.pop() {
        if !seen.insert(next) {
            continue;
        }
        let receipt = source
            .receipt(&next)
            .ok_or(LedgerError::UnknownTransaction { tx_id: next })?;
        pending.extend(receipt.triggered.iter().copied());
        out.push(receipt);
    }

    Ok(out)
}
