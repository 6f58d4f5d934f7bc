//! Fee accounting across logical operations
//!
//! [`CostTracker`] folds receipts into per-payer and global totals. Each
//! ledger receipt is counted at most once, so recording both members of an
//! atomic group (or the same receipt twice) does not double-charge.

use std::collections::{BTreeMap, BTreeSet};

use custody_types::errors::LedgerError;
use custody_types::fee::{operation_receipts, ReceiptSource, TransactionReceipt};
use custody_types::ids::{Identity, TxId};
use custody_types::numeric::{Amount, BASE_UNIT_DECIMALS};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Cost summary in whole units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostReport {
    pub total: Decimal,
    pub by_payer: BTreeMap<Identity, Decimal>,
    pub receipts: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CostTracker {
    by_payer: BTreeMap<Identity, Amount>,
    counted: BTreeSet<TxId>,
    total: Amount,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every not-yet-counted receipt of the operation containing
    /// `receipt`. Returns the fees added by this call.
    pub fn record<S: ReceiptSource + ?Sized>(
        &mut self,
        source: &S,
        receipt: &TransactionReceipt,
    ) -> Result<Amount, LedgerError> {
        let mut added = Amount::ZERO;
        for member in operation_receipts(source, &receipt.id)? {
            if !self.counted.insert(member.id) || member.fee.is_zero() {
                continue;
            }
            let payer = self.by_payer.entry(member.sender.clone()).or_insert(Amount::ZERO);
            *payer = payer.checked_add(member.fee).ok_or(LedgerError::Overflow)?;
            added = added.checked_add(member.fee).ok_or(LedgerError::Overflow)?;
        }
        self.total = self.total.checked_add(added).ok_or(LedgerError::Overflow)?;
        Ok(added)
    }

    pub fn total(&self) -> Amount {
        self.total
    }

    pub fn paid_by(&self, payer: &Identity) -> Amount {
        self.by_payer.get(payer).copied().unwrap_or(Amount::ZERO)
    }

    pub fn total_units(&self) -> Decimal {
        self.total.to_units(BASE_UNIT_DECIMALS)
    }

    pub fn receipt_count(&self) -> usize {
        self.counted.len()
    }

    pub fn report(&self) -> CostReport {
        CostReport {
            total: self.total_units(),
            by_payer: self
                .by_payer
                .iter()
                .map(|(payer, fee)| (payer.clone(), fee.to_units(BASE_UNIT_DECIMALS)))
                .collect(),
            receipts: self.counted.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetypes::escrow::{EscrowAction, EscrowParams};
    use crate::config::LedgerConfig;
    use crate::engine::Engine;
    use crate::ledger::MemoryLedger;
    use crate::testkit::{alice, bob, RESERVE};
    use std::str::FromStr;

    fn engine() -> Engine<MemoryLedger> {
        let mut ledger = MemoryLedger::new(LedgerConfig::default());
        ledger.fund(&alice(), Amount::new(10_000_000)).unwrap();
        ledger.fund(&bob(), Amount::new(10_000_000)).unwrap();
        Engine::with_ledger(ledger)
    }

    #[test]
    fn test_grouped_operation_counted_once() {
        let mut engine = engine();
        let receipt = engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(100_000),
                },
            )
            .unwrap();

        let mut tracker = CostTracker::new();
        let added = tracker.record(engine.ledger(), &receipt.transaction).unwrap();
        // payment fee + create fee
        assert_eq!(added, Amount::new(2_000));
        assert_eq!(tracker.receipt_count(), 2);

        let again = tracker.record(engine.ledger(), &receipt.transaction).unwrap();
        assert_eq!(again, Amount::ZERO);
        assert_eq!(tracker.total(), Amount::new(2_000));
    }

    #[test]
    fn test_per_payer_totals() {
        let mut engine = engine();
        let create = engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(100_000),
                },
            )
            .unwrap();
        let id = create.contract;
        let deposit = engine
            .call(id, &bob(), Amount::new(100_000), EscrowAction::Deposit)
            .unwrap();
        let pay = engine.call(id, &bob(), Amount::ZERO, EscrowAction::Pay).unwrap();

        let mut tracker = CostTracker::new();
        for receipt in [&create.transaction, &deposit.transaction, &pay.transaction] {
            tracker.record(engine.ledger(), receipt).unwrap();
        }

        assert_eq!(tracker.paid_by(&alice()), Amount::new(2_000));
        // deposit: payment + call, pay: call pooling one inner payment
        assert_eq!(tracker.paid_by(&bob()), Amount::new(4_000));
        assert_eq!(tracker.total(), Amount::new(6_000));
        assert_eq!(tracker.total_units(), Decimal::from_str("0.006").unwrap());

        let report = tracker.report();
        assert_eq!(report.by_payer.len(), 2);
        assert_eq!(report.receipts, 6);
    }

    #[test]
    fn test_unknown_receipt_rejected() {
        let engine = engine();
        let mut tracker = CostTracker::new();
        let stray = TransactionReceipt {
            id: TxId::new(),
            kind: custody_types::fee::TxKind::AppCall,
            sender: alice(),
            fee: Amount::new(1_000),
            group: None,
            round: custody_types::numeric::Round::new(1),
            triggered: Vec::new(),
        };
        let err = tracker.record(engine.ledger(), &stray).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownTransaction { .. }));
        assert_eq!(tracker.total(), Amount::ZERO);
    }
}
