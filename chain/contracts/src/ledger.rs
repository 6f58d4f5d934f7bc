//! Ledger interface and in-memory ledger
//!
//! The engine hands every accepted transition to a [`Ledger`] as one
//! [`Submission`]: the value attached by the caller, the payments planned
//! by the contract, and the nested application calls it made. The ledger
//! settles all of it atomically or rejects it.
//!
//! [`MemoryLedger`] implements the interface for tests and simulations:
//! - balances per identity and a manually advanced round counter
//! - the attached payment and the call form an atomic group
//! - inner transactions carry a zero fee; the outer call pays for them
//! - a partial transfer may not leave a contract account below its reserve

use std::collections::{BTreeMap, HashMap};

use custody_types::account::{Account, AccountModel};
use custody_types::errors::LedgerError;
use custody_types::fee::{ReceiptSource, TransactionReceipt, TxKind};
use custody_types::ids::{GroupId, Identity, TxId};
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock::Clock;
use crate::config::LedgerConfig;
use crate::payment::{PaymentAction, TransferKind};

/// Nested application call made during a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnerCall {
    pub application: Identity,
    pub kind: TxKind,
}

/// Everything one accepted transition asks the ledger to settle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub sender: Identity,
    pub application: Identity,
    /// `AppCall` or `AppCreate`
    pub kind: TxKind,
    /// Value the sender attaches to the call
    pub attached: Amount,
    pub payments: Vec<PaymentAction>,
    pub inner_calls: Vec<InnerCall>,
}

/// Ledger consumed by the engine
pub trait Ledger: Clock + AccountModel + ReceiptSource {
    /// Settle a submission atomically, returning the application call's receipt.
    fn submit(&mut self, submission: Submission) -> Result<TransactionReceipt, LedgerError>;
}

/// In-memory ledger
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    config: LedgerConfig,
    round: Round,
    accounts: BTreeMap<Identity, Account>,
    receipts: HashMap<TxId, TransactionReceipt>,
    groups: BTreeMap<GroupId, Vec<TxId>>,
    /// Top-level application receipts in submission order
    history: Vec<TxId>,
}

impl MemoryLedger {
    pub fn new(config: LedgerConfig) -> Self {
        Self {
            config,
            round: Round::new(1),
            accounts: BTreeMap::new(),
            receipts: HashMap::new(),
            groups: BTreeMap::new(),
            history: Vec::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(LedgerConfig::default())
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Mint funds into an account.
    pub fn fund(&mut self, who: &Identity, amount: Amount) -> Result<(), LedgerError> {
        account_mut(&mut self.accounts, who).credit(amount)
    }

    /// Advance the round counter.
    pub fn advance(&mut self, rounds: u64) {
        self.round = self.round.saturating_add(rounds);
    }

    /// Move the round counter forward to `round`. Never moves backwards.
    pub fn advance_to(&mut self, round: Round) {
        self.round = self.round.max(round);
    }

    pub fn balance(&self, who: &Identity) -> Amount {
        self.account_balance(who)
    }

    pub fn history(&self) -> &[TxId] {
        &self.history
    }

    pub fn receipt_count(&self) -> usize {
        self.receipts.len()
    }

    fn settle(&self, accounts: &mut BTreeMap<Identity, Account>, payment: &PaymentAction) -> Result<Amount, LedgerError> {
        let moved = match payment.kind {
            TransferKind::Partial => {
                let from = account_mut(accounts, &payment.from);
                from.debit(payment.amount)?;
                if payment.from.is_contract() && from.balance < self.config.reserve {
                    return Err(LedgerError::BelowReserve {
                        account: payment.from.clone(),
                        reserve: self.config.reserve,
                    });
                }
                payment.amount
            }
            TransferKind::Close => {
                let from = account_mut(accounts, &payment.from);
                let swept = from.balance;
                from.debit(swept)?;
                swept
            }
        };
        account_mut(accounts, &payment.to).credit(moved)?;
        Ok(moved)
    }

    fn new_receipt(&self, kind: TxKind, sender: &Identity, fee: Amount, group: Option<GroupId>) -> TransactionReceipt {
        TransactionReceipt {
            id: TxId::new(),
            kind,
            sender: sender.clone(),
            fee,
            group,
            round: self.round,
            triggered: Vec::new(),
        }
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn account_mut<'a>(accounts: &'a mut BTreeMap<Identity, Account>, who: &Identity) -> &'a mut Account {
    accounts
        .entry(who.clone())
        .or_insert_with(|| Account::new(who.clone()))
}

impl Clock for MemoryLedger {
    fn current_round(&self) -> Round {
        self.round
    }
}

impl AccountModel for MemoryLedger {
    fn account_balance(&self, id: &Identity) -> Amount {
        self.accounts
            .get(id)
            .map(|account| account.balance)
            .unwrap_or(Amount::ZERO)
    }

    fn reserve_of(&self, _id: &Identity) -> Amount {
        self.config.reserve
    }
}

impl ReceiptSource for MemoryLedger {
    fn receipt(&self, id: &TxId) -> Option<&TransactionReceipt> {
        self.receipts.get(id)
    }

    fn group_members(&self, group: &GroupId) -> Vec<TxId> {
        self.groups.get(group).cloned().unwrap_or_default()
    }
}

impl Ledger for MemoryLedger {
    fn submit(&mut self, submission: Submission) -> Result<TransactionReceipt, LedgerError> {
        let fees = self.config.fee_schedule();
        let mut accounts = self.accounts.clone();
        let mut staged = Vec::new();

        let group = (!submission.attached.is_zero()).then(GroupId::new);
        if let Some(group) = group {
            account_mut(&mut accounts, &submission.sender).debit(submission.attached)?;
            account_mut(&mut accounts, &submission.application).credit(submission.attached)?;
            account_mut(&mut accounts, &submission.sender).debit(fees.payment_fee())?;
            staged.push(self.new_receipt(TxKind::Payment, &submission.sender, fees.payment_fee(), Some(group)));
        }

        let mut triggered = Vec::new();
        for payment in &submission.payments {
            self.settle(&mut accounts, payment)?;
            let inner = self.new_receipt(TxKind::Payment, &payment.from, Amount::ZERO, None);
            triggered.push(inner.id);
            staged.push(inner);
        }
        for call in &submission.inner_calls {
            let inner = self.new_receipt(call.kind, &submission.application, Amount::ZERO, None);
            triggered.push(inner.id);
            staged.push(inner);
        }

        let fee = fees
            .app_call_fee(triggered.len())
            .ok_or(LedgerError::Overflow)?;
        account_mut(&mut accounts, &submission.sender).debit(fee)?;

        let mut call = self.new_receipt(submission.kind, &submission.sender, fee, group);
        call.triggered = triggered;
        staged.push(call.clone());

        debug!(
            tx_id = %call.id,
            sender = %submission.sender,
            application = %submission.application,
            attached = submission.attached.value(),
            payments = submission.payments.len(),
            fee = fee.value(),
            "submission settled"
        );

        self.accounts = accounts;
        if let Some(group) = group {
            let members = staged
                .iter()
                .filter(|receipt| receipt.group == Some(group))
                .map(|receipt| receipt.id)
                .collect();
            self.groups.insert(group, members);
        }
        for receipt in staged {
            self.receipts.insert(receipt.id, receipt);
        }
        self.history.push(call.id);
        Ok(call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_types::fee::total_cost;
    use custody_types::ids::ContractId;

    fn app() -> Identity {
        Identity::contract(ContractId::new())
    }

    fn call(sender: &Identity, application: &Identity, attached: u64) -> Submission {
        Submission {
            sender: sender.clone(),
            application: application.clone(),
            kind: TxKind::AppCall,
            attached: Amount::new(attached),
            payments: Vec::new(),
            inner_calls: Vec::new(),
        }
    }

    #[test]
    fn test_attached_value_grouped_with_call() {
        let mut ledger = MemoryLedger::with_defaults();
        let alice = Identity::user("alice");
        let contract = app();
        ledger.fund(&alice, Amount::new(1_000_000)).unwrap();

        let receipt = ledger.submit(call(&alice, &contract, 200_000)).unwrap();

        assert!(receipt.group.is_some());
        assert_eq!(ledger.balance(&contract), Amount::new(200_000));
        // 200_000 attached + 1_000 payment fee + 1_000 call fee
        assert_eq!(ledger.balance(&alice), Amount::new(798_000));
        assert_eq!(total_cost(&ledger, &receipt.id).unwrap(), Amount::new(2_000));
    }

    #[test]
    fn test_plain_call_not_grouped() {
        let mut ledger = MemoryLedger::with_defaults();
        let alice = Identity::user("alice");
        ledger.fund(&alice, Amount::new(10_000)).unwrap();
        let receipt = ledger.submit(call(&alice, &app(), 0)).unwrap();
        assert_eq!(receipt.group, None);
        assert_eq!(receipt.fee, Amount::new(1_000));
    }

    #[test]
    fn test_inner_payments_pool_fees() {
        let mut ledger = MemoryLedger::with_defaults();
        let alice = Identity::user("alice");
        let bob = Identity::user("bob");
        let contract = app();
        ledger.fund(&alice, Amount::new(10_000)).unwrap();
        ledger.fund(&contract, Amount::new(500_000)).unwrap();

        let mut submission = call(&alice, &contract, 0);
        submission.payments.push(PaymentAction {
            from: contract.clone(),
            to: bob.clone(),
            amount: Amount::new(150_000),
            kind: TransferKind::Partial,
        });
        let receipt = ledger.submit(submission).unwrap();

        assert_eq!(receipt.fee, Amount::new(2_000));
        assert_eq!(receipt.triggered.len(), 1);
        assert_eq!(ledger.balance(&bob), Amount::new(150_000));
        assert_eq!(ledger.balance(&contract), Amount::new(350_000));
    }

    #[test]
    fn test_partial_below_reserve_rejected_atomically() {
        let mut ledger = MemoryLedger::new(LedgerConfig::without_fees());
        let alice = Identity::user("alice");
        let contract = app();
        ledger.fund(&alice, Amount::new(50_000)).unwrap();
        ledger.fund(&contract, Amount::new(150_000)).unwrap();

        let mut submission = call(&alice, &contract, 50_000);
        submission.payments.push(PaymentAction {
            from: contract.clone(),
            to: alice.clone(),
            amount: Amount::new(150_000),
            kind: TransferKind::Partial,
        });
        let err = ledger.submit(submission).unwrap_err();

        assert!(matches!(err, LedgerError::BelowReserve { .. }));
        assert_eq!(ledger.balance(&alice), Amount::new(50_000));
        assert_eq!(ledger.balance(&contract), Amount::new(150_000));
        assert_eq!(ledger.receipt_count(), 0);
    }

    #[test]
    fn test_close_sweeps_balance() {
        let mut ledger = MemoryLedger::new(LedgerConfig::without_fees());
        let alice = Identity::user("alice");
        let contract = app();
        ledger.fund(&contract, Amount::new(300_000)).unwrap();

        let mut submission = call(&alice, &contract, 0);
        submission.payments.push(PaymentAction {
            from: contract.clone(),
            to: alice.clone(),
            amount: Amount::new(300_000),
            kind: TransferKind::Close,
        });
        ledger.submit(submission).unwrap();

        assert_eq!(ledger.balance(&contract), Amount::ZERO);
        assert_eq!(ledger.balance(&alice), Amount::new(300_000));
    }

    #[test]
    fn test_sender_cannot_pay_fee() {
        let mut ledger = MemoryLedger::with_defaults();
        let alice = Identity::user("alice");
        let err = ledger.submit(call(&alice, &app(), 0)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_round_advances_forward_only() {
        let mut ledger = MemoryLedger::with_defaults();
        ledger.advance(9);
        assert_eq!(ledger.current_round(), Round::new(10));
        ledger.advance_to(Round::new(5));
        assert_eq!(ledger.current_round(), Round::new(10));
        ledger.advance_to(Round::new(50));
        assert_eq!(ledger.current_round(), Round::new(50));
    }
}
