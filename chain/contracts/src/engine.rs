//! Engine — entry point for creating, calling and reading contracts
//!
//! Every action runs through the same pipeline:
//! 1. Terminal check (`WrongPhase` once a contract is closed)
//! 2. Role authorization against committed state
//! 3. Phase, deadline and amount checks inside the archetype's `apply`,
//!    which also plans the payments
//! 4. Ledger submission of the attached value, payments and nested calls
//! 5. Commit of the staged state, then events
//!
//! A failure at any step leaves the store, the ledger and the event log
//! untouched.

use custody_types::account::AccountModel;
use custody_types::fee::{TransactionReceipt, TxKind};
use custody_types::ids::{ContractId, Identity, TxId};
use custody_types::numeric::Amount;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::archetypes::{Action, ContractState, CreateParams, View, ViewValue};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::events::{ActionApplied, ContractCreated, ContractEvent, PaymentEmitted};
use crate::ledger::{Ledger, Submission};
use crate::payment::PaymentAction;
use crate::security::CallStack;
use crate::store::{ContractRecord, ContractStore, StagedWrites, StoreError, StoreSnapshot, StoreView};
use crate::transition::{ReadContext, Transition, TransitionOutcome};

/// Result of an accepted create or call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionReceipt {
    pub contract: ContractId,
    pub action: String,
    pub caller: Identity,
    /// Phase after the transition
    pub phase: String,
    pub payments: Vec<PaymentAction>,
    /// Value returned by the action, if any
    pub output: Option<ViewValue>,
    /// Ledger receipt of the application call
    pub transaction: TransactionReceipt,
}

/// Custody position of one contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyReport {
    pub contract: ContractId,
    pub balance: Amount,
    pub reserve: Amount,
    /// Value the contract currently owes to participants
    pub owed: Amount,
    pub closed: bool,
}

impl CustodyReport {
    /// `owed + reserve <= balance` while open; nothing owed once closed.
    pub fn holds(&self) -> bool {
        if self.closed {
            return self.owed.is_zero();
        }
        self.owed
            .checked_add(self.reserve)
            .is_some_and(|required| required <= self.balance)
    }
}

/// Contract engine over a ledger `L`
pub struct Engine<L: Ledger> {
    ledger: L,
    config: EngineConfig,
    store: ContractStore,
    /// Emitted events log (append-only)
    events: Vec<ContractEvent>,
}

impl<L: Ledger> Engine<L> {
    pub fn new(ledger: L, config: EngineConfig) -> Self {
        Self {
            ledger,
            config,
            store: ContractStore::new(),
            events: Vec::new(),
        }
    }

    pub fn with_ledger(ledger: L) -> Self {
        Self::new(ledger, EngineConfig::default())
    }

    // ───────────────────────── Create ─────────────────────────

    /// Create a contract. `attached` must cover the contract's reserve; any
    /// surplus is the archetype's initial funding.
    pub fn create(
        &mut self,
        creator: &Identity,
        attached: Amount,
        params: impl Into<CreateParams>,
    ) -> Result<ActionReceipt, EngineError> {
        let params = params.into();
        let archetype = params.archetype();
        match self.execute_create(creator, attached, params) {
            Ok(receipt) => {
                info!(
                    contract = %receipt.contract,
                    archetype,
                    creator = %creator,
                    attached = attached.value(),
                    "contract created"
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(archetype, creator = %creator, kind = err.kind(), error = %err, "create rejected");
                Err(err)
            }
        }
    }

    fn execute_create(
        &mut self,
        creator: &Identity,
        attached: Amount,
        params: CreateParams,
    ) -> Result<ActionReceipt, EngineError> {
        let id = ContractId::new();
        let address = Identity::contract(id);
        let reserve = self.ledger.reserve_of(&address);
        if attached < reserve {
            return Err(EngineError::InsufficientReserve {
                required: reserve,
                available: attached,
            });
        }

        let mut writes = StagedWrites::default();
        let mut calls = self.call_stack(id)?;
        let (state, outcome) = {
            let mut tx = Transition::new(
                &self.ledger,
                &self.config,
                &self.store,
                &mut writes,
                &mut calls,
                id,
                creator.clone(),
                attached,
            )?;
            let state = ContractState::create(params, &mut tx)?;
            (state, tx.finish())
        };
        let phase = state.phase().to_string();
        writes.put_record(ContractRecord {
            id,
            address: address.clone(),
            creator: creator.clone(),
            created_round: self.ledger.current_round(),
            state,
        });

        let transaction = self.settle(creator, &address, TxKind::AppCreate, attached, &outcome, writes)?;
        self.record_created(id, &transaction.id);
        for child in &outcome.spawned {
            self.record_created(*child, &transaction.id);
        }
        self.record_payments(id, &outcome.payments, &transaction.id);

        Ok(ActionReceipt {
            contract: id,
            action: "create".to_string(),
            caller: creator.clone(),
            phase,
            payments: outcome.payments,
            output: outcome.output.or(Some(ViewValue::Contract(id))),
            transaction,
        })
    }

    // ───────────────────────── Call ─────────────────────────

    /// Apply an action to an existing contract.
    pub fn call(
        &mut self,
        contract: ContractId,
        caller: &Identity,
        attached: Amount,
        action: impl Into<Action>,
    ) -> Result<ActionReceipt, EngineError> {
        let action = action.into();
        let name = action.name();
        match self.execute_call(contract, caller, attached, action) {
            Ok(receipt) => {
                info!(
                    contract = %contract,
                    action = name,
                    caller = %caller,
                    phase = %receipt.phase,
                    payments = receipt.payments.len(),
                    "action applied"
                );
                Ok(receipt)
            }
            Err(err) => {
                warn!(
                    contract = %contract,
                    action = name,
                    caller = %caller,
                    kind = err.kind(),
                    error = %err,
                    "action rejected"
                );
                Err(err)
            }
        }
    }

    fn execute_call(
        &mut self,
        contract: ContractId,
        caller: &Identity,
        attached: Amount,
        action: Action,
    ) -> Result<ActionReceipt, EngineError> {
        let name = action.name();
        let record = self
            .store
            .record(&contract)
            .ok_or(EngineError::UnknownContract { contract })?;
        if record.state.is_terminal() {
            return Err(EngineError::wrong_phase(record.phase(), name));
        }
        {
            let ctx = ReadContext::new(contract, caller.clone(), &self.ledger, StoreView::committed(&self.store));
            record.state.authorize(&action, &ctx)?;
        }
        let mut updated = record.clone();

        let mut writes = StagedWrites::default();
        let mut calls = self.call_stack(contract)?;
        let outcome = {
            let mut tx = Transition::new(
                &self.ledger,
                &self.config,
                &self.store,
                &mut writes,
                &mut calls,
                contract,
                caller.clone(),
                attached,
            )?;
            updated.state.apply(action, &mut tx)?;
            tx.finish()
        };
        let phase = updated.phase().to_string();
        let address = updated.address.clone();
        writes.put_record(updated);

        let transaction = self.settle(caller, &address, TxKind::AppCall, attached, &outcome, writes)?;
        self.events.push(ContractEvent::ActionApplied(ActionApplied {
            contract,
            action: name.to_string(),
            caller: caller.clone(),
            phase: phase.clone(),
            round: self.ledger.current_round(),
            tx_id: transaction.id,
        }));
        for child in &outcome.spawned {
            self.record_created(*child, &transaction.id);
        }
        self.record_payments(contract, &outcome.payments, &transaction.id);

        Ok(ActionReceipt {
            contract,
            action: name.to_string(),
            caller: caller.clone(),
            phase,
            payments: outcome.payments,
            output: outcome.output,
            transaction,
        })
    }

    // ───────────────────────── Read ─────────────────────────

    /// Pure read of a contract view.
    pub fn read(&self, contract: ContractId, caller: &Identity, view: impl Into<View>) -> Result<ViewValue, EngineError> {
        let record = self
            .store
            .record(&contract)
            .ok_or(EngineError::UnknownContract { contract })?;
        let ctx = ReadContext::new(contract, caller.clone(), &self.ledger, StoreView::committed(&self.store));
        record.state.read(&view.into(), &ctx)
    }

    pub fn state(&self, contract: &ContractId) -> Option<&ContractState> {
        self.store.record(contract).map(|record| &record.state)
    }

    pub fn record(&self, contract: &ContractId) -> Option<&ContractRecord> {
        self.store.record(contract)
    }

    pub fn sub_balance(&self, contract: ContractId, who: &Identity) -> Amount {
        self.store.sub_balance(contract, who)
    }

    /// Balance, reserve and owed value of a contract.
    pub fn custody_report(&self, contract: ContractId) -> Result<CustodyReport, EngineError> {
        let record = self
            .store
            .record(&contract)
            .ok_or(EngineError::UnknownContract { contract })?;
        let ctx = ReadContext::new(
            contract,
            record.creator.clone(),
            &self.ledger,
            StoreView::committed(&self.store),
        );
        Ok(CustodyReport {
            contract,
            balance: ctx.balance(),
            reserve: ctx.reserve(),
            owed: record.state.owed(&ctx),
            closed: record.state.is_terminal(),
        })
    }

    // ───────────────────────── Events ─────────────────────────

    pub fn events(&self) -> &[ContractEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ContractEvent> {
        std::mem::take(&mut self.events)
    }

    // ───────────────────────── Accessors ─────────────────────────

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn store(&self) -> &ContractStore {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        self.store.snapshot()
    }

    // ───────────────────────── Internal ─────────────────────────

    fn call_stack(&self, contract: ContractId) -> Result<CallStack, EngineError> {
        let mut calls = CallStack::new(self.config.max_call_depth);
        if !calls.enter(contract) {
            return Err(EngineError::invalid_argument("max_call_depth must be at least 1"));
        }
        Ok(calls)
    }

    /// Submit the transition to the ledger and commit the staged writes only
    /// once it has been accepted.
    fn settle(
        &mut self,
        sender: &Identity,
        application: &Identity,
        kind: TxKind,
        attached: Amount,
        outcome: &TransitionOutcome,
        writes: StagedWrites,
    ) -> Result<TransactionReceipt, EngineError> {
        let transaction = self.ledger.submit(Submission {
            sender: sender.clone(),
            application: application.clone(),
            kind,
            attached,
            payments: outcome.payments.clone(),
            inner_calls: outcome.inner_calls.clone(),
        })?;
        self.store.commit(writes);
        Ok(transaction)
    }

    fn record_created(&mut self, contract: ContractId, tx_id: &TxId) {
        let Some(record) = self.store.record(&contract) else {
            return;
        };
        let event = ContractCreated {
            contract,
            archetype: record.archetype().to_string(),
            creator: record.creator.clone(),
            round: record.created_round,
            tx_id: *tx_id,
        };
        self.events.push(ContractEvent::Created(event));
    }

    fn record_payments(&mut self, contract: ContractId, payments: &[PaymentAction], tx_id: &TxId) {
        for payment in payments {
            self.events.push(ContractEvent::PaymentEmitted(PaymentEmitted {
                contract: payment.from.as_contract().unwrap_or(contract),
                payment: payment.clone(),
                tx_id: *tx_id,
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archetypes::escrow::{EscrowAction, EscrowParams, EscrowView};
    use crate::archetypes::oracle::OracleView;
    use crate::config::LedgerConfig;
    use crate::ledger::MemoryLedger;
    use crate::testkit::{alice, bob, carol, TestEngine, RESERVE};

    fn escrow(engine: &mut TestEngine) -> ContractId {
        engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(100_000),
                },
            )
            .unwrap()
            .contract
    }

    // ─── Create tests ───

    #[test]
    fn test_create_requires_reserve() {
        let mut engine = TestEngine::funded();
        let err = engine
            .create(
                &alice(),
                Amount::new(99_999),
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(1),
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientReserve { .. }));
        assert!(engine.store().is_empty());
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_create_returns_contract_id() {
        let mut engine = TestEngine::funded();
        let receipt = engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(1),
                },
            )
            .unwrap();
        assert_eq!(receipt.output, Some(ViewValue::Contract(receipt.contract)));
        assert_eq!(receipt.phase, "WaitDeposit");
        assert_eq!(receipt.transaction.kind, TxKind::AppCreate);
        assert_eq!(engine.balance(&Identity::contract(receipt.contract)), RESERVE);
    }

    // ─── Call tests ───

    #[test]
    fn test_unknown_contract() {
        let mut engine = TestEngine::funded();
        let err = engine
            .call(ContractId::new(), &bob(), Amount::ZERO, EscrowAction::Pay)
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownContract { .. }));
    }

    #[test]
    fn test_action_for_other_archetype() {
        let mut engine = TestEngine::funded();
        let id = escrow(&mut engine);
        let err = engine.read(id, &bob(), OracleView::ExchangeRate).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedAction { .. }));
    }

    #[test]
    fn test_rejected_call_leaves_no_trace() {
        let mut engine = TestEngine::funded();
        let id = escrow(&mut engine);
        engine.drain_events();
        let before = engine.store().clone();
        let history = engine.ledger().history().len();

        assert!(engine.call(id, &carol(), Amount::new(100_000), EscrowAction::Deposit).is_err());

        assert_eq!(engine.store(), &before);
        assert_eq!(engine.ledger().history().len(), history);
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_ledger_rejection_rolls_back_state() {
        let mut engine = TestEngine::funded();
        let poor = Identity::user("poor");
        let id = engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: poor.clone(),
                    price: Amount::new(100_000),
                },
            )
            .unwrap()
            .contract;
        let err = engine
            .call(id, &poor, Amount::new(100_000), EscrowAction::Deposit)
            .unwrap_err();
        assert!(matches!(err, EngineError::Ledger(_)));
        assert_eq!(engine.record(&id).unwrap().phase(), "WaitDeposit");
        assert_eq!(engine.balance(&Identity::contract(id)), RESERVE);
    }

    #[test]
    fn test_events_for_accepted_actions() {
        let mut engine = TestEngine::funded();
        let id = escrow(&mut engine);
        engine.call(id, &bob(), Amount::new(100_000), EscrowAction::Deposit).unwrap();
        engine.call(id, &bob(), Amount::ZERO, EscrowAction::Pay).unwrap();

        let events = engine.drain_events();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ContractEvent::Created(_)));
        assert!(matches!(events[3], ContractEvent::PaymentEmitted(_)));
        assert!(events.iter().all(|e| e.contract() == id));
        assert!(engine.events().is_empty());
    }

    #[test]
    fn test_reads_work_after_close() {
        let mut engine = TestEngine::funded();
        let id = escrow(&mut engine);
        engine.call(id, &bob(), Amount::new(100_000), EscrowAction::Deposit).unwrap();
        engine.call(id, &bob(), Amount::ZERO, EscrowAction::Pay).unwrap();
        let phase = engine.read(id, &carol(), EscrowView::Phase).unwrap();
        assert_eq!(phase, ViewValue::Phase("Closed".into()));
        assert!(engine.custody_report(id).unwrap().holds());
    }

    #[test]
    fn test_fees_charged_to_caller() {
        let mut ledger = MemoryLedger::new(LedgerConfig::default());
        ledger.fund(&alice(), Amount::new(1_000_000)).unwrap();
        let mut engine = Engine::with_ledger(ledger);
        engine
            .create(
                &alice(),
                RESERVE,
                EscrowParams {
                    seller: alice(),
                    buyer: bob(),
                    price: Amount::new(1),
                },
            )
            .unwrap();
        // reserve + payment fee + create fee
        assert_eq!(engine.ledger().balance(&alice()), Amount::new(898_000));
    }

    // ─── Custody report tests ───

    #[test]
    fn test_custody_report_counts_owed_value() {
        let mut engine = TestEngine::funded();
        let id = escrow(&mut engine);
        engine.call(id, &bob(), Amount::new(100_000), EscrowAction::Deposit).unwrap();
        let report = engine.custody_report(id).unwrap();
        assert_eq!(report.owed, Amount::new(100_000));
        assert_eq!(report.balance, Amount::new(200_000));
        assert!(report.holds());
    }
}
