//! Execution context handed to archetypes
//!
//! - [`ReadContext`]: pure reads (authorization, views, custody accounting)
//! - [`Transition`]: one state transition in progress, with staged
//!   sub-balances, the pay-or-close builder and synchronous nested calls
//!
//! The round is re-read from the ledger on every `now()` call.

use custody_types::account::AccountModel;
use custody_types::fee::TxKind;
use custody_types::ids::{ContractId, Identity};
use custody_types::numeric::{Amount, Round};

use crate::archetypes::{ContractState, CreateParams, View, ViewValue};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::ledger::InnerCall;
use crate::payment::{PaymentAction, Payouts, TransferKind};
use crate::security::CallStack;
use crate::store::{ContractRecord, ContractStore, StagedWrites, StoreView};

/// Read-only ledger access needed while executing a transition
pub trait LedgerView: Clock + AccountModel {}

impl<T: Clock + AccountModel + ?Sized> LedgerView for T {}

/// Context for pure reads of one contract
pub struct ReadContext<'a> {
    contract: ContractId,
    caller: Identity,
    ledger: &'a dyn LedgerView,
    store: StoreView<'a>,
}

impl<'a> ReadContext<'a> {
    pub fn new(contract: ContractId, caller: Identity, ledger: &'a dyn LedgerView, store: StoreView<'a>) -> Self {
        Self {
            contract,
            caller,
            ledger,
            store,
        }
    }

    pub fn contract(&self) -> ContractId {
        self.contract
    }

    pub fn address(&self) -> Identity {
        Identity::contract(self.contract)
    }

    pub fn caller(&self) -> &Identity {
        &self.caller
    }

    pub fn now(&self) -> Round {
        self.ledger.current_round()
    }

    pub fn balance(&self) -> Amount {
        self.ledger.account_balance(&self.address())
    }

    pub fn reserve(&self) -> Amount {
        self.ledger.reserve_of(&self.address())
    }

    pub fn sub_balance(&self, who: &Identity) -> Amount {
        self.store.sub_balance(self.contract, who)
    }

    pub fn has_sub_balance(&self, who: &Identity) -> bool {
        self.store.has_sub_balance(self.contract, who)
    }

    pub fn participants(&self) -> Vec<(Identity, Amount)> {
        self.store.participants(self.contract)
    }

    pub fn sub_balance_total(&self) -> Amount {
        self.store.sub_balance_total(self.contract)
    }
}

/// Side effects of a finished transition
#[derive(Debug, Clone, Default)]
pub struct TransitionOutcome {
    pub payments: Vec<PaymentAction>,
    pub inner_calls: Vec<InnerCall>,
    pub spawned: Vec<ContractId>,
    pub output: Option<ViewValue>,
}

/// One state transition in progress
pub struct Transition<'a> {
    ledger: &'a dyn LedgerView,
    config: &'a EngineConfig,
    base: &'a ContractStore,
    writes: &'a mut StagedWrites,
    calls: &'a mut CallStack,
    contract: ContractId,
    caller: Identity,
    attached: Amount,
    payouts: Payouts,
    nested_payments: Vec<PaymentAction>,
    inner_calls: Vec<InnerCall>,
    spawned: Vec<ContractId>,
    output: Option<ViewValue>,
}

impl<'a> Transition<'a> {
    /// Open a transition on `contract`. The running balance starts at the
    /// ledger balance plus the attached value.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ledger: &'a dyn LedgerView,
        config: &'a EngineConfig,
        base: &'a ContractStore,
        writes: &'a mut StagedWrites,
        calls: &'a mut CallStack,
        contract: ContractId,
        caller: Identity,
        attached: Amount,
    ) -> Result<Self, EngineError> {
        let address = Identity::contract(contract);
        let balance = ledger
            .account_balance(&address)
            .checked_add(attached)
            .ok_or(EngineError::Overflow)?;
        let reserve = ledger.reserve_of(&address);
        Ok(Self {
            ledger,
            config,
            base,
            writes,
            calls,
            contract,
            caller,
            attached,
            payouts: Payouts::new(address, balance, reserve),
            nested_payments: Vec::new(),
            inner_calls: Vec::new(),
            spawned: Vec::new(),
            output: None,
        })
    }

    // ───────────────────────── Context ─────────────────────────

    pub fn contract(&self) -> ContractId {
        self.contract
    }

    pub fn address(&self) -> Identity {
        Identity::contract(self.contract)
    }

    pub fn caller(&self) -> &Identity {
        &self.caller
    }

    pub fn attached(&self) -> Amount {
        self.attached
    }

    pub fn config(&self) -> &EngineConfig {
        self.config
    }

    pub fn now(&self) -> Round {
        self.ledger.current_round()
    }

    /// Running balance: ledger balance + attached - payments planned so far
    pub fn balance(&self) -> Amount {
        self.payouts.balance()
    }

    pub fn reserve(&self) -> Amount {
        self.payouts.reserve()
    }

    /// `true` once this transition closed the contract account
    pub fn is_closed(&self) -> bool {
        self.payouts.is_closed()
    }

    pub fn set_output(&mut self, value: ViewValue) {
        self.output = Some(value);
    }

    fn store_view(&self) -> StoreView<'_> {
        StoreView::staged(self.base, &*self.writes)
    }

    // ───────────────────────── Sub-balances ─────────────────────────

    pub fn sub_balance(&self, who: &Identity) -> Amount {
        self.store_view().sub_balance(self.contract, who)
    }

    pub fn has_sub_balance(&self, who: &Identity) -> bool {
        self.store_view().has_sub_balance(self.contract, who)
    }

    pub fn set_sub_balance(&mut self, who: &Identity, amount: Amount) {
        self.writes.set_sub_balance(self.contract, who.clone(), amount);
    }

    pub fn credit_sub_balance(&mut self, who: &Identity, amount: Amount) -> Result<Amount, EngineError> {
        let updated = self
            .sub_balance(who)
            .checked_add(amount)
            .ok_or(EngineError::Overflow)?;
        self.set_sub_balance(who, updated);
        Ok(updated)
    }

    /// Zero a sub-balance and return what it held. The entry is kept.
    pub fn take_sub_balance(&mut self, who: &Identity) -> Amount {
        let held = self.sub_balance(who);
        if self.has_sub_balance(who) {
            self.set_sub_balance(who, Amount::ZERO);
        }
        held
    }

    pub fn participants(&self) -> Vec<(Identity, Amount)> {
        self.store_view().participants(self.contract)
    }

    pub fn sub_balance_total(&self) -> Amount {
        self.store_view().sub_balance_total(self.contract)
    }

    // ───────────────────────── Payments ─────────────────────────

    pub fn pay_or_close(&mut self, to: &Identity, amount: Amount) -> Result<Option<TransferKind>, EngineError> {
        self.payouts.pay_or_close(to, amount)
    }

    pub fn close_to(&mut self, to: &Identity) -> Result<Amount, EngineError> {
        self.payouts.close(to)
    }

    // ───────────────────────── Nested calls ─────────────────────────

    fn enter(&mut self, target: ContractId) -> Result<(), EngineError> {
        if self.calls.is_active(&target) {
            return Err(EngineError::Reentrancy { contract: target });
        }
        if !self.calls.enter(target) {
            return Err(EngineError::invalid_argument(format!(
                "call depth limit {} reached",
                self.calls.max_depth()
            )));
        }
        Ok(())
    }

    /// Synchronous read of another contract's view.
    ///
    /// Any failure is reported as `NestedCallFailed` and aborts the caller.
    pub fn read_nested(&mut self, target: ContractId, view: View) -> Result<ViewValue, EngineError> {
        self.inner_calls.push(InnerCall {
            application: Identity::contract(target),
            kind: TxKind::AppCall,
        });
        self.enter(target)
            .map_err(|e| EngineError::nested(target, e))?;

        let result = {
            let store = self.store_view();
            match store.record(&target) {
                Some(record) => {
                    let ctx = ReadContext::new(target, self.address(), self.ledger, store);
                    record.state.read(&view, &ctx)
                }
                None => Err(EngineError::UnknownContract { contract: target }),
            }
        };
        self.calls.exit();
        result.map_err(|e| EngineError::nested(target, e))
    }

    /// Create a new contract funded with `funding` from this contract's
    /// account. The caller of the nested create is this contract.
    pub fn spawn(&mut self, params: CreateParams, funding: Amount) -> Result<ContractId, EngineError> {
        let child = ContractId::new();
        self.spawn_child(child, params, funding)
            .map_err(|e| EngineError::nested(child, e))
    }

    fn spawn_child(&mut self, child: ContractId, params: CreateParams, funding: Amount) -> Result<ContractId, EngineError> {
        let child_address = Identity::contract(child);
        let reserve = self.ledger.reserve_of(&child_address);
        if funding < reserve {
            return Err(EngineError::InsufficientReserve {
                required: reserve,
                available: funding,
            });
        }

        self.enter(child)?;
        let created = self.create_child(child, params, funding);
        self.calls.exit();
        let (state, outcome) = created?;

        let parent = self.address();
        self.writes.put_record(ContractRecord {
            id: child,
            address: child_address.clone(),
            creator: parent,
            created_round: self.now(),
            state,
        });
        self.nested_payments.extend(outcome.payments);
        self.inner_calls.push(InnerCall {
            application: child_address,
            kind: TxKind::AppCreate,
        });
        self.inner_calls.extend(outcome.inner_calls);
        self.spawned.push(child);
        self.spawned.extend(outcome.spawned);
        Ok(child)
    }

    fn create_child(
        &mut self,
        child: ContractId,
        params: CreateParams,
        funding: Amount,
    ) -> Result<(ContractState, TransitionOutcome), EngineError> {
        self.payouts.pay_or_close(&Identity::contract(child), funding)?;
        let parent = self.address();
        let mut nested = Transition::new(
            self.ledger,
            self.config,
            self.base,
            &mut *self.writes,
            &mut *self.calls,
            child,
            parent,
            funding,
        )?;
        let state = ContractState::create(params, &mut nested)?;
        Ok((state, nested.finish()))
    }

    pub(crate) fn finish(self) -> TransitionOutcome {
        let mut payments = self.payouts.into_actions();
        payments.extend(self.nested_payments);
        TransitionOutcome {
            payments,
            inner_calls: self.inner_calls,
            spawned: self.spawned,
            output: self.output,
        }
    }
}
