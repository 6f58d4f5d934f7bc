//! Contract state store
//!
//! Persisted layout:
//! - contract records keyed by `ContractId`
//! - per-participant sub-balances keyed by `(ContractId, Identity)`
//!
//! Transitions never write to the store directly. They collect changes in
//! [`StagedWrites`], which the engine commits only after the ledger accepted
//! the settlement.

use std::collections::BTreeMap;

use custody_types::ids::{ContractId, Identity};
use custody_types::numeric::{Amount, Round};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::archetypes::ContractState;
use crate::commitment::{sha256, Digest32};
use crate::STATE_FORMAT_VERSION;

/// Store-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Snapshot serialization failed: {0}")]
    Serialization(String),

    #[error("State root mismatch: expected {expected}, computed {actual}")]
    RootMismatch { expected: Digest32, actual: Digest32 },

    #[error("Unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),
}

/// One contract instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub id: ContractId,
    pub address: Identity,
    pub creator: Identity,
    pub created_round: Round,
    pub state: ContractState,
}

impl ContractRecord {
    pub fn archetype(&self) -> &'static str {
        self.state.archetype()
    }

    pub fn phase(&self) -> &'static str {
        self.state.phase()
    }
}

/// Committed contract state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContractStore {
    records: BTreeMap<ContractId, ContractRecord>,
    sub_balances: BTreeMap<(ContractId, Identity), Amount>,
}

/// Changes produced by one transition, not yet committed
#[derive(Debug, Clone, Default)]
pub struct StagedWrites {
    records: BTreeMap<ContractId, ContractRecord>,
    sub_balances: BTreeMap<(ContractId, Identity), Amount>,
}

/// Flat sub-balance entry used in snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubBalanceEntry {
    pub contract: ContractId,
    pub participant: Identity,
    pub amount: Amount,
}

#[derive(Serialize, Deserialize)]
struct PersistedStore {
    records: Vec<ContractRecord>,
    sub_balances: Vec<SubBalanceEntry>,
}

/// Serialized store with its SHA-256 state root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Format version the snapshot was written with
    pub version: u32,
    pub json: String,
    pub root: Digest32,
}

fn contract_range<'a, V>(
    map: &'a BTreeMap<(ContractId, Identity), V>,
    contract: ContractId,
) -> impl Iterator<Item = (&'a Identity, &'a V)> + 'a {
    map.range((contract, Identity::zero())..)
        .take_while(move |((owner, _), _)| *owner == contract)
        .map(|((_, who), value)| (who, value))
}

impl ContractStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, id: &ContractId) -> Option<&ContractRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &ContractRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn sub_balance(&self, contract: ContractId, who: &Identity) -> Amount {
        self.sub_balances
            .get(&(contract, who.clone()))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// Apply staged writes.
    pub fn commit(&mut self, writes: StagedWrites) {
        self.records.extend(writes.records);
        self.sub_balances.extend(writes.sub_balances);
    }

    // ───────────────────────── Persistence ─────────────────────────

    fn to_json(&self) -> Result<String, StoreError> {
        let persisted = PersistedStore {
            records: self.records.values().cloned().collect(),
            sub_balances: self
                .sub_balances
                .iter()
                .map(|((contract, participant), amount)| SubBalanceEntry {
                    contract: *contract,
                    participant: participant.clone(),
                    amount: *amount,
                })
                .collect(),
        };
        serde_json::to_string(&persisted).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// SHA-256 over the canonical JSON encoding
    pub fn state_root(&self) -> Result<Digest32, StoreError> {
        Ok(sha256(self.to_json()?.as_bytes()))
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let json = self.to_json()?;
        let root = sha256(json.as_bytes());
        Ok(StoreSnapshot {
            version: STATE_FORMAT_VERSION,
            json,
            root,
        })
    }

    /// Rebuild a store from a snapshot, verifying its version and state root.
    pub fn restore(snapshot: &StoreSnapshot) -> Result<Self, StoreError> {
        if snapshot.version > STATE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion(snapshot.version));
        }
        let actual = sha256(snapshot.json.as_bytes());
        if actual != snapshot.root {
            return Err(StoreError::RootMismatch {
                expected: snapshot.root,
                actual,
            });
        }
        let persisted: PersistedStore = serde_json::from_str(&snapshot.json)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let records = persisted
            .records
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        let sub_balances = persisted
            .sub_balances
            .into_iter()
            .map(|entry| ((entry.contract, entry.participant), entry.amount))
            .collect();
        Ok(Self {
            records,
            sub_balances,
        })
    }
}

impl StagedWrites {
    pub fn put_record(&mut self, record: ContractRecord) {
        self.records.insert(record.id, record);
    }

    pub fn set_sub_balance(&mut self, contract: ContractId, who: Identity, amount: Amount) {
        self.sub_balances.insert((contract, who), amount);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.sub_balances.is_empty()
    }
}

/// Read access to the store with staged writes layered on top
#[derive(Debug, Clone, Copy)]
pub struct StoreView<'a> {
    base: &'a ContractStore,
    writes: Option<&'a StagedWrites>,
}

impl<'a> StoreView<'a> {
    /// View of committed state only
    pub fn committed(base: &'a ContractStore) -> Self {
        Self { base, writes: None }
    }

    pub fn staged(base: &'a ContractStore, writes: &'a StagedWrites) -> Self {
        Self {
            base,
            writes: Some(writes),
        }
    }

    pub fn record(&self, id: &ContractId) -> Option<&'a ContractRecord> {
        self.writes
            .and_then(|writes| writes.records.get(id))
            .or_else(|| self.base.records.get(id))
    }

    fn staged_sub_balance(&self, contract: ContractId, who: &Identity) -> Option<Amount> {
        self.writes
            .and_then(|writes| writes.sub_balances.get(&(contract, who.clone())).copied())
            .or_else(|| self.base.sub_balances.get(&(contract, who.clone())).copied())
    }

    pub fn sub_balance(&self, contract: ContractId, who: &Identity) -> Amount {
        self.staged_sub_balance(contract, who).unwrap_or(Amount::ZERO)
    }

    /// `true` if `who` ever held a sub-balance entry, even a zeroed one
    pub fn has_sub_balance(&self, contract: ContractId, who: &Identity) -> bool {
        self.staged_sub_balance(contract, who).is_some()
    }

    /// All sub-balance entries of a contract, zeroed ones included
    pub fn participants(&self, contract: ContractId) -> Vec<(Identity, Amount)> {
        let mut merged: BTreeMap<Identity, Amount> = contract_range(&self.base.sub_balances, contract)
            .map(|(who, amount)| (who.clone(), *amount))
            .collect();
        if let Some(writes) = self.writes {
            for (who, amount) in contract_range(&writes.sub_balances, contract) {
                merged.insert(who.clone(), *amount);
            }
        }
        merged.into_iter().collect()
    }

    pub fn sub_balance_total(&self, contract: ContractId) -> Amount {
        self.participants(contract)
            .into_iter()
            .map(|(_, amount)| amount)
            .sum()
    }
}
