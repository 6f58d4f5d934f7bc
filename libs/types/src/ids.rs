//! Unique identifier types for contracts, transactions and ledger accounts
//!
//! Contract, transaction and group ids use UUID v7 for time-sortable ordering,
//! so records created earlier always sort first in the persisted state layout.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix reserved for contract account addresses.
pub const CONTRACT_ADDRESS_PREFIX: &str = "app:";

/// Unique identifier for a contract instance
///
/// One id per `create`; the contract's ledger account address is derived
/// from it (see [`Identity::contract`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(Uuid);

impl ContractId {
    /// Create a new ContractId with current timestamp
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Create from existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ContractId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a ledger transaction (top-level or triggered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(Uuid);

impl TxId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier shared by every member of an atomic transaction group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for GroupId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Address of a ledger account
///
/// Either a user account, named by its address string, or the account owned
/// by a contract instance. Serialized as a plain string (`"alice"`,
/// `"app:<uuid>"`) so identities can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    User(String),
    Contract(ContractId),
}

impl Identity {
    /// User account address. The `app:` prefix is reserved for contracts.
    pub fn user(address: impl Into<String>) -> Self {
        Self::User(address.into())
    }

    /// Account owned by a contract instance.
    pub fn contract(id: ContractId) -> Self {
        Self::Contract(id)
    }

    /// The zero address: an empty user address, never a valid role holder.
    pub fn zero() -> Self {
        Self::User(String::new())
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Self::User(address) if address.is_empty())
    }

    pub fn is_contract(&self) -> bool {
        matches!(self, Self::Contract(_))
    }

    pub fn as_contract(&self) -> Option<ContractId> {
        match self {
            Self::Contract(id) => Some(*id),
            Self::User(_) => None,
        }
    }

    /// Canonical byte encoding used when an identity is hashed.
    ///
    /// User addresses carry a big-endian `u32` length so that concatenated
    /// encodings stay unambiguous.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::User(address) => {
                let mut out = Vec::with_capacity(address.len() + 5);
                out.push(0u8);
                out.extend_from_slice(&(address.len() as u32).to_be_bytes());
                out.extend_from_slice(address.as_bytes());
                out
            }
            Self::Contract(id) => {
                let mut out = Vec::with_capacity(17);
                out.push(1u8);
                out.extend_from_slice(id.as_uuid().as_bytes());
                out
            }
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(address) => write!(f, "{}", address),
            Self::Contract(id) => write!(f, "{}{}", CONTRACT_ADDRESS_PREFIX, id),
        }
    }
}

impl FromStr for Identity {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix(CONTRACT_ADDRESS_PREFIX) {
            Some(rest) => Ok(Self::Contract(ContractId::from_uuid(Uuid::parse_str(rest)?))),
            None => Ok(Self::User(s.to_string())),
        }
    }
}

impl From<&str> for Identity {
    fn from(s: &str) -> Self {
        Self::user(s)
    }
}

impl From<ContractId> for Identity {
    fn from(id: ContractId) -> Self {
        Self::contract(id)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
