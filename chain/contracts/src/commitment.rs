//! Hash commitments — digests, hash locks, delegation keys
//!
//! - `keccak256` for sealed lottery bids and HTLC hash locks
//! - `sha512_256` for identity delegation keys
//! - `sha256` for store state roots

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256, Sha512_256};
use sha3::Keccak256;
use std::fmt;

use custody_types::ids::Identity;

use crate::errors::EngineError;

/// 32-byte digest, serialized as lowercase hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest32([u8; 32]);

impl Digest32 {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, EngineError> {
        let bytes = hex::decode(s)
            .map_err(|e| EngineError::invalid_argument(format!("bad digest hex: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| EngineError::invalid_argument("digest must be 32 bytes"))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Digest32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for Digest32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Digest32::from_hex(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn keccak256(data: &[u8]) -> Digest32 {
    Digest32(Keccak256::digest(data).into())
}

pub fn sha256(data: &[u8]) -> Digest32 {
    Digest32(Sha256::digest(data).into())
}

pub fn sha512_256(data: &[u8]) -> Digest32 {
    Digest32(Sha512_256::digest(data).into())
}

/// Key under which a delegation is stored: `sha512_256(identity ‖ len ‖ type ‖ delegate)`.
///
/// Every variable-length field is length-prefixed, so no two distinct
/// triples feed the hasher the same bytes.
pub fn delegation_key(identity: &Identity, delegate_type: &str, delegate: &Identity) -> Digest32 {
    let mut hasher = Sha512_256::new();
    hasher.update(identity.encode());
    hasher.update((delegate_type.len() as u32).to_be_bytes());
    hasher.update(delegate_type.as_bytes());
    hasher.update(delegate.encode());
    Digest32(hasher.finalize().into())
}

/// Keccak-256 hash lock over a secret preimage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashLock {
    pub hash: Digest32,
}

impl HashLock {
    pub fn new(hash: Digest32) -> Self {
        Self { hash }
    }

    /// Lock for a known secret.
    pub fn for_secret(secret: &[u8]) -> Self {
        Self::new(keccak256(secret))
    }

    pub fn matches(&self, secret: &[u8]) -> bool {
        keccak256(secret) == self.hash
    }

    /// Check the preimage, rejecting a mismatch as an invalid argument.
    pub fn open(&self, secret: &[u8]) -> Result<(), EngineError> {
        if !self.matches(secret) {
            return Err(EngineError::invalid_argument("secret does not match hash lock"));
        }
        Ok(())
    }
}
