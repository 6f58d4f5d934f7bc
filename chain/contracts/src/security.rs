//! Shared security primitives for contract archetypes
//!
//! Provides reusable guards and role bindings used across every archetype
//! and by the engine's nested-call dispatch.

use custody_types::ids::{ContractId, Identity};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::errors::AuthError;

/// Roles a contract can bind to an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Identity that created the contract
    Creator,
    /// Administrative owner (vault, wallet, bet, HTLC, oracle, product)
    Owner,
    Seller,
    Buyer,
    /// May cancel pending vault withdrawals
    Recovery,
    /// Receives crowdfund proceeds
    Receiver,
    Beneficiary,
    /// Decides the winner of a bet
    Oracle,
    Opponent,
    Verifier,
    Player,
    Player0,
    Player1,
    /// Contract that spawned this one
    Factory,
}

/// Role → identity table for one contract.
///
/// Roles are bound once. The only mutation after binding is an explicit
/// [`RoleBindings::transfer`] by the current holder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindings {
    bindings: BTreeMap<Role, Identity>,
}

impl RoleBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a role. Returns `false` if the role is already bound.
    pub fn bind(&mut self, role: Role, identity: Identity) -> bool {
        if self.bindings.contains_key(&role) {
            return false;
        }
        self.bindings.insert(role, identity);
        true
    }

    /// Builder form of [`RoleBindings::bind`] for freshly created contracts.
    pub fn with(mut self, role: Role, identity: Identity) -> Self {
        self.bind(role, identity);
        self
    }

    pub fn holder(&self, role: Role) -> Option<&Identity> {
        self.bindings.get(&role)
    }

    pub fn is_bound(&self, role: Role) -> bool {
        self.bindings.contains_key(&role)
    }

    /// Check whether `caller` holds `role`.
    pub fn is(&self, role: Role, caller: &Identity) -> bool {
        self.bindings.get(&role) == Some(caller)
    }

    pub fn require(&self, role: Role, caller: &Identity) -> Result<(), AuthError> {
        match self.bindings.get(&role) {
            None => Err(AuthError::Unbound { role }),
            Some(holder) if holder == caller => Ok(()),
            Some(_) => Err(AuthError::MissingRole {
                caller: caller.clone(),
                role,
            }),
        }
    }

    /// Succeeds if the caller holds any of the listed roles.
    pub fn require_any(&self, roles: &[Role], caller: &Identity) -> Result<(), AuthError> {
        if roles.iter().any(|role| self.is(*role, caller)) {
            return Ok(());
        }
        Err(AuthError::MissingRole {
            caller: caller.clone(),
            role: roles.first().copied().unwrap_or(Role::Owner),
        })
    }

    /// Move a role to a new holder. Only the current holder may do this.
    pub fn transfer(&mut self, role: Role, current: &Identity, new_holder: Identity) -> bool {
        if !self.is(role, current) {
            return false;
        }
        self.bindings.insert(role, new_holder);
        true
    }
}

/// One-shot replay guard.
///
/// Each id can be consumed exactly once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneShotGuard {
    used: BTreeSet<u64>,
}

impl OneShotGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_used(&self, id: u64) -> bool {
        self.used.contains(&id)
    }

    /// Mark an id as used. Returns `false` if already used (replay attempt).
    pub fn consume(&mut self, id: u64) -> bool {
        self.used.insert(id)
    }

    pub fn count(&self) -> usize {
        self.used.len()
    }
}

/// Stack of contracts currently executing within one top-level call.
///
/// Entering a contract already on the stack is a reentrancy attempt.
#[derive(Debug, Clone)]
pub struct CallStack {
    frames: Vec<ContractId>,
    max_depth: usize,
}

impl CallStack {
    pub fn new(max_depth: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_depth,
        }
    }

    /// Push a frame. Returns `false` on reentrancy or when the depth limit
    /// is reached.
    pub fn enter(&mut self, contract: ContractId) -> bool {
        if self.is_active(&contract) || self.frames.len() >= self.max_depth {
            return false;
        }
        self.frames.push(contract);
        true
    }

    pub fn exit(&mut self) {
        self.frames.pop();
    }

    pub fn is_active(&self, contract: &ContractId) -> bool {
        self.frames.contains(contract)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ─── RoleBindings tests ───

    #[test]
    fn test_bind_once() {
        let mut roles = RoleBindings::new();
        assert!(roles.bind(Role::Seller, Identity::user("alice")));
        assert!(!roles.bind(Role::Seller, Identity::user("bob")));
        assert_eq!(roles.holder(Role::Seller), Some(&Identity::user("alice")));
    }

    #[test]
    fn test_require_role() {
        let roles = RoleBindings::new().with(Role::Buyer, Identity::user("bob"));
        assert!(roles.require(Role::Buyer, &Identity::user("bob")).is_ok());
        assert!(matches!(
            roles.require(Role::Buyer, &Identity::user("eve")),
            Err(AuthError::MissingRole { role: Role::Buyer, .. })
        ));
        assert_eq!(
            roles.require(Role::Seller, &Identity::user("bob")),
            Err(AuthError::Unbound { role: Role::Seller })
        );
    }

    #[test]
    fn test_require_any() {
        let roles = RoleBindings::new()
            .with(Role::Owner, Identity::user("alice"))
            .with(Role::Opponent, Identity::user("bob"));
        let allowed = [Role::Owner, Role::Opponent];
        assert!(roles.require_any(&allowed, &Identity::user("bob")).is_ok());
        assert!(roles.require_any(&allowed, &Identity::user("carol")).is_err());
    }

    #[test]
    fn test_transfer_by_holder_only() {
        let mut roles = RoleBindings::new().with(Role::Owner, Identity::user("alice"));
        assert!(!roles.transfer(Role::Owner, &Identity::user("bob"), Identity::user("bob")));
        assert!(roles.transfer(Role::Owner, &Identity::user("alice"), Identity::user("bob")));
        assert!(roles.is(Role::Owner, &Identity::user("bob")));
    }

    #[test]
    fn test_bindings_json_round_trip() {
        let roles = RoleBindings::new()
            .with(Role::Seller, Identity::user("alice"))
            .with(Role::Factory, Identity::contract(ContractId::new()));
        let json = serde_json::to_string(&roles).unwrap();
        let back: RoleBindings = serde_json::from_str(&json).unwrap();
        assert_eq!(roles, back);
    }

    // ─── OneShotGuard tests ───

    #[test]
    fn test_one_shot_replay_rejected() {
        let mut guard = OneShotGuard::new();
        assert!(guard.consume(7));
        assert!(guard.is_used(7));
        assert!(!guard.consume(7), "Second use must return false");
        assert_eq!(guard.count(), 1);
    }

    // ─── CallStack tests ───

    #[test]
    fn test_call_stack_rejects_reentry() {
        let mut stack = CallStack::new(4);
        let a = ContractId::new();
        let b = ContractId::new();
        assert!(stack.enter(a));
        assert!(stack.enter(b));
        assert!(!stack.enter(a), "Re-entering an active contract must fail");
        stack.exit();
        assert!(!stack.is_active(&b));
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn test_call_stack_depth_limit() {
        let mut stack = CallStack::new(2);
        assert!(stack.enter(ContractId::new()));
        assert!(stack.enter(ContractId::new()));
        assert!(!stack.enter(ContractId::new()));
    }
}
