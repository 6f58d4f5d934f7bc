//! Delegated identity registry
//!
//! Identities register themselves, may hand ownership to another account,
//! and the current owner can grant time-limited delegations. A delegation is
//! stored under a length-framed `sha512_256(identity ‖ type ‖ delegate)` with its expiry
//! round and is valid while `now < expiry`.
//!
//! The registry has a single phase and never terminates.

use std::collections::BTreeMap;

use custody_types::ids::Identity;
use custody_types::numeric::Round;
use serde::{Deserialize, Serialize};

use super::{require_address, Archetype, ViewValue};
use crate::commitment::{delegation_key, Digest32};
use crate::errors::{AuthError, EngineError};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegistryParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryAction {
    /// Register the caller as an identity owned by itself
    CreateIdentity,
    ChangeOwner {
        identity: Identity,
        new_owner: Identity,
    },
    AddDelegate {
        identity: Identity,
        delegate_type: String,
        delegate: Identity,
        /// Rounds from now until the delegation expires
        validity: u64,
    },
    RevokeDelegate {
        identity: Identity,
        delegate_type: String,
        delegate: Identity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryView {
    OwnerOf(Identity),
    ValidDelegate {
        identity: Identity,
        delegate_type: String,
        delegate: Identity,
    },
    DelegateExpiry {
        identity: Identity,
        delegate_type: String,
        delegate: Identity,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IdentityRegistry {
    owners: BTreeMap<Identity, Identity>,
    delegates: BTreeMap<Digest32, Round>,
}

impl IdentityRegistry {
    pub fn owner_of(&self, identity: &Identity) -> Option<&Identity> {
        self.owners.get(identity)
    }

    /// Whether the delegation exists and has not yet expired at `now`.
    pub fn is_valid_delegate(&self, identity: &Identity, delegate_type: &str, delegate: &Identity, now: Round) -> bool {
        self.delegates
            .get(&delegation_key(identity, delegate_type, delegate))
            .is_some_and(|expiry| now < *expiry)
    }

    fn require_owner(&self, identity: &Identity, caller: &Identity) -> Result<(), AuthError> {
        match self.owners.get(identity) {
            Some(owner) if owner == caller => Ok(()),
            Some(_) => Err(AuthError::ineligible(caller, format!("not the owner of {identity}"))),
            None => Err(AuthError::ineligible(caller, format!("{identity} is not registered"))),
        }
    }
}

impl Archetype for IdentityRegistry {
    const NAME: &'static str = "identity_registry";

    type Params = RegistryParams;
    type Action = RegistryAction;
    type View = RegistryView;

    fn create(_params: RegistryParams, _tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        Ok(Self::default())
    }

    fn phase(&self) -> &'static str {
        "Active"
    }

    fn action_name(action: &RegistryAction) -> &'static str {
        match action {
            RegistryAction::CreateIdentity => "create_identity",
            RegistryAction::ChangeOwner { .. } => "change_owner",
            RegistryAction::AddDelegate { .. } => "add_delegate",
            RegistryAction::RevokeDelegate { .. } => "revoke_delegate",
        }
    }

    fn authorize(&self, action: &RegistryAction, ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match action {
            RegistryAction::CreateIdentity => Ok(()),
            RegistryAction::ChangeOwner { identity, .. }
            | RegistryAction::AddDelegate { identity, .. }
            | RegistryAction::RevokeDelegate { identity, .. } => self.require_owner(identity, ctx.caller()),
        }
    }

    fn apply(&mut self, action: RegistryAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            RegistryAction::CreateIdentity => {
                let caller = tx.caller().clone();
                if self.owners.contains_key(&caller) {
                    return Err(EngineError::AlreadyProcessed {
                        what: format!("identity {caller}"),
                    });
                }
                self.owners.insert(caller.clone(), caller);
            }
            RegistryAction::ChangeOwner { identity, new_owner } => {
                require_address(&new_owner, "new owner")?;
                self.owners.insert(identity, new_owner);
            }
            RegistryAction::AddDelegate {
                identity,
                delegate_type,
                delegate,
                validity,
            } => {
                require_address(&delegate, "delegate")?;
                let expiry = tx.now().checked_add(validity).ok_or(EngineError::Overflow)?;
                self.delegates
                    .insert(delegation_key(&identity, &delegate_type, &delegate), expiry);
            }
            RegistryAction::RevokeDelegate {
                identity,
                delegate_type,
                delegate,
            } => {
                let key = delegation_key(&identity, &delegate_type, &delegate);
                let now = tx.now();
                match self.delegates.get_mut(&key) {
                    Some(expiry) => *expiry = now.min(*expiry),
                    None => {
                        return Err(EngineError::invalid_argument(format!(
                            "no {delegate_type} delegation from {identity} to {delegate}"
                        )))
                    }
                }
            }
        }
        Ok(())
    }

    fn read(&self, view: &RegistryView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            RegistryView::OwnerOf(identity) => ViewValue::MaybeIdentity(self.owners.get(identity).cloned()),
            RegistryView::ValidDelegate {
                identity,
                delegate_type,
                delegate,
            } => ViewValue::Bool(self.is_valid_delegate(identity, delegate_type, delegate, ctx.now())),
            RegistryView::DelegateExpiry {
                identity,
                delegate_type,
                delegate,
            } => match self.delegates.get(&delegation_key(identity, delegate_type, delegate)) {
                Some(expiry) => ViewValue::Round(*expiry),
                None => ViewValue::Unit,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{alice, bob, carol, TestEngine, RESERVE, STARTING_BALANCE};
    use custody_types::ids::ContractId;
    use custody_types::numeric::Amount;

    fn setup(engine: &mut TestEngine) -> ContractId {
        let id = engine
            .create(&carol(), RESERVE, RegistryParams::default())
            .unwrap()
            .contract;
        engine
            .call(id, &alice(), Amount::ZERO, RegistryAction::CreateIdentity)
            .unwrap();
        id
    }

    fn valid(engine: &TestEngine, id: ContractId) -> ViewValue {
        engine
            .read(
                id,
                &carol(),
                RegistryView::ValidDelegate {
                    identity: alice(),
                    delegate_type: "signer".into(),
                    delegate: bob(),
                },
            )
            .unwrap()
    }

    fn add_delegate(validity: u64) -> RegistryAction {
        RegistryAction::AddDelegate {
            identity: alice(),
            delegate_type: "signer".into(),
            delegate: bob(),
            validity,
        }
    }

    #[test]
    fn test_create_identity_once() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let owner = engine.read(id, &bob(), RegistryView::OwnerOf(alice())).unwrap();
        assert_eq!(owner.as_identity(), Some(&alice()));

        let err = engine
            .call(id, &alice(), Amount::ZERO, RegistryAction::CreateIdentity)
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyProcessed { .. }));
    }

    #[test]
    fn test_delegate_expires() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine.call(id, &alice(), Amount::ZERO, add_delegate(5)).unwrap();
        assert_eq!(valid(&engine, id), ViewValue::Bool(true));

        engine.advance(4);
        assert_eq!(valid(&engine, id), ViewValue::Bool(true));
        engine.advance(1);
        assert_eq!(valid(&engine, id), ViewValue::Bool(false));
    }

    #[test]
    fn test_change_owner_moves_control() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine
            .call(
                id,
                &alice(),
                Amount::ZERO,
                RegistryAction::ChangeOwner {
                    identity: alice(),
                    new_owner: bob(),
                },
            )
            .unwrap();

        let err = engine.call(id, &alice(), Amount::ZERO, add_delegate(5)).unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(_)));
        engine.call(id, &bob(), Amount::ZERO, add_delegate(5)).unwrap();
    }

    #[test]
    fn test_unregistered_identity_rejected() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let err = engine
            .call(
                id,
                &bob(),
                Amount::ZERO,
                RegistryAction::AddDelegate {
                    identity: bob(),
                    delegate_type: "signer".into(),
                    delegate: carol(),
                    validity: 10,
                },
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotAuthorized(AuthError::Ineligible { .. })));
    }

    #[test]
    fn test_revoke_delegate() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        engine.call(id, &alice(), Amount::ZERO, add_delegate(100)).unwrap();
        let revoke = RegistryAction::RevokeDelegate {
            identity: alice(),
            delegate_type: "signer".into(),
            delegate: bob(),
        };
        engine.call(id, &alice(), Amount::ZERO, revoke).unwrap();
        assert_eq!(valid(&engine, id), ViewValue::Bool(false));
    }

    #[test]
    fn test_delegation_does_not_leak_across_identities() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let alicex = Identity::user("alicex");
        engine.ledger_mut().fund(&alicex, STARTING_BALANCE).unwrap();
        engine
            .call(id, &alicex, Amount::ZERO, RegistryAction::CreateIdentity)
            .unwrap();
        engine
            .call(
                id,
                &alicex,
                Amount::ZERO,
                RegistryAction::AddDelegate {
                    identity: alicex.clone(),
                    delegate_type: String::new(),
                    delegate: bob(),
                    validity: 100,
                },
            )
            .unwrap();

        let granted = RegistryView::ValidDelegate {
            identity: alicex,
            delegate_type: String::new(),
            delegate: bob(),
        };
        assert_eq!(engine.read(id, &carol(), granted).unwrap(), ViewValue::Bool(true));
        let forged = RegistryView::ValidDelegate {
            identity: alice(),
            delegate_type: "x".into(),
            delegate: bob(),
        };
        assert_eq!(engine.read(id, &carol(), forged).unwrap(), ViewValue::Bool(false));
    }

    #[test]
    fn test_revoke_unknown_delegate() {
        let mut engine = TestEngine::funded();
        let id = setup(&mut engine);
        let revoke = RegistryAction::RevokeDelegate {
            identity: alice(),
            delegate_type: "admin".into(),
            delegate: bob(),
        };
        let err = engine.call(id, &alice(), Amount::ZERO, revoke).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument { .. }));
    }
}
