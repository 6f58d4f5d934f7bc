//! Product — tagged record spawned by a factory
//!
//! Has no actions. The tag is only readable by the owner.

use custody_types::ids::Identity;
use serde::{Deserialize, Serialize};

use super::{require_address, Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::security::{Role, RoleBindings};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductParams {
    pub owner: Identity,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductAction {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductView {
    Tag,
    Factory,
    Owner,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    roles: RoleBindings,
    tag: String,
}

impl Archetype for Product {
    const NAME: &'static str = "product";

    type Params = ProductParams;
    type Action = ProductAction;
    type View = ProductView;

    fn create(params: ProductParams, tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        require_address(&params.owner, "owner")?;
        let mut roles = RoleBindings::new().with(Role::Owner, params.owner);
        if tx.caller().is_contract() {
            roles.bind(Role::Factory, tx.caller().clone());
        }
        Ok(Self { roles, tag: params.tag })
    }

    fn phase(&self) -> &'static str {
        "Active"
    }

    fn action_name(action: &ProductAction) -> &'static str {
        match *action {}
    }

    fn authorize(&self, action: &ProductAction, _ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        match *action {}
    }

    fn apply(&mut self, action: ProductAction, _tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {}
    }

    fn read(&self, view: &ProductView, ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            ProductView::Tag => {
                self.roles.require(Role::Owner, ctx.caller())?;
                ViewValue::Text(self.tag.clone())
            }
            ProductView::Factory => ViewValue::MaybeIdentity(self.roles.holder(Role::Factory).cloned()),
            ProductView::Owner => ViewValue::MaybeIdentity(self.roles.holder(Role::Owner).cloned()),
        })
    }
}
