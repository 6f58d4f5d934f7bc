//! Factory — spawns [`Product`](super::product::Product) contracts
//!
//! `create_product` performs a nested create. The value attached to the call
//! is forwarded to the new product and must cover its reserve; the product
//! id is returned as the action output.

use custody_types::ids::ContractId;
use serde::{Deserialize, Serialize};

use super::product::ProductParams;
use super::{Archetype, ViewValue};
use crate::errors::{AuthError, EngineError};
use crate::transition::{ReadContext, Transition};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FactoryParams {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryAction {
    CreateProduct { tag: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactoryView {
    ProductCount,
    ProductAt(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Factory {
    products: Vec<ContractId>,
}

impl Factory {
    pub fn products(&self) -> &[ContractId] {
        &self.products
    }
}

impl Archetype for Factory {
    const NAME: &'static str = "factory";

    type Params = FactoryParams;
    type Action = FactoryAction;
    type View = FactoryView;

    fn create(_params: FactoryParams, _tx: &mut Transition<'_>) -> Result<Self, EngineError> {
        Ok(Self::default())
    }

    fn phase(&self) -> &'static str {
        "Active"
    }

    fn action_name(action: &FactoryAction) -> &'static str {
        match action {
            FactoryAction::CreateProduct { .. } => "create_product",
        }
    }

    fn authorize(&self, _action: &FactoryAction, _ctx: &ReadContext<'_>) -> Result<(), AuthError> {
        Ok(())
    }

    fn apply(&mut self, action: FactoryAction, tx: &mut Transition<'_>) -> Result<(), EngineError> {
        match action {
            FactoryAction::CreateProduct { tag } => {
                let params = ProductParams {
                    owner: tx.caller().clone(),
                    tag,
                };
                let funding = tx.attached();
                let product = tx.spawn(params.into(), funding)?;
                self.products.push(product);
                tx.set_output(ViewValue::Contract(product));
            }
        }
        Ok(())
    }

    fn read(&self, view: &FactoryView, _ctx: &ReadContext<'_>) -> Result<ViewValue, EngineError> {
        Ok(match view {
            FactoryView::ProductCount => ViewValue::Number(self.products.len() as u64),
            FactoryView::ProductAt(index) => {
                let product = usize::try_from(*index)
                    .ok()
                    .and_then(|i| self.products.get(i))
                    .ok_or_else(|| EngineError::invalid_argument(format!("no product at index {index}")))?;
                ViewValue::Contract(*product)
            }
        })
    }
}
