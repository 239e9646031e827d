//! Stock reservation against the catalogue.

use common::ProductId;
use domain::Product;
use store::{StockDecrement, UnitOfWork};

use crate::{EngineError, Entity, Result};

/// Reserves stock inside a unit of work.
///
/// There is no release path: a failed order rolls back its unit of work,
/// and the decrements with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Takes `quantity` units of a product, or fails without touching stock.
    ///
    /// Returns the product as it is after the decrement.
    pub async fn reserve(
        &self,
        uow: &mut dyn UnitOfWork,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<Product> {
        match uow.decrement_stock(product_id, quantity).await? {
            StockDecrement::Applied(product) => {
                metrics::counter!("stock_reservations_total").increment(1);
                tracing::debug!(%product_id, quantity, remaining = product.stock, "stock reserved");
                Ok(product)
            }
            StockDecrement::Insufficient { available } => {
                metrics::counter!("stock_reservation_rejections_total").increment(1);
                Err(EngineError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                })
            }
            StockDecrement::Missing => Err(EngineError::NotFound(Entity::Product)),
        }
    }
}
