use std::sync::Arc;

use async_trait::async_trait;
use common::{AddressId, BuyerId, OrderId, ProductId};
use domain::{Address, Buyer, Order, Product, StatusChange};

use crate::{OrderFilter, OrderPage, OrderScope, Result};

/// Outcome of an atomic conditional stock decrement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StockDecrement {
    /// Stock was decremented; carries the product as it is after the decrement.
    Applied(Product),

    /// Fewer units than requested were available; nothing changed.
    Insufficient { available: u32 },

    /// The product does not exist (or is soft-deleted).
    Missing,
}

/// One atomic unit of work against the store.
///
/// Everything done through a unit of work becomes visible together on
/// [`commit`](UnitOfWork::commit), or not at all. Dropping a unit of work
/// without committing rolls it back, including stock decrements.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_buyer(&mut self, buyer_id: BuyerId) -> Result<Option<Buyer>>;

    async fn find_address(&mut self, address_id: AddressId) -> Result<Option<Address>>;

    async fn find_product(&mut self, product_id: ProductId) -> Result<Option<Product>>;

    /// Tests `stock >= quantity` and decrements by `quantity` as one
    /// indivisible step relative to every other unit of work.
    async fn decrement_stock(
        &mut self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<StockDecrement>;

    /// Writes the order with all its lines and snapshots.
    ///
    /// Fails with `DuplicateInvoice` if the invoice number is taken.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Loads an order visible to `scope`.
    ///
    /// Orders outside the scope are reported as absent, exactly like orders
    /// that do not exist.
    async fn find_order(&self, order_id: OrderId, scope: OrderScope) -> Result<Option<Order>>;

    /// Returns one page of a buyer's orders, newest first, plus the total
    /// number of matching orders.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<OrderPage>;

    /// Persists a status change if the order is still in `change.from`.
    ///
    /// Fails with `StatusChanged` when another writer moved the order first.
    async fn update_status(&self, order_id: OrderId, change: &StatusChange) -> Result<()>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        (**self).begin().await
    }

    async fn find_order(&self, order_id: OrderId, scope: OrderScope) -> Result<Option<Order>> {
        (**self).find_order(order_id, scope).await
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<OrderPage> {
        (**self).list_orders(filter).await
    }

    async fn update_status(&self, order_id: OrderId, change: &StatusChange) -> Result<()> {
        (**self).update_status(order_id, change).await
    }
}
