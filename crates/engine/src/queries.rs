//! Ownership-scoped order reads.

use common::{BuyerId, OrderId};
use domain::Order;
use store::{OrderFilter, OrderPage, OrderScope, OrderStore};

use crate::{EngineConfig, EngineError, Entity, Result};

/// Read side of the engine.
pub struct OrderQueries<S: OrderStore> {
    store: S,
    config: EngineConfig,
}

impl<S: OrderStore> OrderQueries<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Loads one of the buyer's orders with its lines and snapshots.
    ///
    /// Orders placed by someone else are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: OrderId, buyer_id: BuyerId) -> Result<Order> {
        self.config
            .bounded(async {
                self.store
                    .find_order(order_id, OrderScope::Buyer(buyer_id))
                    .await?
                    .ok_or(EngineError::NotFound(Entity::Order))
            })
            .await
    }

    /// Lists the buyer's orders, newest first.
    #[tracing::instrument(skip(self), fields(buyer_id = %filter.buyer_id))]
    pub async fn list(&self, filter: &OrderFilter) -> Result<OrderPage> {
        self.config
            .bounded(async { self.store.list_orders(filter).await.map_err(EngineError::from) })
            .await
    }
}
