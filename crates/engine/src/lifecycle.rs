//! Order status transitions.

use chrono::{SubsecRound, Utc};
use common::{BuyerId, OrderId};
use domain::{Order, OrderError, OrderStatus};
use store::{OrderScope, OrderStore, StoreError};

use crate::{EngineConfig, EngineError, Entity, Result};

/// Moves persisted orders through the status machine.
///
/// Buyers may only cancel their own orders. Operators may apply any legal
/// transition. Cancelling does not return stock to the catalogue.
pub struct OrderLifecycleService<S: OrderStore> {
    store: S,
    config: EngineConfig,
}

impl<S: OrderStore> OrderLifecycleService<S> {
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

    /// Applies a single transition to `target`.
    ///
    /// `tracking` is recorded only when moving to `Shipped`. If another
    /// writer changes the order's status first, fails with `Conflict`.
    #[tracing::instrument(skip(self, tracking))]
    pub async fn transition(
        &self,
        order_id: OrderId,
        scope: OrderScope,
        target: OrderStatus,
        tracking: Option<String>,
    ) -> Result<Order> {
        let order = self
            .config
            .bounded(self.apply(order_id, scope, target, tracking))
            .await?;

        metrics::counter!("order_status_transitions_total", "target" => target.as_str())
            .increment(1);
        tracing::info!(%order_id, status = %order.status(), "order status changed");
        Ok(order)
    }

    /// Cancels one of the buyer's orders.
    pub async fn cancel(&self, order_id: OrderId, buyer_id: BuyerId) -> Result<Order> {
        self.transition(
            order_id,
            OrderScope::Buyer(buyer_id),
            OrderStatus::Cancelled,
            None,
        )
        .await
    }

    async fn apply(
        &self,
        order_id: OrderId,
        scope: OrderScope,
        target: OrderStatus,
        tracking: Option<String>,
    ) -> Result<Order> {
        let mut order = self
            .store
            .find_order(order_id, scope)
            .await?
            .ok_or(EngineError::NotFound(Entity::Order))?;

        if matches!(scope, OrderScope::Buyer(_)) && target != OrderStatus::Cancelled {
            return Err(EngineError::InvalidTransition {
                from: order.status(),
                to: target,
            });
        }

        let change = order
            .transition(target, Utc::now().trunc_subsecs(6), tracking)
            .map_err(|e| match e {
                OrderError::InvalidStateTransition { from, to } => {
                    EngineError::InvalidTransition { from, to }
                }
                other => EngineError::InvalidInput(other),
            })?;

        self.store
            .update_status(order_id, &change)
            .await
            .map_err(|e| match e {
                StoreError::StatusChanged { expected, .. } => EngineError::Conflict(format!(
                    "order {order_id} is no longer {expected}"
                )),
                StoreError::OrderNotFound(_) => EngineError::NotFound(Entity::Order),
                other => EngineError::Persistence(other),
            })?;

        Ok(order)
    }
}
