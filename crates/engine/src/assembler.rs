//! Order creation.

use std::sync::Arc;
use std::time::Instant;

use chrono::{SubsecRound, Utc};
use common::OrderId;
use domain::{
    InvoiceNumber, InvoiceNumberGenerator, Order, PlaceOrder, UuidInvoiceNumbers, snapshot,
};
use store::{OrderStore, StoreError, UnitOfWork};

use crate::{EngineConfig, EngineError, Entity, InventoryLedger, Result};

/// Turns `PlaceOrder` requests into persisted orders.
///
/// Buyer and address lookups, every stock decrement and the order write
/// run in one unit of work: either all of them take effect or none do.
pub struct OrderAssembler<S: OrderStore> {
    store: S,
    ledger: InventoryLedger,
    invoice_numbers: Arc<dyn InvoiceNumberGenerator>,
    config: EngineConfig,
}

impl<S: OrderStore> OrderAssembler<S> {
    /// Creates an assembler issuing UUID-based invoice numbers.
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: InventoryLedger::new(),
            invoice_numbers: Arc::new(UuidInvoiceNumbers),
            config: EngineConfig::default(),
        }
    }

    pub fn with_invoice_numbers(mut self, generator: Arc<dyn InvoiceNumberGenerator>) -> Self {
        self.invoice_numbers = generator;
        self
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Creates a pending order.
    ///
    /// Items are processed in submission order and the first failing item
    /// determines the error. On an invoice number collision a fresh number
    /// is drawn and the whole unit of work is retried once.
    #[tracing::instrument(
        skip(self, command),
        fields(buyer_id = %command.buyer_id, items = command.items.len())
    )]
    pub async fn create_order(&self, command: PlaceOrder) -> Result<Order> {
        let start = Instant::now();

        let result = self.create(&command).await;

        match &result {
            Ok(order) => {
                metrics::counter!("orders_created_total").increment(1);
                tracing::info!(
                    order_id = %order.id(),
                    invoice_number = %order.invoice_number(),
                    total = %order.total_amount(),
                    "order created"
                );
            }
            Err(e) => {
                metrics::counter!("order_create_failures_total", "reason" => e.reason())
                    .increment(1);
                tracing::warn!(error = %e, "order creation failed");
            }
        }
        metrics::histogram!("order_create_duration_seconds").record(start.elapsed().as_secs_f64());

        result
    }

    async fn create(&self, command: &PlaceOrder) -> Result<Order> {
        command.validate()?;

        let mut retried = false;
        loop {
            let invoice_number = self.invoice_numbers.generate();
            let attempt = self
                .config
                .bounded(self.assemble(command, invoice_number))
                .await;

            match attempt {
                Err(EngineError::Persistence(StoreError::DuplicateInvoice(taken))) => {
                    if retried {
                        return Err(EngineError::Conflict(format!(
                            "invoice number {taken} is already in use"
                        )));
                    }
                    tracing::warn!(invoice_number = %taken, "invoice number collision, retrying");
                    retried = true;
                }
                other => return other,
            }
        }
    }

    async fn assemble(&self, command: &PlaceOrder, invoice_number: InvoiceNumber) -> Result<Order> {
        let mut uow = self.store.begin().await?;

        match self.fill(uow.as_mut(), command, invoice_number).await {
            Ok(order) => {
                uow.commit().await?;
                Ok(order)
            }
            Err(e) => {
                if let Err(rollback) = uow.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn fill(
        &self,
        uow: &mut dyn UnitOfWork,
        command: &PlaceOrder,
        invoice_number: InvoiceNumber,
    ) -> Result<Order> {
        uow.find_buyer(command.buyer_id)
            .await?
            .ok_or(EngineError::NotFound(Entity::Buyer))?;

        uow.find_address(command.address_id)
            .await?
            .filter(|address| address.is_owned_by(command.buyer_id))
            .ok_or(EngineError::NotFound(Entity::Address))?;

        let order_id = OrderId::new();
        let now = Utc::now().trunc_subsecs(6);
        let mut lines = Vec::with_capacity(command.items.len());

        for item in &command.items {
            let product = uow
                .find_product(item.product_id)
                .await?
                .ok_or(EngineError::NotFound(Entity::Product))?;

            // The conditional decrement below is authoritative; this only fails fast.
            if !product.has_stock_for(item.quantity) {
                metrics::counter!("stock_reservation_rejections_total").increment(1);
                return Err(EngineError::InsufficientStock {
                    product_id: item.product_id,
                    requested: item.quantity,
                    available: product.stock,
                });
            }

            let reserved = self
                .ledger
                .reserve(uow, item.product_id, item.quantity)
                .await?;
            lines.push(snapshot::record_line(
                order_id,
                &reserved,
                item.quantity,
                item.unit_price,
                now,
            ));
        }

        let order = Order::place(order_id, command, invoice_number, lines, now)?;
        uow.insert_order(&order).await?;
        Ok(order)
    }
}
