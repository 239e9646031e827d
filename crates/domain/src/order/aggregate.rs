//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{AddressId, BuyerId, OrderId, OrderLineId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

use super::{InvoiceNumber, Lifecycle, Money, OrderStatus, PlaceOrder, ProductSnapshot};

/// One product-quantity-price entry within an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,

    /// Reference to the catalogue product; the product may later change or vanish.
    pub product_id: ProductId,

    pub quantity: u32,

    /// Unit price captured when the order was placed.
    pub unit_price: Money,

    pub snapshot: ProductSnapshot,
}

impl OrderLine {
    /// Creates a new order line with a fresh line ID.
    pub fn new(
        order_id: OrderId,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        snapshot: ProductSnapshot,
    ) -> Self {
        Self {
            id: OrderLineId::new(),
            order_id,
            product_id,
            quantity,
            unit_price,
            snapshot,
        }
    }

    /// Returns `unit_price * quantity`, or `None` on overflow.
    pub fn line_total(&self) -> Option<Money> {
        self.unit_price.checked_multiply(self.quantity)
    }
}

/// A status change applied to an order, as the store needs to persist it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    /// Tracking number recorded with a `Shipped` transition.
    pub shipping_tracking: Option<String>,
}

/// Every persisted field of an order, used to rebuild it from storage.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub id: OrderId,
    pub buyer_id: BuyerId,
    pub address_id: AddressId,
    pub invoice_number: InvoiceNumber,
    pub total_amount: Money,
    pub shipping_cost: Money,
    pub payment_method: String,
    pub shipping_courier: Option<String>,
    pub shipping_tracking: Option<String>,
    pub lifecycle: Lifecycle,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order aggregate root.
///
/// Created once with all its lines, then changed only through status
/// transitions. The total is computed at creation and never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: BuyerId,
    address_id: AddressId,
    invoice_number: InvoiceNumber,
    total_amount: Money,
    shipping_cost: Money,
    payment_method: String,
    shipping_courier: Option<String>,
    shipping_tracking: Option<String>,
    lifecycle: Lifecycle,
    lines: Vec<OrderLine>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderRecord> for Order {
    fn from(record: OrderRecord) -> Self {
        Self {
            id: record.id,
            buyer_id: record.buyer_id,
            address_id: record.address_id,
            invoice_number: record.invoice_number,
            total_amount: record.total_amount,
            shipping_cost: record.shipping_cost,
            payment_method: record.payment_method,
            shipping_courier: record.shipping_courier,
            shipping_tracking: record.shipping_tracking,
            lifecycle: record.lifecycle,
            lines: record.lines,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> BuyerId {
        self.buyer_id
    }

    pub fn address_id(&self) -> AddressId {
        self.address_id
    }

    pub fn invoice_number(&self) -> &InvoiceNumber {
        &self.invoice_number
    }

    /// Returns the total fixed at creation: line totals plus shipping cost.
    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn shipping_cost(&self) -> Money {
        self.shipping_cost
    }

    pub fn payment_method(&self) -> &str {
        &self.payment_method
    }

    pub fn shipping_courier(&self) -> Option<&str> {
        self.shipping_courier.as_deref()
    }

    pub fn shipping_tracking(&self) -> Option<&str> {
        self.shipping_tracking.as_deref()
    }

    pub fn status(&self) -> OrderStatus {
        self.lifecycle.status()
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Returns the lines in submission order.
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// Returns the total quantity of all lines.
    pub fn total_quantity(&self) -> u64 {
        self.lines.iter().map(|line| u64::from(line.quantity)).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

// Command methods
impl Order {
    /// Assembles a new pending order from a validated command and its lines.
    pub fn place(
        id: OrderId,
        command: &PlaceOrder,
        invoice_number: InvoiceNumber,
        lines: Vec<OrderLine>,
        at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::NoItems);
        }

        let total_amount = lines
            .iter()
            .try_fold(command.shipping_cost, |total, line| {
                line.line_total().and_then(|line_total| total.checked_add(line_total))
            })
            .ok_or(OrderError::AmountOverflow)?;

        Ok(Self {
            id,
            buyer_id: command.buyer_id,
            address_id: command.address_id,
            invoice_number,
            total_amount,
            shipping_cost: command.shipping_cost,
            payment_method: command.payment_method.trim().to_string(),
            shipping_courier: command.shipping_courier.clone(),
            shipping_tracking: None,
            lifecycle: Lifecycle::started(at),
            lines,
            created_at: at,
            updated_at: at,
        })
    }

    /// Moves the order to `target`.
    ///
    /// `tracking` is only recorded on the transition into `Shipped`.
    pub fn transition(
        &mut self,
        target: OrderStatus,
        at: DateTime<Utc>,
        tracking: Option<String>,
    ) -> Result<StatusChange, OrderError> {
        let from = self.lifecycle.status();
        self.lifecycle.transition(target, at)?;

        if target == OrderStatus::Shipped && tracking.is_some() {
            self.shipping_tracking = tracking;
        }
        self.updated_at = at;

        Ok(StatusChange {
            from,
            to: target,
            at,
            shipping_tracking: if target == OrderStatus::Shipped {
                self.shipping_tracking.clone()
            } else {
                None
            },
        })
    }
}
