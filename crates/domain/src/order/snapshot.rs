//! Point-in-time product snapshots.
//!
//! A snapshot copies the catalogue attributes of a product at the moment it
//! is purchased. Once attached to an order line it is never updated, so later
//! catalogue edits or deletions leave historical orders untouched.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

use crate::catalog::Product;

use super::{Money, OrderLine, Weight};

/// Frozen copy of a product's attributes at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub product_name: String,
    pub description: String,
    /// Catalogue price at capture time.
    pub price: Money,
    pub weight: Weight,
    pub images: Vec<String>,
    pub captured_at: DateTime<Utc>,
}

/// Copies the current attributes of `product`.
pub fn capture(product: &Product, at: DateTime<Utc>) -> ProductSnapshot {
    ProductSnapshot {
        product_name: product.name.clone(),
        description: product.description.clone(),
        price: product.price,
        weight: product.weight,
        images: product.images.clone(),
        captured_at: at,
    }
}

/// Builds the order line for a purchase of `product`, snapshot included.
///
/// `unit_price` is the price the buyer agreed to and is kept on the line
/// as-is; the snapshot keeps the catalogue price separately.
pub fn record_line(
    order_id: OrderId,
    product: &Product,
    quantity: u32,
    unit_price: Money,
    at: DateTime<Utc>,
) -> OrderLine {
    OrderLine::new(order_id, product.id, quantity, unit_price, capture(product, at))
}
