//! Read-only views of catalogue and account entities.
//!
//! These records are owned by external services. The order engine only
//! looks them up and, for products, decrements stock.

use common::{AddressId, BuyerId, ProductId};
use serde::{Deserialize, Serialize};

use crate::order::{Money, Weight};

/// A buyer account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub id: BuyerId,
    pub name: String,
}

/// A shipping address in a buyer's address book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub buyer_id: BuyerId,
    pub recipient_name: String,
    pub detail: String,
}

impl Address {
    /// Returns true if the address belongs to `buyer_id`.
    pub fn is_owned_by(&self, buyer_id: BuyerId) -> bool {
        self.buyer_id == buyer_id
    }
}

/// A product as currently listed in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub stock: u32,
    pub weight: Weight,
    pub images: Vec<String>,
}

impl Product {
    /// Returns true if at least `quantity` units are in stock.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock >= quantity
    }
}
