//! Order commands.

use common::{AddressId, BuyerId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::OrderError;

use super::Money;

/// One requested line: a product, how many units, and the agreed unit price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl PlaceOrderItem {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
        }
    }
}

/// Command to place a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    /// The buyer placing the order (as authenticated upstream).
    pub buyer_id: BuyerId,

    /// Destination address from the buyer's address book.
    pub address_id: AddressId,

    pub shipping_cost: Money,

    /// Free-form payment method label, e.g. `bank_transfer` or `cod`.
    pub payment_method: String,

    pub shipping_courier: Option<String>,

    /// Items in submission order.
    pub items: Vec<PlaceOrderItem>,
}

impl PlaceOrder {
    /// Creates a command with no courier and no items.
    pub fn new(
        buyer_id: impl Into<BuyerId>,
        address_id: impl Into<AddressId>,
        shipping_cost: Money,
        payment_method: impl Into<String>,
    ) -> Self {
        Self {
            buyer_id: buyer_id.into(),
            address_id: address_id.into(),
            shipping_cost,
            payment_method: payment_method.into(),
            shipping_courier: None,
            items: Vec::new(),
        }
    }

    pub fn with_courier(mut self, courier: impl Into<String>) -> Self {
        self.shipping_courier = Some(courier.into());
        self
    }

    pub fn with_item(
        mut self,
        product_id: impl Into<ProductId>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        self.items
            .push(PlaceOrderItem::new(product_id, quantity, unit_price));
        self
    }

    /// Checks the request shape without consulting any store.
    ///
    /// Items are checked in submission order and the first failure wins.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.shipping_cost.is_negative() {
            return Err(OrderError::InvalidShippingCost {
                cents: self.shipping_cost.cents(),
            });
        }

        if self.payment_method.trim().is_empty() {
            return Err(OrderError::PaymentMethodRequired);
        }

        if self.items.is_empty() {
            return Err(OrderError::NoItems);
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    index,
                    quantity: item.quantity,
                });
            }
            if item.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    index,
                    price: item.unit_price.cents(),
                });
            }
        }

        Ok(())
    }
}
