//! Domain error types.

use thiserror::Error;

use crate::order::OrderStatus;

/// Errors raised by the order model itself: request validation, money
/// arithmetic and status transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The request contained no items.
    #[error("Order has no items")]
    NoItems,

    /// An item asked for zero units.
    #[error("Invalid quantity for item {index}: {quantity} (must be greater than 0)")]
    InvalidQuantity { index: usize, quantity: u32 },

    /// An item carried a negative unit price.
    #[error("Invalid price for item {index}: {price} (must not be negative)")]
    InvalidPrice { index: usize, price: i64 },

    /// Shipping cost was negative.
    #[error("Invalid shipping cost: {cents} (must not be negative)")]
    InvalidShippingCost { cents: i64 },

    /// Payment method was missing or blank.
    #[error("Payment method is required")]
    PaymentMethodRequired,

    /// A monetary total does not fit in the amount type.
    #[error("Order amount overflows")]
    AmountOverflow,

    /// The requested status change is not allowed from the current status.
    #[error("Invalid state transition: cannot move from {from} to {to}")]
    InvalidStateTransition { from: OrderStatus, to: OrderStatus },

    /// A status name did not match any known status.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
