//! Engine error types.

use std::time::Duration;

use common::ProductId;
use domain::{OrderError, OrderStatus};
use store::StoreError;
use thiserror::Error;

/// Kinds of records an operation can fail to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Buyer,
    Address,
    Product,
    Order,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Entity::Buyer => "buyer",
            Entity::Address => "address",
            Entity::Product => "product",
            Entity::Order => "order",
        };
        write!(f, "{name}")
    }
}

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The record is absent, or exists but is not visible to the caller.
    #[error("{0} not found")]
    NotFound(Entity),

    /// A product lacks enough units for the requested quantity.
    #[error(
        "Insufficient stock for product {product_id}: requested {requested}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// The request is malformed.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] OrderError),

    /// The status change is not allowed.
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// A concurrent writer got there first.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Store error.
    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    /// The operation did not finish within the configured timeout.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    /// Returns true if the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Timeout(_) => true,
            EngineError::Persistence(err) => err.is_transient(),
            _ => false,
        }
    }

    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            EngineError::NotFound(_) => "not_found",
            EngineError::InsufficientStock { .. } => "insufficient_stock",
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::InvalidTransition { .. } => "invalid_transition",
            EngineError::Conflict(_) => "conflict",
            EngineError::Persistence(_) => "persistence",
            EngineError::Timeout(_) => "timeout",
        }
    }
}

/// Convenience type alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
