use common::OrderId;
use domain::{InvoiceNumber, OrderStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another order already carries this invoice number.
    #[error("Duplicate invoice number: {0}")]
    DuplicateInvoice(InvoiceNumber),

    /// The order's status changed between load and update.
    #[error("Order {order_id} is no longer in status {expected}")]
    StatusChanged {
        order_id: OrderId,
        expected: OrderStatus,
    },

    /// The order does not exist (or is soft-deleted).
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The unit of work was already committed or rolled back.
    #[error("Unit of work is already closed")]
    TransactionClosed,

    /// The backing store is temporarily unavailable.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persisted row could not be mapped back into the domain model.
    #[error("Invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(err) => match err {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => true,
                // serialization_failure, deadlock_detected
                sqlx::Error::Database(db_err) => {
                    matches!(db_err.code().as_deref(), Some("40001") | Some("40P01"))
                }
                _ => false,
            },
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
