//! Domain layer for the order processing engine.
//!
//! This crate holds the pure order model:
//! - `Money` and `Weight` value objects with exact integer arithmetic
//! - The `Order` aggregate with its lines and frozen product snapshots
//! - The order status machine (`OrderStatus` + `Lifecycle`)
//! - The `PlaceOrder` request and its validation
//! - Read-only views of the catalogue entities an order refers to

pub mod catalog;
pub mod error;
pub mod order;

pub use catalog::{Address, Buyer, Product};
pub use error::OrderError;
pub use order::{
    InvoiceNumber, InvoiceNumberGenerator, Lifecycle, Money, Order, OrderLine, OrderRecord,
    OrderStatus, PlaceOrder, PlaceOrderItem, ProductSnapshot, StatusChange, UuidInvoiceNumbers,
    Weight, snapshot,
};
