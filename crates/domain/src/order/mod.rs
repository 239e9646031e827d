//! Order aggregate and related types.

mod aggregate;
mod commands;
mod invoice;
pub mod snapshot;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderLine, OrderRecord, StatusChange};
pub use commands::{PlaceOrder, PlaceOrderItem};
pub use invoice::{InvoiceNumber, InvoiceNumberGenerator, UuidInvoiceNumbers};
pub use snapshot::ProductSnapshot;
pub use state::{Lifecycle, OrderStatus};
pub use value_objects::{Money, Weight};
