//! Order persistence for the order processing engine.
//!
//! - [`OrderStore`] opens [`UnitOfWork`]s and serves ownership-scoped reads
//! - [`UnitOfWork`] groups stock decrements and the order write into one
//!   atomic step
//! - [`InMemoryOrderStore`] and [`PostgresOrderStore`] implement both

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OrderFilter, OrderPage, OrderScope};
pub use store::{OrderStore, StockDecrement, UnitOfWork};
