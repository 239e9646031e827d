//! Order processing engine.
//!
//! This crate orchestrates the order workflows on top of an [`OrderStore`]:
//! 1. `OrderAssembler` turns a `PlaceOrder` request into a persisted order,
//!    reserving stock for every line inside one unit of work
//! 2. `OrderQueries` serves ownership-scoped reads and listings
//! 3. `OrderLifecycleService` moves orders through the status machine
//!
//! If any step of order creation fails, the unit of work is rolled back and
//! no stock stays reserved.
//!
//! [`OrderStore`]: store::OrderStore

pub mod assembler;
pub mod config;
pub mod error;
pub mod ledger;
pub mod lifecycle;
pub mod queries;

pub use assembler::OrderAssembler;
pub use config::EngineConfig;
pub use error::{EngineError, Entity, Result};
pub use ledger::InventoryLedger;
pub use lifecycle::OrderLifecycleService;
pub use queries::OrderQueries;
