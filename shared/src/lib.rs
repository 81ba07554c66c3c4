//! Inventory core for the dus / pasang stock ledger
//!
//! This crate holds the pure, I/O-free part of the system: domain types,
//! the stock ledger, the conversion tracker, the movement engine and the
//! read projections. The backend runs the same engine against balances it
//! has locked in the database.

pub mod conversion;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod query;
pub mod types;
pub mod validation;

pub use conversion::ConversionTracker;
pub use engine::{generate_reference_id, MovementEngine, MovementOutcome};
pub use error::*;
pub use ledger::StockLedger;
pub use models::*;
pub use query::*;
pub use types::*;
pub use validation::*;
