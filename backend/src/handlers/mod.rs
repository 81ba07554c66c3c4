//! HTTP handlers for the stock ledger API

pub mod conversion;
pub mod health;
pub mod movement;
pub mod product;
pub mod stock;
pub mod transfer;

pub use conversion::*;
pub use health::*;
pub use movement::*;
pub use product::*;
pub use stock::*;
pub use transfer::*;
