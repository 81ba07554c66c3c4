//! Domain models for the stock ledger

mod conversion;
mod movement;
mod product;
mod request;
mod sale;
mod transfer;

pub use conversion::*;
pub use movement::*;
pub use product::*;
pub use request::*;
pub use sale::*;
pub use transfer::*;
