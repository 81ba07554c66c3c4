//! Business logic services for the stock ledger

pub mod conversion;
pub mod ledger;
pub mod movement;
pub mod product;
pub mod stock;
pub mod transfer;

pub use conversion::ConversionService;
pub use ledger::LedgerService;
pub use movement::MovementService;
pub use product::ProductService;
pub use stock::StockService;
pub use transfer::TransferService;
