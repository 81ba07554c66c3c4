//! Error taxonomy of the inventory core

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Balance, CellKey, ProductId, StockKind};

/// A single cell that cannot cover what a movement asks of it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Shortage {
    pub cell: CellKey,
    pub kind: StockKind,
    /// Total amount the movement would take from the cell
    pub requested: i64,
    pub available: i64,
}

impl Shortage {
    pub fn shortfall(&self) -> i64 {
        self.requested - self.available
    }
}

/// A malformed field of a movement request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
    /// Index of the offending line for multi-item movements
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<usize>,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            item: None,
        }
    }

    pub fn at_item(mut self, item: usize) -> Self {
        self.item = Some(item);
        self
    }
}

/// Errors raised by the ledger, the conversion tracker and the movement engine
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryError {
    #[error("insufficient stock in {} cell(s)", shortages.len())]
    InsufficientStock { shortages: Vec<Shortage> },

    #[error("invalid movement: {}", join_violations(violations))]
    InvalidMovement { violations: Vec<Violation> },

    #[error("conversion batch {batch_id} has no boxes remaining")]
    NoBoxesRemaining { batch_id: Uuid },

    #[error("concurrency conflict: {message}")]
    ConcurrencyConflict { message: String },

    #[error("ledger consistency violation at {cell}: stored {stored:?}, replayed {replayed:?}")]
    ConsistencyViolation {
        cell: CellKey,
        stored: Balance,
        replayed: Balance,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("product {product_id} has {open_batches} conversion batch(es) in flight")]
    ConversionInFlight {
        product_id: ProductId,
        open_batches: usize,
    },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| match v.item {
            Some(item) => format!("items[{}].{}: {}", item, v.field, v.message),
            None => format!("{}: {}", v.field, v.message),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl InventoryError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        InventoryError::InvalidMovement {
            violations: vec![Violation::new(field, message)],
        }
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        InventoryError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may simply retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(self, InventoryError::ConcurrencyConflict { .. })
    }

    /// Errors that indicate a defect rather than a caller mistake
    pub fn is_fatal(&self) -> bool {
        matches!(self, InventoryError::ConsistencyViolation { .. })
    }
}

/// Turn collected violations into a result
pub fn violations_to_result(violations: Vec<Violation>) -> InventoryResult<()> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(InventoryError::InvalidMovement { violations })
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;
