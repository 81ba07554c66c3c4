//! Movement log models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CellKey, ColorId, LocationId, ProductId, SizeId, StockKind};

/// Kinds of movement log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementKind {
    Receipt,
    TransferOut,
    TransferIn,
    ConversionOut,
    ConversionIn,
    Sale,
    Reject,
    OpnameAdjust,
}

impl MovementKind {
    pub const ALL: [MovementKind; 8] = [
        MovementKind::Receipt,
        MovementKind::TransferOut,
        MovementKind::TransferIn,
        MovementKind::ConversionOut,
        MovementKind::ConversionIn,
        MovementKind::Sale,
        MovementKind::Reject,
        MovementKind::OpnameAdjust,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Receipt => "RECEIPT",
            MovementKind::TransferOut => "TRANSFER_OUT",
            MovementKind::TransferIn => "TRANSFER_IN",
            MovementKind::ConversionOut => "CONVERSION_OUT",
            MovementKind::ConversionIn => "CONVERSION_IN",
            MovementKind::Sale => "SALE",
            MovementKind::Reject => "REJECT",
            MovementKind::OpnameAdjust => "OPNAME_ADJUST",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only movement log entry.
///
/// Exactly one of `box_delta` / `pair_delta` is set, matching the kind of
/// the cell the record is posted against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: Uuid,
    /// Log position; breaks ties between records with the same timestamp
    pub seq: i64,
    pub kind: MovementKind,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: Option<SizeId>,
    pub box_delta: Option<i64>,
    pub pair_delta: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub reference_id: String,
    pub notes: Option<String>,
    /// Supplier for receipts
    pub counterparty: Option<String>,
    /// Price per pair for sales
    pub unit_price: Option<Decimal>,
    /// Opname audit: system count at the time of the physical count
    pub system_count: Option<i64>,
    /// Opname audit: physically counted amount
    pub physical_count: Option<i64>,
}

impl MovementRecord {
    /// Start a record against `cell` carrying `delta` of the cell's stock kind
    pub fn new(
        kind: MovementKind,
        cell: CellKey,
        delta: i64,
        reference_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let (box_delta, pair_delta) = match cell.kind() {
            StockKind::Dus => (Some(delta), None),
            StockKind::Pasang => (None, Some(delta)),
        };
        Self {
            id: Uuid::new_v4(),
            seq: 0,
            kind,
            location_id: cell.location_id,
            product_id: cell.product_id,
            color_id: cell.color_id,
            size_id: cell.size_id,
            box_delta,
            pair_delta,
            timestamp,
            reference_id: reference_id.into(),
            notes: None,
            counterparty: None,
            unit_price: None,
            system_count: None,
            physical_count: None,
        }
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes;
        self
    }

    pub fn with_counterparty(mut self, counterparty: Option<String>) -> Self {
        self.counterparty = counterparty;
        self
    }

    pub fn with_unit_price(mut self, unit_price: Decimal) -> Self {
        self.unit_price = Some(unit_price);
        self
    }

    pub fn with_counts(mut self, system_count: i64, physical_count: i64) -> Self {
        self.system_count = Some(system_count);
        self.physical_count = Some(physical_count);
        self
    }

    pub fn cell(&self) -> CellKey {
        CellKey {
            location_id: self.location_id,
            product_id: self.product_id,
            color_id: self.color_id,
            size_id: self.size_id,
        }
    }

    /// Signed change of the given stock kind
    pub fn delta(&self, kind: StockKind) -> i64 {
        match kind {
            StockKind::Dus => self.box_delta.unwrap_or(0),
            StockKind::Pasang => self.pair_delta.unwrap_or(0),
        }
    }

    /// Signed change of the stock kind the record's cell carries
    pub fn cell_delta(&self) -> i64 {
        self.delta(self.cell().kind())
    }
}
