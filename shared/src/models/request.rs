//! Movement requests accepted by the engine

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ConversionBatch, SalesOrder, TransferItem};
use crate::error::InventoryResult;
use crate::types::{CellKey, ColorId, LocationId, ProductId, SizeId, StockKind};
use crate::validation;

/// Goods received into box stock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveGoods {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub boxes: i64,
    #[serde(default)]
    pub supplier: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Stock moved from one location to another in one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub transfer_type: StockKind,
    pub items: Vec<TransferItem>,
    #[serde(default)]
    pub reference_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl TransferRequest {
    pub fn source_cell(&self, item: &TransferItem) -> CellKey {
        CellKey {
            location_id: self.source_location_id,
            product_id: item.product_id,
            color_id: item.color_id,
            size_id: item.size_id,
        }
    }

    pub fn destination_cell(&self, item: &TransferItem) -> CellKey {
        self.source_cell(item).at(self.destination_location_id)
    }
}

/// Boxes pulled from box stock to be opened and counted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartConversion {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub boxes: i64,
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// Pairs of one size physically counted out of a conversion batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalCount {
    pub batch_id: Uuid,
    pub size_id: SizeId,
    pub pairs: i64,
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// One box of a conversion batch finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteBox {
    pub batch_id: Uuid,
    #[serde(default)]
    pub reference_id: Option<String>,
}

/// Damaged pairs written off
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectRequest {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: SizeId,
    pub quantity: i64,
    pub reason: String,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl RejectRequest {
    pub fn cell(&self) -> CellKey {
        CellKey::pasang(self.location_id, self.product_id, self.color_id, self.size_id)
    }
}

/// Reconciliation of a physical stock count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpnameAdjustment {
    pub location_id: LocationId,
    pub stock_kind: StockKind,
    pub product_id: ProductId,
    pub color_id: ColorId,
    #[serde(default)]
    pub size_id: Option<SizeId>,
    pub physical_count: i64,
    /// Balance the counter saw in the system when counting
    pub system_count: i64,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub reference_id: Option<String>,
}

impl OpnameAdjustment {
    pub fn cell(&self) -> CellKey {
        CellKey {
            location_id: self.location_id,
            product_id: self.product_id,
            color_id: self.color_id,
            size_id: self.size_id,
        }
    }

    pub fn delta(&self) -> i64 {
        self.physical_count - self.system_count
    }
}

/// Every mutation the engine knows how to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "movement", rename_all = "snake_case")]
pub enum Movement {
    Receipt(ReceiveGoods),
    Transfer(TransferRequest),
    StartConversion(StartConversion),
    PhysicalCount(PhysicalCount),
    CompleteBox(CompleteBox),
    Sale(SalesOrder),
    Reject(RejectRequest),
    Opname(OpnameAdjustment),
}

impl Movement {
    /// Operation name used in logs and reference claims
    pub fn operation(&self) -> &'static str {
        match self {
            Movement::Receipt(_) => "receive_goods",
            Movement::Transfer(_) => "transfer",
            Movement::StartConversion(_) => "start_conversion",
            Movement::PhysicalCount(_) => "record_physical_count",
            Movement::CompleteBox(_) => "complete_one_box",
            Movement::Sale(_) => "sell",
            Movement::Reject(_) => "record_reject",
            Movement::Opname(_) => "adjust_opname",
        }
    }

    pub fn reference_id(&self) -> Option<&str> {
        match self {
            Movement::Receipt(r) => r.reference_id.as_deref(),
            Movement::Transfer(r) => r.reference_id.as_deref(),
            Movement::StartConversion(r) => r.reference_id.as_deref(),
            Movement::PhysicalCount(r) => r.reference_id.as_deref(),
            Movement::CompleteBox(r) => r.reference_id.as_deref(),
            Movement::Sale(r) => r.reference_id.as_deref(),
            Movement::Reject(r) => r.reference_id.as_deref(),
            Movement::Opname(r) => r.reference_id.as_deref(),
        }
    }

    /// Replace the reference, e.g. with a generated one
    pub fn with_reference_id(mut self, reference_id: String) -> Self {
        let slot = match &mut self {
            Movement::Receipt(r) => &mut r.reference_id,
            Movement::Transfer(r) => &mut r.reference_id,
            Movement::StartConversion(r) => &mut r.reference_id,
            Movement::PhysicalCount(r) => &mut r.reference_id,
            Movement::CompleteBox(r) => &mut r.reference_id,
            Movement::Sale(r) => &mut r.reference_id,
            Movement::Reject(r) => &mut r.reference_id,
            Movement::Opname(r) => &mut r.reference_id,
        };
        *slot = Some(reference_id);
        self
    }

    /// Batch a conversion movement operates on, if it names one
    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            Movement::PhysicalCount(r) => Some(r.batch_id),
            Movement::CompleteBox(r) => Some(r.batch_id),
            _ => None,
        }
    }

    /// Product whose box contents the movement depends on
    pub fn conversion_product(&self) -> Option<ProductId> {
        match self {
            Movement::StartConversion(r) => Some(r.product_id),
            _ => None,
        }
    }

    /// Cells the movement may write, sorted and without duplicates.
    ///
    /// Movements that act on a batch need the batch to know their cells.
    pub fn touched_cells(&self, batch: Option<&ConversionBatch>) -> Vec<CellKey> {
        let mut cells = match self {
            Movement::Receipt(r) => vec![CellKey::dus(r.location_id, r.product_id, r.color_id)],
            Movement::Transfer(r) => r
                .items
                .iter()
                .flat_map(|item| [r.source_cell(item), r.destination_cell(item)])
                .collect(),
            Movement::StartConversion(r) => {
                vec![CellKey::dus(r.location_id, r.product_id, r.color_id)]
            }
            Movement::PhysicalCount(r) => batch
                .map(|b| vec![CellKey::pasang(b.location_id, b.product_id, b.color_id, r.size_id)])
                .unwrap_or_default(),
            Movement::CompleteBox(_) => Vec::new(),
            Movement::Sale(order) => order
                .items
                .iter()
                .map(|item| {
                    CellKey::pasang(order.location_id, item.product_id, item.color_id, item.size_id)
                })
                .collect(),
            Movement::Reject(r) => vec![r.cell()],
            Movement::Opname(r) => vec![r.cell()],
        };
        cells.sort();
        cells.dedup();
        cells
    }

    /// Check the request shape; every problem is reported at once
    pub fn validate(&self) -> InventoryResult<()> {
        match self {
            Movement::Receipt(r) => validation::validate_receipt(r),
            Movement::Transfer(r) => validation::validate_transfer(r),
            Movement::StartConversion(r) => validation::validate_start_conversion(r),
            Movement::PhysicalCount(r) => validation::validate_physical_count(r),
            Movement::CompleteBox(r) => validation::validate_reference(r.reference_id.as_deref()),
            Movement::Sale(r) => validation::validate_sale(r),
            Movement::Reject(r) => validation::validate_reject(r),
            Movement::Opname(r) => validation::validate_opname(r),
        }
    }
}
