//! Inter-location transfer models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::MovementOutcome;
use crate::error::{InventoryError, InventoryResult};
use crate::models::TransferRequest;
use crate::types::{ColorId, LocationId, ProductId, SizeId, StockKind};

/// One line of a transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub product_id: ProductId,
    pub color_id: ColorId,
    /// Required for pair transfers, must be absent for box transfers
    pub size_id: Option<SizeId>,
    pub quantity: i64,
}

/// Transfer order lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InTransit => "in_transit",
            TransferStatus::Completed => "completed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransferStatus::Pending),
            "in_transit" => Some(TransferStatus::InTransit),
            "completed" => Some(TransferStatus::Completed),
            "cancelled" => Some(TransferStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        use TransferStatus::*;
        matches!(
            (self, next),
            (Pending, InTransit)
                | (Pending, Completed)
                | (InTransit, Completed)
                | (Pending, Cancelled)
                | (InTransit, Cancelled)
        )
    }

    /// Move to `next`, or fail with the rejected transition
    pub fn transition(self, next: TransferStatus) -> InventoryResult<TransferStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(InventoryError::InvalidTransition {
                from: self.to_string(),
                to: next.to_string(),
            })
        }
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transfer document moving stock between two locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub id: Uuid,
    pub reference_id: String,
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub transfer_type: StockKind,
    pub transfer_date: NaiveDate,
    pub status: TransferStatus,
    pub items: Vec<TransferItem>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Operation under which completing an order claims its reference
pub const TRANSFER_ORDER_COMPLETION: &str = "complete_transfer_order";

impl TransferOrder {
    /// The stock movement that completing this order applies
    pub fn movement_request(&self) -> TransferRequest {
        TransferRequest {
            source_location_id: self.source_location_id,
            destination_location_id: self.destination_location_id,
            transfer_type: self.transfer_type,
            items: self.items.clone(),
            reference_id: Some(self.reference_id.clone()),
            notes: self.notes.clone(),
        }
    }

    /// Only a movement freshly applied under this order's reference may
    /// complete it; a replay means the items were never moved by this order
    pub fn check_completion(&self, outcome: &MovementOutcome) -> InventoryResult<()> {
        if outcome.replayed || outcome.reference_id != self.reference_id {
            return Err(InventoryError::invalid(
                "reference_id",
                format!(
                    "reference {} was already applied by another movement",
                    self.reference_id
                ),
            ));
        }
        Ok(())
    }
}
