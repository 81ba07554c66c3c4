//! Box-to-pair conversion batch model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{CellKey, ColorId, LocationId, ProductId};

/// Boxes pulled from box stock that are waiting to be counted into pairs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionBatch {
    pub id: Uuid,
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    /// Pairs per box captured when the batch was opened
    pub box_contents: i64,
    pub boxes_pending: i64,
    pub pairs_expected: i64,
    /// Pairs counted and credited to pair stock but not yet settled against a
    /// completed box
    pub pairs_counted: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversionBatch {
    pub fn open(
        location_id: LocationId,
        product_id: ProductId,
        color_id: ColorId,
        box_contents: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            location_id,
            product_id,
            color_id,
            box_contents,
            boxes_pending: 0,
            pairs_expected: 0,
            pairs_counted: 0,
            created_at: at,
            updated_at: at,
        }
    }

    pub fn is_open(&self) -> bool {
        self.boxes_pending > 0
    }

    /// Pairs still expected but not yet counted
    pub fn pairs_outstanding(&self) -> i64 {
        self.pairs_expected - self.pairs_counted
    }

    /// Box-stock cell the batch draws from
    pub fn dus_cell(&self) -> CellKey {
        CellKey::dus(self.location_id, self.product_id, self.color_id)
    }

    /// Holds `boxes_pending × box_contents == pairs_expected` and
    /// `0 ≤ pairs_counted ≤ pairs_expected`
    pub fn is_consistent(&self) -> bool {
        self.boxes_pending >= 0
            && self.pairs_counted >= 0
            && self.boxes_pending.checked_mul(self.box_contents) == Some(self.pairs_expected)
            && self.pairs_counted <= self.pairs_expected
    }
}

/// Result of settling one box of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxCompletion {
    pub batch: ConversionBatch,
    /// Counted pairs settled against the finished box
    pub pairs_confirmed: i64,
    /// Pairs the finished box came up short, if any
    pub shortfall: i64,
}
