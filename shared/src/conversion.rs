//! Conversion tracker: boxes opened and counted into pairs
//!
//! Lifecycle of a batch:
//! - `start_conversion` pulls boxes out of box stock into the open batch of
//!   that (location, product, color), opening one if needed
//! - `record_physical_count` credits counted pairs of one size to pair stock
//! - `complete_one_box` settles one finished box against the counted pairs
//!
//! A batch closes once it has no boxes pending.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{InventoryError, InventoryResult};
use crate::ledger::StockLedger;
use crate::models::{
    BoxCompletion, ConversionBatch, MovementKind, MovementRecord, PhysicalCount, Product,
    StartConversion,
};
use crate::types::{CellKey, ColorId, LocationId, ProductId};
use crate::validation::validate_box_contents;

#[derive(Debug, Clone, Default)]
pub struct ConversionTracker {
    batches: BTreeMap<Uuid, ConversionBatch>,
}

impl ConversionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_batches(batches: impl IntoIterator<Item = ConversionBatch>) -> Self {
        Self {
            batches: batches.into_iter().map(|b| (b.id, b)).collect(),
        }
    }

    pub fn get(&self, batch_id: Uuid) -> Option<&ConversionBatch> {
        self.batches.get(&batch_id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &ConversionBatch> {
        self.batches.values()
    }

    pub fn open_batch_for(
        &self,
        location_id: LocationId,
        product_id: ProductId,
        color_id: ColorId,
    ) -> Option<&ConversionBatch> {
        self.batches.values().find(|b| {
            b.is_open()
                && b.location_id == location_id
                && b.product_id == product_id
                && b.color_id == color_id
        })
    }

    /// Refuse a box-contents change while the product has boxes in flight
    pub fn ensure_box_contents_mutable(&self, product_id: ProductId) -> InventoryResult<()> {
        let open_batches = self
            .batches
            .values()
            .filter(|b| b.product_id == product_id && b.is_open())
            .count();
        if open_batches > 0 {
            return Err(InventoryError::ConversionInFlight {
                product_id,
                open_batches,
            });
        }
        Ok(())
    }

    /// Pull boxes from box stock into the open batch
    pub fn start_conversion(
        &mut self,
        ledger: &mut StockLedger,
        product: &Product,
        request: &StartConversion,
        reference_id: &str,
        at: DateTime<Utc>,
    ) -> InventoryResult<(ConversionBatch, Vec<MovementRecord>)> {
        if product.id != request.product_id {
            return Err(InventoryError::not_found("product", request.product_id));
        }
        validate_box_contents(product.box_contents)
            .map_err(|message| InventoryError::invalid("box_contents", message))?;

        let mut batch = match self.open_batch_for(
            request.location_id,
            request.product_id,
            request.color_id,
        ) {
            Some(open) => open.clone(),
            None => ConversionBatch::open(
                request.location_id,
                request.product_id,
                request.color_id,
                product.box_contents,
                at,
            ),
        };

        let out_of_range = || InventoryError::invalid("boxes", "quantity is out of range");
        let added_pairs = request
            .boxes
            .checked_mul(batch.box_contents)
            .ok_or_else(out_of_range)?;
        batch.boxes_pending = batch
            .boxes_pending
            .checked_add(request.boxes)
            .ok_or_else(out_of_range)?;
        batch.pairs_expected = batch
            .pairs_expected
            .checked_add(added_pairs)
            .ok_or_else(out_of_range)?;
        batch.updated_at = at;

        let record = MovementRecord::new(
            MovementKind::ConversionOut,
            batch.dus_cell(),
            -request.boxes,
            reference_id,
            at,
        )
        .with_notes(Some(format!("conversion batch {}", batch.id)));

        let posted = ledger.post(vec![record])?;
        self.batches.insert(batch.id, batch.clone());
        Ok((batch, posted))
    }

    /// Credit physically counted pairs of one size to pair stock
    pub fn record_physical_count(
        &mut self,
        ledger: &mut StockLedger,
        request: &PhysicalCount,
        reference_id: &str,
        at: DateTime<Utc>,
    ) -> InventoryResult<(ConversionBatch, Vec<MovementRecord>)> {
        let mut batch = self
            .batches
            .get(&request.batch_id)
            .cloned()
            .ok_or_else(|| InventoryError::not_found("conversion batch", request.batch_id))?;

        if request.pairs == 0 {
            return Ok((batch, Vec::new()));
        }

        let counted = batch.pairs_counted.checked_add(request.pairs);
        if counted.map_or(true, |counted| counted > batch.pairs_expected) {
            return Err(InventoryError::invalid(
                "pairs",
                format!(
                    "counting {} more pairs would exceed the {} expected ({} already counted)",
                    request.pairs, batch.pairs_expected, batch.pairs_counted
                ),
            ));
        }
        batch.pairs_counted += request.pairs;
        batch.updated_at = at;

        let cell = CellKey::pasang(
            batch.location_id,
            batch.product_id,
            batch.color_id,
            request.size_id,
        );
        let record = MovementRecord::new(
            MovementKind::ConversionIn,
            cell,
            request.pairs,
            reference_id,
            at,
        )
        .with_notes(Some(format!("conversion batch {}", batch.id)));

        let posted = ledger.post(vec![record])?;
        self.batches.insert(batch.id, batch.clone());
        Ok((batch, posted))
    }

    /// Settle one finished box.
    ///
    /// Counted pairs were credited to pair stock when counted, so this only
    /// retires the box from the batch; pair stock is not touched.
    pub fn complete_one_box(
        &mut self,
        batch_id: Uuid,
        at: DateTime<Utc>,
    ) -> InventoryResult<BoxCompletion> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or_else(|| InventoryError::not_found("conversion batch", batch_id))?;

        if batch.boxes_pending <= 0 {
            return Err(InventoryError::NoBoxesRemaining { batch_id });
        }

        let pairs_confirmed = batch.pairs_counted.min(batch.box_contents);
        batch.boxes_pending -= 1;
        batch.pairs_expected -= batch.box_contents;
        batch.pairs_counted -= pairs_confirmed;
        batch.updated_at = at;

        Ok(BoxCompletion {
            batch: batch.clone(),
            pairs_confirmed,
            shortfall: batch.box_contents - pairs_confirmed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Balance, SizeId};

    fn product(box_contents: i64) -> Product {
        Product {
            id: ProductId(1),
            sku: "SKU-001".to_string(),
            name: "Runner".to_string(),
            category: None,
            box_contents,
        }
    }

    fn start(boxes: i64) -> StartConversion {
        StartConversion {
            location_id: LocationId(1),
            product_id: ProductId(1),
            color_id: ColorId(1),
            boxes,
            reference_id: None,
        }
    }

    fn ledger_with_boxes(boxes: i64) -> StockLedger {
        StockLedger::with_opening_balances([(
            CellKey::dus(LocationId(1), ProductId(1), ColorId(1)),
            Balance::new(boxes, 0),
        )])
    }

    #[test]
    fn test_start_conversion_moves_boxes_into_batch() {
        let mut ledger = ledger_with_boxes(10);
        let mut tracker = ConversionTracker::new();

        let (batch, records) = tracker
            .start_conversion(&mut ledger, &product(12), &start(4), "CNV-1", Utc::now())
            .unwrap();

        assert_eq!(batch.boxes_pending, 4);
        assert_eq!(batch.pairs_expected, 48);
        assert_eq!(records[0].box_delta, Some(-4));
        assert_eq!(ledger.available(&batch.dus_cell()), 6);
    }

    #[test]
    fn test_start_conversion_tops_up_open_batch() {
        let mut ledger = ledger_with_boxes(10);
        let mut tracker = ConversionTracker::new();

        let (first, _) = tracker
            .start_conversion(&mut ledger, &product(12), &start(2), "CNV-1", Utc::now())
            .unwrap();
        let (second, _) = tracker
            .start_conversion(&mut ledger, &product(12), &start(3), "CNV-2", Utc::now())
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.boxes_pending, 5);
        assert_eq!(second.pairs_expected, 60);
    }

    #[test]
    fn test_start_conversion_insufficient_boxes_leaves_no_batch() {
        let mut ledger = ledger_with_boxes(1);
        let mut tracker = ConversionTracker::new();

        let err = tracker
            .start_conversion(&mut ledger, &product(12), &start(2), "CNV-1", Utc::now())
            .unwrap_err();

        assert!(matches!(err, InventoryError::InsufficientStock { .. }));
        assert_eq!(tracker.batches().count(), 0);
    }

    #[test]
    fn test_count_cannot_exceed_expected() {
        let mut ledger = ledger_with_boxes(1);
        let mut tracker = ConversionTracker::new();
        let (batch, _) = tracker
            .start_conversion(&mut ledger, &product(6), &start(1), "CNV-1", Utc::now())
            .unwrap();

        let count = |pairs| PhysicalCount {
            batch_id: batch.id,
            size_id: SizeId(40),
            pairs,
            reference_id: None,
        };
        tracker
            .record_physical_count(&mut ledger, &count(4), "CNT-1", Utc::now())
            .unwrap();
        let err = tracker
            .record_physical_count(&mut ledger, &count(3), "CNT-2", Utc::now())
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidMovement { .. }));
        assert_eq!(tracker.get(batch.id).unwrap().pairs_counted, 4);
    }

    #[test]
    fn test_count_overflow_is_rejected() {
        let mut ledger = ledger_with_boxes(1);
        let mut tracker = ConversionTracker::new();
        let (batch, _) = tracker
            .start_conversion(&mut ledger, &product(12), &start(1), "CNV-1", Utc::now())
            .unwrap();
        let count = |pairs| PhysicalCount {
            batch_id: batch.id,
            size_id: SizeId(41),
            pairs,
            reference_id: None,
        };
        tracker
            .record_physical_count(&mut ledger, &count(1), "CNT-1", Utc::now())
            .unwrap();

        let err = tracker
            .record_physical_count(&mut ledger, &count(i64::MAX), "CNT-2", Utc::now())
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidMovement { .. }));
        let batch = tracker.get(batch.id).unwrap();
        assert_eq!(batch.pairs_counted, 1);
        assert!(batch.is_consistent());
        let pair_cell = CellKey::pasang(LocationId(1), ProductId(1), ColorId(1), SizeId(41));
        assert_eq!(ledger.available(&pair_cell), 1);
    }

    #[test]
    fn test_top_up_overflow_is_rejected() {
        let mut ledger = ledger_with_boxes(i64::MAX);
        let mut tracker = ConversionTracker::new();
        let (batch, _) = tracker
            .start_conversion(&mut ledger, &product(1), &start(i64::MAX - 1), "CNV-1", Utc::now())
            .unwrap();

        let err = tracker
            .start_conversion(&mut ledger, &product(1), &start(2), "CNV-2", Utc::now())
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidMovement { .. }));
        assert_eq!(tracker.get(batch.id).unwrap().boxes_pending, i64::MAX - 1);
        assert_eq!(ledger.available(&batch.dus_cell()), 1);
    }

    #[test]
    fn test_complete_box_keeps_counted_pairs_in_stock() {
        let mut ledger = ledger_with_boxes(2);
        let mut tracker = ConversionTracker::new();
        let (batch, _) = tracker
            .start_conversion(&mut ledger, &product(12), &start(2), "CNV-1", Utc::now())
            .unwrap();
        let pair_cell = CellKey::pasang(LocationId(1), ProductId(1), ColorId(1), SizeId(40));
        tracker
            .record_physical_count(
                &mut ledger,
                &PhysicalCount {
                    batch_id: batch.id,
                    size_id: SizeId(40),
                    pairs: 10,
                    reference_id: None,
                },
                "CNT-1",
                Utc::now(),
            )
            .unwrap();

        let completion = tracker.complete_one_box(batch.id, Utc::now()).unwrap();

        assert_eq!(completion.pairs_confirmed, 10);
        assert_eq!(completion.shortfall, 2);
        assert_eq!(completion.batch.boxes_pending, 1);
        assert_eq!(completion.batch.pairs_expected, 12);
        assert_eq!(completion.batch.pairs_counted, 0);
        assert!(completion.batch.is_consistent());
        assert_eq!(ledger.available(&pair_cell), 10);
    }

    #[test]
    fn test_complete_box_on_exhausted_batch() {
        let mut ledger = ledger_with_boxes(1);
        let mut tracker = ConversionTracker::new();
        let (batch, _) = tracker
            .start_conversion(&mut ledger, &product(12), &start(1), "CNV-1", Utc::now())
            .unwrap();

        tracker.complete_one_box(batch.id, Utc::now()).unwrap();
        let err = tracker.complete_one_box(batch.id, Utc::now()).unwrap_err();

        assert_eq!(err, InventoryError::NoBoxesRemaining { batch_id: batch.id });
        assert!(tracker.ensure_box_contents_mutable(ProductId(1)).is_ok());
    }

    #[test]
    fn test_box_contents_locked_while_in_flight() {
        let mut ledger = ledger_with_boxes(1);
        let mut tracker = ConversionTracker::new();
        tracker
            .start_conversion(&mut ledger, &product(12), &start(1), "CNV-1", Utc::now())
            .unwrap();

        assert!(matches!(
            tracker.ensure_box_contents_mutable(ProductId(1)),
            Err(InventoryError::ConversionInFlight { open_batches: 1, .. })
        ));
    }
}
