//! Movement engine: the one routine every stock mutation goes through
//!
//! Each [`Movement`] is validated, turned into movement records and posted
//! to the ledger as a single unit. A failed movement leaves the ledger and
//! the conversion tracker untouched.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conversion::ConversionTracker;
use crate::error::{InventoryError, InventoryResult};
use crate::ledger::StockLedger;
use crate::models::{
    BoxCompletion, CompleteBox, ConversionBatch, Movement, MovementKind, MovementRecord,
    OpnameAdjustment, PhysicalCount, Product, ReceiveGoods, RejectRequest, SalesOrder,
    StartConversion, TransferRequest,
};
use crate::types::{CellKey, ProductId, StockCell};
use crate::validation::validate_box_contents;

/// What a movement did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementOutcome {
    pub operation: String,
    pub reference_id: String,
    pub records: Vec<MovementRecord>,
    /// Balances of the written cells after the movement
    pub balances: Vec<StockCell>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch: Option<ConversionBatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion: Option<BoxCompletion>,
    /// True when the reference had already been applied and nothing changed
    pub replayed: bool,
}

/// Generate a reference for requests that do not carry one
pub fn generate_reference_id() -> String {
    format!("MV-{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Default)]
pub struct MovementEngine {
    ledger: StockLedger,
    conversions: ConversionTracker,
    products: BTreeMap<ProductId, Product>,
    outcomes: BTreeMap<String, MovementOutcome>,
}

impl MovementEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an engine over an existing working set
    pub fn from_parts(
        ledger: StockLedger,
        conversions: ConversionTracker,
        products: impl IntoIterator<Item = Product>,
    ) -> Self {
        Self {
            ledger,
            conversions,
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            outcomes: BTreeMap::new(),
        }
    }

    pub fn ledger(&self) -> &StockLedger {
        &self.ledger
    }

    pub fn conversions(&self) -> &ConversionTracker {
        &self.conversions
    }

    pub fn product(&self, product_id: ProductId) -> Option<&Product> {
        self.products.get(&product_id)
    }

    /// Add or replace a product; box contents cannot change under an open batch
    pub fn register_product(&mut self, product: Product) -> InventoryResult<()> {
        validate_box_contents(product.box_contents)
            .map_err(|message| InventoryError::invalid("box_contents", message))?;
        if let Some(existing) = self.products.get(&product.id) {
            if existing.box_contents != product.box_contents {
                self.conversions.ensure_box_contents_mutable(product.id)?;
            }
        }
        self.products.insert(product.id, product);
        Ok(())
    }

    pub fn update_box_contents(
        &mut self,
        product_id: ProductId,
        box_contents: i64,
    ) -> InventoryResult<()> {
        let mut product = self
            .products
            .get(&product_id)
            .cloned()
            .ok_or_else(|| InventoryError::not_found("product", product_id))?;
        product.box_contents = box_contents;
        self.register_product(product)
    }

    pub fn receive_goods(
        &mut self,
        request: ReceiveGoods,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::Receipt(request), at)
    }

    pub fn transfer(
        &mut self,
        request: TransferRequest,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::Transfer(request), at)
    }

    pub fn start_conversion(
        &mut self,
        request: StartConversion,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::StartConversion(request), at)
    }

    pub fn record_physical_count(
        &mut self,
        request: PhysicalCount,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::PhysicalCount(request), at)
    }

    pub fn complete_one_box(
        &mut self,
        request: CompleteBox,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::CompleteBox(request), at)
    }

    pub fn sell(&mut self, order: SalesOrder, at: DateTime<Utc>) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::Sale(order), at)
    }

    pub fn record_reject(
        &mut self,
        request: RejectRequest,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::Reject(request), at)
    }

    pub fn adjust_opname(
        &mut self,
        request: OpnameAdjustment,
        at: DateTime<Utc>,
    ) -> InventoryResult<MovementOutcome> {
        self.apply(Movement::Opname(request), at)
    }

    /// Apply any movement as one atomic unit
    pub fn apply(&mut self, movement: Movement, at: DateTime<Utc>) -> InventoryResult<MovementOutcome> {
        movement.validate()?;

        let reference_id = movement
            .reference_id()
            .map(str::to_owned)
            .unwrap_or_else(generate_reference_id);

        if let Some(previous) = self.outcomes.get(&reference_id) {
            let mut replay = previous.clone();
            replay.replayed = true;
            return Ok(replay);
        }

        let mut batch = None;
        let mut completion = None;
        let records = match &movement {
            Movement::Receipt(r) => self.ledger.post(receipt_records(r, &reference_id, at))?,
            Movement::Transfer(r) => self.ledger.post(transfer_records(r, &reference_id, at))?,
            Movement::Sale(order) => self.ledger.post(sale_records(order, &reference_id, at))?,
            Movement::Reject(r) => self.ledger.post(reject_records(r, &reference_id, at))?,
            Movement::Opname(r) => self.ledger.post(opname_records(r, &reference_id, at))?,
            Movement::StartConversion(r) => {
                let product = self
                    .products
                    .get(&r.product_id)
                    .ok_or_else(|| InventoryError::not_found("product", r.product_id))?;
                let (updated, records) = self.conversions.start_conversion(
                    &mut self.ledger,
                    product,
                    r,
                    &reference_id,
                    at,
                )?;
                batch = Some(updated);
                records
            }
            Movement::PhysicalCount(r) => {
                let (updated, records) =
                    self.conversions
                        .record_physical_count(&mut self.ledger, r, &reference_id, at)?;
                batch = Some(updated);
                records
            }
            Movement::CompleteBox(r) => {
                let done = self.conversions.complete_one_box(r.batch_id, at)?;
                batch = Some(done.batch.clone());
                completion = Some(done);
                Vec::new()
            }
        };

        let outcome = MovementOutcome {
            operation: movement.operation().to_string(),
            balances: self.balances_of(&records),
            reference_id: reference_id.clone(),
            records,
            batch,
            completion,
            replayed: false,
        };
        self.outcomes.insert(reference_id, outcome.clone());
        Ok(outcome)
    }

    fn balances_of(&self, records: &[MovementRecord]) -> Vec<StockCell> {
        let mut cells: Vec<CellKey> = records.iter().map(MovementRecord::cell).collect();
        cells.sort();
        cells.dedup();
        cells
            .into_iter()
            .map(|cell| StockCell::new(cell, self.ledger.get_balance(&cell)))
            .collect()
    }
}

fn receipt_records(r: &ReceiveGoods, reference_id: &str, at: DateTime<Utc>) -> Vec<MovementRecord> {
    let cell = CellKey::dus(r.location_id, r.product_id, r.color_id);
    vec![MovementRecord::new(MovementKind::Receipt, cell, r.boxes, reference_id, at)
        .with_counterparty(r.supplier.clone())
        .with_notes(r.notes.clone())]
}

fn transfer_records(
    r: &TransferRequest,
    reference_id: &str,
    at: DateTime<Utc>,
) -> Vec<MovementRecord> {
    r.items
        .iter()
        .flat_map(|item| {
            [
                MovementRecord::new(
                    MovementKind::TransferOut,
                    r.source_cell(item),
                    -item.quantity,
                    reference_id,
                    at,
                )
                .with_notes(r.notes.clone()),
                MovementRecord::new(
                    MovementKind::TransferIn,
                    r.destination_cell(item),
                    item.quantity,
                    reference_id,
                    at,
                )
                .with_notes(r.notes.clone()),
            ]
        })
        .collect()
}

fn sale_records(order: &SalesOrder, reference_id: &str, at: DateTime<Utc>) -> Vec<MovementRecord> {
    order
        .items
        .iter()
        .map(|item| {
            let cell =
                CellKey::pasang(order.location_id, item.product_id, item.color_id, item.size_id);
            MovementRecord::new(MovementKind::Sale, cell, -item.quantity, reference_id, at)
                .with_unit_price(item.price_per_item)
                .with_notes(order.notes.clone())
        })
        .collect()
}

fn reject_records(r: &RejectRequest, reference_id: &str, at: DateTime<Utc>) -> Vec<MovementRecord> {
    vec![
        MovementRecord::new(MovementKind::Reject, r.cell(), -r.quantity, reference_id, at)
            .with_notes(Some(r.reason.trim().to_string())),
    ]
}

fn opname_records(
    r: &OpnameAdjustment,
    reference_id: &str,
    at: DateTime<Utc>,
) -> Vec<MovementRecord> {
    vec![
        MovementRecord::new(MovementKind::OpnameAdjust, r.cell(), r.delta(), reference_id, at)
            .with_counts(r.system_count, r.physical_count)
            .with_notes(r.reason.clone()),
    ]
}
