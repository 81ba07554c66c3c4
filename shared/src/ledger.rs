//! Stock ledger: per-cell running balances over an append-only movement log
//!
//! Balances only change through [`StockLedger::post`], which appends the
//! records that explain the change. Folding the log over the opening
//! balances must always reproduce the stored balances.

use std::collections::BTreeMap;

use crate::error::{InventoryError, InventoryResult, Shortage, Violation};
use crate::models::MovementRecord;
use crate::types::{Balance, CellKey, StockCell, StockKind};

/// In-memory ledger.
///
/// Used standalone, and by the backend as the working set of one database
/// transaction (opening balances are the locked rows, the log holds only the
/// records the transaction adds).
#[derive(Debug, Clone, Default)]
pub struct StockLedger {
    opening: BTreeMap<CellKey, Balance>,
    cells: BTreeMap<CellKey, Balance>,
    log: Vec<MovementRecord>,
    next_seq: i64,
}

impl StockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from known balances with an empty log
    pub fn with_opening_balances(balances: impl IntoIterator<Item = (CellKey, Balance)>) -> Self {
        let opening: BTreeMap<CellKey, Balance> = balances.into_iter().collect();
        Self {
            cells: opening.clone(),
            opening,
            log: Vec::new(),
            next_seq: 1,
        }
    }

    /// Current balance of a cell; unknown cells are empty
    pub fn get_balance(&self, cell: &CellKey) -> Balance {
        self.cells.get(cell).copied().unwrap_or_default()
    }

    /// Balance a cell had before the first record of this ledger
    pub fn opening_balance(&self, cell: &CellKey) -> Balance {
        self.opening.get(cell).copied().unwrap_or_default()
    }

    /// Balance of the kind the cell carries
    pub fn available(&self, cell: &CellKey) -> i64 {
        self.get_balance(cell).of(cell.kind())
    }

    pub fn cells(&self) -> impl Iterator<Item = StockCell> + '_ {
        self.cells
            .iter()
            .map(|(key, balance)| StockCell::new(*key, *balance))
    }

    pub fn records(&self) -> &[MovementRecord] {
        &self.log
    }

    pub fn records_for<'a>(
        &'a self,
        cell: &'a CellKey,
    ) -> impl Iterator<Item = &'a MovementRecord> + 'a {
        self.log.iter().filter(move |record| record.cell() == *cell)
    }

    pub fn records_by_reference(&self, reference_id: &str) -> Vec<MovementRecord> {
        self.log
            .iter()
            .filter(|record| record.reference_id == reference_id)
            .cloned()
            .collect()
    }

    pub fn has_reference(&self, reference_id: &str) -> bool {
        self.log.iter().any(|record| record.reference_id == reference_id)
    }

    /// Cells that received at least one record, in key order
    pub fn touched_cells(&self) -> Vec<CellKey> {
        let mut cells: Vec<CellKey> = self.log.iter().map(MovementRecord::cell).collect();
        cells.sort();
        cells.dedup();
        cells
    }

    /// Post a group of records as one unit.
    ///
    /// Either every record is applied and appended, or nothing changes. All
    /// cells that would go negative are reported together.
    pub fn post(&mut self, records: Vec<MovementRecord>) -> InventoryResult<Vec<MovementRecord>> {
        let mut violations = Vec::new();
        let mut net: BTreeMap<CellKey, (i64, i64)> = BTreeMap::new();
        let mut requested: BTreeMap<CellKey, i64> = BTreeMap::new();

        for (index, record) in records.iter().enumerate() {
            let cell = record.cell();
            let box_delta = record.delta(StockKind::Dus);
            let pair_delta = record.delta(StockKind::Pasang);
            match cell.kind() {
                StockKind::Dus if record.pair_delta.unwrap_or(0) != 0 => violations.push(
                    Violation::new("pair_delta", "pair stock requires a size").at_item(index),
                ),
                StockKind::Pasang if record.box_delta.unwrap_or(0) != 0 => violations.push(
                    Violation::new("box_delta", "box stock is not tracked per size")
                        .at_item(index),
                ),
                _ => {}
            }

            let entry = net.entry(cell).or_insert((0, 0));
            match (entry.0.checked_add(box_delta), entry.1.checked_add(pair_delta)) {
                (Some(b), Some(p)) => *entry = (b, p),
                _ => violations
                    .push(Violation::new("quantity", "quantity is out of range").at_item(index)),
            }

            let outgoing = box_delta
                .min(0)
                .saturating_neg()
                .saturating_add(pair_delta.min(0).saturating_neg());
            let total = requested.entry(cell).or_insert(0);
            *total = total.saturating_add(outgoing);
        }

        if !violations.is_empty() {
            return Err(InventoryError::InvalidMovement { violations });
        }

        let mut shortages = Vec::new();
        for (cell, (box_delta, pair_delta)) in &net {
            let current = self.get_balance(cell);
            let next = current
                .checked_add(*box_delta, *pair_delta)
                .ok_or_else(|| InventoryError::invalid("quantity", "quantity is out of range"))?;
            if next.box_stock < 0 || next.pair_stock < 0 {
                shortages.push(Shortage {
                    cell: *cell,
                    kind: cell.kind(),
                    requested: requested.get(cell).copied().unwrap_or(0),
                    available: current.of(cell.kind()),
                });
            }
        }

        if !shortages.is_empty() {
            return Err(InventoryError::InsufficientStock { shortages });
        }

        for (cell, (box_delta, pair_delta)) in net {
            self.apply_delta(&cell, box_delta, pair_delta)?;
        }

        let mut posted = Vec::with_capacity(records.len());
        for mut record in records {
            record.seq = self.next_seq.max(1);
            self.next_seq = record.seq + 1;
            posted.push(record.clone());
            self.log.push(record);
        }

        Ok(posted)
    }

    /// The single place a balance changes; refuses to go below zero
    pub(crate) fn apply_delta(
        &mut self,
        cell: &CellKey,
        box_delta: i64,
        pair_delta: i64,
    ) -> InventoryResult<Balance> {
        let current = self.get_balance(cell);
        let next = current
            .checked_add(box_delta, pair_delta)
            .ok_or_else(|| InventoryError::invalid("quantity", "quantity is out of range"))?;

        if next.box_stock < 0 || next.pair_stock < 0 {
            let kind = if next.box_stock < 0 {
                StockKind::Dus
            } else {
                StockKind::Pasang
            };
            let delta = if kind == StockKind::Dus { box_delta } else { pair_delta };
            return Err(InventoryError::InsufficientStock {
                shortages: vec![Shortage {
                    cell: *cell,
                    kind,
                    requested: -delta,
                    available: current.of(kind),
                }],
            });
        }

        self.cells.insert(*cell, next);
        Ok(next)
    }

    /// Replay the log of one cell over its opening balance
    pub fn rebuild_from_log(&self, cell: &CellKey) -> Balance {
        let mut records: Vec<&MovementRecord> = self.records_for(cell).collect();
        records.sort_by_key(|record| (record.timestamp, record.seq));

        let opening = self.opening_balance(cell);
        records.into_iter().fold(opening, |balance, record| Balance {
            box_stock: balance.box_stock + record.delta(StockKind::Dus),
            pair_stock: balance.pair_stock + record.delta(StockKind::Pasang),
        })
    }

    /// Compare a stored balance with its replay
    pub fn verify_cell(&self, cell: &CellKey) -> InventoryResult<Balance> {
        let stored = self.get_balance(cell);
        let replayed = self.rebuild_from_log(cell);
        if stored != replayed {
            return Err(InventoryError::ConsistencyViolation {
                cell: *cell,
                stored,
                replayed,
            });
        }
        Ok(stored)
    }

    /// Verify every known cell; returns how many were checked
    pub fn verify_all(&self) -> InventoryResult<usize> {
        let mut keys: Vec<CellKey> = self.cells.keys().copied().collect();
        keys.extend(self.log.iter().map(MovementRecord::cell));
        keys.sort();
        keys.dedup();

        for key in &keys {
            self.verify_cell(key)?;
        }
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovementKind;
    use crate::types::{ColorId, LocationId, ProductId, SizeId};
    use chrono::{TimeZone, Utc};

    fn dus_cell() -> CellKey {
        CellKey::dus(LocationId(1), ProductId(1), ColorId(1))
    }

    fn pair_cell(size: i64) -> CellKey {
        CellKey::pasang(LocationId(1), ProductId(1), ColorId(1), SizeId(size))
    }

    fn record(kind: MovementKind, cell: CellKey, delta: i64) -> MovementRecord {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        MovementRecord::new(kind, cell, delta, "REF-1", at)
    }

    #[test]
    fn test_post_applies_and_logs() {
        let mut ledger = StockLedger::new();
        let posted = ledger
            .post(vec![record(MovementKind::Receipt, dus_cell(), 10)])
            .unwrap();

        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].seq, 1);
        assert_eq!(ledger.get_balance(&dus_cell()), Balance::new(10, 0));
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn test_post_rejects_overflowing_outflows() {
        let mut ledger = StockLedger::with_opening_balances([(pair_cell(40), Balance::new(0, 5))]);

        let err = ledger
            .post(vec![
                record(MovementKind::TransferOut, pair_cell(40), -i64::MAX),
                record(MovementKind::TransferOut, pair_cell(40), -i64::MAX),
            ])
            .unwrap_err();

        assert!(matches!(err, InventoryError::InvalidMovement { .. }));
        assert_eq!(ledger.available(&pair_cell(40)), 5);
        assert!(ledger.records().is_empty());
    }

    #[test]
    fn test_post_refuses_negative_and_changes_nothing() {
        let mut ledger = StockLedger::new();
        ledger
            .post(vec![record(MovementKind::OpnameAdjust, pair_cell(40), 3)])
            .unwrap();

        let err = ledger
            .post(vec![
                record(MovementKind::Sale, pair_cell(40), -2),
                record(MovementKind::Sale, pair_cell(41), -1),
            ])
            .unwrap_err();

        match err {
            InventoryError::InsufficientStock { shortages } => {
                assert_eq!(shortages.len(), 1);
                assert_eq!(shortages[0].cell, pair_cell(41));
                assert_eq!(shortages[0].requested, 1);
                assert_eq!(shortages[0].available, 0);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(ledger.available(&pair_cell(40)), 3);
        assert_eq!(ledger.records().len(), 1);
    }

    #[test]
    fn test_post_aggregates_lines_on_same_cell() {
        let mut ledger = StockLedger::with_opening_balances([(pair_cell(40), Balance::new(0, 5))]);
        let err = ledger
            .post(vec![
                record(MovementKind::Sale, pair_cell(40), -3),
                record(MovementKind::Sale, pair_cell(40), -3),
            ])
            .unwrap_err();

        match err {
            InventoryError::InsufficientStock { shortages } => {
                assert_eq!(shortages[0].requested, 6);
                assert_eq!(shortages[0].shortfall(), 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_post_rejects_mismatched_kind() {
        let mut ledger = StockLedger::new();
        let mut bad = record(MovementKind::Receipt, pair_cell(40), 1);
        bad.box_delta = Some(1);
        bad.pair_delta = None;

        assert!(matches!(
            ledger.post(vec![bad]),
            Err(InventoryError::InvalidMovement { .. })
        ));
    }

    #[test]
    fn test_apply_delta_is_the_non_negative_choke_point() {
        let mut ledger = StockLedger::new();
        assert!(ledger.apply_delta(&dus_cell(), -1, 0).is_err());
        assert_eq!(ledger.apply_delta(&dus_cell(), 4, 0).unwrap(), Balance::new(4, 0));
    }

    #[test]
    fn test_rebuild_matches_opening_plus_log() {
        let mut ledger = StockLedger::with_opening_balances([(dus_cell(), Balance::new(7, 0))]);
        ledger
            .post(vec![record(MovementKind::ConversionOut, dus_cell(), -2)])
            .unwrap();

        assert_eq!(ledger.rebuild_from_log(&dus_cell()), Balance::new(5, 0));
        assert_eq!(ledger.verify_all().unwrap(), 1);
    }

    #[test]
    fn test_verify_detects_drift() {
        let mut ledger = StockLedger::new();
        ledger
            .post(vec![record(MovementKind::Receipt, dus_cell(), 3)])
            .unwrap();
        ledger.cells.insert(dus_cell(), Balance::new(4, 0));

        assert!(matches!(
            ledger.verify_cell(&dus_cell()),
            Err(InventoryError::ConsistencyViolation { .. })
        ));
    }
}
