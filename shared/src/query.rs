//! Read-only projections: stock on hand and stock cards

use serde::{Deserialize, Serialize};

use crate::error::{InventoryError, InventoryResult};
use crate::ledger::StockLedger;
use crate::models::MovementRecord;
use crate::types::{CellKey, ColorId, DateRange, LocationId, ProductId, StockCell, StockKind};

/// Optional narrowing of a stock-on-hand listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFilter {
    pub product_id: Option<ProductId>,
    pub color_id: Option<ColorId>,
    pub kind: Option<StockKind>,
    /// Include cells whose balance is zero
    #[serde(default)]
    pub include_empty: bool,
}

impl StockFilter {
    pub fn matches(&self, cell: &StockCell) -> bool {
        if self.product_id.is_some_and(|p| p != cell.key.product_id) {
            return false;
        }
        if self.color_id.is_some_and(|c| c != cell.key.color_id) {
            return false;
        }
        if self.kind.is_some_and(|k| k != cell.key.kind()) {
            return false;
        }
        self.include_empty || cell.balance().of(cell.key.kind()) != 0
    }
}

/// Balances of one location, in cell order
pub fn get_stock_on_hand(
    cells: impl IntoIterator<Item = StockCell>,
    location_id: LocationId,
    filter: &StockFilter,
) -> Vec<StockCell> {
    let mut rows: Vec<StockCell> = cells
        .into_iter()
        .filter(|cell| cell.key.location_id == location_id && filter.matches(cell))
        .collect();
    rows.sort_by_key(|cell| cell.key);
    rows
}

/// One line of a stock card
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockCardRow {
    #[serde(flatten)]
    pub record: MovementRecord,
    pub delta: i64,
    /// Balance right after this movement
    pub balance: i64,
}

/// Movement history of one cell over a date range with running balances
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockCard {
    pub cell: CellKey,
    pub kind: StockKind,
    pub range: DateRange,
    pub starting_balance: i64,
    pub movements: Vec<StockCardRow>,
    pub closing_balance: i64,
}

impl StockCard {
    /// Lay out `records` (those dated inside the range) after `starting_balance`
    pub fn build(
        cell: CellKey,
        range: DateRange,
        starting_balance: i64,
        records: impl IntoIterator<Item = MovementRecord>,
    ) -> Self {
        let kind = cell.kind();
        let mut records: Vec<MovementRecord> = records
            .into_iter()
            .filter(|record| record.cell() == cell && range.contains(record.timestamp))
            .collect();
        records.sort_by_key(|record| (record.timestamp, record.seq));

        let mut balance = starting_balance;
        let movements: Vec<StockCardRow> = records
            .into_iter()
            .map(|record| {
                let delta = record.delta(kind);
                balance += delta;
                StockCardRow {
                    record,
                    delta,
                    balance,
                }
            })
            .collect();

        Self {
            cell,
            kind,
            range,
            starting_balance,
            closing_balance: balance,
            movements,
        }
    }

    /// Each row's balance is the previous balance plus its delta
    pub fn is_continuous(&self) -> bool {
        let mut previous = self.starting_balance;
        for row in &self.movements {
            if row.balance != previous + row.delta {
                return false;
            }
            previous = row.balance;
        }
        previous == self.closing_balance
    }
}

pub fn validate_range(range: &DateRange) -> InventoryResult<()> {
    if range.from >= range.to {
        return Err(InventoryError::invalid("range", "from must be before to"));
    }
    Ok(())
}

/// Fold every record of `cell` dated before `range.from` over `opening`
pub fn balance_before<'a>(
    records: impl IntoIterator<Item = &'a MovementRecord>,
    cell: &CellKey,
    opening: i64,
    range: &DateRange,
) -> i64 {
    let kind = cell.kind();
    records
        .into_iter()
        .filter(|record| record.cell() == *cell && record.timestamp < range.from)
        .fold(opening, |balance, record| balance + record.delta(kind))
}

/// Stock card straight from an in-memory ledger
pub fn get_stock_card(
    ledger: &StockLedger,
    cell: &CellKey,
    range: DateRange,
) -> InventoryResult<StockCard> {
    validate_range(&range)?;
    let opening = ledger.opening_balance(cell).of(cell.kind());
    let starting_balance = balance_before(ledger.records(), cell, opening, &range);
    Ok(StockCard::build(
        *cell,
        range,
        starting_balance,
        ledger.records_for(cell).cloned(),
    ))
}
