//! Stock queries: balances on hand and stock cards

use chrono::{DateTime, Utc};
use serde::Deserialize;
use shared::{
    get_stock_on_hand, validate_range, CellKey, ColorId, DateRange, LocationId, ProductId, SizeId,
    StockCard, StockCell, StockFilter,
};
use sqlx::PgPool;

use crate::error::AppResult;
use crate::services::ledger::{bind_cell, cell_filter, CellRow, MovementRow, MOVEMENT_COLUMNS};

/// Stock service for read-only projections
#[derive(Clone)]
pub struct StockService {
    db: PgPool,
}

/// Query parameters identifying one cell and a date range
#[derive(Debug, Deserialize)]
pub struct StockCardQuery {
    pub location_id: LocationId,
    pub product_id: ProductId,
    pub color_id: ColorId,
    pub size_id: Option<SizeId>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl StockCardQuery {
    pub fn cell(&self) -> CellKey {
        CellKey {
            location_id: self.location_id,
            product_id: self.product_id,
            color_id: self.color_id,
            size_id: self.size_id,
        }
    }

    pub fn range(&self) -> DateRange {
        DateRange::new(self.from, self.to)
    }
}

impl StockService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Balances at a location; empty cells only when the filter asks
    pub async fn get_stock_on_hand(
        &self,
        location_id: LocationId,
        filter: StockFilter,
    ) -> AppResult<Vec<StockCell>> {
        let rows = sqlx::query_as::<_, CellRow>(
            r#"
            SELECT location_id, product_id, color_id, size_id, box_stock, pair_stock
            FROM stock_cells
            WHERE location_id = $1
              AND ($2::BIGINT IS NULL OR product_id = $2)
              AND ($3::BIGINT IS NULL OR color_id = $3)
            ORDER BY product_id, color_id, size_id NULLS FIRST
            "#,
        )
        .bind(location_id.0)
        .bind(filter.product_id.map(|id| id.0))
        .bind(filter.color_id.map(|id| id.0))
        .fetch_all(&self.db)
        .await?;

        Ok(get_stock_on_hand(
            rows.into_iter().map(StockCell::from),
            location_id,
            &filter,
        ))
    }

    /// Movements of one cell in `[from, to)` with running balances, starting
    /// from the fold of everything before `from`
    pub async fn get_stock_card(&self, query: StockCardQuery) -> AppResult<StockCard> {
        let cell = query.cell();
        let range = query.range();
        validate_range(&range)?;

        let next = if cell.size_id.is_some() { 5 } else { 4 };
        let starting_sql = format!(
            "SELECT COALESCE(SUM({}), 0)::BIGINT FROM movement_log WHERE {} AND ts < ${}",
            delta_column(&cell),
            cell_filter(&cell),
            next
        );
        let starting_balance = bind_cell!(sqlx::query_scalar::<_, i64>(&starting_sql), cell)
            .bind(range.from)
            .fetch_one(&self.db)
            .await?;

        let rows_sql = format!(
            "SELECT {} FROM movement_log WHERE {} AND ts >= ${} AND ts < ${} ORDER BY ts, seq",
            MOVEMENT_COLUMNS,
            cell_filter(&cell),
            next,
            next + 1
        );
        let rows = bind_cell!(sqlx::query_as::<_, MovementRow>(&rows_sql), cell)
            .bind(range.from)
            .bind(range.to)
            .fetch_all(&self.db)
            .await?;
        let records = rows
            .into_iter()
            .map(MovementRow::into_record)
            .collect::<AppResult<Vec<_>>>()?;

        let card = StockCard::build(cell, range, starting_balance, records);
        tracing::debug!(%cell, rows = card.movements.len(), "Stock card built");
        Ok(card)
    }
}

fn delta_column(cell: &CellKey) -> &'static str {
    if cell.size_id.is_some() {
        "pair_delta"
    } else {
        "box_delta"
    }
}
