//! Persistence of stock cells, the movement log and movement references
//!
//! The free functions run inside a caller's transaction and are the only
//! code that writes `stock_cells` or `movement_log`. [`LedgerService`] holds
//! the read side: movement lookup and replay verification.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use shared::{
    Balance, CellKey, ColorId, InventoryError, LocationId, MovementKind, MovementOutcome,
    MovementRecord, ProductId, SizeId, StockCell, StockLedger,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::LedgerConfig;
use crate::error::{AppError, AppResult};

pub(crate) const MOVEMENT_COLUMNS: &str = "seq, id, kind, location_id, product_id, color_id, size_id, \
     box_delta, pair_delta, ts, reference_id, notes, counterparty, unit_price, \
     system_count, physical_count";

#[derive(Debug, FromRow)]
pub(crate) struct MovementRow {
    seq: i64,
    id: Uuid,
    kind: String,
    location_id: i64,
    product_id: i64,
    color_id: i64,
    size_id: Option<i64>,
    box_delta: Option<i64>,
    pair_delta: Option<i64>,
    ts: DateTime<Utc>,
    reference_id: String,
    notes: Option<String>,
    counterparty: Option<String>,
    unit_price: Option<Decimal>,
    system_count: Option<i64>,
    physical_count: Option<i64>,
}

impl MovementRow {
    pub(crate) fn into_record(self) -> AppResult<MovementRecord> {
        let kind = MovementKind::from_str(&self.kind)
            .ok_or_else(|| AppError::Internal(format!("Unknown movement kind: {}", self.kind)))?;
        Ok(MovementRecord {
            id: self.id,
            seq: self.seq,
            kind,
            location_id: LocationId(self.location_id),
            product_id: ProductId(self.product_id),
            color_id: ColorId(self.color_id),
            size_id: self.size_id.map(SizeId),
            box_delta: self.box_delta,
            pair_delta: self.pair_delta,
            timestamp: self.ts,
            reference_id: self.reference_id,
            notes: self.notes,
            counterparty: self.counterparty,
            unit_price: self.unit_price,
            system_count: self.system_count,
            physical_count: self.physical_count,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CellRow {
    location_id: i64,
    product_id: i64,
    color_id: i64,
    size_id: Option<i64>,
    box_stock: i64,
    pair_stock: i64,
}

impl From<CellRow> for StockCell {
    fn from(row: CellRow) -> Self {
        StockCell {
            key: cell_key(row.location_id, row.product_id, row.color_id, row.size_id),
            box_stock: row.box_stock,
            pair_stock: row.pair_stock,
        }
    }
}

pub(crate) fn cell_key(
    location_id: i64,
    product_id: i64,
    color_id: i64,
    size_id: Option<i64>,
) -> CellKey {
    CellKey {
        location_id: LocationId(location_id),
        product_id: ProductId(product_id),
        color_id: ColorId(color_id),
        size_id: size_id.map(SizeId),
    }
}

/// `WHERE` fragment selecting one cell; binds `$1..$3` and `$4` when sized
pub(crate) fn cell_filter(cell: &CellKey) -> &'static str {
    if cell.size_id.is_some() {
        "location_id = $1 AND product_id = $2 AND color_id = $3 AND size_id = $4"
    } else {
        "location_id = $1 AND product_id = $2 AND color_id = $3 AND size_id IS NULL"
    }
}

macro_rules! bind_cell {
    ($query:expr, $cell:expr) => {{
        let query = $query
            .bind($cell.location_id.0)
            .bind($cell.product_id.0)
            .bind($cell.color_id.0);
        match $cell.size_id {
            Some(size) => query.bind(size.0),
            None => query,
        }
    }};
}
pub(crate) use bind_cell;

/// Bound how long a movement may wait on locks or run
pub async fn configure_transaction(conn: &mut PgConnection, config: &LedgerConfig) -> AppResult<()> {
    sqlx::query("SELECT set_config('lock_timeout', $1, true), set_config('statement_timeout', $2, true)")
        .bind(format!("{}ms", config.lock_timeout_ms))
        .bind(format!("{}ms", config.statement_timeout_ms))
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Claim a reference for this transaction. Returns false when another
/// movement already owns it.
pub async fn claim_reference(
    conn: &mut PgConnection,
    reference_id: &str,
    operation: &str,
) -> AppResult<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO movement_references (reference_id, operation)
        VALUES ($1, $2)
        ON CONFLICT (reference_id) DO NOTHING
        "#,
    )
    .bind(reference_id)
    .bind(operation)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Store the outcome a repeated reference will be answered with
pub async fn store_outcome(conn: &mut PgConnection, outcome: &MovementOutcome) -> AppResult<()> {
    let outcome_json = serde_json::to_value(outcome)
        .map_err(|e| AppError::Internal(format!("Failed to serialize outcome: {}", e)))?;

    sqlx::query("UPDATE movement_references SET outcome = $2 WHERE reference_id = $1")
        .bind(&outcome.reference_id)
        .bind(outcome_json)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Outcome of an already-applied reference, marked as replayed
pub async fn replay_outcome(
    conn: &mut PgConnection,
    reference_id: &str,
    operation: &str,
) -> AppResult<MovementOutcome> {
    let row = sqlx::query_as::<_, (String, Option<serde_json::Value>)>(
        "SELECT operation, outcome FROM movement_references WHERE reference_id = $1",
    )
    .bind(reference_id)
    .fetch_optional(&mut *conn)
    .await?;

    let (stored_operation, outcome) = match row {
        Some(row) => row,
        None => {
            return Err(InventoryError::ConcurrencyConflict {
                message: format!("reference {} was released while claiming it", reference_id),
            }
            .into())
        }
    };

    if stored_operation != operation {
        return Err(InventoryError::invalid(
            "reference_id",
            format!("already used by a {} movement", stored_operation),
        )
        .into());
    }

    let outcome = outcome.ok_or_else(|| InventoryError::ConcurrencyConflict {
        message: format!("reference {} is still being applied", reference_id),
    })?;
    let mut outcome: MovementOutcome = serde_json::from_value(outcome)
        .map_err(|e| AppError::Internal(format!("Stored outcome is unreadable: {}", e)))?;
    outcome.replayed = true;

    tracing::info!(reference_id, operation, "Replayed movement for repeated reference");
    Ok(outcome)
}

/// Lock the given cells, creating missing rows at zero, and return their
/// balances. Cells must arrive sorted so every movement locks in one order.
pub async fn lock_cells(
    conn: &mut PgConnection,
    cells: &[CellKey],
) -> AppResult<Vec<(CellKey, Balance)>> {
    debug_assert!(cells.windows(2).all(|pair| pair[0] < pair[1]));

    let mut balances = Vec::with_capacity(cells.len());
    for cell in cells {
        sqlx::query(
            r#"
            INSERT INTO stock_cells (location_id, product_id, color_id, size_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT ON CONSTRAINT stock_cells_key DO NOTHING
            "#,
        )
        .bind(cell.location_id.0)
        .bind(cell.product_id.0)
        .bind(cell.color_id.0)
        .bind(cell.size_id.map(|size| size.0))
        .execute(&mut *conn)
        .await?;

        let sql = format!(
            "SELECT box_stock, pair_stock FROM stock_cells WHERE {} FOR UPDATE",
            cell_filter(cell)
        );
        let (box_stock, pair_stock) =
            bind_cell!(sqlx::query_as::<_, (i64, i64)>(&sql), cell)
                .fetch_one(&mut *conn)
                .await?;

        balances.push((*cell, Balance::new(box_stock, pair_stock)));
    }

    Ok(balances)
}

/// Write back every cell the working-set ledger changed
pub async fn store_balances(conn: &mut PgConnection, ledger: &StockLedger) -> AppResult<()> {
    for cell in ledger.touched_cells() {
        let balance = ledger.get_balance(&cell);
        let sql = format!(
            "UPDATE stock_cells SET box_stock = {}, pair_stock = {}, updated_at = NOW() WHERE {}",
            if cell.size_id.is_some() { "$5" } else { "$4" },
            if cell.size_id.is_some() { "$6" } else { "$5" },
            cell_filter(&cell)
        );
        let updated = bind_cell!(sqlx::query(&sql), cell)
            .bind(balance.box_stock)
            .bind(balance.pair_stock)
            .execute(&mut *conn)
            .await?;

        if updated.rows_affected() != 1 {
            return Err(AppError::Internal(format!("Stock cell {} is not locked", cell)));
        }
    }
    Ok(())
}

/// Append records to the log, replacing their seq with the log's own
pub async fn append_records(
    conn: &mut PgConnection,
    records: &mut [MovementRecord],
) -> AppResult<()> {
    for record in records.iter_mut() {
        let seq = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO movement_log (
                id, kind, location_id, product_id, color_id, size_id,
                box_delta, pair_delta, ts, reference_id, notes, counterparty,
                unit_price, system_count, physical_count
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            RETURNING seq
            "#,
        )
        .bind(record.id)
        .bind(record.kind.as_str())
        .bind(record.location_id.0)
        .bind(record.product_id.0)
        .bind(record.color_id.0)
        .bind(record.size_id.map(|size| size.0))
        .bind(record.box_delta)
        .bind(record.pair_delta)
        .bind(record.timestamp)
        .bind(&record.reference_id)
        .bind(&record.notes)
        .bind(&record.counterparty)
        .bind(record.unit_price)
        .bind(record.system_count)
        .bind(record.physical_count)
        .fetch_one(&mut *conn)
        .await?;

        record.seq = seq;
    }
    Ok(())
}

/// Summary of a successful replay verification
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub location_id: Option<LocationId>,
    pub cells_checked: usize,
    pub verified_at: DateTime<Utc>,
}

#[derive(Debug, FromRow)]
struct ReplayRow {
    location_id: i64,
    product_id: i64,
    color_id: i64,
    size_id: Option<i64>,
    box_stock: i64,
    pair_stock: i64,
    replayed_box: i64,
    replayed_pair: i64,
}

/// Read side of the ledger
#[derive(Clone)]
pub struct LedgerService {
    db: PgPool,
}

impl LedgerService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Records written under one reference, in log order
    pub async fn movements_by_reference(&self, reference_id: &str) -> AppResult<Vec<MovementRecord>> {
        let sql = format!(
            "SELECT {} FROM movement_log WHERE reference_id = $1 ORDER BY seq",
            MOVEMENT_COLUMNS
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(reference_id)
            .fetch_all(&self.db)
            .await?;

        if rows.is_empty() {
            return Err(InventoryError::not_found("movement reference", reference_id).into());
        }

        rows.into_iter().map(MovementRow::into_record).collect()
    }

    /// Balance of one cell folded from its movement log
    pub async fn rebuild_from_log(&self, cell: &CellKey) -> AppResult<Balance> {
        let sql = format!(
            "SELECT COALESCE(SUM(box_delta), 0)::BIGINT, COALESCE(SUM(pair_delta), 0)::BIGINT \
             FROM movement_log WHERE {}",
            cell_filter(cell)
        );
        let (box_stock, pair_stock) = bind_cell!(sqlx::query_as::<_, (i64, i64)>(&sql), cell)
            .fetch_one(&self.db)
            .await?;
        Ok(Balance::new(box_stock, pair_stock))
    }

    /// Compare every stored balance with the fold of its log. Any mismatch
    /// is reported and nothing is corrected.
    pub async fn verify(&self, location_id: Option<LocationId>) -> AppResult<VerificationReport> {
        let rows = sqlx::query_as::<_, ReplayRow>(
            r#"
            SELECT
                COALESCE(c.location_id, l.location_id) AS location_id,
                COALESCE(c.product_id, l.product_id) AS product_id,
                COALESCE(c.color_id, l.color_id) AS color_id,
                COALESCE(c.size_id, l.size_id) AS size_id,
                COALESCE(c.box_stock, 0) AS box_stock,
                COALESCE(c.pair_stock, 0) AS pair_stock,
                COALESCE(l.box_sum, 0)::BIGINT AS replayed_box,
                COALESCE(l.pair_sum, 0)::BIGINT AS replayed_pair
            FROM stock_cells c
            FULL OUTER JOIN (
                SELECT location_id, product_id, color_id, size_id,
                       SUM(COALESCE(box_delta, 0)) AS box_sum,
                       SUM(COALESCE(pair_delta, 0)) AS pair_sum
                FROM movement_log
                GROUP BY location_id, product_id, color_id, size_id
            ) l
              ON l.location_id = c.location_id
             AND l.product_id = c.product_id
             AND l.color_id = c.color_id
             AND COALESCE(l.size_id, -1) = COALESCE(c.size_id, -1)
            WHERE $1::BIGINT IS NULL OR COALESCE(c.location_id, l.location_id) = $1
            ORDER BY 1, 2, 3, 4 NULLS FIRST
            "#,
        )
        .bind(location_id.map(|id| id.0))
        .fetch_all(&self.db)
        .await?;

        let cells_checked = rows.len();
        let mut first_violation = None;
        for row in rows {
            let stored = Balance::new(row.box_stock, row.pair_stock);
            let replayed = Balance::new(row.replayed_box, row.replayed_pair);
            if stored == replayed {
                continue;
            }

            let cell = cell_key(row.location_id, row.product_id, row.color_id, row.size_id);
            tracing::error!(
                %cell,
                stored_box = stored.box_stock,
                stored_pair = stored.pair_stock,
                replayed_box = replayed.box_stock,
                replayed_pair = replayed.pair_stock,
                "Stored balance disagrees with movement log"
            );
            first_violation.get_or_insert(InventoryError::ConsistencyViolation {
                cell,
                stored,
                replayed,
            });
        }

        if let Some(violation) = first_violation {
            return Err(violation.into());
        }

        tracing::info!(cells_checked, ?location_id, "Ledger replay verification passed");
        Ok(VerificationReport {
            location_id,
            cells_checked,
            verified_at: Utc::now(),
        })
    }
}
