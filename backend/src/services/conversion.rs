//! Conversion batch persistence and lookup

use chrono::{DateTime, Utc};
use shared::{ColorId, ConversionBatch, InventoryError, LocationId, ProductId};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::AppResult;

const BATCH_COLUMNS: &str = "id, location_id, product_id, color_id, box_contents, boxes_pending, \
     pairs_expected, pairs_counted, created_at, updated_at";

/// Conversion service for reading batches
#[derive(Clone)]
pub struct ConversionService {
    db: PgPool,
}

#[derive(Debug, FromRow)]
struct BatchRow {
    id: Uuid,
    location_id: i64,
    product_id: i64,
    color_id: i64,
    box_contents: i64,
    boxes_pending: i64,
    pairs_expected: i64,
    pairs_counted: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<BatchRow> for ConversionBatch {
    fn from(row: BatchRow) -> Self {
        ConversionBatch {
            id: row.id,
            location_id: LocationId(row.location_id),
            product_id: ProductId(row.product_id),
            color_id: ColorId(row.color_id),
            box_contents: row.box_contents,
            boxes_pending: row.boxes_pending,
            pairs_expected: row.pairs_expected,
            pairs_counted: row.pairs_counted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Lock one batch by id
pub async fn lock_batch(conn: &mut PgConnection, batch_id: Uuid) -> AppResult<ConversionBatch> {
    let sql = format!("SELECT {} FROM conversion_batches WHERE id = $1 FOR UPDATE", BATCH_COLUMNS);
    let row = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(batch_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| InventoryError::not_found("conversion batch", batch_id))?;
    Ok(row.into())
}

/// Lock the open batch of a (location, product, color), if there is one
pub async fn lock_open_batch(
    conn: &mut PgConnection,
    location_id: LocationId,
    product_id: ProductId,
    color_id: ColorId,
) -> AppResult<Option<ConversionBatch>> {
    let sql = format!(
        "SELECT {} FROM conversion_batches \
         WHERE location_id = $1 AND product_id = $2 AND color_id = $3 AND boxes_pending > 0 \
         FOR UPDATE",
        BATCH_COLUMNS
    );
    let row = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(location_id.0)
        .bind(product_id.0)
        .bind(color_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Into::into))
}

/// Open batches of a product, locked so none can start meanwhile
pub async fn load_open_batches_for_product(
    conn: &mut PgConnection,
    product_id: ProductId,
) -> AppResult<Vec<ConversionBatch>> {
    let sql = format!(
        "SELECT {} FROM conversion_batches WHERE product_id = $1 AND boxes_pending > 0 FOR UPDATE",
        BATCH_COLUMNS
    );
    let rows = sqlx::query_as::<_, BatchRow>(&sql)
        .bind(product_id.0)
        .fetch_all(&mut *conn)
        .await?;
    Ok(rows.into_iter().map(Into::into).collect())
}

/// Insert or update a batch after a movement changed it
pub async fn save_batch(conn: &mut PgConnection, batch: &ConversionBatch) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO conversion_batches (
            id, location_id, product_id, color_id, box_contents, boxes_pending,
            pairs_expected, pairs_counted, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO UPDATE SET
            boxes_pending = EXCLUDED.boxes_pending,
            pairs_expected = EXCLUDED.pairs_expected,
            pairs_counted = EXCLUDED.pairs_counted,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(batch.id)
    .bind(batch.location_id.0)
    .bind(batch.product_id.0)
    .bind(batch.color_id.0)
    .bind(batch.box_contents)
    .bind(batch.boxes_pending)
    .bind(batch.pairs_expected)
    .bind(batch.pairs_counted)
    .bind(batch.created_at)
    .bind(batch.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

impl ConversionService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<ConversionBatch> {
        let sql = format!("SELECT {} FROM conversion_batches WHERE id = $1", BATCH_COLUMNS);
        let row = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(batch_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| InventoryError::not_found("conversion batch", batch_id))?;
        Ok(row.into())
    }

    /// Batches with boxes still pending, optionally for one location
    pub async fn list_open_batches(
        &self,
        location_id: Option<LocationId>,
    ) -> AppResult<Vec<ConversionBatch>> {
        let sql = format!(
            "SELECT {} FROM conversion_batches \
             WHERE boxes_pending > 0 AND ($1::BIGINT IS NULL OR location_id = $1) \
             ORDER BY created_at",
            BATCH_COLUMNS
        );
        let rows = sqlx::query_as::<_, BatchRow>(&sql)
            .bind(location_id.map(|id| id.0))
            .fetch_all(&self.db)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
