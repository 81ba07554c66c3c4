//! Transfer order lifecycle: pending, in transit, completed or cancelled
//!
//! Stock only moves when an order completes; completion applies the
//! order's transfer movement in the same transaction as the status change,
//! under the order's own reference.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    validate_transfer, InventoryError, LocationId, Movement, MovementOutcome, StockKind,
    TransferItem, TransferOrder, TransferRequest, TransferStatus, TRANSFER_ORDER_COMPLETION,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::config::{Config, RetryConfig};
use crate::error::{AppError, AppResult};
use crate::retry::with_contention_retry;
use crate::services::MovementService;

const ORDER_COLUMNS: &str = "id, reference_id, source_location_id, destination_location_id, \
     transfer_type, transfer_date, status, items, notes, created_at, updated_at";

/// Transfer service for multi-step transfer orders
#[derive(Clone)]
pub struct TransferService {
    db: PgPool,
    movements: MovementService,
    retry: RetryConfig,
}

/// Input for creating a transfer order
#[derive(Debug, Deserialize)]
pub struct CreateTransferOrderInput {
    pub source_location_id: LocationId,
    pub destination_location_id: LocationId,
    pub transfer_type: StockKind,
    pub transfer_date: Option<NaiveDate>,
    pub items: Vec<TransferItem>,
    pub reference_id: Option<String>,
    pub notes: Option<String>,
}

/// A completed order with the movement it applied
#[derive(Debug, Serialize)]
pub struct CompletedTransfer {
    pub order: TransferOrder,
    pub movement: MovementOutcome,
}

/// Filter for listing orders
#[derive(Debug, Default, Deserialize)]
pub struct TransferOrderFilter {
    pub status: Option<TransferStatus>,
    pub location_id: Option<LocationId>,
}

#[derive(Debug, FromRow)]
struct TransferOrderRow {
    id: Uuid,
    reference_id: String,
    source_location_id: i64,
    destination_location_id: i64,
    transfer_type: String,
    transfer_date: NaiveDate,
    status: String,
    items: Json<Vec<TransferItem>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransferOrderRow> for TransferOrder {
    type Error = AppError;

    fn try_from(row: TransferOrderRow) -> Result<Self, Self::Error> {
        let transfer_type = StockKind::from_str(&row.transfer_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown transfer type: {}", row.transfer_type))
        })?;
        let status = TransferStatus::from_str(&row.status)
            .ok_or_else(|| AppError::Internal(format!("Unknown transfer status: {}", row.status)))?;

        Ok(TransferOrder {
            id: row.id,
            reference_id: row.reference_id,
            source_location_id: LocationId(row.source_location_id),
            destination_location_id: LocationId(row.destination_location_id),
            transfer_type,
            transfer_date: row.transfer_date,
            status,
            items: row.items.0,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl TransferService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            movements: MovementService::new(db.clone(), config),
            retry: config.retry.clone(),
            db,
        }
    }

    /// Create a pending order; no stock moves yet
    pub async fn create_order(&self, input: CreateTransferOrderInput) -> AppResult<TransferOrder> {
        let reference_id = input
            .reference_id
            .clone()
            .unwrap_or_else(|| format!("TRF-{}", Uuid::new_v4().simple()));

        let request = TransferRequest {
            source_location_id: input.source_location_id,
            destination_location_id: input.destination_location_id,
            transfer_type: input.transfer_type,
            items: input.items.clone(),
            reference_id: Some(reference_id.clone()),
            notes: input.notes.clone(),
        };
        validate_transfer(&request)?;
        self.ensure_reference_unused(&reference_id).await?;

        let transfer_date = input.transfer_date.unwrap_or_else(|| Utc::now().date_naive());
        let sql = format!(
            r#"
            INSERT INTO transfer_orders (
                id, reference_id, source_location_id, destination_location_id,
                transfer_type, transfer_date, status, items, notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (reference_id) DO NOTHING
            RETURNING {}
            "#,
            ORDER_COLUMNS
        );
        let row = sqlx::query_as::<_, TransferOrderRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&reference_id)
            .bind(input.source_location_id.0)
            .bind(input.destination_location_id.0)
            .bind(input.transfer_type.as_str())
            .bind(transfer_date)
            .bind(TransferStatus::Pending.as_str())
            .bind(Json(&input.items))
            .bind(&input.notes)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| {
                InventoryError::invalid("reference_id", "already used by another transfer order")
            })?;

        let order = TransferOrder::try_from(row)?;
        tracing::info!(
            order_id = %order.id,
            reference_id = %order.reference_id,
            items = order.items.len(),
            "Transfer order created"
        );
        Ok(order)
    }

    pub async fn get_order(&self, order_id: Uuid) -> AppResult<TransferOrder> {
        let sql = format!("SELECT {} FROM transfer_orders WHERE id = $1", ORDER_COLUMNS);
        let row = sqlx::query_as::<_, TransferOrderRow>(&sql)
            .bind(order_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| InventoryError::not_found("transfer order", order_id))?;
        row.try_into()
    }

    pub async fn list_orders(&self, filter: TransferOrderFilter) -> AppResult<Vec<TransferOrder>> {
        let sql = format!(
            "SELECT {} FROM transfer_orders \
             WHERE ($1::VARCHAR IS NULL OR status = $1) \
               AND ($2::BIGINT IS NULL OR source_location_id = $2 OR destination_location_id = $2) \
             ORDER BY transfer_date DESC, created_at DESC",
            ORDER_COLUMNS
        );
        let rows = sqlx::query_as::<_, TransferOrderRow>(&sql)
            .bind(filter.status.map(|status| status.as_str()))
            .bind(filter.location_id.map(|id| id.0))
            .fetch_all(&self.db)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Mark a pending order as shipped
    pub async fn dispatch_order(&self, order_id: Uuid) -> AppResult<TransferOrder> {
        self.change_status(order_id, TransferStatus::InTransit).await
    }

    /// Cancel an order that has not completed; nothing was moved, so
    /// nothing is reversed
    pub async fn cancel_order(&self, order_id: Uuid) -> AppResult<TransferOrder> {
        self.change_status(order_id, TransferStatus::Cancelled).await
    }

    /// Complete an order: move its stock and close it in one transaction
    pub async fn complete_order(&self, order_id: Uuid) -> AppResult<CompletedTransfer> {
        let this = self;
        with_contention_retry(&self.retry, "complete_transfer_order", move || async move {
            this.complete_once(order_id).await
        })
        .await
    }

    async fn complete_once(&self, order_id: Uuid) -> AppResult<CompletedTransfer> {
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut *tx, order_id).await?;
        let status = order.status.transition(TransferStatus::Completed)?;

        let movement = self
            .movements
            .apply_in_tx_as(
                &mut *tx,
                Movement::Transfer(order.movement_request()),
                TRANSFER_ORDER_COMPLETION,
            )
            .await?;
        order.check_completion(&movement)?;
        let order = update_status(&mut *tx, order_id, status).await?;

        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            reference_id = %order.reference_id,
            records = movement.records.len(),
            "Transfer order completed"
        );
        Ok(CompletedTransfer { order, movement })
    }

    /// A reference already claimed by a movement would replay that
    /// movement instead of moving this order's items
    async fn ensure_reference_unused(&self, reference_id: &str) -> AppResult<()> {
        let claimed = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM movement_references WHERE reference_id = $1)",
        )
        .bind(reference_id)
        .fetch_one(&self.db)
        .await?;

        if claimed {
            return Err(
                InventoryError::invalid("reference_id", "already used by a stock movement").into(),
            );
        }
        Ok(())
    }

    async fn change_status(&self, order_id: Uuid, next: TransferStatus) -> AppResult<TransferOrder> {
        let mut tx = self.db.begin().await?;

        let order = lock_order(&mut *tx, order_id).await?;
        let status = order.status.transition(next)?;
        let order = update_status(&mut *tx, order_id, status).await?;

        tx.commit().await?;

        tracing::info!(order_id = %order.id, status = %order.status, "Transfer order status changed");
        Ok(order)
    }
}

async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> AppResult<TransferOrder> {
    let sql = format!("SELECT {} FROM transfer_orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
    let row = sqlx::query_as::<_, TransferOrderRow>(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| InventoryError::not_found("transfer order", order_id))?;
    row.try_into()
}

async fn update_status(
    conn: &mut PgConnection,
    order_id: Uuid,
    status: TransferStatus,
) -> AppResult<TransferOrder> {
    let sql = format!(
        "UPDATE transfer_orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        ORDER_COLUMNS
    );
    let row = sqlx::query_as::<_, TransferOrderRow>(&sql)
        .bind(order_id)
        .bind(status.as_str())
        .fetch_one(&mut *conn)
        .await?;
    row.try_into()
}
