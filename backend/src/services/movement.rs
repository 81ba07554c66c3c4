//! Movement service: runs every stock mutation as one database transaction
//!
//! A movement claims its reference, locks the product, batch and cell rows
//! it depends on (in that order, cells sorted by key), applies the shared
//! [`MovementEngine`] to the locked working set and writes the result back.
//! Contention rolls the whole attempt back and retries it.

use chrono::Utc;
use shared::{
    generate_reference_id, CompleteBox, ConversionTracker, Movement, MovementEngine,
    MovementOutcome, OpnameAdjustment, PhysicalCount, ReceiveGoods, RejectRequest, SalesOrder,
    StartConversion, StockLedger, TransferRequest,
};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::{Config, LedgerConfig, RetryConfig};
use crate::error::{AppError, AppResult};
use crate::retry::with_contention_retry;
use crate::services::{conversion, ledger, product};

/// Movement service for all ledger mutations
#[derive(Clone)]
pub struct MovementService {
    db: PgPool,
    ledger: LedgerConfig,
    retry: RetryConfig,
}

impl MovementService {
    pub fn new(db: PgPool, config: &Config) -> Self {
        Self {
            db,
            ledger: config.ledger.clone(),
            retry: config.retry.clone(),
        }
    }

    pub async fn receive_goods(&self, request: ReceiveGoods) -> AppResult<MovementOutcome> {
        self.execute(Movement::Receipt(request)).await
    }

    pub async fn transfer(&self, request: TransferRequest) -> AppResult<MovementOutcome> {
        self.execute(Movement::Transfer(request)).await
    }

    pub async fn start_conversion(&self, request: StartConversion) -> AppResult<MovementOutcome> {
        self.execute(Movement::StartConversion(request)).await
    }

    pub async fn record_physical_count(&self, request: PhysicalCount) -> AppResult<MovementOutcome> {
        self.execute(Movement::PhysicalCount(request)).await
    }

    pub async fn complete_one_box(&self, request: CompleteBox) -> AppResult<MovementOutcome> {
        self.execute(Movement::CompleteBox(request)).await
    }

    pub async fn sell(&self, order: SalesOrder) -> AppResult<MovementOutcome> {
        self.execute(Movement::Sale(order)).await
    }

    pub async fn record_reject(&self, request: RejectRequest) -> AppResult<MovementOutcome> {
        self.execute(Movement::Reject(request)).await
    }

    pub async fn adjust_opname(&self, request: OpnameAdjustment) -> AppResult<MovementOutcome> {
        self.execute(Movement::Opname(request)).await
    }

    /// Validate, pin a reference, then apply with contention retry
    pub async fn execute(&self, movement: Movement) -> AppResult<MovementOutcome> {
        movement.validate()?;

        // Retries must reuse the reference so a lost commit ack replays
        let movement = match movement.reference_id() {
            Some(_) => movement,
            None => movement.with_reference_id(generate_reference_id()),
        };

        let this = self;
        let movement = &movement;
        with_contention_retry(&self.retry, movement.operation(), move || async move {
            this.run_once(movement).await
        })
        .await
    }

    async fn run_once(&self, movement: &Movement) -> AppResult<MovementOutcome> {
        let mut tx = self.db.begin().await?;
        let outcome = self.apply_in_tx(&mut *tx, movement.clone()).await?;
        tx.commit().await?;

        if !outcome.replayed {
            tracing::info!(
                operation = %outcome.operation,
                reference_id = %outcome.reference_id,
                records = outcome.records.len(),
                "Movement committed"
            );
        }
        Ok(outcome)
    }

    /// Apply one movement inside the caller's transaction. Nothing is
    /// committed here; on error the caller must roll back.
    pub(crate) async fn apply_in_tx(
        &self,
        conn: &mut PgConnection,
        movement: Movement,
    ) -> AppResult<MovementOutcome> {
        let operation = movement.operation();
        self.apply_in_tx_as(conn, movement, operation).await
    }

    /// Same as [`Self::apply_in_tx`], claiming the reference under
    /// `operation` so a different caller of the same movement kind cannot
    /// replay it
    pub(crate) async fn apply_in_tx_as(
        &self,
        conn: &mut PgConnection,
        movement: Movement,
        operation: &str,
    ) -> AppResult<MovementOutcome> {
        ledger::configure_transaction(conn, &self.ledger).await?;

        let reference_id = match movement.reference_id() {
            Some(reference) => reference.to_string(),
            None => generate_reference_id(),
        };
        let movement = movement.with_reference_id(reference_id.clone());

        if !ledger::claim_reference(conn, &reference_id, operation).await? {
            return ledger::replay_outcome(conn, &reference_id, operation).await;
        }

        let mut products = Vec::new();
        if let Some(product_id) = movement.conversion_product() {
            products.push(product::lock_product_for_share(conn, product_id).await?);
        }

        let mut batches = Vec::new();
        match &movement {
            Movement::StartConversion(r) => {
                if let Some(batch) =
                    conversion::lock_open_batch(conn, r.location_id, r.product_id, r.color_id)
                        .await?
                {
                    batches.push(batch);
                }
            }
            _ => {
                if let Some(batch_id) = movement.batch_id() {
                    batches.push(conversion::lock_batch(conn, batch_id).await?);
                }
            }
        }

        let cells = movement.touched_cells(batches.first());
        let balances = ledger::lock_cells(conn, &cells).await?;

        let mut engine = MovementEngine::from_parts(
            StockLedger::with_opening_balances(balances),
            ConversionTracker::with_batches(batches),
            products,
        );
        let mut outcome = engine.apply(movement.clone(), Utc::now())?;

        ledger::store_balances(conn, engine.ledger()).await?;
        ledger::append_records(conn, &mut outcome.records).await?;
        if let Some(batch) = &outcome.batch {
            conversion::save_batch(conn, batch).await?;
        }
        if let Movement::Sale(order) = &movement {
            insert_sales_order(conn, order, &reference_id).await?;
        }
        ledger::store_outcome(conn, &outcome).await?;

        tracing::debug!(
            operation,
            reference_id = %reference_id,
            cells = cells.len(),
            "Movement applied to working set"
        );
        Ok(outcome)
    }
}

async fn insert_sales_order(
    conn: &mut PgConnection,
    order: &SalesOrder,
    reference_id: &str,
) -> AppResult<()> {
    let items = serde_json::to_value(&order.items)
        .map_err(|e| AppError::Internal(format!("Failed to serialize items: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO sales_orders (id, reference_id, location_id, total_amount, items, notes)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(reference_id)
    .bind(order.location_id.0)
    .bind(order.total_amount)
    .bind(items)
    .bind(&order.notes)
    .execute(&mut *conn)
    .await?;
    Ok(())
}
