//! HTTP handlers for stock queries and ledger verification

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use shared::{LocationId, MovementRecord, StockCard, StockCell, StockFilter};

use crate::error::AppResult;
use crate::services::ledger::VerificationReport;
use crate::services::stock::StockCardQuery;
use crate::services::{LedgerService, StockService};
use crate::AppState;

/// Get stock on hand at a location
pub async fn get_stock_on_hand(
    State(state): State<AppState>,
    Path(location_id): Path<LocationId>,
    Query(filter): Query<StockFilter>,
) -> AppResult<Json<Vec<StockCell>>> {
    let service = StockService::new(state.db);
    let cells = service.get_stock_on_hand(location_id, filter).await?;
    Ok(Json(cells))
}

/// Get the stock card of one cell over a date range
pub async fn get_stock_card(
    State(state): State<AppState>,
    Query(query): Query<StockCardQuery>,
) -> AppResult<Json<StockCard>> {
    let service = StockService::new(state.db);
    let card = service.get_stock_card(query).await?;
    Ok(Json(card))
}

/// Get the records written under a reference
pub async fn get_movements_by_reference(
    State(state): State<AppState>,
    Path(reference_id): Path<String>,
) -> AppResult<Json<Vec<MovementRecord>>> {
    let service = LedgerService::new(state.db);
    let records = service.movements_by_reference(&reference_id).await?;
    Ok(Json(records))
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyInput {
    pub location_id: Option<LocationId>,
}

/// Replay the movement log against stored balances
pub async fn verify_ledger(
    State(state): State<AppState>,
    input: Option<Json<VerifyInput>>,
) -> AppResult<Json<VerificationReport>> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let service = LedgerService::new(state.db);
    let report = service.verify(input.location_id).await?;
    Ok(Json(report))
}
