//! HTTP handlers for stock movements

use axum::{extract::State, http::StatusCode, Json};
use shared::{
    MovementOutcome, OpnameAdjustment, ReceiveGoods, RejectRequest, SalesOrder, TransferRequest,
};

use crate::error::AppResult;
use crate::services::MovementService;
use crate::AppState;

/// New movements answer 201, replays of a known reference 200
pub(crate) fn created(outcome: MovementOutcome) -> (StatusCode, Json<MovementOutcome>) {
    let status = if outcome.replayed {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    (status, Json(outcome))
}

/// Receive boxes from a supplier
pub async fn receive_goods(
    State(state): State<AppState>,
    Json(input): Json<ReceiveGoods>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service.receive_goods(input).await?;
    Ok(created(outcome))
}

/// Move stock between locations in one step
pub async fn transfer_stock(
    State(state): State<AppState>,
    Json(input): Json<TransferRequest>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service.transfer(input).await?;
    Ok(created(outcome))
}

/// Sell pairs
pub async fn sell(
    State(state): State<AppState>,
    Json(input): Json<SalesOrder>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service.sell(input).await?;
    Ok(created(outcome))
}

/// Write off damaged pairs
pub async fn record_reject(
    State(state): State<AppState>,
    Json(input): Json<RejectRequest>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service.record_reject(input).await?;
    Ok(created(outcome))
}

/// Reconcile a cell with a physical stock count
pub async fn adjust_opname(
    State(state): State<AppState>,
    Json(input): Json<OpnameAdjustment>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service.adjust_opname(input).await?;
    Ok(created(outcome))
}
