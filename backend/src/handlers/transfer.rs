//! HTTP handlers for transfer orders

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::TransferOrder;
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::transfer::{CompletedTransfer, CreateTransferOrderInput, TransferOrderFilter};
use crate::services::TransferService;
use crate::AppState;

/// Create a pending transfer order
pub async fn create_transfer_order(
    State(state): State<AppState>,
    Json(input): Json<CreateTransferOrderInput>,
) -> AppResult<(StatusCode, Json<TransferOrder>)> {
    let service = TransferService::new(state.db, &state.config);
    let order = service.create_order(input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// List transfer orders
pub async fn list_transfer_orders(
    State(state): State<AppState>,
    Query(filter): Query<TransferOrderFilter>,
) -> AppResult<Json<Vec<TransferOrder>>> {
    let service = TransferService::new(state.db, &state.config);
    let orders = service.list_orders(filter).await?;
    Ok(Json(orders))
}

/// Get a transfer order
pub async fn get_transfer_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<TransferOrder>> {
    let service = TransferService::new(state.db, &state.config);
    let order = service.get_order(order_id).await?;
    Ok(Json(order))
}

/// Mark an order as in transit
pub async fn dispatch_transfer_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<TransferOrder>> {
    let service = TransferService::new(state.db, &state.config);
    let order = service.dispatch_order(order_id).await?;
    Ok(Json(order))
}

/// Complete an order and move its stock
pub async fn complete_transfer_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<CompletedTransfer>> {
    let service = TransferService::new(state.db, &state.config);
    let completed = service.complete_order(order_id).await?;
    Ok(Json(completed))
}

/// Cancel an order that has not completed
pub async fn cancel_transfer_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> AppResult<Json<TransferOrder>> {
    let service = TransferService::new(state.db, &state.config);
    let order = service.cancel_order(order_id).await?;
    Ok(Json(order))
}
