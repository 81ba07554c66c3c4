//! HTTP handlers for box-to-pair conversion

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{
    CompleteBox, ConversionBatch, LocationId, MovementOutcome, PhysicalCount, SizeId,
    StartConversion,
};
use uuid::Uuid;

use super::movement::created;
use crate::error::AppResult;
use crate::services::{ConversionService, MovementService};
use crate::AppState;

/// Count of one size found in opened boxes
#[derive(Debug, Deserialize)]
pub struct PhysicalCountInput {
    pub size_id: SizeId,
    pub pairs: i64,
    pub reference_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteBoxInput {
    pub reference_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchListQuery {
    pub location_id: Option<LocationId>,
}

/// Take boxes out of box stock for opening
pub async fn start_conversion(
    State(state): State<AppState>,
    Json(input): Json<StartConversion>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service.start_conversion(input).await?;
    Ok(created(outcome))
}

/// Add counted pairs of one size to pair stock
pub async fn record_physical_count(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    Json(input): Json<PhysicalCountInput>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let service = MovementService::new(state.db, &state.config);
    let outcome = service
        .record_physical_count(PhysicalCount {
            batch_id,
            size_id: input.size_id,
            pairs: input.pairs,
            reference_id: input.reference_id,
        })
        .await?;
    Ok(created(outcome))
}

/// Close one box of the batch
pub async fn complete_one_box(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
    input: Option<Json<CompleteBoxInput>>,
) -> AppResult<(StatusCode, Json<MovementOutcome>)> {
    let input = input.map(|Json(input)| input).unwrap_or_default();
    let service = MovementService::new(state.db, &state.config);
    let outcome = service
        .complete_one_box(CompleteBox {
            batch_id,
            reference_id: input.reference_id,
        })
        .await?;
    Ok(created(outcome))
}

/// Get a conversion batch
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> AppResult<Json<ConversionBatch>> {
    let service = ConversionService::new(state.db);
    let batch = service.get_batch(batch_id).await?;
    Ok(Json(batch))
}

/// List batches with boxes still pending
pub async fn list_open_batches(
    State(state): State<AppState>,
    Query(query): Query<BatchListQuery>,
) -> AppResult<Json<Vec<ConversionBatch>>> {
    let service = ConversionService::new(state.db);
    let batches = service.list_open_batches(query.location_id).await?;
    Ok(Json(batches))
}
