//! HTTP handlers for products

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{Product, ProductId};

use crate::error::AppResult;
use crate::services::product::{CreateProductInput, UpdateBoxContentsInput};
use crate::services::ProductService;
use crate::AppState;

/// Register a product
pub async fn create_product(
    State(state): State<AppState>,
    Json(input): Json<CreateProductInput>,
) -> AppResult<(StatusCode, Json<Product>)> {
    let service = ProductService::new(state.db);
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// Get a product
pub async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.get_product(product_id).await?;
    Ok(Json(product))
}

/// Change pairs per box
pub async fn update_box_contents(
    State(state): State<AppState>,
    Path(product_id): Path<ProductId>,
    Json(input): Json<UpdateBoxContentsInput>,
) -> AppResult<Json<Product>> {
    let service = ProductService::new(state.db);
    let product = service.update_box_contents(product_id, input).await?;
    Ok(Json(product))
}
