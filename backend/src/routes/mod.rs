//! Route definitions for the stock ledger API

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Movements
        .route("/receipts", post(handlers::receive_goods))
        .route("/transfers", post(handlers::transfer_stock))
        .route("/sales", post(handlers::sell))
        .route("/rejects", post(handlers::record_reject))
        .route("/opname", post(handlers::adjust_opname))
        .nest("/conversions", conversion_routes())
        .nest("/transfer-orders", transfer_order_routes())
        // Queries
        .route("/stock/:location_id", get(handlers::get_stock_on_hand))
        .route("/stock-card", get(handlers::get_stock_card))
        .route(
            "/movements/:reference_id",
            get(handlers::get_movements_by_reference),
        )
        .route("/ledger/verify", post(handlers::verify_ledger))
        .nest("/products", product_routes())
}

/// Box-to-pair conversion routes
fn conversion_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_open_batches).post(handlers::start_conversion),
        )
        .route("/:batch_id", get(handlers::get_batch))
        .route("/:batch_id/counts", post(handlers::record_physical_count))
        .route("/:batch_id/complete-box", post(handlers::complete_one_box))
}

/// Transfer order lifecycle routes
fn transfer_order_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_transfer_orders).post(handlers::create_transfer_order),
        )
        .route("/:order_id", get(handlers::get_transfer_order))
        .route("/:order_id/dispatch", post(handlers::dispatch_transfer_order))
        .route("/:order_id/complete", post(handlers::complete_transfer_order))
        .route("/:order_id/cancel", post(handlers::cancel_transfer_order))
}

/// Product routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_product))
        .route("/:product_id", get(handlers::get_product))
        .route(
            "/:product_id/box-contents",
            put(handlers::update_box_contents),
        )
}
