use crate::{
    entities::{product, stock_movement},
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct StockAdjustRequest {
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i32,
    #[validate(length(min = 1, max = 255, message = "Reason must be 1-255 characters"))]
    pub reason: String,
}

/// POST /stock/:id/add
pub async fn add_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<StockAdjustRequest>,
) -> ApiResult<product::Model> {
    payload.validate()?;
    let product = state
        .inventory
        .add_stock(id, payload.quantity, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

/// POST /stock/:id/deduct
pub async fn deduct_stock(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<StockAdjustRequest>,
) -> ApiResult<product::Model> {
    payload.validate()?;
    let product = state
        .inventory
        .deduct_stock(id, payload.quantity, &payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

/// GET /stock/:id/history
pub async fn stock_history(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<Vec<stock_movement::Model>> {
    let history = state.inventory.stock_history(id).await?;
    Ok(Json(ApiResponse::success(history)))
}
