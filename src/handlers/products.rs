use super::PaginationParams;
use crate::{
    entities::product,
    errors::ServiceError,
    services::inventory::{CreateProductInput, UpdateProductInput},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

/// POST /products
pub async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<(StatusCode, Json<ApiResponse<product::Model>>), ServiceError> {
    let product = state.inventory.create_product(payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(product))))
}

/// GET /products?page=&page_size=
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<product::Model>> {
    let page = state
        .inventory
        .list_products(params.page, params.per_page)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        page.items,
        page.total,
        page.page,
        page.per_page,
    ))))
}

/// GET /products/:id
pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<product::Model> {
    let product = state.inventory.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

/// PUT /products/:id
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateProductInput>,
) -> ApiResult<product::Model> {
    let product = state.inventory.update_product(id, payload).await?;
    Ok(Json(ApiResponse::success(product)))
}
