use crate::{entities::stock_alert, ApiResponse, ApiResult, AppState};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct AlertQuery {
    pub product_id: Option<i32>,
    #[serde(default)]
    pub unresolved: bool,
}

/// GET /alerts?product_id=&unresolved=
pub async fn list_alerts(
    State(state): State<AppState>,
    Query(query): Query<AlertQuery>,
) -> ApiResult<Vec<stock_alert::Model>> {
    let alerts = state
        .inventory
        .list_alerts(query.product_id, query.unresolved)
        .await?;
    Ok(Json(ApiResponse::success(alerts)))
}

/// POST /alerts/:id/resolve
pub async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> ApiResult<stock_alert::Model> {
    let alert = state.inventory.resolve_alert(id).await?;
    Ok(Json(ApiResponse::success(alert)))
}
