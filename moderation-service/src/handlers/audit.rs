use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::AppState;

/// GET /audit/:table/:record_id
pub async fn logs_by_record(
    State(state): State<AppState>,
    Path((table, record_id)): Path<(String, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let logs = state.audit.logs_by_table(&table, record_id).await?;
    Ok(Json(logs))
}

/// GET /audit/by-user/:user_id
pub async fn logs_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let logs = state.audit.logs_by_user(user_id).await?;
    Ok(Json(logs))
}
