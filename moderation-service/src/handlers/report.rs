use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use super::validate_request;
use crate::{
    dtos::post::{CreateReportRequest, PaginationQuery, UpdateReportStatusRequest},
    middleware::AuthUser,
    AppState,
};

/// POST /posts/:id/reports
pub async fn create_report(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(post_id): Path<i64>,
    Json(req): Json<CreateReportRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_request(&req)?;
    let report = state
        .post_service
        .create_report(claims.user_id, post_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /reports
pub async fn list_reports(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state.post_service.list_reports(query).await?;
    Ok(Json(page))
}

/// PUT /reports/:id/status
pub async fn update_report_status(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(report_id): Path<i64>,
    Json(req): Json<UpdateReportStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_request(&req)?;
    let report = state
        .post_service
        .update_report_status(claims.user_id, report_id, req)
        .await?;
    Ok(Json(report))
}
