use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use super::validate_request;
use crate::{
    dtos::{
        post::{CreatePostRequest, PaginationQuery, UpdatePostRequest},
        MessageResponse,
    },
    middleware::{AuthUser, MaybeAuthUser},
    AppState,
};

/// GET /posts
///
/// Public posts, plus the caller's private ones when authenticated.
pub async fn list_posts(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Query(query): Query<PaginationQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = state
        .post_service
        .list_posts(viewer.user_id(), query)
        .await?;
    Ok(Json(page))
}

/// GET /posts/:id
pub async fn get_post(
    State(state): State<AppState>,
    viewer: MaybeAuthUser,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let post = state
        .post_service
        .get_post(post_id, viewer.user_id())
        .await?;
    Ok(Json(post))
}

/// POST /posts
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_request(&req)?;
    let post = state.post_service.create_post(claims.user_id, req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /posts/:id
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(post_id): Path<i64>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_request(&req)?;
    let post = state
        .post_service
        .update_post(claims.user_id, post_id, req)
        .await?;
    Ok(Json(post))
}

/// DELETE /posts/:id
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    state
        .post_service
        .delete_post(claims.user_id, post_id)
        .await?;
    Ok(Json(MessageResponse::new("Post deleted")))
}

/// GET /posts/:id/history
pub async fn get_post_history(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(post_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let history = state
        .post_service
        .get_post_history(claims.user_id, post_id)
        .await?;
    Ok(Json(history))
}
