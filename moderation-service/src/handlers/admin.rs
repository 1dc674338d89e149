//! Role and permission administration. Every route here sits behind the
//! `roles:manage` permission.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use super::validate_request;
use crate::{
    dtos::admin::{AssignmentResponse, CreatePermissionRequest, CreateRoleRequest},
    middleware::AuthUser,
    AppState,
};

fn assignment(changed: bool, changed_msg: &str, unchanged_msg: &str) -> Json<AssignmentResponse> {
    Json(AssignmentResponse {
        changed,
        message: if changed { changed_msg } else { unchanged_msg }.to_string(),
    })
}

/// POST /admin/roles
pub async fn create_role(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<CreateRoleRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_request(&req)?;
    let role = state
        .admin_service
        .create_role(claims.user_id, &req.name, &req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// POST /admin/permissions
pub async fn create_permission(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<CreatePermissionRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_request(&req)?;
    let permission = state
        .admin_service
        .create_permission(
            claims.user_id,
            &req.name,
            &req.resource,
            &req.action,
            &req.description,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

/// GET /admin/roles/:id/permissions
pub async fn role_permissions(
    State(state): State<AppState>,
    Path(role_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let permissions = state.admin_service.role_permissions(role_id).await?;
    Ok(Json(permissions))
}

/// GET /admin/users/:user_id/roles
pub async fn user_roles(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let roles = state.admin_service.user_roles(user_id).await?;
    Ok(Json(roles))
}

/// POST /admin/users/:user_id/roles/:role_id
pub async fn assign_role(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((user_id, role_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let added = state
        .admin_service
        .assign_role(claims.user_id, user_id, role_id)
        .await?;
    Ok(assignment(added, "Role assigned", "Role already assigned"))
}

/// DELETE /admin/users/:user_id/roles/:role_id
pub async fn remove_role(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((user_id, role_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state
        .admin_service
        .remove_role(claims.user_id, user_id, role_id)
        .await?;
    Ok(assignment(removed, "Role removed", "Role was not assigned"))
}

/// POST /admin/roles/:role_id/permissions/:permission_id
pub async fn grant_permission(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((role_id, permission_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let added = state
        .admin_service
        .grant_permission(claims.user_id, role_id, permission_id)
        .await?;
    Ok(assignment(added, "Permission granted", "Permission already granted"))
}

/// DELETE /admin/roles/:role_id/permissions/:permission_id
pub async fn revoke_permission(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((role_id, permission_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let removed = state
        .admin_service
        .revoke_permission(claims.user_id, role_id, permission_id)
        .await?;
    Ok(assignment(removed, "Permission revoked", "Permission was not granted"))
}
