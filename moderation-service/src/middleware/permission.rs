use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::{services::Claims, AppState};

/// The `(resource, action)` pair a route requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequiredPermission {
    pub resource: &'static str,
    pub action: &'static str,
}

impl RequiredPermission {
    pub const fn new(resource: &'static str, action: &'static str) -> Self {
        Self { resource, action }
    }
}

/// Runs after `auth_middleware`. 401 without claims, 403 when the caller
/// lacks the permission, 500 when the check itself fails.
pub async fn permission_middleware(
    State((state, required)): State<(AppState, RequiredPermission)>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user_id = req
        .extensions()
        .get::<Claims>()
        .map(|c| c.user_id)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))?;

    let allowed = state
        .rbac
        .check_permission(user_id, required.resource, required.action)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, user_id, "Permission check failed");
            AppError::InternalError(anyhow::anyhow!("Permission check failed"))
        })?;

    if !allowed {
        tracing::info!(
            user_id,
            resource = required.resource,
            action = required.action,
            "Permission denied"
        );
        return Err(AppError::Forbidden(anyhow::anyhow!(
            "Missing permission {}:{}",
            required.resource,
            required.action
        )));
    }

    Ok(next.run(req).await)
}
