use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use service_core::error::AppError;
use std::convert::Infallible;

use crate::{
    services::{Claims, ServiceError},
    AppState,
};

/// `Some(token)` for `Authorization: Bearer <token>`, `None` when the
/// header is absent. Any other shape is rejected.
fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(value) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    value
        .to_str()
        .ok()
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Some)
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })
}

fn verify(state: &AppState, token: &str) -> Result<Claims, AppError> {
    state.tokens.verify(token, Utc::now()).map_err(|e| match e {
        ServiceError::Unauthorized(_) => {
            AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
        }
        other => AppError::from(other),
    })
}

/// Middleware to require authentication
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())?.ok_or_else(|| {
        AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
    })?;

    let claims = verify(&state, token)?;
    tracing::debug!(user_id = claims.user_id, "Request authenticated");

    // Store claims in request extensions so handlers can access them
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Like `auth_middleware` but lets anonymous requests through. A token that
/// is present but invalid is still rejected.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = match bearer_token(req.headers())? {
        Some(token) => Some(verify(&state, token)?),
        None => None,
    };
    if let Some(claims) = claims {
        req.extensions_mut().insert(claims);
    }

    Ok(next.run(req).await)
}

/// Extractor for the authenticated caller's claims.
pub struct AuthUser(pub Claims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}

/// Claims when the caller sent a valid token, `None` for anonymous callers.
pub struct MaybeAuthUser(pub Option<Claims>);

impl MaybeAuthUser {
    pub fn user_id(&self) -> Option<i64> {
        self.0.as_ref().map(|c| c.user_id)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(parts.extensions.get::<Claims>().cloned()))
    }
}
