pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode},
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    metrics_middleware, request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::{sync::Arc, time::Duration};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::ModerationConfig;
use crate::middleware::{
    auth_middleware, optional_auth_middleware, permission_middleware, RequiredPermission,
};
use crate::services::{
    AdminService, AuditService, AuthService, HistoryService, PostService, RbacService, Store,
    TokenService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: ModerationConfig,
    pub store: Arc<dyn Store>,
    pub tokens: TokenService,
    pub rbac: RbacService,
    pub audit: AuditService,
    pub auth_service: AuthService,
    pub post_service: PostService,
    pub admin_service: AdminService,
}

impl AppState {
    /// Wire every service over one shared store.
    pub fn new(config: ModerationConfig, store: Arc<dyn Store>) -> Self {
        let tokens = TokenService::new(
            config.jwt.secret.clone(),
            chrono::Duration::hours(config.jwt.token_expiry_hours),
        );
        let rbac = RbacService::new(
            store.clone(),
            Duration::from_secs(config.rbac.cache_ttl_seconds),
        );
        let audit = AuditService::new(store.clone());
        let history = HistoryService::new(store.clone());

        let auth_service = AuthService::new(
            store.clone(),
            tokens.clone(),
            rbac.clone(),
            audit.clone(),
            config.rbac.default_role.clone(),
            config.rbac.admin_email.clone(),
        );
        let post_service =
            PostService::new(store.clone(), audit.clone(), history, config.posts.bool_merge);
        let admin_service = AdminService::new(rbac.clone(), audit.clone());

        Self {
            config,
            store,
            tokens,
            rbac,
            audit,
            auth_service,
            post_service,
            admin_service,
        }
    }
}

/// Guard every route in `routes` with a token and `required`. Authentication
/// runs first.
fn require_permission(
    routes: Router<AppState>,
    state: &AppState,
    required: RequiredPermission,
) -> Router<AppState> {
    routes
        .route_layer(from_fn_with_state(
            (state.clone(), required),
            permission_middleware,
        ))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, AppError> {
    let origins = origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin '{}': {}", o, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]))
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let public_routes = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login));

    // Anonymous callers see public posts; a valid token adds the caller's own.
    let browse_routes = Router::new()
        .route("/posts", get(handlers::post::list_posts))
        .route("/posts/:id", get(handlers::post::get_post))
        .route_layer(from_fn_with_state(state.clone(), optional_auth_middleware));

    // Ownership is enforced in the post service.
    let authenticated_routes = Router::new()
        .route("/users/me", get(handlers::user::get_me))
        .route(
            "/posts/:id",
            put(handlers::post::update_post).delete(handlers::post::delete_post),
        )
        .route("/posts/:id/history", get(handlers::post::get_post_history))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    let post_routes = require_permission(
        Router::new().route("/posts", post(handlers::post::create_post)),
        &state,
        RequiredPermission::new("posts", "create"),
    );

    let report_create_routes = require_permission(
        Router::new().route("/posts/:id/reports", post(handlers::report::create_report)),
        &state,
        RequiredPermission::new("reports", "create"),
    );

    let report_read_routes = require_permission(
        Router::new().route("/reports", get(handlers::report::list_reports)),
        &state,
        RequiredPermission::new("reports", "read"),
    );

    let report_update_routes = require_permission(
        Router::new().route(
            "/reports/:id/status",
            put(handlers::report::update_report_status),
        ),
        &state,
        RequiredPermission::new("reports", "update"),
    );

    let audit_routes = require_permission(
        Router::new()
            .route("/audit/by-user/:user_id", get(handlers::audit::logs_by_user))
            .route(
                "/audit/:table/:record_id",
                get(handlers::audit::logs_by_record),
            ),
        &state,
        RequiredPermission::new("audit", "read"),
    );

    let admin_routes = require_permission(
        Router::new()
            .route("/admin/roles", post(handlers::admin::create_role))
            .route("/admin/permissions", post(handlers::admin::create_permission))
            .route(
                "/admin/roles/:role_id/permissions",
                get(handlers::admin::role_permissions),
            )
            .route(
                "/admin/roles/:role_id/permissions/:permission_id",
                post(handlers::admin::grant_permission)
                    .delete(handlers::admin::revoke_permission),
            )
            .route("/admin/users/:user_id/roles", get(handlers::admin::user_roles))
            .route(
                "/admin/users/:user_id/roles/:role_id",
                post(handlers::admin::assign_role).delete(handlers::admin::remove_role),
            ),
        &state,
        RequiredPermission::new("roles", "manage"),
    );

    let cors = cors_layer(&state.config.security.allowed_origins)?;
    let timeout = state.config.common.request_timeout();

    let app = public_routes
        .merge(browse_routes)
        .merge(authenticated_routes)
        .merge(post_routes)
        .merge(report_create_routes)
        .merge(report_read_routes)
        .merge(report_update_routes)
        .merge(audit_routes)
        .merge(admin_routes)
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
            let request_id = request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or("-");

            tracing::info_span!(
                "http_request",
                request_id = %request_id,
                method = %request.method(),
                uri = %request.uri(),
            )
        }))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(cors);

    Ok(app)
}

/// Service health check. 503 when the store is unreachable.
pub async fn health_check(State(state): State<AppState>) -> Response {
    match state.store.health_check().await {
        Ok(()) => Json(serde_json::json!({
            "status": "healthy",
            "service": state.config.service_name,
            "version": state.config.service_version,
            "checks": { "store": "up" }
        }))
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "version": state.config.service_version,
                    "checks": { "store": "down" }
                })),
            )
                .into_response()
        }
    }
}
