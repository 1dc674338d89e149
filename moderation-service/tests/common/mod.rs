//! Shared setup for moderation-service integration tests.
//!
//! Builds the full router over an in-memory store and drives it with
//! `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use moderation_service::{
    build_router,
    config::{
        BoolMergeMode, DatabaseConfig, Environment, JwtConfig, ModerationConfig, PostConfig,
        RbacConfig, SecurityConfig, StoreBackend,
    },
    services::{bootstrap, MemoryStore, Store},
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret";
pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const PASSWORD: &str = "secret123";

pub fn test_config(secret: Option<&str>) -> ModerationConfig {
    ModerationConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "moderation-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store_backend: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
            acquire_timeout_seconds: 1,
        },
        jwt: JwtConfig {
            secret: secret.map(|s| SecretString::new(s.to_string())),
            token_expiry_hours: 24,
        },
        rbac: RbacConfig {
            cache_ttl_seconds: 0,
            default_role: "user".to_string(),
            admin_email: Some(ADMIN_EMAIL.to_string()),
        },
        posts: PostConfig {
            bool_merge: BoolMergeMode::Legacy,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: Value,
    pub text: String,
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config(Some(TEST_SECRET))).await
    }

    pub async fn with_config(config: ModerationConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let state = AppState::new(config.clone(), dyn_store);
        bootstrap::seed_defaults(&state.rbac, &config.rbac.default_role)
            .await
            .expect("seeding should succeed");
        let router = build_router(state.clone()).expect("router should build");
        Self {
            router,
            state,
            store,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request should build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should be readable")
            .to_bytes();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        TestResponse {
            status,
            headers,
            body,
            text,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: Option<&str>, body: Value) -> TestResponse {
        self.request(Method::PUT, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Register a user; returns the new id.
    pub async fn register(&self, username: &str, email: &str) -> i64 {
        let response = self
            .post(
                "/auth/register",
                None,
                json!({
                    "username": username,
                    "email": email,
                    "password": PASSWORD,
                    "name": username,
                    "birthday": "1990-01-01",
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        response.body["user_id"].as_i64().expect("user_id in body")
    }

    pub async fn login(&self, email: &str) -> String {
        let response = self
            .post(
                "/auth/login",
                None,
                json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(response.status, StatusCode::OK, "{}", response.text);
        response.body["token"]
            .as_str()
            .expect("token in body")
            .to_string()
    }

    /// Register then log in; returns `(user_id, token)`.
    pub async fn signup(&self, username: &str) -> (i64, String) {
        let email = format!("{}@example.com", username);
        let user_id = self.register(username, &email).await;
        let token = self.login(&email).await;
        (user_id, token)
    }

    /// Give an existing user one of the seeded roles directly.
    pub async fn grant_role(&self, user_id: i64, role_name: &str) {
        let role = self
            .store
            .find_role_by_name(role_name)
            .await
            .expect("role lookup")
            .expect("seeded role exists");
        self.state
            .rbac
            .assign_role_to_user(user_id, role.id)
            .await
            .expect("role assignment");
    }

    pub async fn create_post(&self, token: &str, title: &str, visibility: &str) -> i64 {
        let response = self
            .post(
                "/posts",
                Some(token),
                json!({
                    "title": title,
                    "description": "Broken streetlight",
                    "address": "1 Main St",
                    "incident_date": "2024-05-01",
                    "visibility": visibility,
                    "allow_comments": true,
                }),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.text);
        response.body["id"].as_i64().expect("post id")
    }
}
