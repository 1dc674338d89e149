use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use super::{AuditService, RbacService, ServiceError, Store, TokenService};
use crate::dtos::auth::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};
use crate::models::{AuditAction, NewUser, Snapshot, UserResponse};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};

pub const ADMIN_ROLE: &str = "admin";
pub const USERS_TABLE: &str = "users";

/// Registration, login and profile lookups.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    tokens: TokenService,
    rbac: RbacService,
    audit: AuditService,
    default_role: String,
    admin_email: Option<String>,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: TokenService,
        rbac: RbacService,
        audit: AuditService,
        default_role: String,
        admin_email: Option<String>,
    ) -> Self {
        Self {
            store,
            tokens,
            rbac,
            audit,
            default_role,
            admin_email,
        }
    }

    #[tracing::instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        if self.store.user_exists(&req.email).await? {
            return Err(ServiceError::AlreadyExists("User".to_string()));
        }

        // Hashing internals never reach the caller.
        let password_hash = hash_password(&Password::new(req.password)).map_err(|e| {
            tracing::error!(error = %e, "Password hashing failed");
            ServiceError::internal("error processing password")
        })?;

        // Roles exist before the user row; the user and assignments commit together.
        let mut role_ids = vec![
            self.rbac
                .ensure_role(&self.default_role, "Default role for registered users")
                .await?
                .id,
        ];
        let bootstrap_admin = self.admin_email.as_deref() == Some(req.email.as_str());
        if bootstrap_admin {
            role_ids.push(self.rbac.ensure_role(ADMIN_ROLE, "Full access").await?.id);
        }

        let user = self
            .store
            .insert_user_with_roles(
                NewUser {
                    username: req.username,
                    email: req.email,
                    password_hash: password_hash.into_string(),
                    name: req.name,
                    birthday: req.birthday,
                },
                &role_ids,
            )
            .await?;

        if bootstrap_admin {
            tracing::info!(user_id = user.id, "Bootstrap admin registered");
        }
        tracing::info!(user_id = user.id, "User registered");

        Ok(RegisterResponse {
            user_id: user.id,
            message: "Registration successful".to_string(),
        })
    }

    /// Unknown e-mail and wrong password are indistinguishable to the caller.
    #[tracing::instrument(skip(self, req), fields(email = %req.email))]
    pub async fn login(&self, req: LoginRequest) -> Result<LoginResponse, ServiceError> {
        self.login_at(req, Utc::now()).await
    }

    pub async fn login_at(
        &self,
        req: LoginRequest,
        now: DateTime<Utc>,
    ) -> Result<LoginResponse, ServiceError> {
        let user = self
            .store
            .find_user_by_email(&req.email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(user.password_hash.clone()),
        )
        .map_err(|_| ServiceError::InvalidCredentials)?;

        let role = self
            .rbac
            .get_user_roles(user.id)
            .await?
            .into_iter()
            .next()
            .map(|r| r.name);

        let issued = self.tokens.issue(&user, role.as_deref(), now)?;
        let expires_at = DateTime::<Utc>::from_timestamp(issued.claims.exp, 0)
            .ok_or_else(|| ServiceError::internal("token expiry out of range"))?;

        tracing::info!(user_id = user.id, "User logged in");

        Ok(LoginResponse {
            token: issued.token,
            token_type: "Bearer".to_string(),
            expires_at,
            user_id: user.id,
            username: user.username,
            email: user.email,
            name: user.name,
            role,
        })
    }

    /// Profile lookup. The view is audited best-effort: an audit failure is
    /// logged and the profile is still returned.
    pub async fn get_user_profile(
        &self,
        user_id: i64,
        viewer: i64,
    ) -> Result<UserResponse, ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User".to_string()))?;

        let mut viewed = Snapshot::new();
        viewed.insert("username".to_string(), json!(user.username));
        viewed.insert("email".to_string(), json!(user.email));
        viewed.insert("name".to_string(), json!(user.name));
        viewed.insert("birthday".to_string(), json!(user.birthday));
        let roles: Vec<String> = self
            .rbac
            .get_user_roles(user.id)
            .await?
            .into_iter()
            .map(|r| r.name)
            .collect();
        viewed.insert("roles".to_string(), json!(roles));

        if let Err(e) = self
            .audit
            .record(
                Some(viewer),
                AuditAction::ViewProfile.as_str(),
                USERS_TABLE,
                user.id,
                None,
                Some(viewed),
            )
            .await
        {
            tracing::warn!(error = %e, user_id, "Failed to record profile view");
        }

        Ok(user.sanitized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::MemoryStore;
    use chrono::{Duration, NaiveDate};
    use secrecy::SecretString;

    fn auth_service(store: Arc<MemoryStore>, admin_email: Option<&str>) -> AuthService {
        let tokens = TokenService::new(
            Some(SecretString::new("test-secret".to_string())),
            Duration::hours(24),
        );
        let rbac = RbacService::new(store.clone(), std::time::Duration::ZERO);
        let audit = AuditService::new(store.clone());
        AuthService::new(
            store,
            tokens,
            rbac,
            audit,
            "user".to_string(),
            admin_email.map(str::to_string),
        )
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            username: "alice".to_string(),
            email: email.to_string(),
            password: "secret123".to_string(),
            name: "Alice".to_string(),
            birthday: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
        }
    }

    #[tokio::test]
    async fn register_twice_conflicts() {
        let auth = auth_service(Arc::new(MemoryStore::new()), None);
        auth.register(register_request("a@x.com")).await.unwrap();
        let err = auth.register(register_request("a@x.com")).await.unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn login_token_carries_default_role() {
        let auth = auth_service(Arc::new(MemoryStore::new()), None);
        auth.register(register_request("a@x.com")).await.unwrap();

        let now = Utc::now();
        let response = auth
            .login_at(
                LoginRequest {
                    email: "a@x.com".to_string(),
                    password: "secret123".to_string(),
                },
                now,
            )
            .await
            .unwrap();

        assert_eq!(response.role.as_deref(), Some("user"));
        let claims = auth.tokens.verify(&response.token, now).unwrap();
        assert_eq!(claims.role.as_deref(), Some("user"));
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.user_id, response.user_id);
    }

    #[tokio::test]
    async fn bad_email_and_bad_password_look_the_same() {
        let auth = auth_service(Arc::new(MemoryStore::new()), None);
        auth.register(register_request("a@x.com")).await.unwrap();

        let wrong_password = auth
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                password: "nope".to_string(),
            })
            .await
            .unwrap_err();
        let unknown = auth
            .login(LoginRequest {
                email: "b@x.com".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, ServiceError::InvalidCredentials));
        assert!(matches!(unknown, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn admin_email_gets_admin_role() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(store.clone(), Some("root@x.com"));
        let registered = auth.register(register_request("root@x.com")).await.unwrap();

        let roles: Vec<String> = store
            .find_user_roles(registered.user_id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(roles, vec!["user", "admin"]);
    }

    #[tokio::test]
    async fn profile_survives_audit_failure() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(store.clone(), None);
        let registered = auth.register(register_request("a@x.com")).await.unwrap();

        store.fail_on("insert_audit_log");
        let profile = auth
            .get_user_profile(registered.user_id, registered.user_id)
            .await
            .unwrap();
        assert_eq!(profile.email, "a@x.com");
    }

    #[tokio::test]
    async fn failed_role_assignment_leaves_no_user_behind() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(store.clone(), None);

        store.fail_on("insert_user_role");
        assert!(auth.register(register_request("a@x.com")).await.is_err());
        assert!(!store.user_exists("a@x.com").await.unwrap());

        store.recover("insert_user_role");
        auth.register(register_request("a@x.com")).await.unwrap();
        let response = auth
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(response.role.as_deref(), Some("user"));
    }

    #[tokio::test]
    async fn profile_view_records_identity_and_roles() {
        let store = Arc::new(MemoryStore::new());
        let auth = auth_service(store.clone(), Some("a@x.com"));
        let registered = auth.register(register_request("a@x.com")).await.unwrap();

        auth.get_user_profile(registered.user_id, registered.user_id)
            .await
            .unwrap();

        let logs = store
            .find_audit_logs_by_record(USERS_TABLE, registered.user_id)
            .await
            .unwrap();
        assert_eq!(logs[0].action, "view_profile");
        let viewed = logs[0].new_values.as_ref().unwrap();
        assert_eq!(viewed["username"], "alice");
        assert_eq!(viewed["email"], "a@x.com");
        assert_eq!(viewed["name"], "Alice");
        assert_eq!(viewed["birthday"], "1990-01-01");
        assert_eq!(viewed["roles"], json!(["user", "admin"]));
    }

    #[tokio::test]
    async fn missing_secret_fails_login_with_config_error() {
        let store = Arc::new(MemoryStore::new());
        let rbac = RbacService::new(store.clone(), std::time::Duration::ZERO);
        let auth = AuthService::new(
            store.clone(),
            TokenService::new(None, Duration::hours(24)),
            rbac,
            AuditService::new(store),
            "user".to_string(),
            None,
        );
        auth.register(register_request("a@x.com")).await.unwrap();

        let err = auth
            .login(LoginRequest {
                email: "a@x.com".to_string(),
                password: "secret123".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Config(_)));
    }
}
