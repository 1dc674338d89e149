use secrecy::SecretString;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Longest accepted token lifetime: one year.
pub const MAX_TOKEN_EXPIRY_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub store_backend: StoreBackend,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rbac: RbacConfig,
    pub posts: PostConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

/// How an update treats boolean fields the request leaves out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoolMergeMode {
    /// Omitted booleans are written as `false`.
    #[default]
    Legacy,
    /// Omitted booleans keep their stored value.
    Explicit,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long a request waits for a pooled connection before failing.
    pub acquire_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Absent is allowed at startup; token operations then fail.
    pub secret: Option<SecretString>,
    pub token_expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct RbacConfig {
    /// Zero disables the permission cache.
    pub cache_ttl_seconds: u64,
    pub default_role: String,
    pub admin_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostConfig {
    pub bool_merge: BoolMergeMode,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

impl ModerationConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let store_backend: StoreBackend = get_env("STORE_BACKEND", Some("postgres"), is_prod)?
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let database_url = match store_backend {
            StoreBackend::Postgres => get_env("DATABASE_URL", None, is_prod)?,
            StoreBackend::Memory => optional_env("DATABASE_URL").unwrap_or_default(),
        };

        let config = ModerationConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("moderation-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: optional_env("OTEL_EXPORTER_OTLP_ENDPOINT"),
            store_backend,
            database: DatabaseConfig {
                url: database_url,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
                acquire_timeout_seconds: parse_env(
                    "DATABASE_ACQUIRE_TIMEOUT_SECONDS",
                    "30",
                    is_prod,
                )?,
            },
            jwt: JwtConfig {
                secret: optional_env("JWT_SECRET").map(SecretString::new),
                token_expiry_hours: parse_env("JWT_TOKEN_EXPIRY_HOURS", "24", is_prod)?,
            },
            rbac: RbacConfig {
                cache_ttl_seconds: parse_env("RBAC_CACHE_TTL_SECONDS", "0", is_prod)?,
                default_role: get_env("DEFAULT_ROLE", Some("user"), is_prod)?,
                admin_email: optional_env("ADMIN_EMAIL"),
            },
            posts: PostConfig {
                bool_merge: get_env("POST_BOOL_MERGE", Some("legacy"), is_prod)?
                    .parse()
                    .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.token_expiry_hours <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_TOKEN_EXPIRY_HOURS must be positive"
            )));
        }

        if self.jwt.token_expiry_hours > MAX_TOKEN_EXPIRY_HOURS {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_TOKEN_EXPIRY_HOURS must not exceed {}",
                MAX_TOKEN_EXPIRY_HOURS
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.database.acquire_timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_ACQUIRE_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.rbac.default_role.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DEFAULT_ROLE must not be empty"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if self.store_backend == StoreBackend::Memory {
                tracing::error!("In-memory store selected in production - data will not persist");
            }
        }

        if self.jwt.secret.is_none() {
            tracing::warn!("JWT_SECRET is not set - login and authenticated routes will fail");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod && default.is_none() {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(format!("Invalid store backend: {}", s)),
        }
    }
}

impl std::str::FromStr for BoolMergeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "legacy" => Ok(BoolMergeMode::Legacy),
            "explicit" => Ok(BoolMergeMode::Explicit),
            _ => Err(format!("Invalid post boolean merge mode: {}", s)),
        }
    }
}
