//! Listener settings shared by the service binaries.
//!
//! Read from an optional `configuration` file (toml, yaml or json) and then
//! from `APP__`-prefixed environment variables, e.g. `APP__PORT=9000` or
//! `APP__REQUEST_TIMEOUT_SECONDS=10`. A `.env` file is loaded first if present.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;
use config::builder::DefaultState;
use config::{Config as Cfg, ConfigBuilder, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on a single request, applied by the router's timeout layer.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        Self::from_sources(
            Cfg::builder()
                .add_source(File::with_name("configuration").required(false))
                .add_source(config::Environment::with_prefix("APP").separator("__")),
        )
    }

    fn from_sources(builder: ConfigBuilder<DefaultState>) -> Result<Self, AppError> {
        let config: Self = builder.build()?.try_deserialize()?;
        if config.request_timeout_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "APP__REQUEST_TIMEOUT_SECONDS must be positive"
            )));
        }
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Address the HTTP listener binds to, on every interface.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
