use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

use azsnap_arm::{DEFAULT_AUTHORITY_HOST, DEFAULT_RESOURCE_MANAGER_ENDPOINT};

pub const TENANT_ID_VAR: &str = "REACT_APP_AZURE_TENANT_ID";
pub const CLIENT_ID_VAR: &str = "REACT_APP_AZURE_CLIENT_ID";
pub const SUBSCRIPTION_ID_VAR: &str = "REACT_APP_AZURE_SUBSCRIPTION_ID";
pub const PORT_VAR: &str = "PORT";
pub const AUTHORITY_HOST_VAR: &str = "AZURE_AUTHORITY_HOST";
pub const RESOURCE_MANAGER_VAR: &str = "AZURE_RESOURCE_MANAGER_ENDPOINT";
pub const CORS_ORIGINS_VAR: &str = "CORS_ALLOWED_ORIGINS";

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:8080", "http://localhost:80"];

/// Graceful drain deadline once a termination signal arrives.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub subscription_id: String,
    pub port: u16,
    pub authority_host: String,
    pub resource_manager_endpoint: String,
    pub allowed_origins: Vec<String>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| optional(key).ok_or(ConfigError::Missing(key));

        let tenant_id = required(TENANT_ID_VAR)?;
        let client_id = required(CLIENT_ID_VAR)?;
        let subscription_id = required(SUBSCRIPTION_ID_VAR)?;

        let port = match optional(PORT_VAR) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                name: PORT_VAR,
                value: raw,
            })?,
            None => DEFAULT_PORT,
        };

        let allowed_origins = match optional(CORS_ORIGINS_VAR) {
            Some(raw) => {
                let origins: Vec<String> = raw
                    .split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect();
                // Credentialed CORS cannot use a wildcard origin.
                if origins.iter().any(|o| o == "*") {
                    return Err(ConfigError::Invalid {
                        name: CORS_ORIGINS_VAR,
                        value: raw,
                    });
                }
                origins
            }
            None => DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect(),
        };

        Ok(Self {
            tenant_id,
            client_id,
            subscription_id,
            port,
            authority_host: optional(AUTHORITY_HOST_VAR)
                .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string()),
            resource_manager_endpoint: optional(RESOURCE_MANAGER_VAR)
                .unwrap_or_else(|| DEFAULT_RESOURCE_MANAGER_ENDPOINT.to_string()),
            allowed_origins,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}
