//! File and environment configuration.
//!
//! Settings load from an optional TOML file layered under `FLEET__`-prefixed
//! environment variables, e.g. `FLEET__MANAGER__POLL_PERIOD_MS=5000` or
//! `FLEET__MANAGER__AUTO_SWITCH=false`.

use std::{path::Path, time::Duration};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{
    endpoint::{Endpoint, DEFAULT_ENDPOINT_TIMEOUT},
    error::ClientError,
    manager::{ManagerConfig, PollMode, DEFAULT_POLL_PERIOD, DEFAULT_POLL_TIMEOUT},
};

const ENV_PREFIX: &str = "FLEET";

/// Top-level configuration: manager settings plus the initial endpoint list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub manager: ManagerSettings,
    pub endpoints: Vec<EndpointSettings>,
}

/// Polling and failover settings for the connection manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    pub poll_period_ms: u64,
    pub poll_timeout_ms: u64,
    pub auto_switch: bool,
    pub poll_mode: PollMode,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            poll_period_ms: DEFAULT_POLL_PERIOD.as_millis() as u64,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT.as_millis() as u64,
            auto_switch: true,
            poll_mode: PollMode::default(),
        }
    }
}

/// One endpoint as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub proxy_uri: Option<String>,
    pub priority: u32,
    pub timeout_ms: u64,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            uri: String::new(),
            username: None,
            password: None,
            proxy_uri: None,
            priority: 0,
            timeout_ms: DEFAULT_ENDPOINT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl FleetConfig {
    /// Loads configuration from an optional TOML file with environment
    /// variable overrides layered on top.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] when the file cannot be read or the
    /// merged settings fail to deserialize or validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ClientError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            let path = path
                .to_str()
                .ok_or_else(|| ClientError::Config("config path is not valid UTF-8".into()))?;
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }
        let settings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to load configuration: {e}")))?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ClientError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks invariants the serde layer cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] naming the first violation found.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.manager.poll_period_ms == 0 {
            return Err(ClientError::Config("manager.poll_period_ms must be positive".into()));
        }
        if self.manager.poll_timeout_ms == 0 {
            return Err(ClientError::Config("manager.poll_timeout_ms must be positive".into()));
        }

        for (i, endpoint) in self.endpoints.iter().enumerate() {
            if endpoint.uri.trim().is_empty() {
                return Err(ClientError::Config(format!("endpoints[{i}]: uri must not be empty")));
            }
            if endpoint.username.is_some() != endpoint.password.is_some() {
                return Err(ClientError::Config(format!(
                    "endpoints[{i}]: username and password must be set together"
                )));
            }
            if endpoint.timeout_ms == 0 {
                return Err(ClientError::Config(format!(
                    "endpoints[{i}]: timeout_ms must be positive"
                )));
            }
        }
        Ok(())
    }

    /// Converts the manager settings into a runtime [`ManagerConfig`].
    #[must_use]
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            poll_period: Duration::from_millis(self.manager.poll_period_ms),
            poll_timeout: Duration::from_millis(self.manager.poll_timeout_ms),
            auto_switch: self.manager.auto_switch,
            poll_mode: self.manager.poll_mode,
            excluded: Vec::new(),
        }
    }

    /// Builds the declared endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] for an invalid URI, credentials, or
    /// proxy address.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, ClientError> {
        self.endpoints
            .iter()
            .map(|settings| {
                let mut endpoint = Endpoint::new(&settings.uri)?
                    .with_priority(settings.priority)
                    .with_timeout(Duration::from_millis(settings.timeout_ms));
                if let (Some(username), Some(password)) = (&settings.username, &settings.password) {
                    endpoint = endpoint.with_credentials(username, password)?;
                }
                if let Some(proxy_uri) = &settings.proxy_uri {
                    endpoint = endpoint.with_proxy(proxy_uri)?;
                }
                Ok(endpoint)
            })
            .collect()
    }
}
