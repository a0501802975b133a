//! Gateway configuration.
//!
//! # Load Order
//!
//! 1. Default values
//! 2. Settings file (`settings.json`, keys in SCREAMING_SNAKE_CASE)
//! 3. Environment variables (`LIQUIDGATE_*`)
//!
//! Each layer overrides the previous. Keys missing from the settings file
//! keep their defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use liquidgate_planner::PlannerConfig;
use liquidgate_robot::{ExecutorConfig, RobotIdentity};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the settings file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the settings file.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Invalid environment variable value.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },
}

impl ConfigError {
    pub fn invalid_env_var(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Process-wide gateway settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct GatewayConfig {
    /// HTTP listen port.
    pub port: u16,

    /// Path prefix reported in heartbeats.
    pub uri: String,

    /// Address reported in heartbeats.
    pub ip_address: String,

    pub machine_code: String,

    /// Identifying code used for the second heartbeat endpoint.
    pub machine_code_2: Option<String>,

    /// Controller batch submission endpoint.
    pub robot_url: String,

    /// Controller callback lookup prefix.
    pub robot_callback_url: String,

    pub robot_id: String,

    /// Orchestrator instance status prefix. Unset disables cancellation.
    pub instance_status_url: Option<String>,

    pub http_callback_url: Option<String>,
    pub http_callback_url_2: Option<String>,

    pub heartbeat_url: Option<String>,
    pub heartbeat_url_2: Option<String>,

    /// Seconds between heartbeats.
    #[serde(alias = "HEARTBEAT_LOG_TIME_INTERVAL")]
    pub heartbeat_interval_secs: u64,

    /// Controller address checked for liveness.
    pub target_ip: Option<String>,
    pub target_port: Option<u16>,

    /// Directory holding the ledger snapshots.
    pub data_dir: PathBuf,

    pub http_callback_enable: bool,
    pub heartbeat_enable: bool,
    pub online_check_enable: bool,

    pub executor: ExecutorConfig,
    pub planner: PlannerConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            uri: String::new(),
            ip_address: "0.0.0.0".to_string(),
            machine_code: String::new(),
            machine_code_2: None,
            robot_url: "http://127.0.0.1:8080/robot/command".to_string(),
            robot_callback_url: "http://127.0.0.1:8080/robot/callback/".to_string(),
            robot_id: String::new(),
            instance_status_url: None,
            http_callback_url: None,
            http_callback_url_2: None,
            heartbeat_url: None,
            heartbeat_url_2: None,
            heartbeat_interval_secs: 5,
            target_ip: None,
            target_port: None,
            data_dir: PathBuf::from("."),
            http_callback_enable: true,
            heartbeat_enable: true,
            online_check_enable: false,
            executor: ExecutorConfig::default(),
            planner: PlannerConfig::default(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl GatewayConfig {
    pub fn robot_identity(&self) -> RobotIdentity {
        RobotIdentity {
            machine_code: self.machine_code.clone(),
            robot_id: self.robot_id.clone(),
        }
    }

    /// Configured completion callback endpoints, in order.
    pub fn callback_urls(&self) -> Vec<String> {
        [&self.http_callback_url, &self.http_callback_url_2]
            .into_iter()
            .filter_map(non_empty)
            .map(str::to_string)
            .collect()
    }

    /// Heartbeat endpoints paired with the identifying code sent to each.
    pub fn heartbeat_targets(&self) -> Vec<(String, String)> {
        let mut targets = Vec::new();
        if let Some(url) = non_empty(&self.heartbeat_url) {
            targets.push((url.to_string(), self.machine_code.clone()));
        }
        if let Some(url) = non_empty(&self.heartbeat_url_2) {
            let code = non_empty(&self.machine_code_2).unwrap_or(&self.machine_code);
            targets.push((url.to_string(), code.to_string()));
        }
        targets
    }

    pub fn instance_status_url(&self) -> Option<&str> {
        non_empty(&self.instance_status_url)
    }

    /// `ip:port` of the controller, if both are configured.
    pub fn liveness_target(&self) -> Option<String> {
        let ip = non_empty(&self.target_ip)?;
        Some(format!("{}:{}", ip, self.target_port?))
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs.max(1))
    }
}

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($loader:expr, $field:expr, $var:literal) => {
        if let Some(val) = $loader.env_var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Configuration loader with builder pattern.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Settings file; missing files are ignored.
    path: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Variables read instead of the process environment.
    env: Option<HashMap<String, String>>,
}

impl ConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Reads `LIQUIDGATE_*` overrides from `vars` instead of the process
    /// environment.
    #[must_use]
    pub fn with_env_vars<K, V>(mut self, vars: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.env = Some(vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect());
        self
    }

    /// Loads and layers configuration from all sources.
    pub fn load(&self) -> Result<GatewayConfig, ConfigError> {
        let mut config = match &self.path {
            Some(path) => match Self::load_file(path)? {
                Some(config) => {
                    debug!(path = %path.display(), "Loaded settings file");
                    config
                }
                None => GatewayConfig::default(),
            },
            None => GatewayConfig::default(),
        };

        if !self.skip_env {
            self.apply_env_vars(&mut config)?;
        }
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Option<GatewayConfig>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    fn env_var(&self, name: &str) -> Option<String> {
        match &self.env {
            Some(vars) => vars.get(name).cloned(),
            None => std::env::var(name).ok(),
        }
    }

    fn apply_env_vars(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        parse_env_bool!(self, config.http_callback_enable, "LIQUIDGATE_HTTP_CALLBACK_ENABLE");
        parse_env_bool!(self, config.heartbeat_enable, "LIQUIDGATE_HEARTBEAT_ENABLE");
        parse_env_bool!(self, config.online_check_enable, "LIQUIDGATE_ONLINE_CHECK_ENABLE");

        if let Some(val) = self.env_var("LIQUIDGATE_PORT") {
            config.port = val
                .parse()
                .map_err(|_| ConfigError::invalid_env_var("LIQUIDGATE_PORT", "expected port number"))?;
        }
        if let Some(val) = self.env_var("LIQUIDGATE_ROBOT_URL") {
            config.robot_url = val;
        }
        if let Some(val) = self.env_var("LIQUIDGATE_ROBOT_CALLBACK_URL") {
            config.robot_callback_url = val;
        }
        if let Some(val) = self.env_var("LIQUIDGATE_DATA_DIR") {
            config.data_dir = PathBuf::from(val);
        }
        Ok(())
    }
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
