//! Runtime configuration
//!
//! Loaded from a YAML file. The path comes from the command line or from the
//! `RESOURCE_RUNTIME_CONFIG` environment variable; defaults apply otherwise.

use std::path::{Path, PathBuf};
use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "RESOURCE_RUNTIME_CONFIG";

/// Log output format
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Runtime configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RuntimeConfig {
    /// Port of the metrics and health endpoint
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Capacity of each informer event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// How long to wait for an informer to exit when stopping a connection
    #[serde(default = "default_informer_stop_timeout_secs")]
    pub informer_stop_timeout_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Tracing filter directives, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Kubeconfig to load connections from; the default lookup applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<PathBuf>,
}

fn default_metrics_port() -> u16 {
    8080
}

fn default_event_buffer() -> usize {
    256
}

fn default_informer_stop_timeout_secs() -> u64 {
    10
}

fn default_log_filter() -> String {
    "info,kube=warn,hyper=warn".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            metrics_port: default_metrics_port(),
            event_buffer: default_event_buffer(),
            informer_stop_timeout_secs: default_informer_stop_timeout_secs(),
            log_format: LogFormat::default(),
            log_filter: default_log_filter(),
            kubeconfig: None,
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a config file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let config: RuntimeConfig = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `RESOURCE_RUNTIME_CONFIG` if set, otherwise use defaults
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(PathBuf::from(path)),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.metrics_port == 0 {
            return Err(Error::config("metricsPort must be non-zero"));
        }
        if self.event_buffer == 0 {
            return Err(Error::config("eventBuffer must be at least 1"));
        }
        Ok(())
    }

    pub fn informer_stop_timeout(&self) -> Duration {
        Duration::from_secs(self.informer_stop_timeout_secs)
    }
}
