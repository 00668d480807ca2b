use log::{debug, warn};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DatasourceError, Result};
use crate::query::BatchErrorPolicy;
use crate::stream::SendFailurePolicy;

/// Top-level plugin configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PluginConfig {
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
    /// Streaming settings
    #[serde(default)]
    pub stream: StreamSettings,
    /// Query handling settings
    #[serde(default)]
    pub query: QuerySettings,
    /// Health check settings
    #[serde(default)]
    pub health: HealthSettings,
}

impl PluginConfig {
    /// Reject values no stream or query could run with
    pub fn validate(&self) -> Result<()> {
        if self.stream.interval_ms == 0 {
            return Err(DatasourceError::Config(
                "stream.interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Settings for live stream sessions
#[derive(Debug, Deserialize, Clone)]
pub struct StreamSettings {
    /// Tick interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// What to do when a packet cannot be delivered
    #[serde(default)]
    pub on_send_failure: SendFailureAction,
    /// Consecutive delivery failures tolerated before giving up
    #[serde(default = "default_max_send_failures")]
    pub max_consecutive_send_failures: usize,
}

fn default_interval_ms() -> u64 {
    200
}

fn default_max_send_failures() -> usize {
    5
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            on_send_failure: SendFailureAction::default(),
            max_consecutive_send_failures: default_max_send_failures(),
        }
    }
}

impl StreamSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn send_failure_policy(&self) -> SendFailurePolicy {
        match self.on_send_failure {
            SendFailureAction::Continue => SendFailurePolicy::Continue,
            SendFailureAction::GiveUp => {
                SendFailurePolicy::give_up_after(self.max_consecutive_send_failures)
            }
        }
    }
}

/// Action taken on a failed packet delivery
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SendFailureAction {
    /// Log and keep ticking
    Continue,
    /// Stop the session after too many consecutive failures
    #[default]
    GiveUp,
}

/// Settings for query batches
#[derive(Debug, Deserialize, Clone, Default)]
pub struct QuerySettings {
    #[serde(default)]
    pub batch_policy: BatchErrorPolicy,
    /// Reject queries without a `format`
    #[serde(default)]
    pub require_format: bool,
}

/// Settings for the health check
#[derive(Debug, Deserialize, Clone, Default)]
pub struct HealthSettings {
    #[serde(default)]
    pub probe: ProbeKind,
}

/// Built-in health probes
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeKind {
    /// Coin flip, illustrates both outcomes
    #[default]
    Random,
    AlwaysOk,
}

/// Logging level
#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// One layer of configuration
#[derive(Debug, Clone)]
enum Layer {
    /// TOML file, skipped when absent
    File(PathBuf),
    /// `PREFIX__SECTION__KEY` variables
    Env(String),
    /// Inline TOML
    Toml(String),
}

/// Layers plugin configuration, later layers win
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    layers: Vec<Layer>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.layers.push(Layer::File(path.as_ref().to_path_buf()));
        self
    }

    pub fn add_env(mut self, prefix: impl Into<String>) -> Self {
        self.layers.push(Layer::Env(prefix.into()));
        self
    }

    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.layers.push(Layer::Toml(toml.into()));
        self
    }

    /// Merge every layer into a validated [`PluginConfig`]
    pub fn build(self) -> Result<PluginConfig> {
        let mut merged = config::Config::builder();

        for layer in self.layers {
            merged = match layer {
                Layer::File(path) if !path.exists() => {
                    warn!("No plugin config at {}, skipping", path.display());
                    merged
                }
                Layer::File(path) => {
                    debug!("Reading plugin config {}", path.display());
                    merged.add_source(
                        config::File::from(path.as_path()).format(config::FileFormat::Toml),
                    )
                }
                Layer::Env(prefix) => merged.add_source(
                    config::Environment::with_prefix(&prefix)
                        .prefix_separator("__")
                        .separator("__")
                        .try_parsing(true),
                ),
                Layer::Toml(toml) => {
                    merged.add_source(config::File::from_str(&toml, config::FileFormat::Toml))
                }
            };
        }

        let plugin: PluginConfig = merged
            .build()
            .and_then(|c| c.try_deserialize::<PluginConfig>())
            .map_err(|e| DatasourceError::Config(format!("invalid plugin config: {}", e)))?;
        plugin.validate()?;

        debug!("Plugin config: {:?}", plugin);
        Ok(plugin)
    }
}
