//! Configuration structures for Brick
//!
//! Configurations are loaded from YAML files and can be overridden by
//! environment variables of the form `BRICK__<SECTION>__<KEY>`
//! (for example `BRICK__PORT` or `BRICK__SHUTDOWN__GRACE_PERIOD_SECS`).

use crate::error::{BrickError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the config file path
pub const CONFIG_PATH_ENV: &str = "BRICK_CONFIG";

/// Config file used when `BRICK_CONFIG` is unset
pub const DEFAULT_CONFIG_PATH: &str = "configs/server-config.yaml";

/// Top-level configuration for the Brick server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrickConfig {
    /// Server binding address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Model configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Generation defaults
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Shutdown behaviour
    #[serde(default)]
    pub shutdown: ShutdownConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model name/identifier passed to the loader
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Backend that provides the generation capability
    #[serde(default)]
    pub backend: ModelBackend,

    /// System prompt injected ahead of every user prompt
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

/// Available generation backends
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    /// Streams the user prompt back word by word; needs no weights
    #[default]
    Echo,
}

/// Generation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Requests asking for more tokens are clamped to this value
    #[serde(default = "default_max_tokens_limit")]
    pub max_tokens_limit: u32,

    /// Capacity of the per-stream handoff channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Delay between fragments of the echo backend, in milliseconds
    #[serde(default)]
    pub echo_delay_ms: u64,
}

/// Shutdown configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// Time in-flight streams get to finish after a stop request
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    50051
}

fn default_model_id() -> String {
    "Qwen/Qwen2.5-0.5B-Instruct".to_string()
}

fn default_system_prompt() -> String {
    "你是一个助手，帮助用户完成各种任务。".to_string()
}

fn default_max_tokens_limit() -> u32 {
    4096
}

fn default_channel_capacity() -> usize {
    32
}

fn default_grace_period() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for BrickConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            model: ModelConfig::default(),
            generation: GenerationConfig::default(),
            shutdown: ShutdownConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            backend: ModelBackend::default(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens_limit: default_max_tokens_limit(),
            channel_capacity: default_channel_capacity(),
            echo_delay_ms: 0,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl BrickConfig {
    /// Load configuration from `BRICK_CONFIG` (or the default path, if present)
    /// layered with environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
        let required = std::env::var_os(CONFIG_PATH_ENV).is_some();

        Self::build(Some((&path, required)))
    }

    /// Load configuration from a YAML file, layered with environment overrides
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(Some((path.as_ref(), true)))
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        Self::build(None)
    }

    fn build(file: Option<(&Path, bool)>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some((path, required)) = file {
            builder = builder.add_source(::config::File::from(path).required(required));
        }

        let settings = builder
            .add_source(
                ::config::Environment::with_prefix("BRICK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BrickError::Config(format!("Failed to read configuration: {}", e)))?;

        let config: BrickConfig = settings
            .try_deserialize()
            .map_err(|e| BrickError::Config(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.model_id.trim().is_empty() {
            return Err(BrickError::config("model.model_id must not be empty"));
        }

        if self.generation.channel_capacity == 0 {
            return Err(BrickError::config("generation.channel_capacity must be at least 1"));
        }

        if self.generation.max_tokens_limit == 0 {
            return Err(BrickError::config("generation.max_tokens_limit must be at least 1"));
        }

        self.socket_addr()?;
        Ok(())
    }

    /// Address the gRPC transport binds to
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| BrickError::Config(format!("Invalid bind address: {}", e)))
    }

    /// Get grace period as Duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown.grace_period_secs)
    }

    /// Get echo backend delay as Duration
    pub fn echo_delay(&self) -> Duration {
        Duration::from_millis(self.generation.echo_delay_ms)
    }
}
