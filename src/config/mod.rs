//! Configuration management.
//!
//! TOML configuration with environment-variable expansion, per-section
//! validation and defaults. Plugin entries carry an opaque config bag that
//! the plugin factory interprets.

pub mod plugins;
pub mod server;

use std::env;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use plugins::{PluginConfig, PluginType, PluginsConfig};
pub use server::ServerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    pub plugins: Option<PluginsConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    /// Load configuration with `${VAR}` environment expansion
    pub async fn from_file_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let expanded = expand_env_vars(&content);
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        info!("Configuration loaded from {:?}", path.as_ref());
        Ok(config)
    }

    /// Validate the whole configuration
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        if let Some(plugins) = &self.plugins {
            plugins.validate()?;
        }
        Ok(())
    }
}

/// Replace `${VAR}` occurrences with the environment value; unset
/// variables are left as-is so the TOML parser reports them in place.
fn expand_env_vars(content: &str) -> String {
    let mut expanded = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        expanded.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match env::var(name) {
                    Ok(value) => expanded.push_str(&value),
                    Err(_) => {
                        expanded.push_str("${");
                        expanded.push_str(name);
                        expanded.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                expanded.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    expanded.push_str(rest);
    expanded
}
