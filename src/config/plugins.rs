use serde::{Deserialize, Serialize};

/// Plugins configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PluginsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
}

impl PluginsConfig {
    /// Validate plugins configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        for plugin in &self.plugins {
            plugin.validate()?;
        }
        Ok(())
    }
}

/// Individual plugin configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginConfig {
    pub name: String,
    pub plugin_type: PluginType,
    pub enabled: bool,
    /// Opaque per-plugin configuration bag
    pub config: Option<serde_json::Value>,
}

impl PluginConfig {
    /// Validate plugin configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            return Err(anyhow::anyhow!("Plugin name cannot be empty"));
        }

        match self.plugin_type {
            PluginType::RequestRedirect => {
                // Records are optional; a record missing its target is not.
                if let Some(config) = &self.config {
                    if let Some(records) = config.get("records").and_then(|v| v.as_array()) {
                        for record in records {
                            if record
                                .get("replacement_resource")
                                .and_then(|v| v.as_str())
                                .is_none_or(|s| s.is_empty())
                            {
                                return Err(anyhow::anyhow!(
                                    "Redirect plugin '{}' has a record without a replacement_resource",
                                    self.name
                                ));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

/// Plugin types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum PluginType {
    RequestRedirect,
}
