//! Plugin system: instruction protocol, plugin interface, registry and the
//! built-in redirect plugin.

pub mod instruction;
pub mod redirect;
pub mod registry;
pub mod traits;

use anyhow::Result;

use crate::config::plugins::{PluginType, PluginsConfig};

pub use instruction::{Instruction, InstructionParameters, PluginInstruction};
pub use redirect::{RedirectCache, RedirectConfigRecord, RequestRedirect};
pub use registry::{PluginRegistry, SharedPluginRegistry};
pub use traits::{PluginHost, PluginProperties, ProtocolSet, ProxyPlugin};

/// Build a registry from configuration. Disabled plugins are not
/// registered at all; the registry's own active flag covers runtime
/// deactivation.
pub fn build_registry(config: &PluginsConfig) -> Result<PluginRegistry> {
    let mut registry = PluginRegistry::new();

    if config.enabled {
        for plugin in &config.plugins {
            if !plugin.enabled {
                continue;
            }
            match plugin.plugin_type {
                PluginType::RequestRedirect => {
                    registry.register(Box::new(RequestRedirect::from_config(
                        &plugin.name,
                        plugin.config.as_ref(),
                    )?));
                }
            }
        }
    }

    Ok(registry)
}
