//! Accept loop and plugin hosting.

use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::{Config, PluginsConfig};
use crate::logging::ProxyLogger;
use crate::plugins::registry::SharedPluginRegistry;
use crate::plugins::traits::PluginHost;
use crate::plugins::{self, PluginRegistry};
use crate::proxy::connection::ConnectionHandler;

/// Host services handed to plugins at load time. Plugins keep it behind a
/// `Weak`, so dropping the server tears everything down cleanly.
struct ProxyHost {
    name: String,
    logger: ProxyLogger,
}

impl PluginHost for ProxyHost {
    fn name(&self) -> &str {
        &self.name
    }

    fn logger(&self) -> &ProxyLogger {
        &self.logger
    }
}

/// The proxy server: owns configuration, the shared plugin registry and
/// the accept loop.
pub struct ProxyServer {
    config: Config,
    registry: SharedPluginRegistry,
    logger: ProxyLogger,
}

impl ProxyServer {
    pub fn new(config: Config) -> Result<Self> {
        let logger = ProxyLogger::new();
        let registry = Self::build_loaded_registry(
            config.plugins.as_ref().cloned().unwrap_or_default(),
            logger,
        )?;

        Ok(Self {
            config,
            registry: SharedPluginRegistry::new(registry),
            logger,
        })
    }

    fn build_loaded_registry(
        plugins_config: PluginsConfig,
        logger: ProxyLogger,
    ) -> Result<PluginRegistry> {
        let mut registry = plugins::build_registry(&plugins_config)?;
        let host: Arc<dyn PluginHost> = Arc::new(ProxyHost {
            name: env!("CARGO_PKG_NAME").to_string(),
            logger,
        });
        registry.load_all(host);
        Ok(registry)
    }

    /// Shared view of the plugin set, e.g. for reload drivers.
    pub fn shared_registry(&self) -> SharedPluginRegistry {
        self.registry.clone()
    }

    /// Hot-reload the plugin set: build a new generation, swap it in, and
    /// unload the old one once no in-flight request references it.
    pub async fn reload_plugins(&self, plugins_config: PluginsConfig) -> Result<()> {
        let registry = Self::build_loaded_registry(plugins_config, self.logger)?;
        let previous = self.registry.swap(registry).await;
        match Arc::try_unwrap(previous) {
            Ok(mut old) => old.unload_all(),
            Err(still_shared) => {
                // In-flight snapshots keep the old generation alive; its
                // unload hooks run when the plugins are dropped.
                info!(
                    "previous plugin generation still referenced ({} plugins)",
                    still_shared.len()
                );
            }
        }
        Ok(())
    }

    /// Run the accept loop until the task is cancelled.
    pub async fn run(&self) -> Result<()> {
        let bind = self.config.server.bind_addr()?;
        let listener = TcpListener::bind(bind).await?;
        info!("Listening on {}", bind);

        let handler = Arc::new(ConnectionHandler::new(
            self.registry.clone(),
            self.logger,
            self.config.server.origin_port,
        ));

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        handler.handle(stream, peer).await;
                    });
                }
                Err(e) => {
                    warn!("accept failed: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::plugins::{PluginConfig, PluginType};
    use serde_json::json;

    fn config_with_redirect() -> Config {
        let mut config = Config::default();
        config.plugins = Some(PluginsConfig {
            enabled: true,
            plugins: vec![PluginConfig {
                name: "redirect".to_string(),
                plugin_type: PluginType::RequestRedirect,
                enabled: true,
                config: Some(json!({
                    "records": [{
                        "host": "old.example.com",
                        "path": "/a",
                        "replacement_resource": "https://new.example.com/a"
                    }]
                })),
            }],
        });
        config
    }

    #[tokio::test]
    async fn test_server_builds_and_loads_registry() {
        let server = ProxyServer::new(config_with_redirect()).unwrap();
        let snapshot = server.shared_registry().snapshot().await;
        assert_eq!(snapshot.plugin_names(), vec!["redirect"]);
    }

    #[tokio::test]
    async fn test_reload_swaps_generations() {
        let server = ProxyServer::new(config_with_redirect()).unwrap();

        server
            .reload_plugins(PluginsConfig::default())
            .await
            .unwrap();
        assert!(server.shared_registry().snapshot().await.is_empty());
    }
}
