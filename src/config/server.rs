use std::net::SocketAddr;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Listener and forwarding configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address the proxy accepts client connections on
    pub bind: String,
    /// Port origin connections are made to
    #[serde(default = "default_origin_port")]
    pub origin_port: u16,
}

fn default_origin_port() -> u16 {
    80
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            origin_port: default_origin_port(),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Result<()> {
        self.bind
            .parse::<SocketAddr>()
            .map_err(|e| anyhow::anyhow!("Invalid bind address '{}': {}", self.bind, e))?;
        if self.origin_port == 0 {
            return Err(anyhow::anyhow!("origin_port cannot be 0"));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        Ok(self.bind.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.origin_port, 80);
    }

    #[test]
    fn test_invalid_bind_address() {
        let config = ServerConfig {
            bind: "not-an-address".to_string(),
            origin_port: 80,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_origin_port_rejected() {
        let config = ServerConfig {
            bind: "127.0.0.1:8080".to_string(),
            origin_port: 0,
        };
        assert!(config.validate().is_err());
    }
}
