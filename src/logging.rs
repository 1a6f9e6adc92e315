//! Correlation-aware logging sink.
//!
//! Every log line in the request path is tied to one request/connection by
//! its correlation id and tagged with the proxy protocol the connection was
//! accepted on. The sink forwards to `tracing` and is best-effort: it never
//! fails the caller.

use std::fmt;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Protocol a connection was accepted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProxyProtocol {
    #[default]
    Undefined,
    Http,
    Https,
}

impl fmt::Display for ProxyProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyProtocol::Undefined => write!(f, "UNDEFINED"),
            ProxyProtocol::Http => write!(f, "HTTP"),
            ProxyProtocol::Https => write!(f, "HTTPS"),
        }
    }
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Loglevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Loglevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loglevel::Debug => write!(f, "DEBUG"),
            Loglevel::Info => write!(f, "INFO"),
            Loglevel::Warning => write!(f, "WARNING"),
            Loglevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Cheap cloneable handle to the process-wide log sink.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyLogger;

impl ProxyLogger {
    pub fn new() -> Self {
        Self
    }

    /// Log one message tied to a request correlation id.
    pub fn log(&self, id: Uuid, protocol: ProxyProtocol, level: Loglevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        match level {
            Loglevel::Debug => debug!(id = %id, protocol = %protocol, "{message}"),
            Loglevel::Info => info!(id = %id, protocol = %protocol, "{message}"),
            Loglevel::Warning => warn!(id = %id, protocol = %protocol, "{message}"),
            Loglevel::Error => error!(id = %id, protocol = %protocol, "{message}"),
        }
    }
}
