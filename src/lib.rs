//! # Interpose - an intercepting HTTP reverse proxy
//!
//! Interpose sits between clients and origin servers, parses and validates
//! inbound HTTP/1.x requests, decides how request and response bodies are
//! relayed, and lets compiled plugins inspect, rewrite, redirect or drop
//! traffic at defined hook points.
//!
//! ## Core pieces
//!
//! - **Request ingestion**: request-line tokenizing, header parsing into a
//!   case-aware ordered multi-map, and content negotiation (type/charset
//!   plus body transmission mode)
//! - **Plugin pipeline**: priority-ordered dispatch with first-actionable-
//!   instruction short-circuiting and copy-and-swap hot reload
//! - **Redirect plugin**: the built-in reference plugin matching
//!   configured host+path records
//! - **Forwarding**: request/response relaying with per-chunk data hooks
//!
//! ## Usage
//!
//! ```rust,no_run
//! use interpose::config::Config;
//! use interpose::proxy::ProxyServer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file_with_env("config/config.toml").await?;
//!     let server = ProxyServer::new(config)?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod plugins;
pub mod proxy;
pub mod request;

// Re-export commonly used types
pub use error::{InterposeError, InterposeResult};
pub use logging::{Loglevel, ProxyLogger, ProxyProtocol};
pub use plugins::{
    Instruction, PluginHost, PluginInstruction, PluginProperties, PluginRegistry, ProtocolSet,
    ProxyPlugin, RedirectConfigRecord, RequestRedirect, SharedPluginRegistry,
};
pub use request::{
    HeaderMap, LineReader, Method, RequestContext, RequestIngest, RequestLine, TransmissionMode,
};
