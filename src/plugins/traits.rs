//! Plugin interface: lifecycle hooks, request/response hooks, properties.

use std::ops::BitOr;
use std::path::PathBuf;
use std::sync::Arc;

use crate::logging::{ProxyLogger, ProxyProtocol};
use crate::plugins::instruction::PluginInstruction;
use crate::request::context::RequestContext;

/// Bitset of protocols a plugin applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolSet(u8);

impl ProtocolSet {
    pub const NONE: ProtocolSet = ProtocolSet(0);
    pub const HTTP: ProtocolSet = ProtocolSet(1);
    pub const HTTPS: ProtocolSet = ProtocolSet(1 << 1);
    pub const ALL: ProtocolSet = ProtocolSet(0b11);

    pub fn contains(self, protocol: ProxyProtocol) -> bool {
        match protocol {
            ProxyProtocol::Http => self.0 & Self::HTTP.0 != 0,
            ProxyProtocol::Https => self.0 & Self::HTTPS.0 != 0,
            ProxyProtocol::Undefined => false,
        }
    }
}

impl BitOr for ProtocolSet {
    type Output = ProtocolSet;

    fn bitor(self, rhs: ProtocolSet) -> ProtocolSet {
        ProtocolSet(self.0 | rhs.0)
    }
}

/// Static facts about an installed plugin, read by the dispatcher.
#[derive(Debug, Clone)]
pub struct PluginProperties {
    pub name: String,
    /// Lower runs first; ties break by registration order.
    pub priority: i32,
    pub version: String,
    /// Where the plugin keeps its auxiliary files, if any.
    pub plugin_directory: PathBuf,
    /// Inactive plugins are skipped entirely by dispatch.
    pub is_active: bool,
    pub supported_protocols: ProtocolSet,
}

impl PluginProperties {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            version: env!("CARGO_PKG_VERSION").to_string(),
            plugin_directory: PathBuf::new(),
            is_active: true,
            supported_protocols: ProtocolSet::ALL,
        }
    }
}

/// Services the host exposes to plugins. Plugins hold this non-owning
/// (via `Weak`): the registry owns the plugins, never the other way round.
pub trait PluginHost: Send + Sync {
    fn name(&self) -> &str;
    fn logger(&self) -> &ProxyLogger;
}

/// A compiled proxy extension.
///
/// Hooks run on the connection task that owns the request context.
/// Returning an actionable instruction from a request/response hook stops
/// the dispatch scan; a panicking hook is handled by the caller's error
/// policy, not swallowed by the dispatcher.
pub trait ProxyPlugin: Send + Sync {
    fn properties(&self) -> &PluginProperties;

    fn on_load(&mut self, _host: Arc<dyn PluginHost>) {}

    fn on_unload(&mut self) {}

    /// Invoked once the client's request line and headers are parsed.
    fn on_post_client_headers_request(&self, _ctx: &mut RequestContext) -> PluginInstruction {
        PluginInstruction::do_nothing()
    }

    /// Invoked once the origin's response headers are parsed.
    fn on_post_server_headers_response(&self, _ctx: &mut RequestContext) -> PluginInstruction {
        PluginInstruction::do_nothing()
    }

    /// Invoked once per relayed origin data chunk.
    fn on_server_data_transfer(&self, _ctx: &mut RequestContext, _chunk: &[u8]) {}
}
