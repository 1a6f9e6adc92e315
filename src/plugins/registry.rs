//! Plugin registry and hook dispatcher.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::plugins::instruction::PluginInstruction;
use crate::plugins::traits::{PluginHost, ProxyPlugin};
use crate::request::context::RequestContext;

struct PluginEntry {
    /// Registration sequence; the tie-break when priorities collide.
    seq: usize,
    plugin: Box<dyn ProxyPlugin>,
}

/// Installed plugins in dispatch order.
///
/// Ordering is an explicit stable sort by (priority, registration order)
/// performed on registration, so dispatch iterates deterministically.
#[derive(Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a plugin and re-sort the dispatch order.
    pub fn register(&mut self, plugin: Box<dyn ProxyPlugin>) {
        let seq = self.entries.len();
        self.entries.push(PluginEntry { seq, plugin });
        self.entries
            .sort_by_key(|e| (e.plugin.properties().priority, e.seq));
    }

    /// Run every plugin's load hook. Must happen before the registry is
    /// shared with connection tasks.
    pub fn load_all(&mut self, host: Arc<dyn PluginHost>) {
        for entry in &mut self.entries {
            entry.plugin.on_load(host.clone());
        }
    }

    /// Run every plugin's unload hook, e.g. before a hot swap discards
    /// this generation.
    pub fn unload_all(&mut self) {
        for entry in &mut self.entries {
            entry.plugin.on_unload();
        }
    }

    fn eligible<'a>(
        &'a self,
        ctx: &RequestContext,
    ) -> impl Iterator<Item = &'a dyn ProxyPlugin> {
        let protocol = ctx.protocol;
        self.entries
            .iter()
            .map(|e| e.plugin.as_ref())
            .filter(move |p| {
                let props = p.properties();
                props.is_active && props.supported_protocols.contains(protocol)
            })
    }

    /// Invoke pre-request hooks in priority order; the first actionable
    /// instruction stops the scan and is returned for the caller to enact.
    pub fn dispatch_client_headers(&self, ctx: &mut RequestContext) -> PluginInstruction {
        for plugin in self.eligible(ctx) {
            let instruction = plugin.on_post_client_headers_request(ctx);
            if instruction.is_actionable() {
                return instruction;
            }
        }
        PluginInstruction::do_nothing()
    }

    /// Invoke post-response hooks in priority order with the same
    /// short-circuit as the pre-request dispatch.
    pub fn dispatch_server_headers(&self, ctx: &mut RequestContext) -> PluginInstruction {
        for plugin in self.eligible(ctx) {
            let instruction = plugin.on_post_server_headers_response(ctx);
            if instruction.is_actionable() {
                return instruction;
            }
        }
        PluginInstruction::do_nothing()
    }

    /// Invoke the streaming-data hook on every eligible plugin. No
    /// short-circuit: the hook returns nothing.
    pub fn dispatch_data_transfer(&self, ctx: &mut RequestContext, chunk: &[u8]) {
        for plugin in self.eligible(ctx) {
            plugin.on_server_data_transfer(ctx, chunk);
        }
    }

    /// Plugin names in dispatch order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|e| e.plugin.properties().name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Shared, read-mostly view of the plugin set.
///
/// Connection tasks take an `Arc` snapshot per request and iterate it
/// lock-free; a hot reload builds a whole new registry and swaps it in, so
/// in-flight dispatches never observe a partially updated collection.
#[derive(Clone)]
pub struct SharedPluginRegistry {
    inner: Arc<RwLock<Arc<PluginRegistry>>>,
}

impl SharedPluginRegistry {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    /// Current plugin set. The snapshot stays valid across a concurrent
    /// swap; it just becomes the previous generation.
    pub async fn snapshot(&self) -> Arc<PluginRegistry> {
        self.inner.read().await.clone()
    }

    /// Replace the plugin set, returning the previous generation so the
    /// caller can run unload hooks once it is no longer referenced.
    pub async fn swap(&self, registry: PluginRegistry) -> Arc<PluginRegistry> {
        let mut guard = self.inner.write().await;
        std::mem::replace(&mut *guard, Arc::new(registry))
    }
}
