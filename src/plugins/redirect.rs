//! Request redirect plugin.
//!
//! Matches configured host+path records against each inbound request and
//! answers with a `RedirectToNewUrl` instruction on the first hit. Also
//! keeps a remembered-redirect table for stripped-SSL flows: entries
//! learned at runtime are consulted after the configured records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::logging::Loglevel;
use crate::plugins::instruction::PluginInstruction;
use crate::plugins::traits::{PluginHost, PluginProperties, ProxyPlugin};
use crate::request::context::RequestContext;

/// One configured redirect rule. Immutable once loaded.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RedirectConfigRecord {
    /// Literal host to match, compared case-insensitively.
    pub host: String,
    /// Literal path to match.
    pub path: String,
    #[serde(default = "default_redirect_status")]
    pub redirect_status: u16,
    #[serde(default = "default_redirect_description")]
    pub redirect_description: String,
    /// Where the client is sent instead.
    pub replacement_resource: String,
}

fn default_redirect_status() -> u16 {
    301
}

fn default_redirect_description() -> String {
    "Moved Permanently".to_string()
}

/// A record with its anchored match patterns compiled.
#[derive(Debug)]
struct CompiledRecord {
    record: RedirectConfigRecord,
    host_pattern: Regex,
    path_pattern: Regex,
}

impl CompiledRecord {
    fn compile(record: RedirectConfigRecord) -> Result<Self> {
        // Exact-match patterns built by escaping the configured literal;
        // no user-supplied wildcards.
        let host_pattern = Regex::new(&format!("(?i)^{}$", regex::escape(&record.host)))
            .with_context(|| format!("host pattern for {}", record.host))?;
        let path_pattern = Regex::new(&format!("(?i)^{}$", regex::escape(&record.path)))
            .with_context(|| format!("path pattern for {}", record.path))?;
        Ok(Self {
            record,
            host_pattern,
            path_pattern,
        })
    }

    fn matches(&self, host: &str, path: &str) -> bool {
        self.host_pattern.is_match(host) && self.path_pattern.is_match(path)
    }
}

/// Concurrency-safe remembered-redirect table keyed by host+path.
///
/// Multiple connection tasks read and write it simultaneously; persistence
/// across restarts is out of scope.
#[derive(Debug, Default)]
pub struct RedirectCache {
    entries: RwLock<HashMap<String, String>>,
}

impl RedirectCache {
    fn key(host: &str, path: &str) -> String {
        format!("{}{}", host.to_ascii_lowercase(), path)
    }

    pub fn remember(&self, host: &str, path: &str, target: impl Into<String>) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(Self::key(host, path), target.into());
        }
    }

    pub fn lookup(&self, host: &str, path: &str) -> Option<String> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&Self::key(host, path)).cloned())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().map(|e| e.is_empty()).unwrap_or(true)
    }
}

/// Reference plugin: first-match-wins redirect against configured records.
pub struct RequestRedirect {
    properties: PluginProperties,
    records: Vec<CompiledRecord>,
    cache: RedirectCache,
    host: RwLock<Option<Weak<dyn PluginHost>>>,
}

impl RequestRedirect {
    /// Build from the plugin config bag:
    /// `{ "priority": 10, "records": [{host, path, ...}, ...] }`.
    pub fn from_config(name: &str, cfg: Option<&Value>) -> Result<Self> {
        let priority = cfg
            .and_then(|v| v.get("priority"))
            .and_then(|x| x.as_i64())
            .unwrap_or(100) as i32;

        let records: Vec<RedirectConfigRecord> = match cfg.and_then(|v| v.get("records")) {
            Some(value) => serde_json::from_value(value.clone())
                .with_context(|| format!("redirect records for plugin '{}'", name))?,
            None => Vec::new(),
        };

        Self::from_records(name, priority, records)
    }

    pub fn from_records(
        name: &str,
        priority: i32,
        records: Vec<RedirectConfigRecord>,
    ) -> Result<Self> {
        let records = records
            .into_iter()
            .map(CompiledRecord::compile)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            properties: PluginProperties::new(name, priority),
            records,
            cache: RedirectCache::default(),
            host: RwLock::new(None),
        })
    }

    /// The remembered-redirect table, for flows that learn targets at
    /// runtime (e.g. SSL stripping).
    pub fn cache(&self) -> &RedirectCache {
        &self.cache
    }

    fn log_through_host(&self, ctx: &RequestContext, message: String) {
        let host = self.host.read().ok().and_then(|h| h.clone());
        if let Some(host) = host.and_then(|weak| weak.upgrade()) {
            host.logger()
                .log(ctx.id, ctx.protocol, Loglevel::Info, message);
        }
    }
}

impl ProxyPlugin for RequestRedirect {
    fn properties(&self) -> &PluginProperties {
        &self.properties
    }

    fn on_load(&mut self, host: Arc<dyn PluginHost>) {
        // Non-owning back-reference; the registry owns this plugin.
        if let Ok(mut slot) = self.host.write() {
            *slot = Some(Arc::downgrade(&host));
        }
    }

    fn on_unload(&mut self) {
        if let Ok(mut slot) = self.host.write() {
            *slot = None;
        }
    }

    fn on_post_client_headers_request(&self, ctx: &mut RequestContext) -> PluginInstruction {
        // Nothing configured and nothing learned: skip the scan entirely.
        if self.records.is_empty() && self.cache.is_empty() {
            return PluginInstruction::do_nothing();
        }

        if ctx.client_headers.is_empty() || !ctx.client_headers.contains("Host") {
            return PluginInstruction::do_nothing();
        }

        let host = ctx
            .client_headers
            .first("Host")
            .unwrap_or_default()
            .to_string();
        let path = ctx.request_line.path.clone();

        for compiled in &self.records {
            if compiled.matches(&host, &path) {
                self.log_through_host(
                    ctx,
                    format!(
                        "RequestRedirect: requesting \"{}{}\" ---{}--> \"{}\"",
                        host,
                        path,
                        compiled.record.redirect_status,
                        compiled.record.replacement_resource
                    ),
                );
                return PluginInstruction::redirect(
                    compiled.record.replacement_resource.clone(),
                    compiled.record.redirect_status,
                    compiled.record.redirect_description.clone(),
                );
            }
        }

        if let Some(target) = self.cache.lookup(&host, &path) {
            self.log_through_host(
                ctx,
                format!("RequestRedirect: remembered \"{}{}\" --> \"{}\"", host, path, target),
            );
            return PluginInstruction::redirect(target, 302, "Found");
        }

        PluginInstruction::do_nothing()
    }

    fn on_server_data_transfer(&self, ctx: &mut RequestContext, chunk: &[u8]) {
        self.log_through_host(
            ctx,
            format!("RequestRedirect: observed {} response bytes", chunk.len()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::ProxyProtocol;
    use crate::plugins::instruction::Instruction;
    use crate::request::line::RequestLine;
    use crate::request::reader::{Newline, RawRequestLine};
    use serde_json::json;
    use uuid::Uuid;

    fn context_for(host: &str, path: &str) -> RequestContext {
        let line = RequestLine::parse(&RawRequestLine {
            line: format!("GET {} HTTP/1.1", path),
            newline: Newline::CrLf,
        })
        .unwrap();
        let mut ctx = RequestContext::new(Uuid::new_v4(), ProxyProtocol::Http, "peer", line);
        ctx.client_headers.append("Host", host);
        ctx.host = host.to_string();
        ctx
    }

    fn single_record_plugin() -> RequestRedirect {
        RequestRedirect::from_records(
            "redirect",
            10,
            vec![RedirectConfigRecord {
                host: "old.example.com".to_string(),
                path: "/a".to_string(),
                redirect_status: 301,
                redirect_description: "Moved Permanently".to_string(),
                replacement_resource: "https://new.example.com/a".to_string(),
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_matching_record_redirects() {
        let plugin = single_record_plugin();
        let mut ctx = context_for("old.example.com", "/a");

        let instruction = plugin.on_post_client_headers_request(&mut ctx);
        assert_eq!(instruction.instruction, Instruction::RedirectToNewUrl);
        assert_eq!(
            instruction.parameters.replacement_resource,
            "https://new.example.com/a"
        );
        assert_eq!(instruction.parameters.status, 301);
        assert_eq!(instruction.parameters.status_description, "Moved Permanently");
    }

    #[test]
    fn test_other_host_does_nothing() {
        let plugin = single_record_plugin();
        let mut ctx = context_for("other.example.com", "/a");
        let instruction = plugin.on_post_client_headers_request(&mut ctx);
        assert_eq!(instruction.instruction, Instruction::DoNothing);
    }

    #[test]
    fn test_host_match_is_case_insensitive_and_anchored() {
        let plugin = single_record_plugin();

        let mut ctx = context_for("OLD.Example.COM", "/a");
        assert!(plugin.on_post_client_headers_request(&mut ctx).is_actionable());

        // Substring hosts must not match the anchored pattern.
        let mut ctx = context_for("prefix.old.example.com", "/a");
        assert!(!plugin.on_post_client_headers_request(&mut ctx).is_actionable());
    }

    #[test]
    fn test_path_must_match_exactly() {
        let plugin = single_record_plugin();
        let mut ctx = context_for("old.example.com", "/a/b");
        assert!(!plugin.on_post_client_headers_request(&mut ctx).is_actionable());
    }

    #[test]
    fn test_escaped_literal_dots_do_not_wildcard() {
        let plugin = single_record_plugin();
        // A regex-unescaped "old.example.com" would match this host.
        let mut ctx = context_for("oldXexample.com", "/a");
        assert!(!plugin.on_post_client_headers_request(&mut ctx).is_actionable());
    }

    #[test]
    fn test_first_match_wins_in_configured_order() {
        let plugin = RequestRedirect::from_records(
            "redirect",
            10,
            vec![
                RedirectConfigRecord {
                    host: "host.example.com".to_string(),
                    path: "/r".to_string(),
                    redirect_status: 301,
                    redirect_description: "Moved Permanently".to_string(),
                    replacement_resource: "https://first.example.com/".to_string(),
                },
                RedirectConfigRecord {
                    host: "host.example.com".to_string(),
                    path: "/r".to_string(),
                    redirect_status: 302,
                    redirect_description: "Found".to_string(),
                    replacement_resource: "https://second.example.com/".to_string(),
                },
            ],
        )
        .unwrap();

        let mut ctx = context_for("host.example.com", "/r");
        let instruction = plugin.on_post_client_headers_request(&mut ctx);
        assert_eq!(
            instruction.parameters.replacement_resource,
            "https://first.example.com/"
        );
        assert_eq!(instruction.parameters.status, 301);
    }

    #[test]
    fn test_empty_configuration_short_circuits() {
        let plugin = RequestRedirect::from_records("redirect", 10, vec![]).unwrap();
        let mut ctx = context_for("any.example.com", "/");
        let instruction = plugin.on_post_client_headers_request(&mut ctx);
        assert_eq!(instruction.instruction, Instruction::DoNothing);
    }

    #[test]
    fn test_missing_host_header_does_nothing() {
        let plugin = single_record_plugin();
        let line = RequestLine::parse(&RawRequestLine {
            line: "GET /a HTTP/1.1".to_string(),
            newline: Newline::CrLf,
        })
        .unwrap();
        let mut ctx = RequestContext::new(Uuid::new_v4(), ProxyProtocol::Http, "peer", line);
        assert!(!plugin.on_post_client_headers_request(&mut ctx).is_actionable());
    }

    #[test]
    fn test_remembered_redirects_are_consulted_after_records() {
        let plugin = RequestRedirect::from_records("redirect", 10, vec![]).unwrap();
        plugin
            .cache()
            .remember("shop.example.com", "/cart", "https://shop.example.com/cart");

        let mut ctx = context_for("Shop.Example.Com", "/cart");
        let instruction = plugin.on_post_client_headers_request(&mut ctx);
        assert_eq!(instruction.instruction, Instruction::RedirectToNewUrl);
        assert_eq!(instruction.parameters.status, 302);
        assert_eq!(
            instruction.parameters.replacement_resource,
            "https://shop.example.com/cart"
        );
    }

    #[test]
    fn test_from_config_bag() {
        let cfg = json!({
            "priority": 7,
            "records": [{
                "host": "old.example.com",
                "path": "/a",
                "replacement_resource": "https://new.example.com/a"
            }]
        });

        let plugin = RequestRedirect::from_config("redirect", Some(&cfg)).unwrap();
        assert_eq!(plugin.properties().priority, 7);

        // Defaults apply to status and description.
        let mut ctx = context_for("old.example.com", "/a");
        let instruction = plugin.on_post_client_headers_request(&mut ctx);
        assert_eq!(instruction.parameters.status, 301);
        assert_eq!(instruction.parameters.status_description, "Moved Permanently");
    }

    #[test]
    fn test_from_config_without_bag() {
        let plugin = RequestRedirect::from_config("redirect", None).unwrap();
        assert_eq!(plugin.properties().priority, 100);
        assert!(plugin.cache().is_empty());
    }
}
