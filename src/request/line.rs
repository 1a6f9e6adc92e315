//! Request line tokenizing and validation.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{InterposeError, InterposeResult};
use crate::request::reader::{Newline, RawRequestLine};

/// Request methods. `Undefined` covers tokens that pass the recognized-set
/// check but map to no canonical method (e.g. a lowercase `get`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
    Undefined,
}

/// Allowed method tokens, matched case-insensitively before any mapping.
static METHOD_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(get|put|post|head|trace|delete|options|connect)\s*$")
        .expect("method token pattern is valid")
});

/// A validated request line.
#[derive(Debug, Clone)]
pub struct RequestLine {
    /// The raw line as read from the wire, newline stripped.
    pub raw: String,
    /// Newline convention the client used; responses reuse it.
    pub newline: Newline,
    pub method: Method,
    /// The method token exactly as the client sent it.
    pub method_token: String,
    pub path: String,
    pub version: String,
}

impl RequestLine {
    /// Tokenize and validate the first line of a request.
    ///
    /// The failure ladder, in order: empty line (400 here; the recoverable
    /// empty-request case is handled by the caller before parsing), no
    /// whitespace (400), not exactly three fields when split on the first
    /// two spaces (400), method token outside the recognized set (405),
    /// path without a leading `/` (400), version not `HTTP/1.x` (505).
    ///
    /// `PUT`, `DELETE` and `OPTIONS` are recognized-but-rejected: they map
    /// to their variants and the call still fails with 405. Tokens the
    /// mapping does not know (the recognized set is matched without regard
    /// to case, the mapping is exact) parse to `Undefined` without failing.
    pub fn parse(raw: &RawRequestLine) -> InterposeResult<RequestLine> {
        if raw.line.is_empty() {
            return Err(InterposeError::bad_request("the request line is undefined"));
        }

        if !raw.line.contains(' ') {
            return Err(InterposeError::bad_request(
                "request line contains no whitespace",
            ));
        }

        let fields: Vec<&str> = raw.line.splitn(3, ' ').collect();
        if fields.len() != 3 {
            return Err(InterposeError::bad_request(
                "request line does not split into three fields",
            ));
        }

        if !METHOD_TOKEN.is_match(&fields[0].to_lowercase()) {
            return Err(InterposeError::method_not_allowed(format!(
                "method not allowed: {}",
                fields[0]
            )));
        }

        if !fields[1].starts_with('/') {
            return Err(InterposeError::bad_request(
                "path does not start with a slash",
            ));
        }

        if !fields[2].starts_with("HTTP/1.") {
            return Err(InterposeError::unsupported_version(format!(
                "unsupported version: {}",
                fields[2]
            )));
        }

        let method_token = fields[0].to_string();
        let mut path = fields[1].to_string();
        let version = fields[2].to_string();

        let method = match method_token.as_str() {
            "GET" => Method::Get,
            "POST" => Method::Post,
            "HEAD" => Method::Head,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            "PUT" => {
                return Err(InterposeError::method_not_allowed("PUT is not relayed"));
            }
            "DELETE" => {
                return Err(InterposeError::method_not_allowed("DELETE is not relayed"));
            }
            "OPTIONS" => {
                return Err(InterposeError::method_not_allowed("OPTIONS is not relayed"));
            }
            _ => Method::Undefined,
        };

        // Repair branch kept for looser grammars; unreachable while the
        // leading-slash check above rejects first.
        if !path.starts_with('/') {
            path = format!("/{}", path);
        }

        Ok(RequestLine {
            raw: raw.line.clone(),
            newline: raw.newline,
            method,
            method_token,
            path,
            version,
        })
    }

    /// Log label derived from the trimmed raw line.
    pub fn log_label(&self) -> String {
        self.raw.trim().to_string()
    }
}
