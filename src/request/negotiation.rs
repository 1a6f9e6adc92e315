//! Content negotiation over the parsed header block.
//!
//! Two independent computations: the request content type/charset, and the
//! transmission mode for the request body. The header parser records a
//! provisional content length leniently; the mode resolution here re-parses
//! `Content-Length` strictly and is the authoritative word on how the body
//! is relayed.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{InterposeError, InterposeResult};
use crate::request::headers::HeaderMap;
use crate::request::line::Method;

/// Default content type when the client declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";
/// Default charset when the client declares none or an unknown one.
pub const DEFAULT_CHARSET: &str = "UTF-8";

static CHARSET_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^charset\s*=").expect("charset parameter pattern is valid"));

/// Charsets with a resolvable decoder. An unknown charset resets the whole
/// negotiation result to the defaults.
const KNOWN_CHARSETS: &[&str] = &[
    "utf-8",
    "utf-16",
    "utf-16le",
    "utf-16be",
    "us-ascii",
    "ascii",
    "iso-8859-1",
    "iso-8859-2",
    "iso-8859-15",
    "latin1",
    "windows-1250",
    "windows-1251",
    "windows-1252",
    "koi8-r",
    "shift_jis",
    "euc-jp",
    "gb2312",
    "gbk",
    "big5",
];

/// Resolved content type, charset and decoder identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentTypeEncoding {
    pub content_type: String,
    pub charset: String,
    /// Canonical decoder name for the charset.
    pub decoder: &'static str,
}

impl Default for ContentTypeEncoding {
    fn default() -> Self {
        Self {
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            decoder: "utf-8",
        }
    }
}

/// Strategy for relaying a request body to the origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    FixedContentLength,
    Chunked,
    /// Legacy relay-one-line behavior for POSTs that declare no length.
    ReadOneLine,
    #[default]
    NoDataToTransfer,
    /// Negative declared length; the request must not be forwarded.
    Error,
}

/// Outcome of the authoritative transmission-mode resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmissionResolution {
    pub mode: TransmissionMode,
    /// Authoritative content length, when `Content-Length` was present.
    pub content_length: Option<i64>,
}

fn lookup_decoder(charset: &str) -> Option<&'static str> {
    let wanted = charset.to_ascii_lowercase();
    KNOWN_CHARSETS.iter().find(|c| **c == wanted).copied()
}

/// Resolve content type and charset from the header block.
///
/// Absent or empty `Content-Type` yields the defaults. A declared charset
/// that resolves to no known decoder resets the whole result to the
/// defaults rather than failing the request.
pub fn resolve_content_type(headers: &HeaderMap) -> ContentTypeEncoding {
    let first = match headers.first("Content-Type") {
        Some(v) if !v.is_empty() => v,
        _ => return ContentTypeEncoding::default(),
    };

    match split_content_type(first) {
        Some(resolved) => resolved,
        None => ContentTypeEncoding::default(),
    }
}

fn split_content_type(value: &str) -> Option<ContentTypeEncoding> {
    match value.split_once(';') {
        Some((content_type, parameter)) => {
            let charset = determine_charset(parameter)?;
            let decoder = lookup_decoder(&charset)?;
            Some(ContentTypeEncoding {
                content_type: content_type.to_string(),
                charset,
                decoder,
            })
        }
        None => Some(ContentTypeEncoding {
            content_type: value.to_string(),
            charset: DEFAULT_CHARSET.to_string(),
            decoder: "utf-8",
        }),
    }
}

/// Extract a charset from the `;`-delimited parameter. Parameters that are
/// not a charset assignment fall back to the default charset.
fn determine_charset(parameter: &str) -> Option<String> {
    let parameter = parameter.trim();
    if parameter.is_empty() {
        return None;
    }
    if CHARSET_PARAM.is_match(parameter) {
        let (_, value) = parameter.split_once('=')?;
        Some(value.to_string())
    } else {
        Some(DEFAULT_CHARSET.to_string())
    }
}

/// Provisional content length: lenient, never fails.
///
/// `Content-Length` parses with failures treated as 0; `Transfer-Encoding`
/// marks the length unknown with the -1 sentinel; otherwise 0.
pub fn provisional_content_length(headers: &HeaderMap) -> i64 {
    if let Some(value) = headers.first("Content-Length") {
        value.parse().unwrap_or(0)
    } else if headers.contains("Transfer-Encoding") {
        -1
    } else {
        0
    }
}

/// Authoritative transmission-mode resolution, first match wins.
///
/// A present `Content-Length` is re-parsed strictly here; an unparsable
/// value fails the call where the header-parsing stage stayed lenient.
pub fn resolve_transmission_mode(
    headers: &HeaderMap,
    method: Method,
) -> InterposeResult<TransmissionResolution> {
    if let Some(value) = headers.first("Content-Length") {
        let length: i64 = value.parse().map_err(|_| {
            InterposeError::bad_request(format!("unparsable Content-Length: {}", value))
        })?;
        let mode = if length > 0 {
            TransmissionMode::FixedContentLength
        } else if length == 0 {
            TransmissionMode::NoDataToTransfer
        } else {
            TransmissionMode::Error
        };
        return Ok(TransmissionResolution {
            mode,
            content_length: Some(length),
        });
    }

    if headers.contains("Transfer-Encoding") {
        return Ok(TransmissionResolution {
            mode: TransmissionMode::Chunked,
            content_length: None,
        });
    }

    if method == Method::Post {
        return Ok(TransmissionResolution {
            mode: TransmissionMode::ReadOneLine,
            content_length: None,
        });
    }

    Ok(TransmissionResolution {
        mode: TransmissionMode::NoDataToTransfer,
        content_length: None,
    })
}
