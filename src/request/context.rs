//! Per-request aggregate built during ingestion.

use uuid::Uuid;

use crate::logging::ProxyProtocol;
use crate::request::headers::HeaderMap;
use crate::request::line::RequestLine;
use crate::request::negotiation::{ContentTypeEncoding, TransmissionMode};
use crate::request::reader::Newline;

/// Everything the dispatcher and the forwarding logic need to know about
/// one inbound request.
///
/// Created per request, populated synchronously during ingestion, and owned
/// exclusively by the connection task. After ingestion only plugins acting
/// through the instruction protocol touch it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id tying log lines to this request.
    pub id: Uuid,
    /// Protocol the connection was accepted on.
    pub protocol: ProxyProtocol,
    /// Peer address, for log messages.
    pub peer: String,
    pub request_line: RequestLine,
    /// Client-side request headers.
    pub client_headers: HeaderMap,
    /// First Host header value; validated during ingestion.
    pub host: String,
    /// Request body length. -1 means unknown/streamed.
    pub content_length: i64,
    pub content_type: ContentTypeEncoding,
    pub transmission_mode: TransmissionMode,
    /// False once the client asked for `Connection: close`.
    pub keep_alive: bool,
    /// Free-form label derived from the trimmed request line.
    pub log_label: String,
}

impl RequestContext {
    pub fn new(
        id: Uuid,
        protocol: ProxyProtocol,
        peer: impl Into<String>,
        request_line: RequestLine,
    ) -> Self {
        let log_label = request_line.log_label();
        Self {
            id,
            protocol,
            peer: peer.into(),
            request_line,
            client_headers: HeaderMap::new(),
            host: String::new(),
            content_length: 0,
            content_type: ContentTypeEncoding::default(),
            transmission_mode: TransmissionMode::NoDataToTransfer,
            keep_alive: true,
            log_label,
        }
    }

    /// Newline convention negotiated with the client.
    pub fn newline(&self) -> Newline {
        self.request_line.newline
    }
}
