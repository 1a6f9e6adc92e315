//! Request ingestion: request line, header block, content negotiation.
//!
//! `receive_request_line` and `receive_request_headers` together populate a
//! [`RequestContext`] from the connection's line reader. Both are
//! synchronous with respect to the request: they block only on the reader,
//! and the context is fully built before any plugin sees it.

use chrono::{DateTime, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::error::{InterposeError, InterposeResult};
use crate::logging::{Loglevel, ProxyLogger, ProxyProtocol};
use crate::request::context::RequestContext;
use crate::request::line::RequestLine;
use crate::request::negotiation::{
    provisional_content_length, resolve_content_type, resolve_transmission_mode,
};
use crate::request::reader::LineReader;

/// Host header values may only contain word characters, dashes and dots.
static HOST_ILLEGAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\-.]+").expect("host charset pattern is valid"));

/// Ingestion routines for one inbound client request.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIngest {
    logger: ProxyLogger,
}

impl RequestIngest {
    pub fn new(logger: ProxyLogger) -> Self {
        Self { logger }
    }

    /// Read and validate the request line.
    ///
    /// An empty line yields the recoverable [`InterposeError::EmptyRequest`]:
    /// per RFC 2616 section 4.1 a lone CRLF ahead of the real request line
    /// is ignored, so the caller re-reads instead of failing.
    pub async fn receive_request_line<R: LineReader + ?Sized>(
        &self,
        reader: &mut R,
        id: Uuid,
        protocol: ProxyProtocol,
        peer: &str,
    ) -> InterposeResult<RequestLine> {
        let raw = reader.read_request_line(false).await?;

        if raw.line.is_empty() {
            return Err(InterposeError::empty_request(format!(
                "{} sent empty request (RFC 2616)",
                peer
            )));
        }

        self.logger.log(
            id,
            protocol,
            Loglevel::Debug,
            format!("receive_request_line(): line={}", raw.line),
        );
        self.logger.log(
            id,
            protocol,
            Loglevel::Debug,
            format!("receive_request_line(): newline={:?}", raw.newline),
        );

        RequestLine::parse(&raw)
    }

    /// Read the header block, validate Host, and resolve content facts.
    pub async fn receive_request_headers<R: LineReader + ?Sized>(
        &self,
        reader: &mut R,
        ctx: &mut RequestContext,
    ) -> InterposeResult<()> {
        self.parse_client_request_headers(reader, ctx).await?;

        if !ctx.client_headers.contains("Host") {
            return Err(InterposeError::not_found("no Host header in request"));
        }

        let host = ctx
            .client_headers
            .first("Host")
            .unwrap_or_default()
            .to_string();
        if HOST_ILLEGAL.is_match(&host) {
            return Err(InterposeError::bad_request(
                "invalid characters in host name",
            ));
        }
        ctx.host = host;

        ctx.content_type = resolve_content_type(&ctx.client_headers);
        ctx.content_length = provisional_content_length(&ctx.client_headers);

        let resolution =
            resolve_transmission_mode(&ctx.client_headers, ctx.request_line.method)?;
        if let Some(length) = resolution.content_length {
            ctx.content_length = length;
        }
        ctx.transmission_mode = resolution.mode;

        self.logger.log(
            ctx.id,
            ctx.protocol,
            Loglevel::Debug,
            format!(
                "receive_request_headers(): transmission_mode={:?}",
                ctx.transmission_mode
            ),
        );

        Ok(())
    }

    /// Read header lines until a blank line terminates the block.
    ///
    /// Lines without a `:` are logged and skipped, never fatal. Recognized
    /// names get dedicated handling; everything else appends under its own
    /// key.
    async fn parse_client_request_headers<R: LineReader + ?Sized>(
        &self,
        reader: &mut R,
        ctx: &mut RequestContext,
    ) -> InterposeResult<()> {
        loop {
            let line = reader.read_line(false).await?;

            if line.trim().is_empty() {
                self.logger.log(
                    ctx.id,
                    ctx.protocol,
                    Loglevel::Debug,
                    "parse_client_request_headers(): all headers read",
                );
                break;
            }

            let Some((name, value)) = line.split_once(':') else {
                self.logger.log(
                    ctx.id,
                    ctx.protocol,
                    Loglevel::Debug,
                    format!("parse_client_request_headers(): invalid header |{}|", line),
                );
                continue;
            };
            let name = name.trim();
            let value = value.trim();

            match name.to_ascii_lowercase().as_str() {
                "host" | "user-agent" | "accept" | "referer" | "cookie" | "content-type" => {
                    ctx.client_headers.append(name, value);
                }
                "connection" => {
                    ctx.client_headers.append(name, value);
                    ctx.keep_alive = value.trim().to_ascii_lowercase() != "close";
                }
                "content-length" => {
                    // Lenient stage: unparsable lengths count as zero here,
                    // the negotiation resolver re-parses strictly.
                    ctx.content_length = value.parse().unwrap_or(0);
                    ctx.client_headers.append(name, value);
                }
                "if-modified-since" => {
                    if is_valid_http_date(value) {
                        ctx.client_headers.append(name, value);
                    } else {
                        self.logger.log(
                            ctx.id,
                            ctx.protocol,
                            Loglevel::Debug,
                            format!(
                                "parse_client_request_headers(): dropped If-Modified-Since |{}|",
                                value
                            ),
                        );
                    }
                }
                _ => {
                    ctx.client_headers.append(name, value);
                }
            }
        }

        Ok(())
    }
}

/// Whether the portion of `value` before a `;` parses as an HTTP date.
/// Accepts the three RFC 7231 formats.
fn is_valid_http_date(value: &str) -> bool {
    let candidate = value.split(';').next().unwrap_or("").trim();
    if candidate.is_empty() {
        return false;
    }
    DateTime::parse_from_rfc2822(candidate).is_ok()
        || NaiveDateTime::parse_from_str(candidate, "%A, %d-%b-%y %H:%M:%S GMT").is_ok()
        || NaiveDateTime::parse_from_str(candidate, "%a %b %e %H:%M:%S %Y").is_ok()
}
