//! Forwarding to the origin once ingestion and dispatch let a request
//! through: serialize the validated head, relay the request body per the
//! negotiated transmission mode, read the origin's head back with the same
//! header machinery, run post-response hooks, then relay the response body
//! chunk by chunk through the data-transfer hook.

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::error::{InterposeError, InterposeResult};
use crate::logging::{Loglevel, ProxyLogger};
use crate::plugins::instruction::Instruction;
use crate::plugins::registry::PluginRegistry;
use crate::proxy::response;
use crate::request::context::RequestContext;
use crate::request::headers::HeaderMap;
use crate::request::line::Method;
use crate::request::negotiation::{resolve_transmission_mode, TransmissionMode};
use crate::request::reader::{BufLineReader, LineReader, Newline};

/// Parsed head of an origin response.
#[derive(Debug)]
struct OriginHead {
    status_line: String,
    newline: Newline,
    headers: HeaderMap,
    transmission_mode: TransmissionMode,
    content_length: i64,
}

/// Relays one request/response exchange with the origin.
pub struct OriginForwarder {
    logger: ProxyLogger,
    origin_port: u16,
}

impl OriginForwarder {
    pub fn new(logger: ProxyLogger, origin_port: u16) -> Self {
        Self {
            logger,
            origin_port,
        }
    }

    pub async fn forward<R, W>(
        &self,
        ctx: &mut RequestContext,
        registry: &PluginRegistry,
        client_reader: &mut BufLineReader<R>,
        client_writer: &mut W,
    ) -> InterposeResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let origin = TcpStream::connect((ctx.host.as_str(), self.origin_port))
            .await
            .map_err(|e| {
                InterposeError::network(format!(
                    "origin connect to {}:{} failed: {}",
                    ctx.host, self.origin_port, e
                ))
            })?;
        let (origin_read, origin_write) = origin.into_split();
        let mut origin_reader = BufLineReader::new(BufReader::new(origin_read));
        let mut origin_writer = origin_write;

        self.send_request_head(ctx, &mut origin_writer).await?;
        self.relay_request_body(ctx, client_reader, &mut origin_writer)
            .await?;
        origin_writer.flush().await?;

        let head = self.read_origin_head(&mut origin_reader).await?;
        self.logger.log(
            ctx.id,
            ctx.protocol,
            Loglevel::Debug,
            format!("forward(): origin answered |{}|", head.status_line),
        );

        let instruction = registry.dispatch_server_headers(ctx);
        match instruction.instruction {
            Instruction::DoNothing => {}
            Instruction::RedirectToNewUrl => {
                let p = &instruction.parameters;
                let block = response::redirect_block(
                    p.status,
                    &p.status_description,
                    &p.replacement_resource,
                    ctx.newline(),
                );
                client_writer.write_all(block.as_bytes()).await?;
                client_writer.flush().await?;
                ctx.keep_alive = false;
                return Ok(());
            }
            Instruction::DropRequest => {
                ctx.keep_alive = false;
                return Ok(());
            }
            Instruction::RewriteRequest => {
                // A rewrite cannot be honored once the origin answered.
                self.logger.log(
                    ctx.id,
                    ctx.protocol,
                    Loglevel::Warning,
                    "forward(): ignoring RewriteRequest from a post-response hook",
                );
            }
        }

        self.relay_response(ctx, registry, head, &mut origin_reader, client_writer)
            .await
    }

    async fn send_request_head<W>(
        &self,
        ctx: &RequestContext,
        origin_writer: &mut W,
    ) -> InterposeResult<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let nl = ctx.newline().as_str();
        let mut head = String::new();
        head.push_str(&ctx.request_line.method_token);
        head.push(' ');
        head.push_str(&ctx.request_line.path);
        head.push(' ');
        head.push_str(&ctx.request_line.version);
        head.push_str(nl);
        for (name, values) in ctx.client_headers.iter() {
            for value in values {
                head.push_str(name);
                head.push_str(": ");
                head.push_str(value);
                head.push_str(nl);
            }
        }
        head.push_str(nl);
        origin_writer.write_all(head.as_bytes()).await?;
        Ok(())
    }

    async fn relay_request_body<R, W>(
        &self,
        ctx: &RequestContext,
        client_reader: &mut BufLineReader<R>,
        origin_writer: &mut W,
    ) -> InterposeResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        match ctx.transmission_mode {
            TransmissionMode::FixedContentLength => {
                copy_exact(
                    client_reader.get_mut(),
                    origin_writer,
                    ctx.content_length as u64,
                    |_| {},
                )
                .await
            }
            TransmissionMode::Chunked => {
                relay_chunked(client_reader, origin_writer, ctx.newline(), |_| {}).await
            }
            TransmissionMode::ReadOneLine => {
                // Legacy relay-one-line behavior for POSTs without a
                // declared length.
                let line = client_reader.read_line(false).await?;
                origin_writer.write_all(line.as_bytes()).await?;
                origin_writer
                    .write_all(ctx.newline().as_str().as_bytes())
                    .await?;
                Ok(())
            }
            TransmissionMode::NoDataToTransfer => Ok(()),
            TransmissionMode::Error => Err(InterposeError::proxy_warning(
                "transmission mode Error reached the forwarder",
            )),
        }
    }

    async fn read_origin_head<R>(
        &self,
        origin_reader: &mut BufLineReader<R>,
    ) -> InterposeResult<OriginHead>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let raw = origin_reader.read_request_line(false).await?;
        if raw.line.is_empty() {
            return Err(InterposeError::network("origin sent an empty status line"));
        }

        let mut headers = HeaderMap::new();
        loop {
            let line = origin_reader.read_line(false).await?;
            if line.trim().is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            headers.append(name.trim(), value.trim());
        }

        // Responses reuse the request-side resolver; GET stands in for the
        // method so the no-length case maps to no body.
        let resolution = resolve_transmission_mode(&headers, Method::Get)
            .map_err(|_| InterposeError::network("origin sent an unparsable Content-Length"))?;

        Ok(OriginHead {
            status_line: raw.line,
            newline: raw.newline,
            headers,
            transmission_mode: resolution.mode,
            content_length: resolution.content_length.unwrap_or(0),
        })
    }

    async fn relay_response<R, W>(
        &self,
        ctx: &mut RequestContext,
        registry: &PluginRegistry,
        head: OriginHead,
        origin_reader: &mut BufLineReader<R>,
        client_writer: &mut W,
    ) -> InterposeResult<()>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let nl = ctx.newline().as_str();
        let mut block = String::new();
        block.push_str(&head.status_line);
        block.push_str(nl);
        for (name, values) in head.headers.iter() {
            for value in values {
                block.push_str(name);
                block.push_str(": ");
                block.push_str(value);
                block.push_str(nl);
            }
        }
        block.push_str(nl);
        client_writer.write_all(block.as_bytes()).await?;

        match head.transmission_mode {
            TransmissionMode::FixedContentLength => {
                copy_exact(
                    origin_reader.get_mut(),
                    client_writer,
                    head.content_length as u64,
                    |chunk| registry.dispatch_data_transfer(ctx, chunk),
                )
                .await?;
            }
            TransmissionMode::Chunked => {
                relay_chunked(origin_reader, client_writer, head.newline, |chunk| {
                    registry.dispatch_data_transfer(ctx, chunk)
                })
                .await?;
            }
            _ => {}
        }

        client_writer.flush().await?;
        Ok(())
    }
}

/// Copy exactly `remaining` bytes, reporting each relayed chunk.
async fn copy_exact<R, W, F>(
    reader: &mut R,
    writer: &mut W,
    mut remaining: u64,
    mut on_chunk: F,
) -> InterposeResult<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    F: FnMut(&[u8]),
{
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(InterposeError::network("stream closed mid-body"));
        }
        writer.write_all(&buf[..n]).await?;
        on_chunk(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(())
}

/// Relay a chunked body: size lines and trailers verbatim, data through
/// the chunk callback.
async fn relay_chunked<R, W, F>(
    reader: &mut BufLineReader<R>,
    writer: &mut W,
    newline: Newline,
    mut on_chunk: F,
) -> InterposeResult<()>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
    F: FnMut(&[u8]),
{
    let nl = newline.as_str();
    loop {
        let size_line = reader.read_line(false).await?;
        writer.write_all(size_line.as_bytes()).await?;
        writer.write_all(nl.as_bytes()).await?;

        let size_token = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_token, 16).map_err(|_| {
            InterposeError::bad_request(format!("invalid chunk size: {}", size_line))
        })?;

        if size == 0 {
            // Relay trailers up to and including the blank terminator.
            loop {
                let trailer = reader.read_line(false).await?;
                writer.write_all(trailer.as_bytes()).await?;
                writer.write_all(nl.as_bytes()).await?;
                if trailer.trim().is_empty() {
                    break;
                }
            }
            return Ok(());
        }

        copy_exact(reader.get_mut(), writer, size as u64, &mut on_chunk).await?;

        let separator = reader.read_line(false).await?;
        if !separator.trim().is_empty() {
            return Err(InterposeError::bad_request(
                "chunk data not followed by a newline",
            ));
        }
        writer.write_all(nl.as_bytes()).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_copy_exact_reports_chunks() {
        let payload = b"hello world, this is a body";
        let mut reader = &payload[..];
        let mut out = Vec::new();
        let mut seen = 0usize;

        copy_exact(&mut reader, &mut out, payload.len() as u64, |chunk| {
            seen += chunk.len();
        })
        .await
        .unwrap();

        assert_eq!(out, payload);
        assert_eq!(seen, payload.len());
    }

    #[tokio::test]
    async fn test_copy_exact_fails_on_short_stream() {
        let payload = b"short";
        let mut reader = &payload[..];
        let mut out = Vec::new();
        let err = copy_exact(&mut reader, &mut out, 100, |_| {}).await.unwrap_err();
        assert!(matches!(err, InterposeError::Network { .. }));
    }

    #[tokio::test]
    async fn test_relay_chunked_round_trip() {
        let body = b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let mut reader = BufLineReader::new(&body[..]);
        let mut out = Vec::new();
        let mut data = Vec::new();

        relay_chunked(&mut reader, &mut out, Newline::CrLf, |chunk| {
            data.extend_from_slice(chunk);
        })
        .await
        .unwrap();

        assert_eq!(out, body);
        assert_eq!(data, b"hello world");
    }

    #[tokio::test]
    async fn test_relay_chunked_rejects_garbage_size() {
        let body = b"zz\r\ndata\r\n";
        let mut reader = BufLineReader::new(&body[..]);
        let mut out = Vec::new();
        let err = relay_chunked(&mut reader, &mut out, Newline::CrLf, |_| {})
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(http::StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_relay_chunked_keeps_extensions_and_trailers() {
        let body = b"4;ext=1\r\nwiki\r\n0\r\nExpires: soon\r\n\r\n";
        let mut reader = BufLineReader::new(&body[..]);
        let mut out = Vec::new();
        relay_chunked(&mut reader, &mut out, Newline::CrLf, |_| {}).await.unwrap();
        assert_eq!(out, body);
    }
}
