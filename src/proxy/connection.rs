//! Per-connection request processing.
//!
//! Each accepted connection runs this handler on its own task: ingest one
//! request, dispatch the pre-request hooks, enact the winning instruction
//! or forward to the origin, then loop while keep-alive holds. Empty
//! request lines ahead of the real request are consumed and re-read per
//! RFC 2616 tolerance.

use std::net::SocketAddr;

use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use uuid::Uuid;

use crate::error::{InterposeError, InterposeResult};
use crate::logging::{Loglevel, ProxyLogger, ProxyProtocol};
use crate::plugins::instruction::Instruction;
use crate::plugins::registry::SharedPluginRegistry;
use crate::proxy::forwarder::OriginForwarder;
use crate::proxy::response;
use crate::request::context::RequestContext;
use crate::request::ingest::RequestIngest;
use crate::request::negotiation::TransmissionMode;
use crate::request::reader::{BufLineReader, Newline};

pub struct ConnectionHandler {
    registry: SharedPluginRegistry,
    logger: ProxyLogger,
    ingest: RequestIngest,
    forwarder: OriginForwarder,
}

impl ConnectionHandler {
    pub fn new(registry: SharedPluginRegistry, logger: ProxyLogger, origin_port: u16) -> Self {
        Self {
            registry,
            logger,
            ingest: RequestIngest::new(logger),
            forwarder: OriginForwarder::new(logger, origin_port),
        }
    }

    /// Drive one client connection to completion.
    pub async fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufLineReader::new(BufReader::new(read_half));
        let mut writer = write_half;
        let peer = peer.to_string();

        loop {
            let id = Uuid::new_v4();
            match self.process_one(id, &mut reader, &mut writer, &peer).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(err) if err.is_recoverable() => {
                    // Lone CRLF ahead of the request line: ignore and
                    // re-read, never surfaced to the client.
                    self.logger
                        .log(id, ProxyProtocol::Http, err.severity(), err.to_string());
                    continue;
                }
                Err(err) => {
                    self.logger
                        .log(id, ProxyProtocol::Http, err.severity(), err.to_string());
                    if let Some(status) = err.status_code() {
                        let block = response::status_block(status, Newline::CrLf);
                        let _ = writer.write_all(block.as_bytes()).await;
                        let _ = writer.flush().await;
                    }
                    // Proxy warnings and transport errors terminate the
                    // connection without a crafted response.
                    break;
                }
            }
        }
    }

    /// Process one request/response cycle. Returns whether the connection
    /// should stay open for the next request.
    async fn process_one<R, W>(
        &self,
        id: Uuid,
        reader: &mut BufLineReader<R>,
        writer: &mut W,
        peer: &str,
    ) -> InterposeResult<bool>
    where
        R: AsyncBufRead + Unpin + Send,
        W: AsyncWrite + Unpin + Send,
    {
        let protocol = ProxyProtocol::Http;
        let request_line = self
            .ingest
            .receive_request_line(reader, id, protocol, peer)
            .await?;
        let mut ctx = RequestContext::new(id, protocol, peer, request_line);
        self.ingest
            .receive_request_headers(reader, &mut ctx)
            .await?;

        self.logger
            .log(id, protocol, Loglevel::Info, &ctx.log_label);

        let registry = self.registry.snapshot().await;
        let instruction = registry.dispatch_client_headers(&mut ctx);
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
                writer.write_all(block.as_bytes()).await?;
                writer.flush().await?;
                // The redirect block carries Connection: close.
                return Ok(false);
            }
            Instruction::DropRequest => {
                self.logger.log(
                    id,
                    protocol,
                    Loglevel::Info,
                    format!("request dropped by plugin: {}", ctx.log_label),
                );
                return Ok(false);
            }
            Instruction::RewriteRequest => {
                self.logger.log(
                    id,
                    protocol,
                    Loglevel::Info,
                    format!(
                        "rewriting {} -> {}",
                        ctx.request_line.path, instruction.parameters.replacement_resource
                    ),
                );
                ctx.request_line.path = instruction.parameters.replacement_resource.clone();
            }
        }

        if ctx.transmission_mode == TransmissionMode::Error {
            return Err(InterposeError::bad_request(
                "negative Content-Length in request",
            ));
        }

        self.forwarder
            .forward(&mut ctx, &registry, reader, writer)
            .await?;

        Ok(ctx.keep_alive)
    }
}
