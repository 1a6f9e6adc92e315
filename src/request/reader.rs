//! Line-oriented reading over the transport stream.
//!
//! The ingestion pipeline consumes the transport through the [`LineReader`]
//! capability: one textual line at a time, plus a request-line variant that
//! also reports which newline convention the client used. The newline
//! convention is carried through to every response block written back on
//! the same connection.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::{InterposeError, InterposeResult};

/// Newline convention detected on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Newline {
    #[default]
    CrLf,
    Lf,
}

impl Newline {
    pub fn as_str(self) -> &'static str {
        match self {
            Newline::CrLf => "\r\n",
            Newline::Lf => "\n",
        }
    }
}

/// The first line of a request as read from the wire, newline stripped.
#[derive(Debug, Clone)]
pub struct RawRequestLine {
    pub line: String,
    pub newline: Newline,
}

/// Line-reading capability consumed from the transport collaborator.
///
/// The `blocking` flag is part of the transport contract: readers that can
/// poll may return early when it is false. The buffered TCP implementation
/// always awaits the next line regardless.
#[async_trait]
pub trait LineReader: Send {
    /// Read one line, newline stripped. Returns an empty string at end of
    /// stream, which the header loop treats as the block terminator.
    async fn read_line(&mut self, blocking: bool) -> InterposeResult<String>;

    /// Read the request line together with its detected newline convention.
    /// Unlike [`read_line`](Self::read_line), end of stream is an error
    /// here so the keep-alive loop can tell a closed peer from a lone CRLF.
    async fn read_request_line(&mut self, blocking: bool) -> InterposeResult<RawRequestLine>;
}

/// [`LineReader`] over any buffered async byte stream.
pub struct BufLineReader<R> {
    inner: R,
}

impl<R: AsyncBufRead + Unpin + Send> BufLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Access the underlying stream, e.g. for raw body relaying once the
    /// header block has been consumed.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    async fn next_line(&mut self) -> InterposeResult<Option<(String, Newline)>> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }

        let newline = if buf.ends_with(b"\r\n") {
            Newline::CrLf
        } else {
            Newline::Lf
        };
        if buf.ends_with(b"\n") {
            buf.pop();
        }
        if buf.ends_with(b"\r") {
            buf.pop();
        }

        Ok(Some((String::from_utf8_lossy(&buf).into_owned(), newline)))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> LineReader for BufLineReader<R> {
    async fn read_line(&mut self, _blocking: bool) -> InterposeResult<String> {
        Ok(self
            .next_line()
            .await?
            .map(|(line, _)| line)
            .unwrap_or_default())
    }

    async fn read_request_line(&mut self, _blocking: bool) -> InterposeResult<RawRequestLine> {
        match self.next_line().await? {
            Some((line, newline)) => Ok(RawRequestLine { line, newline }),
            None => Err(InterposeError::network("connection closed by peer")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newline_as_str() {
        assert_eq!(Newline::CrLf.as_str(), "\r\n");
        assert_eq!(Newline::Lf.as_str(), "\n");
    }

    #[tokio::test]
    async fn test_read_request_line_detects_crlf() {
        let mut reader = BufLineReader::new(&b"GET / HTTP/1.1\r\nHost: a\r\n"[..]);
        let raw = reader.read_request_line(false).await.unwrap();
        assert_eq!(raw.line, "GET / HTTP/1.1");
        assert_eq!(raw.newline, Newline::CrLf);
    }

    #[tokio::test]
    async fn test_read_request_line_detects_lf() {
        let mut reader = BufLineReader::new(&b"GET / HTTP/1.0\n"[..]);
        let raw = reader.read_request_line(false).await.unwrap();
        assert_eq!(raw.line, "GET / HTTP/1.0");
        assert_eq!(raw.newline, Newline::Lf);
    }

    #[tokio::test]
    async fn test_lone_crlf_reads_as_empty_line() {
        let mut reader = BufLineReader::new(&b"\r\nGET / HTTP/1.1\r\n"[..]);
        let raw = reader.read_request_line(false).await.unwrap();
        assert!(raw.line.is_empty());
        let raw = reader.read_request_line(false).await.unwrap();
        assert_eq!(raw.line, "GET / HTTP/1.1");
    }

    #[tokio::test]
    async fn test_eof_is_an_error_for_request_line() {
        let mut reader = BufLineReader::new(&b""[..]);
        let err = reader.read_request_line(false).await.unwrap_err();
        assert!(matches!(err, InterposeError::Network { .. }));
    }

    #[tokio::test]
    async fn test_eof_terminates_header_lines() {
        let mut reader = BufLineReader::new(&b"Host: example.com\r\n"[..]);
        assert_eq!(reader.read_line(false).await.unwrap(), "Host: example.com");
        assert_eq!(reader.read_line(false).await.unwrap(), "");
    }
}
