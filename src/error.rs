use http::StatusCode;
use thiserror::Error;

use crate::logging::Loglevel;

/// Main error type for the Interpose proxy.
///
/// Three request-path kinds matter to the connection handler:
/// `EmptyRequest` is recoverable and re-read, `ClientNotification` carries
/// the HTTP status that must reach the client, and `ProxyWarning` marks an
/// internal contract violation that aborts the request without a crafted
/// response.
#[derive(Error, Debug, Clone)]
pub enum InterposeError {
    /// Empty request line before any method was read (RFC 2616 section 4.1
    /// tolerance). The caller loops and re-reads.
    #[error("empty request: {message}")]
    EmptyRequest { message: String },

    /// Malformed or disallowed request. The status code is written back to
    /// the client by the connection handler.
    #[error("client notification {status}: {message}")]
    ClientNotification { status: StatusCode, message: String },

    /// Invalid internal state; upstream contract violation. Logged and the
    /// request aborted, never surfaced to the client.
    #[error("proxy warning: {message}")]
    ProxyWarning { message: String },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Network related errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// IO related errors
    #[error("IO error: {message}")]
    Io { message: String },

    /// Internal server errors
    #[error("Internal server error: {message}")]
    Internal { message: String },
}

impl InterposeError {
    /// Create a recoverable empty-request error
    pub fn empty_request<S: Into<String>>(message: S) -> Self {
        Self::EmptyRequest {
            message: message.into(),
        }
    }

    /// Create a client-notification error with an explicit status
    pub fn client<S: Into<String>>(status: StatusCode, message: S) -> Self {
        Self::ClientNotification {
            status,
            message: message.into(),
        }
    }

    /// Create a 400 Bad Request client notification
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self::client(StatusCode::BAD_REQUEST, message)
    }

    /// Create a 404 Not Found client notification
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::client(StatusCode::NOT_FOUND, message)
    }

    /// Create a 405 Method Not Allowed client notification
    pub fn method_not_allowed<S: Into<String>>(message: S) -> Self {
        Self::client(StatusCode::METHOD_NOT_ALLOWED, message)
    }

    /// Create a 505 HTTP Version Not Supported client notification
    pub fn unsupported_version<S: Into<String>>(message: S) -> Self {
        Self::client(StatusCode::HTTP_VERSION_NOT_SUPPORTED, message)
    }

    /// Create a proxy warning error
    pub fn proxy_warning<S: Into<String>>(message: S) -> Self {
        Self::ProxyWarning {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an IO error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The HTTP status the client must be notified with, if any
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::ClientNotification { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the caller should re-read instead of failing the request.
    /// Only the empty-request-line case qualifies.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::EmptyRequest { .. })
    }

    /// Log severity the error should be reported at
    pub fn severity(&self) -> Loglevel {
        match self {
            Self::EmptyRequest { .. } => Loglevel::Debug,
            Self::ClientNotification { .. } => Loglevel::Info,
            Self::Network { .. } | Self::Io { .. } => Loglevel::Warning,
            Self::ProxyWarning { .. } | Self::Config { .. } | Self::Internal { .. } => {
                Loglevel::Error
            }
        }
    }
}

/// Result type alias for Interpose operations
pub type InterposeResult<T> = Result<T, InterposeError>;

impl From<std::io::Error> for InterposeError {
    fn from(err: std::io::Error) -> Self {
        InterposeError::io(err.to_string())
    }
}

impl From<toml::de::Error> for InterposeError {
    fn from(err: toml::de::Error) -> Self {
        InterposeError::config(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_json::Error> for InterposeError {
    fn from(err: serde_json::Error) -> Self {
        InterposeError::internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = InterposeError::bad_request("path must start with /");
        assert!(matches!(err, InterposeError::ClientNotification { .. }));
        assert_eq!(err.status_code(), Some(StatusCode::BAD_REQUEST));

        let err = InterposeError::method_not_allowed("PUT is not relayed");
        assert_eq!(err.status_code(), Some(StatusCode::METHOD_NOT_ALLOWED));

        let err = InterposeError::unsupported_version("HTTP/2.0");
        assert_eq!(
            err.status_code(),
            Some(StatusCode::HTTP_VERSION_NOT_SUPPORTED)
        );
    }

    #[test]
    fn test_only_empty_request_is_recoverable() {
        assert!(InterposeError::empty_request("peer sent empty request").is_recoverable());
        assert!(!InterposeError::bad_request("no whitespace").is_recoverable());
        assert!(!InterposeError::proxy_warning("request object is invalid").is_recoverable());
        assert!(!InterposeError::network("connection reset").is_recoverable());
    }

    #[test]
    fn test_severity_mapping() {
        assert_eq!(
            InterposeError::empty_request("x").severity(),
            Loglevel::Debug
        );
        assert_eq!(InterposeError::bad_request("x").severity(), Loglevel::Info);
        assert_eq!(
            InterposeError::proxy_warning("x").severity(),
            Loglevel::Error
        );
    }

    #[test]
    fn test_error_conversions() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "stream closed");
        let err: InterposeError = io_error.into();
        assert!(matches!(err, InterposeError::Io { .. }));
        assert!(err.status_code().is_none());
    }
}
