use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type for httputils operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for httputils
///
/// Building errors (`Uri`, `Io`, `InvalidRequest`) are produced before any
/// network activity. `Timeout` and `Transport` come from the pool or the
/// round trip. A non-success HTTP status is never an error.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed target URI or query value
    #[error("Invalid URI: {0}")]
    Uri(String),

    /// File or stream read failure, MIME detection failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pool acquisition or response wait exceeded its bound
    #[error("Timed out after {duration:?} during {phase}")]
    Timeout { phase: TimeoutPhase, duration: Duration },

    /// Connection refused, reset, or truncated body
    #[error("Transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// JSON/XML translation failure
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid header name/value or MIME string supplied by the caller
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid client or pool configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Where a timeout happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// Waiting for a pooled connection
    PoolAcquire,
    /// Establishing the TCP/TLS connection
    Connect,
    /// Waiting for the status line and headers
    Response,
    /// Draining the response body
    BodyRead,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TimeoutPhase::PoolAcquire => "pool acquisition",
            TimeoutPhase::Connect => "connect",
            TimeoutPhase::Response => "response wait",
            TimeoutPhase::BodyRead => "body read",
        };
        f.write_str(phase)
    }
}

/// Failure reported by a [`MimeDetector`](crate::mimetype::MimeDetector)
#[derive(Error, Debug)]
#[error("MIME detection failed for {subject}: {reason}")]
pub struct DetectionError {
    subject: String,
    reason: String,
}

impl DetectionError {
    /// Create a new detection error
    pub fn new(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// What was being inspected (a file name or "content")
    pub fn subject(&self) -> &str {
        &self.subject
    }
}

impl Error {
    /// Create a new URI error
    pub fn uri(message: impl Into<String>) -> Self {
        Error::Uri(message.into())
    }

    /// Create a new timeout error
    pub fn timeout(phase: TimeoutPhase, duration: Duration) -> Self {
        Error::Timeout { phase, duration }
    }

    /// Create a new encoding error
    pub fn encoding(message: impl fmt::Display) -> Self {
        Error::Encoding(message.to_string())
    }

    /// Create a new invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }

    /// Check if this is a URI error
    pub fn is_uri(&self) -> bool {
        matches!(self, Error::Uri(_))
    }

    /// Check if this is an IO error
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Check if this is a transport error
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Check if this is an encoding error
    pub fn is_encoding(&self) -> bool {
        matches!(self, Error::Encoding(_))
    }

    /// Get the timeout phase if this is a timeout error
    pub fn timeout_phase(&self) -> Option<TimeoutPhase> {
        match self {
            Error::Timeout { phase, .. } => Some(*phase),
            _ => None,
        }
    }

    /// Get the underlying reqwest error if this is a transport error
    pub fn as_transport_error(&self) -> Option<&reqwest::Error> {
        match self {
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DetectionError> for Error {
    fn from(err: DetectionError) -> Self {
        Error::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::Uri(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Encoding(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Error::InvalidRequest(format!("Invalid header name: {}", err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Error::InvalidRequest(format!("Invalid header value: {}", err))
    }
}
