use std::fmt;
use std::io;

use thiserror::Error;

/// Network-level failure classes that the retry controller treats as safe to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    ConnectionReset,
    BrokenPipe,
    Connection,
    Timeout,
    /// Upstream answered with 429 or a 5xx status.
    Http(u16),
}

impl fmt::Display for TransientKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionReset => f.write_str("connection reset"),
            Self::BrokenPipe => f.write_str("broken pipe"),
            Self::Connection => f.write_str("connection error"),
            Self::Timeout => f.write_str("timed out"),
            Self::Http(status) => write!(f, "upstream status {status}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Transient failure ({kind}): {message}")]
    Transient { kind: TransientKind, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn transient(kind: TransientKind, message: impl Into<String>) -> Self {
        Self::Transient { kind, message: message.into() }
    }

    /// True for failures the retry controller may repeat.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Classify a non-success HTTP status returned by a remote API.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", truncate(body, 512));
        match status {
            429 | 500..=599 => Self::transient(TransientKind::Http(status), message),
            401 | 403 => Self::Auth(message),
            404 => Self::NotFound(message),
            400..=499 => Self::InvalidInput(message),
            _ => Self::Operation(message),
        }
    }

    /// HTTP status a transport layer should answer with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::Auth(_) => 401,
            Self::NotFound(_) => 404,
            Self::Cancelled => 499,
            Self::Transient { .. } => 503,
            Self::InvalidConfig(_)
            | Self::Operation(_)
            | Self::Storage(_)
            | Self::MalformedResponse(_)
            | Self::Io(_)
            | Self::Json(_) => 500,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::ConnectionReset => Some(TransientKind::ConnectionReset),
            io::ErrorKind::BrokenPipe => Some(TransientKind::BrokenPipe),
            io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionRefused => Some(TransientKind::Connection),
            io::ErrorKind::TimedOut => Some(TransientKind::Timeout),
            _ => None,
        };
        match kind {
            Some(kind) => Self::transient(kind, e.to_string()),
            None if e.kind() == io::ErrorKind::NotFound => Self::NotFound(e.to_string()),
            None => Self::Io(e),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            return Self::transient(TransientKind::Timeout, e.to_string());
        }
        if e.is_connect() || e.is_request() || e.is_body() {
            return Self::transient(TransientKind::Connection, e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::from_status(status.as_u16(), &e.to_string());
        }
        if e.is_decode() {
            return Self::MalformedResponse(e.to_string());
        }
        Self::Operation(e.to_string())
    }
}

/// Pass a successful response through; classify anything else by status.
pub async fn ensure_success(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::from_status(status.as_u16(), &body))
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::InvalidConfig(e.to_string())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
