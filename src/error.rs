//! Engine error types

use thiserror::Error;

/// Errors surfaced by the triage engine and its NNTP transport
#[derive(Error, Debug)]
pub enum TriageError {
    /// IO error during network or filesystem operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS error during secure connection
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection establishment timed out
    #[error("connection timed out")]
    ConnectTimeout,

    /// Invalid response from server
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// NNTP protocol error with response code
    #[error("NNTP error {code}: {message}")]
    Protocol {
        /// NNTP response code (e.g., 480, 502)
        code: u16,
        /// Error message from server
        message: String,
    },

    /// Authentication failed
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// Connection closed unexpectedly
    #[error("connection closed")]
    ConnectionClosed,

    /// STAT reported the article missing (430)
    #[error("article not found: {0}")]
    StatMissing(String),

    /// STAT did not answer within its hard per-operation deadline
    #[error("STAT timed out for {0}")]
    StatTimeout(String),

    /// BODY reported the article missing (430)
    #[error("article body not found: {0}")]
    BodyMissing(String),

    /// BODY answered but carried no payload
    #[error("empty article body for {0}")]
    BodyError(String),

    /// yEnc decoding produced no output bytes
    #[error("no yEnc payload decoded")]
    DecodeError,

    /// The analyzer batch exceeded its health-check deadline
    #[error("health check deadline exceeded")]
    HealthCheckTimeout,

    /// The runner exhausted its total time budget
    #[error("triage time budget exhausted")]
    TriageTimeout,

    /// NZB document could not be parsed
    #[error("NZB parse error: {0}")]
    Xml(String),

    /// NZB payload fetch failed
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The connection pool is closed
    #[error("pool is closed")]
    PoolClosed,
}

impl TriageError {
    /// Stable error-code string, suitable for logs and decision warnings.
    ///
    /// Transport-level IO errors map to the POSIX-style names callers key
    /// off (`ETIMEDOUT`, `ECONNRESET`, `ECONNABORTED`, `EPIPE`).
    pub fn code(&self) -> &'static str {
        use std::io::ErrorKind;

        match self {
            TriageError::Io(e) => match e.kind() {
                ErrorKind::TimedOut => "ETIMEDOUT",
                ErrorKind::ConnectionReset => "ECONNRESET",
                ErrorKind::ConnectionAborted => "ECONNABORTED",
                ErrorKind::BrokenPipe => "EPIPE",
                ErrorKind::UnexpectedEof => "ECONNRESET",
                _ => "EIO",
            },
            TriageError::Tls(_) => "ETLS",
            TriageError::ConnectTimeout => "ETIMEDOUT",
            TriageError::InvalidResponse(_) => "EPROTO",
            TriageError::Protocol { .. } => "EPROTO",
            TriageError::AuthFailed(_) => "EAUTH",
            TriageError::ConnectionClosed => "ECONNRESET",
            TriageError::StatMissing(_) => "STAT_MISSING",
            TriageError::StatTimeout(_) => "STAT_TIMEOUT",
            TriageError::BodyMissing(_) => "BODY_MISSING",
            TriageError::BodyError(_) => "BODY_ERROR",
            TriageError::DecodeError => "DECODE_ERROR",
            TriageError::HealthCheckTimeout => "HEALTHCHECK_TIMEOUT",
            TriageError::TriageTimeout => "TRIAGE_TIMEOUT",
            TriageError::Xml(_) => "EXML",
            TriageError::Fetch(_) => "EFETCH",
            TriageError::PoolClosed => "EPOOLCLOSED",
        }
    }

    /// Whether the client that produced this error must be dropped from the
    /// pool rather than released back to it.
    ///
    /// A missing article (430) is a well-defined outcome, never a drop.
    pub fn drops_client(&self) -> bool {
        use std::io::ErrorKind;

        match self {
            TriageError::Io(e) => matches!(
                e.kind(),
                ErrorKind::TimedOut
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::UnexpectedEof
            ),
            TriageError::StatTimeout(_) => true,
            TriageError::ConnectionClosed => true,
            TriageError::InvalidResponse(_) => true,
            _ => false,
        }
    }

    /// Whether this error reports a missing article (NNTP 430), either via
    /// the response code or via "430" embedded in a relayed message.
    pub fn is_missing_article(&self) -> bool {
        match self {
            TriageError::StatMissing(_) | TriageError::BodyMissing(_) => true,
            TriageError::Protocol { code, message } => *code == 430 || message.contains("430"),
            _ => false,
        }
    }
}

/// Result type alias using TriageError
pub type Result<T> = std::result::Result<T, TriageError>;
