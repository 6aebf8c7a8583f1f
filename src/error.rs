//! Error types for the mirage crate.

use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during HTTP operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown browser profile name.
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    /// Malformed per-request override (Header-Order, PHeader-Order, ...).
    #[error("Invalid override: {0}")]
    InvalidOverride(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// DNS resolution failure.
    #[error("DNS error: {0}")]
    Dns(String),

    /// TLS or QUIC handshake failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Certificate chain did not verify.
    #[error("Certificate verification failed: {0}")]
    CertVerification(String),

    /// ALPN negotiation produced no usable protocol.
    #[error("No protocol negotiated: {0}")]
    NoProtocolNegotiated(String),

    /// QUIC version negotiation received from peer.
    #[error("QUIC version negotiation (peer offered {advertised:?})")]
    VersionNegotiation { advertised: Vec<u32> },

    /// A cached resumption ticket was rejected by the peer.
    #[error("TLS session ticket rejected: {0}")]
    TicketInvalid(String),

    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// Peer reset the stream.
    #[error("Stream reset by peer (error code {code})")]
    StreamReset { code: u64 },

    /// Peer sent GOAWAY; streams above `last_stream_id` were not processed.
    #[error("GOAWAY received (last stream {last_stream_id})")]
    GoAway { last_stream_id: u32 },

    /// Connection closed mid-response; the body may be truncated.
    #[error("Connection closed mid-response ({received} bytes received)")]
    TruncatedBody { received: usize },

    /// QUIC/HTTP3 error.
    #[error("QUIC error: {0}")]
    Quic(String),

    /// Cookie parsing error.
    #[error("Cookie parse error: {0}")]
    CookieParse(String),

    /// Decompression error.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Session snapshot import/export error.
    #[error("Snapshot error: {0}")]
    Snapshot(String),

    /// Redirect limit exceeded.
    #[error("Redirect limit exceeded ({count} redirects)")]
    RedirectLimit { count: u32 },

    /// Invalid redirect URL.
    #[error("Invalid redirect URL: {0}")]
    InvalidRedirectUrl(String),

    /// Connection-level retry budget exhausted.
    #[error("Retry limit exceeded")]
    RetryLimit,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Missing required field or data.
    #[error("Missing required: {0}")]
    Missing(String),

    /// Timeout error.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Connection error.
    #[error("Connection error: {0}")]
    Connection(String),

    /// TLS/SSL error outside the handshake.
    #[error("TLS error: {0}")]
    Tls(String),
}

impl Error {
    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create a handshake error.
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake(message.into())
    }

    /// Create a QUIC error.
    pub fn quic(message: impl Into<String>) -> Self {
        Self::Quic(message.into())
    }

    /// Create a DNS error.
    pub fn dns(message: impl Into<String>) -> Self {
        Self::Dns(message.into())
    }

    /// Create a missing field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::Missing(field.into())
    }

    /// True when the failure means the origin does not speak the attempted
    /// protocol. Only these failures demote the origin's capability record;
    /// network errors leave it untouched.
    pub fn is_protocol_unsupported(&self) -> bool {
        matches!(
            self,
            Error::NoProtocolNegotiated(_) | Error::VersionNegotiation { .. }
        )
    }

    /// True for failures caused by the network rather than the peer's
    /// protocol support: these neither promote nor demote capability state.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::Dns(_) | Error::Connection(_) | Error::Io(_) | Error::Timeout(_)
        )
    }

    /// True when the request may be transparently retried on a fresh
    /// connection: the peer refused or abandoned the stream before
    /// processing it.
    pub fn is_retryable_on_new_connection(&self) -> bool {
        match self {
            Error::GoAway { .. } => true,
            Error::StreamReset { code } => *code == h2_error_codes::REFUSED_STREAM,
            _ => false,
        }
    }
}

/// HTTP/2 error codes referenced by the retry classification.
pub mod h2_error_codes {
    pub const NO_ERROR: u64 = 0x0;
    pub const REFUSED_STREAM: u64 = 0x7;
    pub const CANCEL: u64 = 0x8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_unsupported_classification() {
        assert!(Error::NoProtocolNegotiated("alpn".into()).is_protocol_unsupported());
        assert!(Error::VersionNegotiation { advertised: vec![1] }.is_protocol_unsupported());
        assert!(!Error::Timeout("dial".into()).is_protocol_unsupported());
        assert!(!Error::Connection("refused".into()).is_protocol_unsupported());
    }

    #[test]
    fn network_errors_do_not_retry_streams() {
        assert!(Error::GoAway { last_stream_id: 0 }.is_retryable_on_new_connection());
        assert!(Error::StreamReset {
            code: h2_error_codes::REFUSED_STREAM
        }
        .is_retryable_on_new_connection());
        assert!(!Error::StreamReset {
            code: h2_error_codes::CANCEL
        }
        .is_retryable_on_new_connection());
        assert!(!Error::Timeout("read".into()).is_retryable_on_new_connection());
    }
}
