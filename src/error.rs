//! Error types

use crate::protocol::message::ErrorFields;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by connection negotiation, authentication, and session management
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Failed to open the underlying transport (TCP connect, Unix socket connect)
    #[error("failed to open connection: {0}")]
    TransportOpen(#[source] std::io::Error),

    /// Read/write failure on an already-established transport
    #[error("transport I/O error: {0}")]
    TransportIo(#[source] std::io::Error),

    /// The server's response to SSLRequest was neither 'S' nor 'N'
    #[error("Could not check if server accepts SSL connections: {0}")]
    TlsAvailability(String),

    /// TLS handshake failed after the server agreed to negotiate
    #[error("TLS handshake failed: {source}")]
    TlsHandshake {
        /// True when the failure was specifically certificate validation
        invalid_certificate: bool,
        /// Human-readable detail from the TLS library
        source: String,
    },

    /// Server sent an ErrorResponse
    #[error("{0}")]
    Postgres(ErrorFields),

    /// Authentication sub-protocol failed (bad nonce, bad server signature, missing password, ...)
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Server requested an authentication method this client does not implement
    #[error("unsupported authentication method: {0}")]
    UnsupportedAuthenticationMethod(i32),

    /// A user operation was attempted on a client with no live session and no retries left
    #[error("The client has been disconnected from the database")]
    ClientDisconnected,

    /// The running session was terminated by the server (EOF or FATAL 57P01) mid-operation
    #[error("The session was terminated by the database")]
    ConnectionLost,

    /// Malformed or unexpected wire data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid configuration (bad hostname, missing TLS config for a TLS-requiring path, ...)
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ErrorFields> for Error {
    fn from(fields: ErrorFields) -> Self {
        Error::Postgres(fields)
    }
}

impl Error {
    /// Whether the Controller's handshake retry loop should retry on this error.
    ///
    /// Only transport-open, transport-io, and TLS-availability errors are
    /// retried. Authentication, protocol, and certificate-validity failures
    /// are never retried.
    pub fn is_retry_eligible(&self) -> bool {
        matches!(
            self,
            Error::TransportOpen(_) | Error::TransportIo(_) | Error::TlsAvailability(_)
        )
    }
}
