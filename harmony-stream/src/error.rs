//! Error types for the harmony-stream crate.

use thiserror::Error;

/// Errors establishing a session with a hub.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The hub refused or dropped the TCP/WebSocket connection
    #[error("connection refused: {0}")]
    Refused(std::io::Error),

    /// The bounded connect/handshake deadline passed
    #[error("connect timed out")]
    Timeout,

    /// The hub rejected our credentials during the handshake
    #[error("authentication rejected: {0}")]
    AuthRejected(String),

    /// The remote side did not speak the expected protocol
    #[error("protocol mismatch: {0}")]
    ProtocolMismatch(String),

    /// The session configuration failed validation
    #[error(transparent)]
    Config(#[from] ConfigurationError),
}

/// Errors on an established connection.
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on the underlying stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame exceeded the codec's size bound
    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    /// A frame was not valid UTF-8
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// The connection is closed
    #[error("connection closed")]
    Closed,
}

/// Invalid session configuration.
#[derive(Debug, Error)]
#[error("configuration error: {0}")]
pub struct ConfigurationError(pub String);

/// Errors surfaced to callers of correlated request operations.
#[derive(Debug, Error)]
pub enum RequestError {
    /// No reply arrived within the deadline. For some request kinds the
    /// hub simply never replies under load; callers apply a per-kind
    /// policy rather than treating this as exceptional.
    #[error("request timed out")]
    TimedOut,

    /// The hub replied with a non-success status code
    #[error("hub returned error code {0}")]
    Hub(String),

    /// The session is not established (never connected, or connection lost)
    #[error("not connected to hub")]
    Disconnected,

    /// The reply arrived but its payload did not match the expected shape
    #[error("malformed reply: {0}")]
    MalformedReply(#[from] harmony_protocol::ProtocolError),
}
