//! Error types for the harmony-protocol crate.

use thiserror::Error;

/// Errors raised while encoding or decoding hub protocol data.
///
/// Frame-level shape problems never surface as errors from the decode path
/// itself (an unrecognized frame degrades to `DecodedMessage::Unknown`);
/// these variants cover payload extraction, where the caller asked for a
/// specific shape and the hub sent something else.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// An activity id string was not a decimal integer
    #[error("invalid activity id: {0:?}")]
    InvalidActivityId(String),

    /// A reply payload was missing or did not match the expected shape
    #[error("malformed reply payload for {kind}: {detail}")]
    MalformedReply {
        /// The request kind whose reply failed to parse
        kind: &'static str,
        /// What was wrong with it
        detail: String,
    },

    /// A JSON payload failed to parse
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An embedded action blob was missing a required field
    #[error("action is missing field {0:?}")]
    MissingActionField(&'static str),
}

/// Convenience alias for Results using ProtocolError.
pub type Result<T> = std::result::Result<T, ProtocolError>;
