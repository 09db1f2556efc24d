//! Error taxonomy for the client.

use thiserror::Error;

use crate::generation::ApiGeneration;

/// Client error type.
///
/// `InvalidArgument` and `Unsupported` are detected before any request is
/// issued, so they can never leave partial side effects on the server.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed hash, empty required collection, blank required parameter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The resolved wire generation does not support the requested
    /// operation or parameter combination.
    #[error("operation requires API generation {required}")]
    Unsupported {
        /// Minimum generation that supports the operation.
        required: ApiGeneration,
    },
    /// Non-success HTTP status from the server, surfaced verbatim.
    #[error("server rejected request with status {status}: {message}")]
    ServerRejected { status: u16, message: String },
    /// Response body shape violates the documented contract.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// Connection, TLS, or body transfer failure.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The request context was cancelled before or during the round-trip.
    #[error("request cancelled")]
    Cancelled,
    /// The request context's deadline passed.
    #[error("deadline exceeded")]
    Timeout,
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn violation(msg: impl Into<String>) -> Self {
        Error::ProtocolViolation(msg.into())
    }

    pub(crate) fn requires(required: ApiGeneration) -> Self {
        Error::Unsupported { required }
    }

    /// True when the server generation cannot perform the operation.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Unsupported { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
