//! Error types for devlink-tls
//!
//! Establishment, read, and write failures each carry the layer that produced
//! them: socket errors keep their `io::Error` source, engine failures keep the
//! [`EngineError`](crate::engine::EngineError) the TLS engine reported.
//!
//! Two conditions are deliberately not errors: a write that makes zero
//! progress returns `Ok(0)`, and a peer-initiated shutdown surfaces as
//! [`ReadOutcome::Closed`](crate::connection::ReadOutcome::Closed).

use crate::engine::EngineError;

/// Result type alias using the crate's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or using a connection.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No resolved address accepted a connection, or resolution itself
    /// failed. Carries the last attempt's error.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The engine or an option builder rejected the configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The TLS handshake failed with a fatal engine error.
    #[error("handshake failed: {0}")]
    Handshake(#[source] EngineError),

    /// A fatal engine error occurred while reading.
    #[error("read failed: {0}")]
    Read(#[source] EngineError),

    /// A fatal engine error occurred while writing.
    #[error("write failed: {0}")]
    Write(#[source] EngineError),

    /// A lifecycle transition was requested that the state machine forbids.
    #[error("invalid connection state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },
}

impl Error {
    /// Returns `true` when the error came out of the establishment path
    /// (connect, configuration, or handshake).
    pub fn is_establishment(&self) -> bool {
        matches!(
            self,
            Error::Connect(_) | Error::Config(_) | Error::Handshake(_)
        )
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config(msg) => Error::Config(msg),
            other => Error::Handshake(other),
        }
    }
}
