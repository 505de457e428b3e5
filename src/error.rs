//! Error types for rump
//!
//! Every failure in the transfer pipeline is fatal, so a single error enum is
//! returned up through both the scanner and the restorer. The binary maps it to
//! a process exit status with [`Error::exit_code`].

use std::io;

use bytes::Bytes;
use thiserror::Error;

/// Main error type for transfer operations
#[derive(Error, Debug)]
pub enum Error {
    /// Underlying socket I/O error
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The store replied with a RESP error
    #[error("server error: {0}")]
    Server(String),

    /// Malformed or unexpected RESP data
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A reply had the wrong shape for the command that was sent
    #[error("unexpected response type: expected {expected}, got {actual}")]
    UnexpectedResponse {
        /// What the command should have returned.
        expected: &'static str,
        /// What came back instead.
        actual: String,
    },

    /// The peer closed the connection
    #[error("connection closed")]
    ConnectionClosed,

    /// A connection string could not be parsed
    #[error("invalid store url '{url}': {reason}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A scanned key vanished before its dump was fetched
    #[error("key not found: {}", String::from_utf8_lossy(.0))]
    KeyNotFound(Bytes),

    /// The other end of the batch queue went away
    #[error("batch queue closed by the restorer")]
    QueueClosed,

    /// The run was cancelled before the keyspace walk finished
    #[error("transfer cancelled")]
    Cancelled,

    /// A pipeline task panicked or was aborted
    #[error("task failed: {0}")]
    TaskFailed(String),

    /// Invalid transfer configuration
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for transfer operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Process exit status for this error.
    ///
    /// | code | meaning |
    /// |------|---------|
    /// | 2    | bad url or configuration |
    /// | 3    | connection or transport failure |
    /// | 4    | data error (missing key, server or protocol error) |
    /// | 130  | cancelled |
    /// | 1    | anything else |
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::InvalidUrl { .. } | Error::Config(_) => 2,
            Error::Io(_) | Error::ConnectionClosed => 3,
            Error::KeyNotFound(_)
            | Error::Server(_)
            | Error::Protocol(_)
            | Error::UnexpectedResponse { .. } => 4,
            Error::Cancelled => 130,
            Error::QueueClosed | Error::TaskFailed(_) => 1,
        }
    }

    /// Returns true if the error came from the network rather than the data.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::ConnectionClosed)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::TaskFailed("scanner task aborted".into())
        } else {
            Error::TaskFailed(err.to_string())
        }
    }
}
