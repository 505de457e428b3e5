//! RESP2 reply values.

use std::fmt;

use bytes::Bytes;

use crate::error::{Error, Result};

/// A single RESP2 value as read off the wire.
///
/// Server error replies are kept as [`Reply::Error`] rather than being turned
/// into an `Err` at decode time, so a pipelined read keeps the stream aligned
/// even when one of the queued commands fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple string: `+OK\r\n`
    Status(String),

    /// Error: `-ERR message\r\n`
    Error(String),

    /// Integer: `:1000\r\n`
    Integer(i64),

    /// Bulk string: `$5\r\nhello\r\n`
    Bulk(Bytes),

    /// Array: `*2\r\n...`
    Array(Vec<Reply>),

    /// Null bulk string or null array: `$-1\r\n` / `*-1\r\n`
    Nil,
}

impl Reply {
    /// Create a bulk reply from anything convertible into `Bytes`.
    #[inline]
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Create a status reply.
    #[inline]
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Create an error reply.
    #[cold]
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    /// Turn an error reply into [`Error::Server`], passing every other reply
    /// through unchanged.
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(msg) => Err(Error::Server(msg)),
            other => Ok(other),
        }
    }

    /// Expect a `+OK` status.
    pub fn expect_ok(self) -> Result<()> {
        match self.into_result()? {
            Reply::Status(ref s) if s == "OK" => Ok(()),
            other => Err(Error::UnexpectedResponse {
                expected: "OK",
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Convert into bulk bytes. Nil maps to `None`.
    pub fn into_optional_bytes(self) -> Result<Option<Bytes>> {
        match self.into_result()? {
            Reply::Bulk(b) => Ok(Some(b)),
            Reply::Nil => Ok(None),
            other => Err(Error::UnexpectedResponse {
                expected: "bulk string",
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Convert into bulk bytes, rejecting nil.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self.into_result()? {
            Reply::Bulk(b) => Ok(b),
            Reply::Status(s) => Ok(Bytes::from(s)),
            other => Err(Error::UnexpectedResponse {
                expected: "bulk string",
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Convert into the element list of an array reply.
    pub fn into_array(self) -> Result<Vec<Reply>> {
        match self.into_result()? {
            Reply::Array(items) => Ok(items),
            Reply::Nil => Ok(Vec::new()),
            other => Err(Error::UnexpectedResponse {
                expected: "array",
                actual: other.type_name().to_string(),
            }),
        }
    }

    /// Human-readable type name, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(_) => "bulk string",
            Reply::Array(_) => "array",
            Reply::Nil => "nil",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "<binary {} bytes>", b.len()),
            },
            Reply::Array(items) => write!(f, "(array of {})", items.len()),
            Reply::Nil => write!(f, "(nil)"),
        }
    }
}
