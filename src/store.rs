//! The two store roles of a transfer.
//!
//! The scanner only reads through [`SourceStore`] and the restorer only writes
//! through [`DestinationStore`]. [`Connection`] implements both over the wire
//! (`SCAN` / `DUMP` / `RESTORE`); [`MemoryStore`](crate::memory::MemoryStore)
//! implements both in-process.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::Reply;

/// Opaque SCAN position. `Cursor::START` both begins and ends a full walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Cursor(pub u64);

impl Cursor {
    /// Beginning of the keyspace; also returned when the walk is complete.
    pub const START: Cursor = Cursor(0);

    /// True when this cursor ends the walk.
    #[inline]
    pub fn is_terminal(self) -> bool {
        self == Self::START
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One step of a keyspace walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPage {
    /// Where the next step starts.
    pub cursor: Cursor,
    /// Keys discovered by this step (possibly none).
    pub keys: Vec<Bytes>,
}

/// Read side of a transfer.
#[async_trait]
pub trait SourceStore: Send {
    /// Run one scan step from `cursor`. `count` is a page-size hint.
    async fn scan(&mut self, cursor: Cursor, count: Option<u64>) -> Result<ScanPage>;

    /// Fetch the serialized dump of every key, in order. A key that no
    /// longer exists yields `None`.
    async fn dump(&mut self, keys: &[Bytes]) -> Result<Vec<Option<Bytes>>>;
}

/// Write side of a transfer.
#[async_trait]
pub trait DestinationStore: Send {
    /// Write `dump` under `key` with the given time-to-live, replacing any
    /// existing value.
    async fn restore(&mut self, key: &Bytes, dump: &Bytes, ttl: Duration) -> Result<()>;
}

#[async_trait]
impl SourceStore for Connection {
    async fn scan(&mut self, cursor: Cursor, count: Option<u64>) -> Result<ScanPage> {
        let mut args = vec![Bytes::from_static(b"SCAN"), Bytes::from(cursor.0.to_string())];
        if let Some(count) = count {
            args.push(Bytes::from_static(b"COUNT"));
            args.push(Bytes::from(count.to_string()));
        }
        parse_scan_reply(self.execute(&args).await?)
    }

    async fn dump(&mut self, keys: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        let commands: Vec<Vec<Bytes>> = keys
            .iter()
            .map(|key| vec![Bytes::from_static(b"DUMP"), key.clone()])
            .collect();
        self.pipeline(&commands)
            .await?
            .into_iter()
            .map(Reply::into_optional_bytes)
            .collect()
    }
}

#[async_trait]
impl DestinationStore for Connection {
    async fn restore(&mut self, key: &Bytes, dump: &Bytes, ttl: Duration) -> Result<()> {
        self.execute(&[
            Bytes::from_static(b"RESTORE"),
            key.clone(),
            Bytes::from(ttl.as_millis().to_string()),
            dump.clone(),
            Bytes::from_static(b"REPLACE"),
        ])
        .await?
        .expect_ok()
    }
}

/// Decode `[cursor, [key, ...]]`.
pub(crate) fn parse_scan_reply(reply: Reply) -> Result<ScanPage> {
    let mut parts = reply.into_array()?.into_iter();
    let (Some(cursor), Some(keys), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(Error::Protocol("SCAN reply must have 2 elements".into()));
    };

    let cursor = cursor.into_bytes()?;
    let cursor = std::str::from_utf8(&cursor)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Cursor)
        .ok_or_else(|| Error::Protocol("SCAN cursor is not an unsigned integer".into()))?;

    let keys = keys
        .into_array()?
        .into_iter()
        .map(Reply::into_bytes)
        .collect::<Result<Vec<_>>>()?;

    Ok(ScanPage { cursor, keys })
}
