//! In-process store.
//!
//! [`MemoryStore`] keeps dumps in a sorted map and implements both store
//! roles, which makes it usable as a transfer endpoint without a server. Its
//! SCAN cursor is the position in key order; a scripted walk can replace that
//! when a test needs exact control over the pages a source hands out.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::store::{Cursor, DestinationStore, ScanPage, SourceStore};

/// Keys returned per scan step when no hint is given (Redis' own default).
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// A stored dump and the expiration it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Opaque serialized value.
    pub dump: Bytes,
    /// Time-to-live given at write time, if any.
    pub ttl: Option<Duration>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: BTreeMap<Bytes, Entry>,
    page_size: Option<usize>,
    script: Option<HashMap<Cursor, ScanPage>>,
    scans: u64,
    restores: u64,
}

/// Shared handle to an in-memory keyspace. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given key/dump pairs, without expiration.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Bytes>,
        V: Into<Bytes>,
    {
        let store = Self::new();
        for (k, v) in pairs {
            store.insert(k, v);
        }
        store
    }

    /// Fix the number of keys returned per scan step, overriding any hint.
    pub fn with_page_size(self, page_size: usize) -> Self {
        self.inner.lock().page_size = Some(page_size.max(1));
        self
    }

    /// Replace the positional walk with explicit pages: scanning from a
    /// cursor in `steps` returns the page mapped to it. Dumps are still
    /// looked up in the stored entries.
    pub fn with_scan_script(self, steps: impl IntoIterator<Item = (Cursor, ScanPage)>) -> Self {
        self.inner.lock().script = Some(steps.into_iter().collect());
        self
    }

    /// Insert or replace a key without expiration.
    pub fn insert(&self, key: impl Into<Bytes>, dump: impl Into<Bytes>) {
        self.inner.lock().entries.insert(
            key.into(),
            Entry {
                dump: dump.into(),
                ttl: None,
            },
        );
    }

    /// Remove a key, returning whether it existed.
    pub fn remove(&self, key: &[u8]) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    /// Look up a key.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Returns true when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Copy of every key and its dump.
    pub fn dumps(&self) -> BTreeMap<Bytes, Bytes> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.dump.clone()))
            .collect()
    }

    /// Copy of every entry, including expirations.
    pub fn entries(&self) -> BTreeMap<Bytes, Entry> {
        self.inner.lock().entries.clone()
    }

    /// Number of scan steps served.
    pub fn scan_calls(&self) -> u64 {
        self.inner.lock().scans
    }

    /// Number of restore writes accepted.
    pub fn restore_calls(&self) -> u64 {
        self.inner.lock().restores
    }
}

#[async_trait]
impl SourceStore for MemoryStore {
    async fn scan(&mut self, cursor: Cursor, count: Option<u64>) -> Result<ScanPage> {
        let mut inner = self.inner.lock();
        inner.scans += 1;

        if let Some(script) = &inner.script {
            return script
                .get(&cursor)
                .cloned()
                .ok_or_else(|| Error::Server(format!("ERR invalid cursor {}", cursor)));
        }

        let page = inner
            .page_size
            .or(count.map(|c| c.max(1) as usize))
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let start = cursor.0 as usize;
        if start > inner.entries.len() {
            return Err(Error::Server(format!("ERR invalid cursor {}", cursor)));
        }

        let keys: Vec<Bytes> = inner
            .entries
            .keys()
            .skip(start)
            .take(page)
            .cloned()
            .collect();
        let end = start + keys.len();
        let next = if end >= inner.entries.len() {
            Cursor::START
        } else {
            Cursor(end as u64)
        };

        Ok(ScanPage { cursor: next, keys })
    }

    async fn dump(&mut self, keys: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        let inner = self.inner.lock();
        Ok(keys
            .iter()
            .map(|k| inner.entries.get(k).map(|e| e.dump.clone()))
            .collect())
    }
}

#[async_trait]
impl DestinationStore for MemoryStore {
    async fn restore(&mut self, key: &Bytes, dump: &Bytes, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.restores += 1;
        inner.entries.insert(
            key.clone(),
            Entry {
                dump: dump.clone(),
                ttl: Some(ttl),
            },
        );
        Ok(())
    }
}
