//! Liveness markers and transfer counters.
//!
//! Markers are a heartbeat for the operator, not a correctness signal: the
//! scanner emits one per published batch and the restorer one per applied
//! batch. Counters are shared by both tasks and read once at the end.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;

use crate::batch::Batch;

/// Receives one callback per scanned and per restored batch.
pub trait Progress: Send + Sync {
    /// A batch was published by the scanner.
    fn on_scanned(&self, batch: &Batch);

    /// A batch was fully written by the restorer.
    fn on_restored(&self, batch: &Batch);
}

/// Discards all progress.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn on_scanned(&self, _batch: &Batch) {}
    fn on_restored(&self, _batch: &Batch) {}
}

/// Prints `>` per scanned batch and `.` per restored batch.
pub struct ConsoleProgress<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleProgress<io::Stderr> {
    /// Markers on stderr, leaving stdout for the final report.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> ConsoleProgress<W> {
    /// Markers on an arbitrary writer.
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn mark(&self, marker: &[u8]) {
        let mut out = self.out.lock();
        // A broken terminal must not fail the transfer.
        let _ = out.write_all(marker).and_then(|_| out.flush());
    }
}

impl<W: Write + Send> Progress for ConsoleProgress<W> {
    fn on_scanned(&self, _batch: &Batch) {
        self.mark(b">");
    }

    fn on_restored(&self, _batch: &Batch) {
        self.mark(b".");
    }
}

/// Counters updated by the scanner and the restorer.
#[derive(Debug, Default)]
pub struct TransferStats {
    batches_scanned: AtomicU64,
    keys_scanned: AtomicU64,
    keys_skipped: AtomicU64,
    batches_restored: AtomicU64,
    keys_restored: AtomicU64,
    bytes_restored: AtomicU64,
}

impl TransferStats {
    /// Fresh zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_scanned(&self, batch: &Batch, skipped: u64) {
        self.batches_scanned.fetch_add(1, Ordering::Relaxed);
        self.keys_scanned
            .fetch_add(batch.len() as u64 + skipped, Ordering::Relaxed);
        self.keys_skipped.fetch_add(skipped, Ordering::Relaxed);
    }

    pub(crate) fn record_restored_key(&self, dump_len: usize) {
        self.keys_restored.fetch_add(1, Ordering::Relaxed);
        self.bytes_restored
            .fetch_add(dump_len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_restored_batch(&self) {
        self.batches_restored.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            batches_scanned: self.batches_scanned.load(Ordering::Relaxed),
            keys_scanned: self.keys_scanned.load(Ordering::Relaxed),
            keys_skipped: self.keys_skipped.load(Ordering::Relaxed),
            batches_restored: self.batches_restored.load(Ordering::Relaxed),
            keys_restored: self.keys_restored.load(Ordering::Relaxed),
            bytes_restored: self.bytes_restored.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`TransferStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Batches published by the scanner.
    pub batches_scanned: u64,
    /// Keys returned by SCAN, including skipped ones.
    pub keys_scanned: u64,
    /// Keys that vanished before DUMP and were skipped.
    pub keys_skipped: u64,
    /// Batches fully applied to the destination.
    pub batches_restored: u64,
    /// Keys written to the destination.
    pub keys_restored: u64,
    /// Total dump bytes written.
    pub bytes_restored: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_console_markers() {
        let progress = ConsoleProgress::new(Vec::new());
        let batch = Batch::new(0);
        progress.on_scanned(&batch);
        progress.on_scanned(&batch);
        progress.on_restored(&batch);
        assert_eq!(progress.into_inner(), b">>.");
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = TransferStats::new();
        let mut batch = Batch::new(0);
        batch.insert(Bytes::from("a"), Bytes::from("xyz"));
        stats.record_scanned(&batch, 2);
        stats.record_restored_key(3);
        stats.record_restored_batch();

        let snap = stats.snapshot();
        assert_eq!(snap.batches_scanned, 1);
        assert_eq!(snap.keys_scanned, 3);
        assert_eq!(snap.keys_skipped, 2);
        assert_eq!(snap.keys_restored, 1);
        assert_eq!(snap.bytes_restored, 3);
        assert_eq!(snap.batches_restored, 1);
    }
}
