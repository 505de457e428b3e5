//! Producer side of a transfer.
//!
//! The scanner walks the source keyspace with SCAN, fetches the dump of every
//! key each step returns and publishes one [`Batch`] per step. The queue is
//! closed right after the batch of the terminal step (cursor 0) has been
//! published, so the restorer sees exactly as many batches as there were scan
//! steps.

use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::batch::Batch;
use crate::config::{MissingKeyPolicy, TransferConfig};
use crate::error::{Error, Result};
use crate::progress::{NoProgress, Progress, TransferStats};
use crate::queue::BatchSender;
use crate::store::{Cursor, ScanPage, SourceStore};

/// Walks a [`SourceStore`] and feeds the batch queue.
pub struct Scanner<S> {
    source: S,
    queue: BatchSender,
    scan_count: Option<u64>,
    missing_keys: MissingKeyPolicy,
    stats: Arc<TransferStats>,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
}

impl<S: SourceStore> Scanner<S> {
    /// Create a scanner reading from `source` into `queue`.
    pub fn new(source: S, queue: BatchSender, config: &TransferConfig) -> Self {
        Self {
            source,
            queue,
            scan_count: config.scan_count,
            missing_keys: config.missing_keys,
            stats: Arc::new(TransferStats::new()),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
        }
    }

    /// Share counters with the rest of the run.
    pub fn with_stats(mut self, stats: Arc<TransferStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Report each published batch.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop publishing once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Walk the whole keyspace, then close the queue.
    ///
    /// On any error the queue is closed by dropping the sender and the source
    /// is released; batches already published stay deliverable.
    pub async fn run(self) -> Result<()> {
        let Scanner {
            mut source,
            queue,
            scan_count,
            missing_keys,
            stats,
            progress,
            cancel,
        } = self;

        let mut cursor = Cursor::START;
        let mut seq = 0u64;

        loop {
            if cancel.is_cancelled() {
                debug!(seq, "scan cancelled");
                return Err(Error::Cancelled);
            }

            let page = source.scan(cursor, scan_count).await?;
            let next = page.cursor;
            let (batch, skipped) = fetch_batch(&mut source, seq, page, missing_keys).await?;

            debug!(
                seq,
                cursor = %next,
                keys = batch.len(),
                skipped,
                pending = queue.pending(),
                "scanned batch"
            );

            let slot = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(seq, "scan cancelled before publish");
                    return Err(Error::Cancelled);
                }
                slot = queue.reserve() => slot?,
            };
            // Only published batches are counted.
            stats.record_scanned(&batch, skipped);
            progress.on_scanned(&batch);
            slot.send(batch);

            if next.is_terminal() {
                break;
            }
            cursor = next;
            seq += 1;
        }

        debug!(batches = seq + 1, "scan complete, closing queue");
        queue.close();
        Ok(())
    }
}

/// Dump every key of one scan step into a batch. Returns the batch and the
/// number of keys skipped because they vanished.
async fn fetch_batch<S: SourceStore>(
    source: &mut S,
    seq: u64,
    page: ScanPage,
    missing_keys: MissingKeyPolicy,
) -> Result<(Batch, u64)> {
    if page.keys.is_empty() {
        return Ok((Batch::new(seq), 0));
    }

    let dumps = source.dump(&page.keys).await?;
    if dumps.len() != page.keys.len() {
        return Err(Error::Protocol(format!(
            "asked for {} dumps, got {}",
            page.keys.len(),
            dumps.len()
        )));
    }

    let mut batch = Batch::with_capacity(seq, page.keys.len());
    let mut skipped = 0;
    for (key, dump) in page.keys.into_iter().zip(dumps) {
        match dump {
            Some(dump) => batch.insert(key, dump),
            None => {
                skip_or_fail(key, missing_keys)?;
                skipped += 1;
            }
        }
    }
    Ok((batch, skipped))
}

fn skip_or_fail(key: Bytes, policy: MissingKeyPolicy) -> Result<()> {
    match policy {
        MissingKeyPolicy::Fail => Err(Error::KeyNotFound(key)),
        MissingKeyPolicy::Skip => {
            warn!(key = %String::from_utf8_lossy(&key), "key vanished before dump, skipping");
            Ok(())
        }
    }
}
