//! Consumer side of a transfer.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::batch::Batch;
use crate::error::Result;
use crate::progress::{NoProgress, Progress, TransferStats};
use crate::queue::BatchReceiver;
use crate::store::DestinationStore;

/// Drains the batch queue into a [`DestinationStore`].
///
/// Every pair is written with `RESTORE ... REPLACE` and the same fixed
/// expiration; existing destination keys are overwritten. The first failed
/// write ends the run and the remaining batches are never attempted.
pub struct Restorer<D> {
    destination: D,
    queue: BatchReceiver,
    ttl: Duration,
    stats: Arc<TransferStats>,
    progress: Arc<dyn Progress>,
}

impl<D: DestinationStore> Restorer<D> {
    /// Create a restorer writing every key with `ttl`.
    pub fn new(destination: D, queue: BatchReceiver, ttl: Duration) -> Self {
        Self {
            destination,
            queue,
            ttl,
            stats: Arc::new(TransferStats::new()),
            progress: Arc::new(NoProgress),
        }
    }

    /// Share counters with the rest of the run.
    pub fn with_stats(mut self, stats: Arc<TransferStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Report each applied batch.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    /// Apply batches until the queue is closed and drained.
    pub async fn run(mut self) -> Result<()> {
        while let Some(batch) = self.queue.next().await {
            self.apply(&batch).await?;
            self.stats.record_restored_batch();
            self.progress.on_restored(&batch);
        }
        debug!("queue drained");
        Ok(())
    }

    async fn apply(&mut self, batch: &Batch) -> Result<()> {
        debug!(seq = batch.seq(), keys = batch.len(), "restoring batch");
        for (key, dump) in batch {
            self.destination.restore(key, dump, self.ttl).await?;
            self.stats.record_restored_key(dump.len());
        }
        Ok(())
    }
}
