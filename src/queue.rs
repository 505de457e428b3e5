//! Bounded batch queue between the scanner and the restorer.
//!
//! A thin wrapper over `tokio::sync::mpsc`: FIFO, fixed capacity, one
//! producer and one consumer. Publishing waits while the queue is full and
//! receiving waits while it is empty. The queue is closed by consuming the
//! sender with [`BatchSender::close`] (or by dropping it); the receiver then
//! drains whatever is left before reporting the end.

use tokio::sync::mpsc;

use crate::batch::Batch;
use crate::error::{Error, Result};

/// Create a queue holding at most `capacity` unconsumed batches.
pub fn bounded(capacity: usize) -> Result<(BatchSender, BatchReceiver)> {
    if capacity == 0 {
        return Err(Error::Config("queue capacity must be at least 1".into()));
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((BatchSender { tx }, BatchReceiver { rx }))
}

/// Producer half, owned by the scanner.
#[derive(Debug)]
pub struct BatchSender {
    tx: mpsc::Sender<Batch>,
}

impl BatchSender {
    /// Enqueue a batch, waiting for a free slot.
    ///
    /// Fails with [`Error::QueueClosed`] if the receiver is gone.
    pub async fn publish(&self, batch: Batch) -> Result<()> {
        self.reserve().await?.send(batch);
        Ok(())
    }

    /// Wait for a free slot without publishing yet.
    ///
    /// The slot is held until [`BatchSlot::send`] fills it or the slot is
    /// dropped. Fails with [`Error::QueueClosed`] if the receiver is gone.
    pub async fn reserve(&self) -> Result<BatchSlot<'_>> {
        let permit = self.tx.reserve().await.map_err(|_| Error::QueueClosed)?;
        Ok(BatchSlot { permit })
    }

    /// Close the queue. Batches already published are still delivered.
    pub fn close(self) {
        drop(self.tx);
    }

    /// Number of batches published but not yet received.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// A reserved place in the queue.
#[derive(Debug)]
pub struct BatchSlot<'a> {
    permit: mpsc::Permit<'a, Batch>,
}

impl BatchSlot<'_> {
    /// Publish `batch` into the reserved slot. Never waits.
    pub fn send(self, batch: Batch) {
        self.permit.send(batch);
    }
}

/// Consumer half, owned by the restorer.
#[derive(Debug)]
pub struct BatchReceiver {
    rx: mpsc::Receiver<Batch>,
}

impl BatchReceiver {
    /// Next batch in publish order, or `None` once the queue is closed and
    /// drained.
    pub async fn next(&mut self) -> Option<Batch> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(bounded(0), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_fifo_and_drain_after_close() {
        let (tx, mut rx) = bounded(4).unwrap();
        for seq in 0..3 {
            tx.publish(Batch::new(seq)).await.unwrap();
        }
        assert_eq!(tx.pending(), 3);
        tx.close();

        let mut order = Vec::new();
        while let Some(batch) = rx.next().await {
            order.push(batch.seq());
        }
        assert_eq!(order, vec![0, 1, 2]);
        assert!(rx.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_waits_when_full() {
        let (tx, mut rx) = bounded(2).unwrap();
        tx.publish(Batch::new(0)).await.unwrap();
        tx.publish(Batch::new(1)).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_secs(1), tx.publish(Batch::new(2))).await;
        assert!(blocked.is_err(), "third publish should wait for a free slot");

        assert_eq!(rx.next().await.map(|b| b.seq()), Some(0));
        tx.publish(Batch::new(2)).await.unwrap();
        assert_eq!(tx.pending(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reserved_slot_counts_against_capacity() {
        let (tx, mut rx) = bounded(1).unwrap();
        let slot = tx.reserve().await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_secs(1), tx.reserve()).await;
        assert!(blocked.is_err(), "only one slot exists");

        slot.send(Batch::new(7));
        assert_eq!(rx.next().await.map(|b| b.seq()), Some(7));

        // A dropped slot frees its place without publishing anything.
        drop(tx.reserve().await.unwrap());
        tx.publish(Batch::new(8)).await.unwrap();
        assert_eq!(rx.next().await.map(|b| b.seq()), Some(8));
    }

    #[tokio::test]
    async fn test_publish_after_receiver_dropped() {
        let (tx, rx) = bounded(1).unwrap();
        drop(rx);
        assert!(matches!(
            tx.publish(Batch::new(0)).await,
            Err(Error::QueueClosed)
        ));
        assert!(matches!(tx.reserve().await, Err(Error::QueueClosed)));
    }
}
