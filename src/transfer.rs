//! Running a transfer end to end.
//!
//! [`run`] wires a scanner and a restorer together through a bounded queue.
//! The scanner runs as its own task and the restorer runs on the caller's
//! task. The first error from either side ends the run:
//!
//! - scanner failure: the restorer future is dropped, releasing the
//!   destination, and the error is returned.
//! - restorer failure: the scanner task is cancelled and aborted, releasing
//!   the source, and the error is returned.
//! - cancellation: the scanner stops publishing and closes the queue, the
//!   restorer applies what was already queued, then [`Error::Cancelled`] is
//!   returned.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::TransferConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::progress::{Progress, StatsSnapshot, TransferStats};
use crate::queue;
use crate::restorer::Restorer;
use crate::scanner::Scanner;
use crate::store::{DestinationStore, SourceStore};
use crate::url::StoreUrl;

/// Outcome of a successful transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Final counters.
    #[serde(flatten)]
    pub stats: StatsSnapshot,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
    /// Queue depth used.
    pub queue_capacity: usize,
    /// Expiration given to restored keys, in seconds.
    pub restore_ttl_secs: u64,
}

impl TransferReport {
    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} keys in {} batches ({} bytes) in {:.2}s",
            self.stats.keys_restored,
            self.stats.batches_restored,
            self.stats.bytes_restored,
            self.elapsed().as_secs_f64()
        )?;
        if self.stats.keys_skipped > 0 {
            write!(f, ", {} skipped", self.stats.keys_skipped)?;
        }
        Ok(())
    }
}

/// Copy every key of `source` into `destination`.
///
/// `cancel` is observed but never triggered by the run itself; a child token
/// is used internally to stop the scanner after a restore failure.
pub async fn run<S, D>(
    source: S,
    destination: D,
    config: &TransferConfig,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
) -> Result<TransferReport>
where
    S: SourceStore + 'static,
    D: DestinationStore,
{
    config.validate()?;
    let started = Instant::now();
    let stats = Arc::new(TransferStats::new());
    let cancel = cancel.child_token();
    let (tx, rx) = queue::bounded(config.queue_capacity)?;

    info!(
        queue_capacity = config.queue_capacity,
        ttl_secs = config.restore_ttl.as_secs(),
        "transfer started"
    );

    let scanner = Scanner::new(source, tx, config)
        .with_stats(stats.clone())
        .with_progress(progress.clone())
        .with_cancellation(cancel.clone());
    let mut scan = tokio::spawn(scanner.run());

    let restore = Restorer::new(destination, rx, config.restore_ttl)
        .with_stats(stats.clone())
        .with_progress(progress)
        .run();
    tokio::pin!(restore);

    let mut scanned: Option<Result<()>> = None;
    let restored = loop {
        tokio::select! {
            biased;
            joined = &mut scan, if scanned.is_none() => {
                match joined.map_err(Error::from).and_then(|r| r) {
                    // Let the restorer drain what was queued before the stop.
                    Err(Error::Cancelled) => scanned = Some(Err(Error::Cancelled)),
                    Err(err) => {
                        error!(error = %err, "scanner failed");
                        return Err(err);
                    }
                    Ok(()) => scanned = Some(Ok(())),
                }
            }
            restored = &mut restore => break restored,
        }
    };

    if let Err(err) = restored {
        error!(error = %err, "restorer failed");
        cancel.cancel();
        scan.abort();
        return Err(err);
    }

    // The restorer only finishes once the sender is gone, so the scanner is done.
    let scanned = match scanned {
        Some(result) => result,
        None => scan.await.map_err(Error::from).and_then(|r| r),
    };
    if let Err(err) = scanned {
        error!(error = %err, "transfer stopped");
        return Err(err);
    }

    let report = TransferReport {
        stats: stats.snapshot(),
        elapsed_ms: started.elapsed().as_millis() as u64,
        queue_capacity: config.queue_capacity,
        restore_ttl_secs: config.restore_ttl.as_secs(),
    };
    info!(
        keys = report.stats.keys_restored,
        batches = report.stats.batches_restored,
        elapsed_ms = report.elapsed_ms,
        "transfer finished"
    );
    Ok(report)
}

/// Open both stores from their URLs and [`run`] a transfer between them.
pub async fn migrate(
    from: &str,
    to: &str,
    config: &TransferConfig,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
) -> Result<TransferReport> {
    config.validate()?;
    let from = StoreUrl::parse(from)?;
    let to = StoreUrl::parse(to)?;

    info!(from = %from, to = %to, "connecting");
    let (source, destination) = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("cancelled while connecting");
            return Err(Error::Cancelled);
        }
        opened = connect(&from, &to) => opened?,
    };

    run(source, destination, config, progress, cancel).await
}

async fn connect(from: &StoreUrl, to: &StoreUrl) -> Result<(Connection, Connection)> {
    let source = Connection::open(from).await?;
    let destination = Connection::open(to).await?;
    Ok((source, destination))
}
