//! # rump
//!
//! One-shot copy of every key from one Redis-compatible store to another.
//!
//! A [`Scanner`] walks the source keyspace with `SCAN`, fetches each key's
//! serialized value with pipelined `DUMP` requests and publishes one
//! [`Batch`] per scan step into a bounded queue. A [`Restorer`] drains that
//! queue and writes every pair to the destination with
//! `RESTORE key ttl dump REPLACE`, using a fixed 24 hour expiration.
//!
//! The run is fail-fast: the first error from either side ends it, and
//! nothing already written is rolled back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rump::{migrate, ConsoleProgress, TransferConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> rump::Result<()> {
//! let report = migrate(
//!     "redis://127.0.0.1:6379/0",
//!     "redis://127.0.0.1:6379/1",
//!     &TransferConfig::default(),
//!     Arc::new(ConsoleProgress::stderr()),
//!     CancellationToken::new(),
//! )
//! .await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`protocol`] | RESP2 replies, command encoding, streaming decoding |
//! | [`connection`] | TCP connection with `AUTH`/`SELECT` handshake and pipelining |
//! | [`store`] | Source and destination store traits |
//! | [`memory`] | In-process store implementing both traits |
//! | [`scanner`] / [`restorer`] | The two halves of a transfer |
//! | [`transfer`] | Orchestration and the final report |

pub mod batch;
pub mod config;
pub mod connection;
pub mod error;
pub mod memory;
pub mod progress;
pub mod protocol;
pub mod queue;
pub mod restorer;
pub mod scanner;
pub mod store;
pub mod transfer;
pub mod url;

pub use batch::Batch;
pub use config::{MissingKeyPolicy, TransferConfig, DEFAULT_QUEUE_CAPACITY, RESTORE_TTL};
pub use connection::Connection;
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use progress::{ConsoleProgress, NoProgress, Progress, StatsSnapshot, TransferStats};
pub use restorer::Restorer;
pub use scanner::Scanner;
pub use store::{Cursor, DestinationStore, ScanPage, SourceStore};
pub use transfer::{migrate, run, TransferReport};
pub use url::StoreUrl;
