//! Shared test utilities for rump integration tests.
//!
//! Import via `mod common;` in integration test files:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use rump::protocol::{decode_reply, encode_reply, Reply};
use rump::{Cursor, DestinationStore, Error, MemoryStore, Result, SourceStore};

// ============================================================================
// Keyspace helpers
// ============================================================================

/// A store holding `n` keys named `key:000`, `key:001`, ...
pub fn keyspace(n: usize) -> MemoryStore {
    MemoryStore::from_pairs((0..n).map(|i| (format!("key:{i:03}"), format!("dump-{i}"))))
}

// ============================================================================
// In-process RESP server
// ============================================================================

/// Number of logical databases served, as in a default Redis setup.
pub const DATABASES: usize = 16;

/// Knobs for [`start_test_server_with`].
#[derive(Debug, Clone, Default)]
pub struct ServerOptions {
    /// Require `AUTH` with this password.
    pub password: Option<String>,
    /// Reject every `RESTORE` after this many have succeeded.
    pub fail_restore_after: Option<u64>,
}

struct ServerState {
    dbs: Vec<MemoryStore>,
    options: ServerOptions,
    restores: AtomicU64,
}

/// A RESP server on `127.0.0.1` backed by one [`MemoryStore`] per database.
/// Stops when dropped.
pub struct TestServer {
    /// Port the server listens on.
    pub port: u16,
    state: Arc<ServerState>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Handle on database `index`. Clones share data with the server.
    pub fn db(&self, index: usize) -> MemoryStore {
        self.state.dbs[index].clone()
    }

    /// Connection URL for database `index`.
    pub fn url(&self, index: usize) -> String {
        match &self.state.options.password {
            Some(password) => format!("redis://:{password}@127.0.0.1:{}/{index}", self.port),
            None => format!("redis://127.0.0.1:{}/{index}", self.port),
        }
    }

    /// Number of `RESTORE` commands accepted so far.
    pub fn restores(&self) -> u64 {
        self.state.restores.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Start a server without authentication or fault injection.
pub async fn start_test_server() -> TestServer {
    start_test_server_with(ServerOptions::default()).await
}

/// Start a server on a random port. The server runs in a background tokio task.
pub async fn start_test_server_with(options: ServerOptions) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let port = listener.local_addr().expect("should have local addr").port();

    let state = Arc::new(ServerState {
        dbs: (0..DATABASES).map(|_| MemoryStore::new()).collect(),
        options,
        restores: AtomicU64::new(0),
    });

    let accept_state = state.clone();
    let handle = tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let state = accept_state.clone();
            tokio::spawn(async move {
                let _ = serve(socket, state).await;
            });
        }
    });

    TestServer {
        port,
        state,
        handle,
    }
}

/// A port nothing listens on.
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    listener.local_addr().expect("should have local addr").port()
}

/// A peer that accepts connections and never answers. Handshakes against it
/// hang until the client gives up.
pub async fn silent_peer() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let port = listener.local_addr().expect("should have local addr").port();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    port
}

struct Session {
    db: usize,
    authed: bool,
    quit: bool,
}

async fn serve(mut socket: TcpStream, state: Arc<ServerState>) -> io::Result<()> {
    let mut read_buf = BytesMut::with_capacity(16 * 1024);
    let mut write_buf = BytesMut::new();
    let mut session = Session {
        db: 0,
        authed: state.options.password.is_none(),
        quit: false,
    };

    loop {
        // Answer every complete request in the buffer before writing, so
        // pipelined commands get their replies in one go.
        while let Some(request) = decode_reply(&mut read_buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?
        {
            let reply = match request_args(request) {
                Some(args) if !args.is_empty() => dispatch(&state, &mut session, args).await,
                _ => Reply::error("ERR protocol error: expected array of bulk strings"),
            };
            encode_reply(&reply, &mut write_buf);
            if session.quit {
                socket.write_all(&write_buf).await?;
                return socket.shutdown().await;
            }
        }

        if !write_buf.is_empty() {
            socket.write_all(&write_buf).await?;
            write_buf.clear();
        }

        if socket.read_buf(&mut read_buf).await? == 0 {
            return Ok(());
        }
    }
}

fn request_args(request: Reply) -> Option<Vec<Bytes>> {
    match request {
        Reply::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Reply::Bulk(b) => Some(b),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

async fn dispatch(state: &ServerState, session: &mut Session, args: Vec<Bytes>) -> Reply {
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();

    if !session.authed && !matches!(name.as_str(), "AUTH" | "QUIT" | "PING") {
        return Reply::error("NOAUTH Authentication required.");
    }

    let mut store = state.dbs[session.db].clone();
    match (name.as_str(), &args[1..]) {
        ("PING", _) => Reply::status("PONG"),
        ("QUIT", _) => {
            session.quit = true;
            Reply::status("OK")
        }
        ("AUTH", [.., password]) if args.len() <= 3 => match &state.options.password {
            None => Reply::error("ERR AUTH <password> called without any password configured"),
            Some(expected) if expected.as_bytes() == &password[..] => {
                session.authed = true;
                Reply::status("OK")
            }
            Some(_) => Reply::error("WRONGPASS invalid username-password pair"),
        },
        ("SELECT", [index]) => match parse_u64(index) {
            Some(i) if (i as usize) < DATABASES => {
                session.db = i as usize;
                Reply::status("OK")
            }
            _ => Reply::error("ERR DB index is out of range"),
        },
        ("SCAN", [cursor, rest @ ..]) => {
            let Some(cursor) = parse_u64(cursor) else {
                return Reply::error("ERR invalid cursor");
            };
            let count = match rest {
                [] => None,
                [opt, n] if opt.eq_ignore_ascii_case(b"COUNT") => match parse_u64(n) {
                    Some(n) if n > 0 => Some(n),
                    _ => return Reply::error("ERR syntax error"),
                },
                _ => return Reply::error("ERR syntax error"),
            };
            match store.scan(Cursor(cursor), count).await {
                Ok(page) => Reply::Array(vec![
                    Reply::bulk(page.cursor.to_string()),
                    Reply::Array(page.keys.into_iter().map(Reply::Bulk).collect()),
                ]),
                Err(Error::Server(msg)) => Reply::Error(msg),
                Err(e) => Reply::error(format!("ERR {e}")),
            }
        }
        ("DUMP", [key]) => match store.get(key) {
            Some(entry) => Reply::Bulk(entry.dump),
            None => Reply::Nil,
        },
        ("RESTORE", [key, ttl, dump, flags @ ..]) => {
            let Some(ttl) = parse_u64(ttl) else {
                return Reply::error("ERR value is not an integer or out of range");
            };
            let replace = flags.iter().any(|f| f.eq_ignore_ascii_case(b"REPLACE"));
            if !replace && store.get(key).is_some() {
                return Reply::error("BUSYKEY Target key name already exists.");
            }
            if let Some(limit) = state.options.fail_restore_after {
                if state.restores.load(Ordering::SeqCst) >= limit {
                    return Reply::error("ERR injected restore failure");
                }
            }
            match store.restore(key, dump, Duration::from_millis(ttl)).await {
                Ok(()) => {
                    state.restores.fetch_add(1, Ordering::SeqCst);
                    Reply::status("OK")
                }
                Err(e) => Reply::error(format!("ERR {e}")),
            }
        }
        _ => Reply::error(format!("ERR unknown command '{name}'")),
    }
}

fn parse_u64(arg: &Bytes) -> Option<u64> {
    std::str::from_utf8(arg).ok()?.parse().ok()
}

// ============================================================================
// Fault-injecting stores
// ============================================================================

/// Destination that accepts `fail_at - 1` writes and rejects the next one.
pub struct FailingDestination {
    inner: MemoryStore,
    fail_at: u64,
    attempts: Arc<AtomicU64>,
}

impl FailingDestination {
    /// Fail the `fail_at`-th write (1-based).
    pub fn new(inner: MemoryStore, fail_at: u64) -> Self {
        Self {
            inner,
            fail_at,
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Shared counter of write attempts, including the failed one.
    pub fn attempts(&self) -> Arc<AtomicU64> {
        self.attempts.clone()
    }
}

#[async_trait]
impl DestinationStore for FailingDestination {
    async fn restore(&mut self, key: &Bytes, dump: &Bytes, ttl: Duration) -> Result<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt == self.fail_at {
            return Err(Error::Server("ERR injected restore failure".into()));
        }
        self.inner.restore(key, dump, ttl).await
    }
}

/// Destination whose writes never complete.
#[derive(Default)]
pub struct StalledDestination {
    /// Write attempts started.
    pub attempts: Arc<AtomicU64>,
}

#[async_trait]
impl DestinationStore for StalledDestination {
    async fn restore(&mut self, _key: &Bytes, _dump: &Bytes, _ttl: Duration) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Destination that records the order keys were written in.
pub struct RecordingDestination {
    inner: MemoryStore,
    /// Keys in write order.
    pub log: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingDestination {
    /// Record writes on top of `inner`.
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl DestinationStore for RecordingDestination {
    async fn restore(&mut self, key: &Bytes, dump: &Bytes, ttl: Duration) -> Result<()> {
        self.log.lock().push(key.clone());
        self.inner.restore(key, dump, ttl).await
    }
}

/// Source whose SCAN fails after `ok_steps` successful steps.
pub struct FailingSource {
    inner: MemoryStore,
    ok_steps: u64,
    steps: u64,
}

impl FailingSource {
    /// Allow `ok_steps` scan steps, then fail with a transport error.
    pub fn new(inner: MemoryStore, ok_steps: u64) -> Self {
        Self {
            inner,
            ok_steps,
            steps: 0,
        }
    }
}

#[async_trait]
impl SourceStore for FailingSource {
    async fn scan(&mut self, cursor: Cursor, count: Option<u64>) -> Result<rump::ScanPage> {
        if self.steps == self.ok_steps {
            return Err(Error::ConnectionClosed);
        }
        self.steps += 1;
        self.inner.scan(cursor, count).await
    }

    async fn dump(&mut self, keys: &[Bytes]) -> Result<Vec<Option<Bytes>>> {
        self.inner.dump(keys).await
    }
}
