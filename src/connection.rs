//! TCP connection to a Redis-compatible store.
//!
//! A [`Connection`] owns one socket plus its read and write buffers. It is
//! never shared: the scanner and the restorer each hold their own.

use std::fmt;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{self, Reply};
use crate::url::StoreUrl;

/// Default read/write buffer size (64 KB). Dumps are often larger than a
/// typical command, so this is bigger than a chat-style client would use.
const DEFAULT_BUF_SIZE: usize = 64 * 1024;

/// A buffered RESP2 connection.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    write_buf: BytesMut,
    peer: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("peer", &self.peer)
            .field("buffered", &self.read_buf.len())
            .finish()
    }
}

impl Connection {
    /// Open a connection, authenticate and select the database named by `url`.
    pub async fn open(url: &StoreUrl) -> Result<Self> {
        let addr = url.socket_addr();
        debug!(peer = %url, "connecting");
        let tcp = TcpStream::connect(&addr).await?;
        tcp.set_nodelay(true)?;

        let mut conn = Self {
            stream: tcp,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_SIZE),
            peer: url.to_string(),
        };

        if let Some(password) = &url.password {
            let mut args = vec![Bytes::from_static(b"AUTH")];
            if let Some(user) = &url.username {
                args.push(Bytes::copy_from_slice(user.as_bytes()));
            }
            args.push(Bytes::copy_from_slice(password.as_bytes()));
            conn.execute(&args).await?.expect_ok()?;
        }

        if url.database != 0 {
            conn.execute(&[
                Bytes::from_static(b"SELECT"),
                Bytes::from(url.database.to_string()),
            ])
            .await?
            .expect_ok()?;
        }

        debug!(peer = %conn.peer, "connected");
        Ok(conn)
    }

    /// Send one command and read its reply. Error replies become
    /// [`Error::Server`].
    pub async fn execute(&mut self, args: &[Bytes]) -> Result<Reply> {
        self.write_buf.clear();
        protocol::encode_command(args, &mut self.write_buf);
        self.flush().await?;
        self.read_reply().await?.into_result()
    }

    /// Send every command in one write, then read one reply per command in
    /// order. Error replies are returned as values so the caller can decide
    /// which of them matter.
    pub async fn pipeline(&mut self, commands: &[Vec<Bytes>]) -> Result<Vec<Reply>> {
        if commands.is_empty() {
            return Ok(Vec::new());
        }

        self.write_buf.clear();
        for args in commands {
            protocol::encode_command(args, &mut self.write_buf);
        }
        self.flush().await?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in 0..commands.len() {
            replies.push(self.read_reply().await?);
        }
        Ok(replies)
    }

    /// Politely end the session with `QUIT` and close the socket.
    ///
    /// Dropping a `Connection` also closes the socket; this only adds the
    /// protocol-level goodbye.
    pub async fn close(mut self) -> Result<()> {
        let _ = self.execute(&[Bytes::from_static(b"QUIT")]).await;
        self.stream.shutdown().await?;
        debug!(peer = %self.peer, "closed");
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.stream.write_all(&self.write_buf).await?;
        self.stream.flush().await?;
        self.write_buf.clear();
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        loop {
            if let Some(reply) = protocol::decode_reply(&mut self.read_buf)? {
                return Ok(reply);
            }

            let n = self.stream.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
        }
    }
}
