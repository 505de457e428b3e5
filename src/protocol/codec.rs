//! RESP2 encoder and streaming decoder.
//!
//! Commands are always sent as arrays of bulk strings. The decoder is
//! incremental: it returns `Ok(None)` until a whole reply is buffered, so the
//! caller can keep reading from the socket into the same `BytesMut`.

use std::io::Cursor;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::Reply;
use crate::error::{Error, Result};

/// Largest bulk string accepted from the peer (matches Redis `proto-max-bulk-len`).
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Largest array element count accepted from the peer.
pub const MAX_ARRAY_LEN: usize = 1_048_576;

/// Deepest array nesting accepted from the peer. Bounds decoder recursion.
pub const MAX_DEPTH: usize = 512;

/// Why a buffered frame could not be decoded yet.
#[derive(Debug)]
enum Malformed {
    Incomplete,
    Invalid(String),
}

impl From<Malformed> for Error {
    fn from(m: Malformed) -> Self {
        match m {
            Malformed::Incomplete => Error::Protocol("truncated frame".into()),
            Malformed::Invalid(msg) => Error::Protocol(msg),
        }
    }
}

type Step<T> = std::result::Result<T, Malformed>;

/// Encode a command as a RESP2 array of bulk strings.
///
/// ```text
/// *3\r\n$7\r\nRESTORE\r\n$1\r\nk\r\n$1\r\n0\r\n
/// ```
pub fn encode_command(args: &[Bytes], buf: &mut BytesMut) {
    buf.put_u8(b'*');
    buf.put_slice(args.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    for arg in args {
        put_bulk(arg, buf);
    }
}

/// Encode a reply. Used by servers and test doubles speaking to a [`Connection`].
///
/// [`Connection`]: crate::connection::Connection
pub fn encode_reply(reply: &Reply, buf: &mut BytesMut) {
    match reply {
        Reply::Status(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(b"\r\n");
        }
        Reply::Error(s) => {
            buf.put_u8(b'-');
            buf.put_slice(s.as_bytes());
            buf.put_slice(b"\r\n");
        }
        Reply::Integer(n) => {
            buf.put_u8(b':');
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(b"\r\n");
        }
        Reply::Bulk(data) => put_bulk(data, buf),
        Reply::Array(items) => {
            buf.put_u8(b'*');
            buf.put_slice(items.len().to_string().as_bytes());
            buf.put_slice(b"\r\n");
            for item in items {
                encode_reply(item, buf);
            }
        }
        Reply::Nil => buf.put_slice(b"$-1\r\n"),
    }
}

fn put_bulk(data: &[u8], buf: &mut BytesMut) {
    buf.put_u8(b'$');
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

/// Try to decode one reply from the front of `buf`.
///
/// Returns `Ok(Some(reply))` and consumes its bytes when a complete frame is
/// buffered, `Ok(None)` when more data is needed, and `Err` on malformed input.
pub fn decode_reply(buf: &mut BytesMut) -> Result<Option<Reply>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(&buf[..]);
    match check(&mut cursor, 0) {
        Ok(()) => {
            let len = cursor.position() as usize;
            cursor.set_position(0);
            let reply = parse(&mut cursor, 0)?;
            buf.advance(len);
            Ok(Some(reply))
        }
        Err(Malformed::Incomplete) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Walk one frame without allocating, leaving the cursor just past it.
fn check(cursor: &mut Cursor<&[u8]>, depth: usize) -> Step<()> {
    match get_byte(cursor)? {
        b'+' | b'-' | b':' => {
            read_line(cursor)?;
            Ok(())
        }
        b'$' => {
            let len = read_decimal(cursor)?;
            if len == -1 {
                return Ok(());
            }
            let len = bulk_len(len)?;
            read_bytes(cursor, len)?;
            skip_crlf(cursor)
        }
        b'*' => {
            let count = read_decimal(cursor)?;
            if count == -1 {
                return Ok(());
            }
            let count = array_len(count)?;
            let depth = nested(depth)?;
            for _ in 0..count {
                check(cursor, depth)?;
            }
            Ok(())
        }
        byte => Err(Malformed::Invalid(format!(
            "unexpected byte: 0x{:02x}",
            byte
        ))),
    }
}

/// Parse a frame that [`check`] has already validated.
fn parse(cursor: &mut Cursor<&[u8]>, depth: usize) -> Step<Reply> {
    match get_byte(cursor)? {
        b'+' => Ok(Reply::Status(utf8_line(cursor)?)),
        b'-' => Ok(Reply::Error(utf8_line(cursor)?)),
        b':' => Ok(Reply::Integer(read_decimal(cursor)?)),
        b'$' => {
            let len = read_decimal(cursor)?;
            if len == -1 {
                return Ok(Reply::Nil);
            }
            let data = read_bytes(cursor, bulk_len(len)?)?;
            let data = Bytes::copy_from_slice(data);
            skip_crlf(cursor)?;
            Ok(Reply::Bulk(data))
        }
        b'*' => {
            let count = read_decimal(cursor)?;
            if count == -1 {
                return Ok(Reply::Nil);
            }
            let count = array_len(count)?;
            let depth = nested(depth)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(parse(cursor, depth)?);
            }
            Ok(Reply::Array(items))
        }
        byte => Err(Malformed::Invalid(format!(
            "unexpected byte: 0x{:02x}",
            byte
        ))),
    }
}

fn bulk_len(len: i64) -> Step<usize> {
    if len < 0 {
        return Err(Malformed::Invalid("negative bulk string length".into()));
    }
    let len = len as usize;
    if len > MAX_BULK_LEN {
        return Err(Malformed::Invalid(format!(
            "bulk string size {} exceeds limit {}",
            len, MAX_BULK_LEN
        )));
    }
    Ok(len)
}

fn array_len(count: i64) -> Step<usize> {
    if count < 0 {
        return Err(Malformed::Invalid("negative array length".into()));
    }
    let count = count as usize;
    if count > MAX_ARRAY_LEN {
        return Err(Malformed::Invalid(format!(
            "array element count {} exceeds limit {}",
            count, MAX_ARRAY_LEN
        )));
    }
    Ok(count)
}

fn nested(depth: usize) -> Step<usize> {
    if depth >= MAX_DEPTH {
        return Err(Malformed::Invalid(format!(
            "array nesting exceeds limit {}",
            MAX_DEPTH
        )));
    }
    Ok(depth + 1)
}

// ── Cursor helpers ──────────────────────────────────────────────────────────

fn get_byte(cursor: &mut Cursor<&[u8]>) -> Step<u8> {
    if !cursor.has_remaining() {
        return Err(Malformed::Incomplete);
    }
    Ok(cursor.get_u8())
}

fn read_line<'a>(cursor: &mut Cursor<&'a [u8]>) -> Step<&'a [u8]> {
    let start = cursor.position() as usize;
    let buf: &'a [u8] = *cursor.get_ref();
    for i in start..buf.len().saturating_sub(1) {
        if buf[i] == b'\r' && buf[i + 1] == b'\n' {
            cursor.set_position((i + 2) as u64);
            return Ok(&buf[start..i]);
        }
    }
    Err(Malformed::Incomplete)
}

fn utf8_line(cursor: &mut Cursor<&[u8]>) -> Step<String> {
    let line = read_line(cursor)?;
    String::from_utf8(line.to_vec()).map_err(|_| Malformed::Invalid("invalid UTF-8".into()))
}

fn read_decimal(cursor: &mut Cursor<&[u8]>) -> Step<i64> {
    let line = read_line(cursor)?;
    let s = std::str::from_utf8(line)
        .map_err(|_| Malformed::Invalid("invalid UTF-8 in integer".into()))?;
    s.parse::<i64>()
        .map_err(|_| Malformed::Invalid(format!("invalid integer: {}", s)))
}

fn read_bytes<'a>(cursor: &mut Cursor<&'a [u8]>, n: usize) -> Step<&'a [u8]> {
    let start = cursor.position() as usize;
    let buf: &'a [u8] = *cursor.get_ref();
    if start + n > buf.len() {
        return Err(Malformed::Incomplete);
    }
    cursor.set_position((start + n) as u64);
    Ok(&buf[start..start + n])
}

fn skip_crlf(cursor: &mut Cursor<&[u8]>) -> Step<()> {
    if cursor.remaining() < 2 {
        return Err(Malformed::Incomplete);
    }
    let pos = cursor.position() as usize;
    let buf = cursor.get_ref();
    if buf[pos] != b'\r' || buf[pos + 1] != b'\n' {
        return Err(Malformed::Invalid("expected CRLF".into()));
    }
    cursor.advance(2);
    Ok(())
}
