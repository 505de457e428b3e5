//! Store connection strings.
//!
//! Accepted form: `redis://[[username]:password@]host[:port][/database]`.
//! The port defaults to 6379 and the database index to 0. Credentials may
//! be percent-encoded, and a username needs a password.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default port when the URL omits one.
pub const DEFAULT_PORT: u16 = 6379;

const SCHEME: &str = "redis://";

/// A parsed store address.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreUrl {
    /// Host name or IP literal (IPv6 without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Optional ACL user for `AUTH`.
    pub username: Option<String>,
    /// Optional password for `AUTH`.
    pub password: Option<String>,
    /// Logical database index to `SELECT`.
    pub database: u32,
}

impl StoreUrl {
    /// Parse a connection string.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: redact(input),
            reason: reason.to_string(),
        };

        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected scheme redis://"))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx + 1..]),
            None => (rest, ""),
        };

        let (userinfo, hostport) = match authority.rfind('@') {
            Some(idx) => (Some(&authority[..idx]), &authority[idx + 1..]),
            None => (None, authority),
        };

        let (username, password) = match userinfo {
            None => (None, None),
            Some(info) => match info.split_once(':') {
                Some((user, pass)) => (
                    decode_userinfo(user).map_err(|r| invalid(&r))?,
                    decode_userinfo(pass).map_err(|r| invalid(&r))?,
                ),
                // A lone userinfo segment is treated as the password, as redis-cli does.
                None => (None, decode_userinfo(info).map_err(|r| invalid(&r))?),
            },
        };
        if username.is_some() && password.is_none() {
            return Err(invalid("username given without a password"));
        }

        let (host, port) = split_host_port(hostport).map_err(|r| invalid(&r))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }

        let database = match path.trim_end_matches('/') {
            "" => 0,
            db => db
                .parse::<u32>()
                .map_err(|_| invalid("database index must be a non-negative integer"))?,
        };

        Ok(Self {
            host,
            port,
            username,
            password,
            database,
        })
    }

    /// `host:port` suitable for `TcpStream::connect`.
    pub fn socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for StoreUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

// Credentials never reach logs.
impl fmt::Display for StoreUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", SCHEME)?;
        if self.username.is_some() || self.password.is_some() {
            if let Some(user) = &self.username {
                write!(f, "{}", urlencoding::encode(user))?;
            }
            if self.password.is_some() {
                write!(f, ":***")?;
            }
            write!(f, "@")?;
        }
        write!(f, "{}/{}", self.socket_addr(), self.database)
    }
}

impl fmt::Debug for StoreUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreUrl")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .finish()
    }
}

/// Percent-decode one userinfo field. Empty fields are absent.
fn decode_userinfo(s: &str) -> std::result::Result<Option<String>, String> {
    if s.is_empty() {
        return Ok(None);
    }
    let bytes = s.as_bytes();
    for (i, _) in s.match_indices('%') {
        let escape = bytes.get(i + 1..i + 3);
        if !escape.is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit)) {
            return Err("malformed percent-encoding in credentials".to_string());
        }
    }
    urlencoding::decode(s)
        .map(|decoded| Some(decoded.into_owned()))
        .map_err(|_| "credentials are not valid UTF-8".to_string())
}

fn split_host_port(hostport: &str) -> std::result::Result<(String, u16), String> {
    // [::1]:6379
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, tail) = rest
            .split_once(']')
            .ok_or_else(|| "unterminated IPv6 literal".to_string())?;
        let port = match tail {
            "" => DEFAULT_PORT,
            t => parse_port(
                t.strip_prefix(':')
                    .ok_or_else(|| "expected ':' after IPv6 literal".to_string())?,
            )?,
        };
        return Ok((host.to_string(), port));
    }

    match hostport.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), parse_port(port)?)),
        None => Ok((hostport.to_string(), DEFAULT_PORT)),
    }
}

fn parse_port(s: &str) -> std::result::Result<u16, String> {
    match s.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{}'", s)),
        Ok(p) => Ok(p),
    }
}

/// Strip the password from a raw input before echoing it in an error.
fn redact(input: &str) -> String {
    let Some(rest) = input.strip_prefix(SCHEME) else {
        return input.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}***@{}", SCHEME, &rest[at + 1..]),
        None => input.to_string(),
    }
}
