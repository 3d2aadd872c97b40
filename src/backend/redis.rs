//! Redis cache speaking RESP over plain TCP.
//!
//! Only the two commands the cache contract needs are issued:
//! `GET key` and `SET key value EXAT <unix-seconds>`. Connections are pooled
//! and a connection that saw an error is dropped rather than reused.

use crate::backend::Cache;
use crate::core::error::BackendError;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// RESP reply values.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// `+OK\r\n`
    SimpleString(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:1000\r\n`
    Integer(i64),
    /// `$6\r\nfoobar\r\n`, or `$-1\r\n` for null
    BulkString(Option<Vec<u8>>),
    /// `*2\r\n...`
    Array(Vec<RespValue>),
    /// `_\r\n` (RESP3) or `*-1\r\n`
    Null,
}

/// Encode a command as an array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    buf.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        buf.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }
    buf
}

/// Parse one value from the front of `buf`.
///
/// Returns the value and the number of bytes it used, or `None` when `buf`
/// does not yet hold a complete value.
pub fn parse(buf: &[u8]) -> Result<Option<(RespValue, usize)>, BackendError> {
    let line_end = match buf.windows(2).position(|w| w == b"\r\n") {
        Some(pos) => pos,
        None => return Ok(None),
    };
    if line_end == 0 {
        return Err(BackendError::Resp("reply line without a type byte".into()));
    }
    let line = &buf[1..line_end];
    let after = line_end + 2;

    let value = match buf[0] {
        b'+' => (RespValue::SimpleString(utf8(line)?), after),
        b'-' => (RespValue::Error(utf8(line)?), after),
        b':' => (RespValue::Integer(int(line)?), after),
        b'_' => (RespValue::Null, after),
        b'$' => {
            let len = int(line)?;
            if len < 0 {
                (RespValue::BulkString(None), after)
            } else {
                let end = after + len as usize;
                if buf.len() < end + 2 {
                    return Ok(None);
                }
                (RespValue::BulkString(Some(buf[after..end].to_vec())), end + 2)
            }
        }
        b'*' => {
            let count = int(line)?;
            if count < 0 {
                (RespValue::Null, after)
            } else {
                let mut items = Vec::with_capacity(count as usize);
                let mut pos = after;
                for _ in 0..count {
                    match parse(&buf[pos..])? {
                        Some((item, used)) => {
                            items.push(item);
                            pos += used;
                        }
                        None => return Ok(None),
                    }
                }
                (RespValue::Array(items), pos)
            }
        }
        other => {
            return Err(BackendError::Resp(format!(
                "unknown RESP type byte '{}'",
                other as char
            )))
        }
    };
    Ok(Some(value))
}

fn utf8(bytes: &[u8]) -> Result<String, BackendError> {
    String::from_utf8(bytes.to_vec()).map_err(|e| BackendError::Resp(e.to_string()))
}

fn int(bytes: &[u8]) -> Result<i64, BackendError> {
    utf8(bytes)?
        .parse::<i64>()
        .map_err(|e| BackendError::Resp(format!("invalid integer: {}", e)))
}

/// Where and how to connect, parsed from `redis://[user:password@]host[:port][/db]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisTarget {
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<u32>,
}

impl RedisTarget {
    pub fn parse(url: &str) -> Result<Self, BackendError> {
        let rest = url
            .strip_prefix("redis://")
            .ok_or_else(|| BackendError::Resp(format!("unsupported redis url '{}'", url)))?;

        let (credentials, host_part) = match rest.rsplit_once('@') {
            Some((creds, host)) => (Some(creds), host),
            None => (None, rest),
        };
        let (username, password) = match credentials {
            Some(creds) => match creds.split_once(':') {
                Some((user, pass)) => (
                    Some(user.to_string()).filter(|u| !u.is_empty()),
                    Some(pass.to_string()),
                ),
                None => (None, Some(creds.to_string())),
            },
            None => (None, None),
        };

        let (host, database) = match host_part.split_once('/') {
            Some((host, db)) if !db.is_empty() => (
                host,
                Some(db.parse::<u32>().map_err(|_| {
                    BackendError::Resp(format!("invalid redis database '{}'", db))
                })?),
            ),
            Some((host, _)) => (host, None),
            None => (host_part, None),
        };
        if host.is_empty() {
            return Err(BackendError::Resp(format!("missing host in '{}'", url)));
        }
        // a bracketed IPv6 host only carries a port after the ']'
        let has_port = match host.rfind(']') {
            Some(end) => host[end + 1..].starts_with(':'),
            None => host.contains(':'),
        };
        let address = if has_port {
            host.to_string()
        } else {
            format!("{}:6379", host)
        };

        Ok(Self {
            address,
            username,
            password,
            database,
        })
    }
}

struct Connection {
    stream: TcpStream,
    buf: BytesMut,
}

impl Connection {
    async fn open(target: &RedisTarget) -> Result<Self, BackendError> {
        let stream = TcpStream::connect(&target.address).await?;
        let mut conn = Self {
            stream,
            buf: BytesMut::with_capacity(4096),
        };
        if let Some(password) = &target.password {
            let reply = match &target.username {
                Some(user) => conn.command(&[b"AUTH", user.as_bytes(), password.as_bytes()]).await?,
                None => conn.command(&[b"AUTH", password.as_bytes()]).await?,
            };
            expect_ok(reply)?;
        }
        if let Some(db) = target.database {
            let db = db.to_string();
            expect_ok(conn.command(&[b"SELECT", db.as_bytes()]).await?)?;
        }
        Ok(conn)
    }

    async fn command(&mut self, args: &[&[u8]]) -> Result<RespValue, BackendError> {
        self.stream.write_all(&encode_command(args)).await?;
        loop {
            if let Some((value, used)) = parse(&self.buf)? {
                self.buf.advance(used);
                return match value {
                    RespValue::Error(message) => Err(BackendError::Resp(message)),
                    other => Ok(other),
                };
            }
            if self.stream.read_buf(&mut self.buf).await? == 0 {
                return Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "redis closed the connection",
                )));
            }
        }
    }
}

fn expect_ok(reply: RespValue) -> Result<(), BackendError> {
    match reply {
        RespValue::SimpleString(s) if s == "OK" => Ok(()),
        other => Err(BackendError::Resp(format!("expected OK, got {:?}", other))),
    }
}

/// Cache adapter backed by a Redis server.
pub struct RedisCache {
    target: RedisTarget,
    idle: Mutex<Vec<Connection>>,
}

impl RedisCache {
    pub fn new(url: &str) -> Result<Self, BackendError> {
        Ok(Self {
            target: RedisTarget::parse(url)?,
            idle: Mutex::new(Vec::new()),
        })
    }

    async fn command(&self, args: &[&[u8]]) -> Result<RespValue, BackendError> {
        let pooled = self.idle.lock().await.pop();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => Connection::open(&self.target).await?,
        };
        let reply = conn.command(args).await;
        if reply.is_ok() {
            self.idle.lock().await.push(conn);
        }
        reply
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        match self.command(&[b"GET", key.as_bytes()]).await? {
            RespValue::BulkString(Some(bytes)) => utf8(&bytes).map(Some),
            RespValue::BulkString(None) | RespValue::Null => Ok(None),
            other => Err(BackendError::Resp(format!("unexpected GET reply {:?}", other))),
        }
    }

    async fn set(&self, key: &str, value: &str, expire_at: DateTime<Utc>) -> Result<(), BackendError> {
        let at = expire_at.timestamp().max(1).to_string();
        let reply = self
            .command(&[b"SET", key.as_bytes(), value.as_bytes(), b"EXAT", at.as_bytes()])
            .await?;
        expect_ok(reply)
    }
}
