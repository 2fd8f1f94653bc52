//! Redis TimeSeries backend.
//!
//! Each sample becomes one `TS.ADD <series> * <value>` command, sent as a
//! RESP array of bulk strings. The `*` timestamp lets the server stamp the
//! sample on arrival.
//!
//! # Connection Lifecycle
//!
//! 1. The connection is established lazily on the first record
//! 2. A transport failure drops the connection; the next record reconnects
//! 3. Failed connects back off exponentially, failing records fast meanwhile
//! 4. Error replies (`-ERR ...`) are rejections and keep the connection
//! 5. A connection whose last command was never answered (the caller gave up
//!    mid round trip) is discarded, so replies always match their command

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::backoff::Backoff;
use crate::error::{SinkError, SinkResult};
use crate::sink::MetricsSink;

/// Command sent for every sample.
const TS_ADD: &[u8] = b"TS.ADD";

/// Read buffer size for replies.
const READ_BUFFER_SIZE: usize = 512;

/// Configuration for the Redis sink.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Server address (`host:port`), resolved at connect time.
    pub addr: String,

    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,

    /// Timeout for each command round trip.
    pub io_timeout: Duration,
}

impl RedisConfig {
    /// Default server address.
    pub const DEFAULT_ADDR: &'static str = "127.0.0.1:6379";

    /// Creates a configuration for `addr` with default timeouts.
    #[must_use]
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            connect_timeout: Duration::from_secs(1),
            io_timeout: Duration::from_secs(1),
        }
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the command timeout.
    #[must_use]
    pub const fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_ADDR)
    }
}

/// Appends `TS.ADD <series> * <value>` to `buf` as a RESP array.
///
/// The value is written with six decimal places.
pub fn encode_ts_add(series: &str, value: f64, buf: &mut BytesMut) {
    let value = format!("{value:.6}");
    buf.put_slice(b"*4\r\n");
    put_bulk(buf, TS_ADD);
    put_bulk(buf, series.as_bytes());
    put_bulk(buf, b"*");
    put_bulk(buf, value.as_bytes());
}

fn put_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_u8(b'$');
    buf.put_slice(data.len().to_string().as_bytes());
    buf.put_slice(b"\r\n");
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}

/// A decoded RESP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+OK`
    Simple(String),
    /// `-ERR ...`
    Error(String),
    /// `:1700000000000`
    Integer(i64),
    /// `$3\r\nabc`; `None` for the null bulk string.
    Bulk(Option<Bytes>),
}

/// Decodes one reply from the front of `buf`.
///
/// Returns the reply and the number of bytes it occupied, or `None` if `buf`
/// does not yet hold a complete reply.
///
/// # Errors
///
/// Returns `SinkError::Protocol` for malformed input or reply kinds a
/// `TS.ADD` never produces.
pub fn decode_reply(buf: &[u8]) -> SinkResult<Option<(Reply, usize)>> {
    let Some(line_end) = find_crlf(buf) else {
        return Ok(None);
    };
    let Some((&kind, line)) = buf[..line_end].split_first() else {
        return Err(protocol("empty reply line"));
    };
    let line = std::str::from_utf8(line).map_err(|_| protocol("reply is not UTF-8"))?;
    let header_len = line_end + 2;

    match kind {
        b'+' => Ok(Some((Reply::Simple(line.to_string()), header_len))),
        b'-' => Ok(Some((Reply::Error(line.to_string()), header_len))),
        b':' => {
            let n = line
                .parse()
                .map_err(|_| protocol(&format!("invalid integer reply {line:?}")))?;
            Ok(Some((Reply::Integer(n), header_len)))
        }
        b'$' => {
            let len: i64 = line
                .parse()
                .map_err(|_| protocol(&format!("invalid bulk length {line:?}")))?;
            if len < 0 {
                return Ok(Some((Reply::Bulk(None), header_len)));
            }
            let len = usize::try_from(len).map_err(|_| protocol("bulk length out of range"))?;
            let total = header_len + len + 2;
            if buf.len() < total {
                return Ok(None);
            }
            if &buf[header_len + len..total] != b"\r\n" {
                return Err(protocol("bulk string missing terminator"));
            }
            let data = Bytes::copy_from_slice(&buf[header_len..header_len + len]);
            Ok(Some((Reply::Bulk(Some(data)), total)))
        }
        other => Err(protocol(&format!(
            "unexpected reply type {:?}",
            char::from(other)
        ))),
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn protocol(message: &str) -> SinkError {
    SinkError::Protocol {
        message: message.to_string(),
    }
}

/// An established connection and its read buffer.
struct Connection {
    stream: TcpStream,
    buffer: BytesMut,
    /// Set while a command is written but its reply not yet decoded.
    awaiting_reply: bool,
}

/// Connection slot plus reconnect backoff state.
struct ConnectionState {
    conn: Option<Connection>,
    backoff: Backoff,
}

/// Sink writing samples to a Redis server with the TimeSeries module.
///
/// Commands are serialized over a single connection.
pub struct RedisTimeSeriesSink {
    config: RedisConfig,
    state: Mutex<ConnectionState>,
}

impl RedisTimeSeriesSink {
    /// Creates a sink. No connection is made until the first record or an
    /// explicit [`connect`](Self::connect).
    #[must_use]
    pub fn new(config: RedisConfig) -> Self {
        Self {
            config,
            state: Mutex::new(ConnectionState {
                conn: None,
                backoff: Backoff::new(),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Connects now if not already connected, ignoring any backoff.
    ///
    /// # Errors
    ///
    /// Returns `SinkError::Connect` if the server is unreachable.
    pub async fn connect(&self) -> SinkResult<()> {
        let mut state = self.state.lock().await;
        state.backoff.skip_wait();
        self.ensure_connected(&mut *state).await?;
        Ok(())
    }

    /// Returns whether a usable connection is currently established.
    pub async fn is_connected(&self) -> bool {
        self.state
            .lock()
            .await
            .conn
            .as_ref()
            .is_some_and(|conn| !conn.awaiting_reply)
    }

    async fn ensure_connected<'a>(
        &self,
        state: &'a mut ConnectionState,
    ) -> SinkResult<&'a mut Connection> {
        if state.conn.as_ref().is_some_and(|conn| conn.awaiting_reply) {
            // The previous caller was cancelled mid round trip; its reply
            // would be read as the answer to the next command.
            debug!(addr = %self.config.addr, "Discarding connection with an unanswered command");
            state.conn = None;
        }

        if state.conn.is_none() {
            state.backoff.check(&self.config.addr)?;

            match self.open().await {
                Ok(stream) => {
                    info!(addr = %self.config.addr, "Connected to Redis");
                    state.backoff.reset();
                    state.conn = Some(Connection {
                        stream,
                        buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
                        awaiting_reply: false,
                    });
                }
                Err(e) => {
                    let backoff_ms = state.backoff.failed();
                    warn!(
                        addr = %self.config.addr,
                        error = %e,
                        backoff_ms,
                        "Failed to connect to Redis, will retry"
                    );
                    return Err(e);
                }
            }
        }

        state.conn.as_mut().ok_or_else(|| protocol("connection missing"))
    }

    async fn open(&self) -> SinkResult<TcpStream> {
        let addr = self.config.addr.as_str();
        let connect_future = async {
            let mut addrs = tokio::net::lookup_host(addr).await?;
            let resolved = addrs.next().ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no addresses found for {addr}"),
                )
            })?;
            TcpStream::connect(resolved).await
        };

        match tokio::time::timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(SinkError::Connect {
                addr: addr.to_string(),
                source: e,
            }),
            Err(_) => Err(SinkError::Connect {
                addr: addr.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::TimedOut, "connection timed out"),
            }),
        }
    }

    async fn round_trip(conn: &mut Connection, command: &[u8]) -> SinkResult<Reply> {
        conn.awaiting_reply = true;
        conn.stream.write_all(command).await?;
        conn.stream.flush().await?;

        loop {
            if let Some((reply, consumed)) = decode_reply(&conn.buffer)? {
                conn.buffer.advance(consumed);
                conn.awaiting_reply = false;
                return Ok(reply);
            }
            let bytes_read = conn.stream.read_buf(&mut conn.buffer).await?;
            if bytes_read == 0 {
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed by Redis",
                )));
            }
        }
    }
}

#[async_trait]
impl MetricsSink for RedisTimeSeriesSink {
    async fn record(&self, series: &str, value: f64) -> SinkResult<()> {
        let mut command = BytesMut::with_capacity(64);
        encode_ts_add(series, value, &mut command);

        let mut state = self.state.lock().await;
        let conn = self.ensure_connected(&mut *state).await?;

        let io_timeout = self.config.io_timeout;
        let result = match tokio::time::timeout(io_timeout, Self::round_trip(conn, &command)).await
        {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout {
                operation: "TS.ADD",
                timeout_ms: u64::try_from(io_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        };

        match result {
            Ok(Reply::Error(message)) => Err(SinkError::Rejected { message }),
            Ok(reply) => {
                debug!(series, value, ?reply, "TS.ADD accepted");
                Ok(())
            }
            Err(e) => {
                if e.breaks_connection() {
                    debug!(error = %e, "Dropping Redis connection");
                    state.conn = None;
                }
                Err(e)
            }
        }
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn encoded(series: &str, value: f64) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_ts_add(series, value, &mut buf);
        buf
    }

    fn test_config(addr: std::net::SocketAddr) -> RedisConfig {
        RedisConfig::new(addr.to_string())
            .with_connect_timeout(Duration::from_secs(2))
            .with_io_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_encode_ts_add() {
        let buf = encoded("metrics", 3.0);
        assert_eq!(
            &buf[..],
            b"*4\r\n$6\r\nTS.ADD\r\n$7\r\nmetrics\r\n$1\r\n*\r\n$8\r\n3.000000\r\n"
        );
    }

    #[test]
    fn test_encode_fractional_value() {
        let buf = encoded("delay_metrics", 1.4);
        assert!(buf.ends_with(b"$8\r\n1.400000\r\n"));
        assert!(buf.starts_with(b"*4\r\n$6\r\nTS.ADD\r\n$13\r\ndelay_metrics\r\n"));
    }

    #[test]
    fn test_decode_replies() {
        assert_eq!(
            decode_reply(b"+OK\r\n").unwrap(),
            Some((Reply::Simple("OK".to_string()), 5))
        );
        assert_eq!(
            decode_reply(b":1700000000000\r\n").unwrap(),
            Some((Reply::Integer(1_700_000_000_000), 16))
        );
        assert_eq!(
            decode_reply(b"-ERR TSDB: key does not exist\r\n").unwrap(),
            Some((Reply::Error("ERR TSDB: key does not exist".to_string()), 31))
        );
        assert_eq!(
            decode_reply(b"$3\r\nabc\r\n").unwrap(),
            Some((Reply::Bulk(Some(Bytes::from_static(b"abc"))), 9))
        );
        assert_eq!(
            decode_reply(b"$-1\r\n").unwrap(),
            Some((Reply::Bulk(None), 5))
        );
    }

    #[test]
    fn test_decode_partial_reply() {
        assert_eq!(decode_reply(b"").unwrap(), None);
        assert_eq!(decode_reply(b":17000").unwrap(), None);
        assert_eq!(decode_reply(b"$3\r\nab").unwrap(), None);
    }

    #[test]
    fn test_decode_leaves_trailing_bytes() {
        let (reply, consumed) = decode_reply(b":1\r\n:2\r\n").unwrap().unwrap();
        assert_eq!(reply, Reply::Integer(1));
        assert_eq!(consumed, 4);
    }

    #[test]
    fn test_decode_malformed() {
        assert!(matches!(
            decode_reply(b":abc\r\n"),
            Err(SinkError::Protocol { .. })
        ));
        assert!(matches!(
            decode_reply(b"*1\r\n"),
            Err(SinkError::Protocol { .. })
        ));
        assert!(matches!(
            decode_reply(b"$3\r\nabcd\r\n"),
            Err(SinkError::Protocol { .. })
        ));
    }

    #[tokio::test]
    async fn test_record_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let expected = [encoded("metrics", 1.0), encoded("delay_metrics", 2.5)];

        let server = tokio::spawn({
            let expected = expected.clone();
            async move {
                let (mut stream, _) = listener.accept().await.unwrap();
                for command in &expected {
                    let mut received = vec![0u8; command.len()];
                    stream.read_exact(&mut received).await.unwrap();
                    assert_eq!(&received[..], &command[..]);
                    stream.write_all(b":1700000000000\r\n").await.unwrap();
                }
            }
        });

        let sink = RedisTimeSeriesSink::new(test_config(addr));
        assert!(!sink.is_connected().await);
        sink.record("metrics", 1.0).await.unwrap();
        assert!(sink.is_connected().await);
        sink.record("delay_metrics", 2.5).await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_error_reply_is_rejection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let command_len = encoded("metrics", 1.0).len();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = vec![0u8; command_len];
            stream.read_exact(&mut received).await.unwrap();
            stream
                .write_all(b"-ERR unknown command 'TS.ADD'\r\n")
                .await
                .unwrap();
            stream.read_exact(&mut received).await.unwrap();
            stream.write_all(b"+OK\r\n").await.unwrap();
        });

        let sink = RedisTimeSeriesSink::new(test_config(addr));
        let result = sink.record("metrics", 1.0).await;
        assert!(
            matches!(result, Err(SinkError::Rejected { ref message }) if message.contains("unknown command"))
        );
        // A rejection keeps the connection.
        assert!(sink.is_connected().await);
        sink.record("metrics", 1.0).await.unwrap();

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_reconnects_after_server_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let command = encoded("metrics", 1.0);

        let server = tokio::spawn({
            let command_len = command.len();
            async move {
                for _ in 0..2 {
                    let (mut stream, _) = listener.accept().await.unwrap();
                    let mut received = vec![0u8; command_len];
                    stream.read_exact(&mut received).await.unwrap();
                    stream.write_all(b":1\r\n").await.unwrap();
                }
            }
        });

        let sink = RedisTimeSeriesSink::new(test_config(addr));
        sink.record("metrics", 1.0).await.unwrap();

        // The server dropped the first connection after one reply.
        let broken = sink.record("metrics", 1.0).await;
        assert!(broken.is_err());
        assert!(!sink.is_connected().await);

        sink.record("metrics", 1.0).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_record_does_not_shift_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let command_len = encoded("metrics", 1.0).len();

        let server = tokio::spawn(async move {
            // First connection: answer late with an error.
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut received = vec![0u8; command_len];
            stream.read_exact(&mut received).await.unwrap();
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = stream.write_all(b"-ERR reply to first\r\n").await;

            // Second connection: answer promptly.
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.read_exact(&mut received).await.unwrap();
            stream.write_all(b"+OK\r\n").await.unwrap();
        });

        let sink = RedisTimeSeriesSink::new(test_config(addr));
        let first =
            tokio::time::timeout(Duration::from_millis(50), sink.record("metrics", 1.0)).await;
        assert!(first.is_err(), "first record should still be waiting");
        assert!(!sink.is_connected().await);

        sink.record("metrics", 2.0).await.unwrap();
        assert!(sink.is_connected().await);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_failure_backs_off() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sink = RedisTimeSeriesSink::new(test_config(addr));
        let first = sink.record("metrics", 1.0).await;
        assert!(matches!(first, Err(SinkError::Connect { .. })));

        let second = sink.record("metrics", 1.0).await;
        assert!(matches!(second, Err(SinkError::Unavailable { .. })));

        // An explicit connect ignores the backoff but still fails.
        assert!(matches!(
            sink.connect().await,
            Err(SinkError::Connect { .. })
        ));
    }
}
