//! Blocking single-connection client for Redis-compatible stores.
//!
//! One request is in flight at a time: each call writes a command and
//! blocks until the complete reply has been read or the I/O timeout fires.

use crate::error::{ClientError, Result};
use crate::protocols::resp::codec::{bulk_frame_len, decode, Decoded, Frame};
use bytes::{Buf, Bytes, BytesMut};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, trace};

/// Read chunk size
const READ_CHUNK: usize = 4 * 1024;

/// Largest reply accepted before the connection is abandoned
pub const MAX_REPLY_BYTES: usize = 64 * 1024 * 1024;

/// Where and how to connect.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Return values as text instead of raw bytes.
    pub decode_responses: bool,
    /// Zero disables the timeout.
    pub connect_timeout: Duration,
    /// Applied to every read and write. Zero disables the timeout.
    pub io_timeout: Duration,
}

impl ConnectOptions {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A value read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Bytes(Bytes),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            // Bytes renders as a b"..." literal with escapes
            Value::Bytes(b) => write!(f, "{b:?}"),
        }
    }
}

/// Reply to PING. Only `+PONG` counts as affirmative.
#[derive(Debug)]
pub struct PingReply(Frame);

impl PingReply {
    pub fn is_pong(&self) -> bool {
        matches!(&self.0, Frame::Simple(s) if s == "PONG")
    }

    pub fn describe(&self) -> String {
        self.0.describe()
    }
}

/// An open, possibly authenticated, connection.
pub struct Client {
    stream: TcpStream,
    peer: SocketAddr,
    buffer: BytesMut,
    decode_responses: bool,
    /// Set once a request failed in a way that leaves the stream unusable.
    broken: bool,
}

impl Client {
    /// Connect to the first reachable resolved address, then authenticate
    /// if a password is configured.
    pub fn connect(options: &ConnectOptions) -> Result<Client> {
        let address = options.address();
        let candidates: Vec<SocketAddr> = address
            .to_socket_addrs()
            .map_err(|e| ClientError::Resolve(address.clone(), e))?
            .collect();

        if candidates.is_empty() {
            return Err(ClientError::Resolve(
                address,
                io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            ));
        }

        let mut last_error = None;
        for peer in candidates {
            match open_stream(peer, options) {
                Ok(stream) => {
                    debug!(%peer, "Connected");
                    let mut client = Client {
                        stream,
                        peer,
                        buffer: BytesMut::with_capacity(READ_CHUNK),
                        decode_responses: options.decode_responses,
                        broken: false,
                    };
                    if let Some(password) = options.password.as_deref() {
                        client.auth(options.username.as_deref(), password)?;
                    }
                    return Ok(client);
                }
                Err(e) => {
                    debug!(%peer, error = %e, "Connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::NotConnected, "no address accepted the connection")
            })
            .into())
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// `AUTH [username] password`
    pub fn auth(&mut self, username: Option<&str>, password: &str) -> Result<()> {
        let reply = match username {
            Some(user) => self.request(&[b"AUTH", user.as_bytes(), password.as_bytes()])?,
            None => self.request(&[b"AUTH", password.as_bytes()])?,
        };
        expect_ok("AUTH", reply)?;
        debug!(peer = %self.peer, "Authenticated");
        Ok(())
    }

    pub fn ping(&mut self) -> Result<PingReply> {
        self.request(&[b"PING"]).map(PingReply)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let reply = self.request(&[b"SET", key.as_bytes(), value.as_bytes()])?;
        expect_ok("SET", reply)
    }

    /// `None` when the key does not exist.
    pub fn get(&mut self, key: &str) -> Result<Option<Value>> {
        match self.request(&[b"GET", key.as_bytes()])? {
            Frame::Bulk(None) => Ok(None),
            Frame::Bulk(Some(data)) if self.decode_responses => String::from_utf8(data.to_vec())
                .map(|text| Some(Value::Text(text)))
                .map_err(|_| ClientError::UnexpectedReply {
                    command: "GET",
                    reply: "value is not valid UTF-8".to_string(),
                }),
            Frame::Bulk(Some(data)) => Ok(Some(Value::Bytes(data))),
            other => Err(unexpected("GET", &other)),
        }
    }

    /// Returns the number of keys removed.
    pub fn del(&mut self, key: &str) -> Result<i64> {
        match self.request(&[b"DEL", key.as_bytes()])? {
            Frame::Integer(n) => Ok(n),
            other => Err(unexpected("DEL", &other)),
        }
    }

    /// Send QUIT and drop the connection. Errors are ignored; the socket is
    /// closed either way. QUIT is skipped when an earlier request left the
    /// stream dead or out of sync, so no further timeout is paid.
    pub fn close(mut self) {
        if self.broken {
            debug!(peer = %self.peer, "Dropping broken connection");
            return;
        }
        if let Err(e) = self.request(&[b"QUIT"]) {
            trace!(peer = %self.peer, error = %e, "QUIT failed");
        }
        debug!(peer = %self.peer, "Connection closed");
    }

    /// Write one command and block for its reply. Error replies become
    /// `ClientError`s.
    fn request(&mut self, parts: &[&[u8]]) -> Result<Frame> {
        let result = self.exchange(parts);
        if let Err(e) = &result {
            self.broken |= e.is_fatal();
        }
        result
    }

    fn exchange(&mut self, parts: &[&[u8]]) -> Result<Frame> {
        let mut out = BytesMut::new();
        Frame::command(parts).encode_into(&mut out);
        trace!(command = %String::from_utf8_lossy(parts[0]), bytes = out.len(), "Sending");
        self.stream.write_all(&out)?;

        match self.read_frame()? {
            Frame::Error(message) => Err(ClientError::from_reply(message)),
            frame => Ok(frame),
        }
    }

    fn read_frame(&mut self) -> Result<Frame> {
        // Bytes needed before decoding is worth retrying; known up front for
        // bulk strings, which is where large replies come from.
        let mut wanted = 0;
        loop {
            if self.buffer.len() >= wanted {
                match decode(&self.buffer) {
                    Decoded::Complete(frame, consumed) => {
                        self.buffer.advance(consumed);
                        trace!(?frame, "Received");
                        return Ok(frame);
                    }
                    Decoded::Incomplete => {
                        wanted = bulk_frame_len(&self.buffer).unwrap_or(0);
                    }
                    Decoded::Invalid(reason) => return Err(ClientError::Protocol(reason)),
                }
            }

            if wanted > MAX_REPLY_BYTES || self.buffer.len() > MAX_REPLY_BYTES {
                return Err(ClientError::Protocol(format!(
                    "reply larger than {MAX_REPLY_BYTES} bytes"
                )));
            }
            if wanted > self.buffer.len() {
                self.buffer.reserve(wanted - self.buffer.len());
            }

            let mut chunk = [0u8; READ_CHUNK];
            let n = self.stream.read(&mut chunk)?;
            if n == 0 {
                return Err(ClientError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by server",
                )));
            }
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Open a TCP stream to one address with the configured timeouts.
fn open_stream(addr: SocketAddr, options: &ConnectOptions) -> io::Result<TcpStream> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    if options.connect_timeout.is_zero() {
        socket.connect(&addr.into())?;
    } else {
        socket.connect_timeout(&addr.into(), options.connect_timeout)?;
    }

    let io_timeout = non_zero(options.io_timeout);
    socket.set_nodelay(true)?;
    socket.set_read_timeout(io_timeout)?;
    socket.set_write_timeout(io_timeout)?;

    Ok(socket.into())
}

fn non_zero(timeout: Duration) -> Option<Duration> {
    (!timeout.is_zero()).then_some(timeout)
}

fn expect_ok(command: &'static str, reply: Frame) -> Result<()> {
    match reply {
        Frame::Simple(s) if s == "OK" => Ok(()),
        other => Err(unexpected(command, &other)),
    }
}

fn unexpected(command: &'static str, reply: &Frame) -> ClientError {
    ClientError::UnexpectedReply {
        command,
        reply: reply.describe(),
    }
}
