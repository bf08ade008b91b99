//! In-process RESP server for tests.

use crate::protocols::resp::codec::{decode, Decoded, Frame};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Minimal store behaviour: AUTH, PING, SET, GET, DEL, QUIT.
#[derive(Debug, Clone)]
pub struct FakeStore {
    pub password: Option<String>,
    pub ping_reply: Frame,
    data: HashMap<Vec<u8>, Bytes>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            password: None,
            ping_reply: Frame::Simple("PONG".to_string()),
            data: HashMap::new(),
        }
    }
}

impl FakeStore {
    pub fn with_password(password: &str) -> Self {
        Self {
            password: Some(password.to_string()),
            ..Self::default()
        }
    }

    fn execute(&mut self, args: &[Bytes], authed: &mut bool) -> Frame {
        let name = String::from_utf8_lossy(&args[0]).to_uppercase();

        if name == "AUTH" {
            let supplied = args.last().map(|p| &p[..]);
            return match self.password.as_deref() {
                None => Frame::Error(
                    "ERR AUTH <password> called without any password configured".to_string(),
                ),
                Some(expected) if supplied == Some(expected.as_bytes()) => {
                    *authed = true;
                    Frame::Simple("OK".to_string())
                }
                Some(_) => Frame::Error(
                    "WRONGPASS invalid username-password pair or user is disabled.".to_string(),
                ),
            };
        }

        if self.password.is_some() && !*authed {
            return Frame::Error("NOAUTH Authentication required.".to_string());
        }

        match (name.as_str(), args) {
            ("PING", _) => self.ping_reply.clone(),
            ("SET", [_, key, value]) => {
                self.data.insert(key.to_vec(), value.clone());
                Frame::Simple("OK".to_string())
            }
            ("GET", [_, key]) => Frame::Bulk(self.data.get(&key[..]).cloned()),
            ("DEL", [_, key]) => Frame::Integer(i64::from(self.data.remove(&key[..]).is_some())),
            ("QUIT", _) => Frame::Simple("OK".to_string()),
            _ => Frame::Error(format!("ERR unknown command '{name}'")),
        }
    }
}

/// Serves a fixed number of connections on an ephemeral port, sharing one
/// `FakeStore` across them, and records every command it receives.
pub struct ScriptedServer {
    port: u16,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedServer {
    pub fn start(store: FakeStore, connections: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let log = Arc::new(Mutex::new(Vec::new()));

        let thread_log = Arc::clone(&log);
        thread::spawn(move || {
            let mut store = store;
            for stream in listener.incoming().take(connections) {
                match stream {
                    Ok(stream) => serve(stream, &mut store, &thread_log),
                    Err(_) => break,
                }
            }
        });

        Self { port, log }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Received commands, arguments joined by spaces.
    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

fn serve(mut stream: TcpStream, store: &mut FakeStore, log: &Mutex<Vec<String>>) {
    let mut buffer = BytesMut::new();
    let mut authed = false;
    let mut chunk = [0u8; 1024];

    loop {
        let frame = match decode(&buffer) {
            Decoded::Complete(frame, consumed) => {
                buffer.advance(consumed);
                frame
            }
            Decoded::Incomplete => match stream.read(&mut chunk) {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    continue;
                }
            },
            Decoded::Invalid(_) => return,
        };

        let Frame::Array(Some(items)) = frame else {
            return;
        };
        let args: Vec<Bytes> = items
            .into_iter()
            .filter_map(|item| match item {
                Frame::Bulk(Some(data)) => Some(data),
                _ => None,
            })
            .collect();
        if args.is_empty() {
            return;
        }

        let line = args
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        log.lock().unwrap().push(line);

        let quit = args[0].eq_ignore_ascii_case(b"QUIT");
        let mut out = BytesMut::new();
        store.execute(&args, &mut authed).encode_into(&mut out);
        if stream.write_all(&out).is_err() || quit {
            return;
        }
    }
}

/// A local port with nothing listening on it.
pub fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Accepts one connection, answers the first request with `reply` verbatim
/// (nothing at all if empty), then holds the socket open without reading.
pub fn raw_reply_server(reply: Vec<u8>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return;
        };
        let mut chunk = [0u8; 1024];
        if matches!(stream.read(&mut chunk), Ok(n) if n > 0) && !reply.is_empty() {
            let _ = stream.write_all(&reply);
        }
        thread::sleep(Duration::from_secs(10));
    });

    port
}
