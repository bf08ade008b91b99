//! RESP2 frame codec for the client side of a connection.
//!
//! Requests are always sent as arrays of bulk strings. Replies may be any
//! RESP2 frame type, so the decoder handles all of them.

use bytes::{Bytes, BytesMut};

/// A single RESP2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),
    /// `-ERR message\r\n`
    Error(String),
    /// `:1000\r\n`
    Integer(i64),
    /// `$5\r\nhello\r\n`, or `$-1\r\n` for nil
    Bulk(Option<Bytes>),
    /// `*2\r\n...`, or `*-1\r\n` for nil
    Array(Option<Vec<Frame>>),
}

impl Frame {
    /// Build a request frame from a command name and its arguments.
    pub fn command<I, B>(parts: I) -> Frame
    where
        I: IntoIterator<Item = B>,
        B: AsRef<[u8]>,
    {
        let parts = parts
            .into_iter()
            .map(|part| Frame::Bulk(Some(Bytes::copy_from_slice(part.as_ref()))))
            .collect();
        Frame::Array(Some(parts))
    }

    /// Serialize this frame onto the end of `buf`.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Frame::Simple(s) => put_line(buf, b'+', s.as_bytes()),
            Frame::Error(s) => put_line(buf, b'-', s.as_bytes()),
            Frame::Integer(n) => put_line(buf, b':', n.to_string().as_bytes()),
            Frame::Bulk(None) => buf.extend_from_slice(b"$-1\r\n"),
            Frame::Bulk(Some(data)) => {
                put_line(buf, b'$', data.len().to_string().as_bytes());
                buf.extend_from_slice(data);
                buf.extend_from_slice(b"\r\n");
            }
            Frame::Array(None) => buf.extend_from_slice(b"*-1\r\n"),
            Frame::Array(Some(frames)) => {
                put_line(buf, b'*', frames.len().to_string().as_bytes());
                for frame in frames {
                    frame.encode_into(buf);
                }
            }
        }
    }

    /// Short human-readable rendering used in logs and reports.
    pub fn describe(&self) -> String {
        match self {
            Frame::Simple(s) => s.clone(),
            Frame::Error(s) => format!("error '{s}'"),
            Frame::Integer(n) => format!("integer {n}"),
            Frame::Bulk(Some(data)) => String::from_utf8_lossy(data).into_owned(),
            Frame::Bulk(None) | Frame::Array(None) => "nil".to_string(),
            Frame::Array(Some(frames)) => format!("array of {} elements", frames.len()),
        }
    }
}

fn put_line(buf: &mut BytesMut, marker: u8, body: &[u8]) {
    buf.extend_from_slice(&[marker]);
    buf.extend_from_slice(body);
    buf.extend_from_slice(b"\r\n");
}

/// Outcome of a decode attempt.
#[derive(Debug, PartialEq)]
pub enum Decoded {
    /// A full frame and the number of bytes it occupied.
    Complete(Frame, usize),
    /// The buffer holds only part of a frame.
    Incomplete,
    /// The buffer does not start with a valid frame.
    Invalid(String),
}

/// Deepest array nesting accepted in a reply.
pub const MAX_NESTING: usize = 32;

/// Decode one frame from the start of `buf`.
///
/// Nothing is consumed unless the whole frame is present.
pub fn decode(buf: &[u8]) -> Decoded {
    decode_at(buf, 0)
}

/// Total encoded size of the bulk string at the start of `buf`, once its
/// length header has arrived. `None` for any other frame type.
pub fn bulk_frame_len(buf: &[u8]) -> Option<usize> {
    if buf.first() != Some(&b'$') {
        return None;
    }
    let (line, header_len) = header_line(buf).ok().flatten()?;
    let len = parse_len(line).ok().flatten()?;
    header_len.checked_add(len)?.checked_add(2)
}

fn decode_at(buf: &[u8], depth: usize) -> Decoded {
    let Some(&marker) = buf.first() else {
        return Decoded::Incomplete;
    };

    let (line, header_len) = match header_line(buf) {
        Ok(Some(found)) => found,
        Ok(None) => return Decoded::Incomplete,
        Err(reason) => return Decoded::Invalid(reason),
    };

    match marker {
        b'+' => Decoded::Complete(Frame::Simple(line.to_string()), header_len),
        b'-' => Decoded::Complete(Frame::Error(line.to_string()), header_len),
        b':' => match line.parse::<i64>() {
            Ok(n) => Decoded::Complete(Frame::Integer(n), header_len),
            Err(_) => Decoded::Invalid(format!("invalid integer reply: {line}")),
        },
        b'$' => decode_bulk(buf, line, header_len),
        b'*' => decode_array(buf, line, header_len, depth),
        other => Decoded::Invalid(format!("unknown reply type byte 0x{other:02x}")),
    }
}

/// Split off the first CRLF-terminated line, minus its type marker.
fn header_line(buf: &[u8]) -> Result<Option<(&str, usize)>, String> {
    let Some(cr) = buf[1..].windows(2).position(|w| w == b"\r\n") else {
        return Ok(None);
    };
    let cr = cr + 1;
    std::str::from_utf8(&buf[1..cr])
        .map(|line| Some((line, cr + 2)))
        .map_err(|_| "reply header is not valid UTF-8".to_string())
}

/// Parse a length header; negative lengths mean nil.
fn parse_len(line: &str) -> Result<Option<usize>, String> {
    let len: i64 = line
        .parse()
        .map_err(|_| format!("invalid length header: {line}"))?;
    Ok(usize::try_from(len).ok())
}

fn decode_bulk(buf: &[u8], line: &str, header_len: usize) -> Decoded {
    let len = match parse_len(line) {
        Ok(Some(len)) => len,
        Ok(None) => return Decoded::Complete(Frame::Bulk(None), header_len),
        Err(reason) => return Decoded::Invalid(reason),
    };

    let Some(end) = header_len.checked_add(len).filter(|end| *end < usize::MAX - 2) else {
        return Decoded::Invalid(format!("bulk string length out of range: {line}"));
    };
    if buf.len() < end + 2 {
        return Decoded::Incomplete;
    }
    if &buf[end..end + 2] != b"\r\n" {
        return Decoded::Invalid("bulk string not terminated by CRLF".to_string());
    }

    let data = Bytes::copy_from_slice(&buf[header_len..end]);
    Decoded::Complete(Frame::Bulk(Some(data)), end + 2)
}

fn decode_array(buf: &[u8], line: &str, header_len: usize, depth: usize) -> Decoded {
    if depth >= MAX_NESTING {
        return Decoded::Invalid(format!("arrays nested deeper than {MAX_NESTING}"));
    }

    let count = match parse_len(line) {
        Ok(Some(count)) => count,
        Ok(None) => return Decoded::Complete(Frame::Array(None), header_len),
        Err(reason) => return Decoded::Invalid(reason),
    };

    let mut offset = header_len;
    // Header count is untrusted until the elements arrive
    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        match decode_at(&buf[offset..], depth + 1) {
            Decoded::Complete(item, used) => {
                items.push(item);
                offset += used;
            }
            other => return other,
        }
    }

    Decoded::Complete(Frame::Array(Some(items)), offset)
}
