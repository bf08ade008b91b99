//! RESP (Redis Serialization Protocol) support.
//!
//! Only RESP2 is spoken; the probe never sends HELLO.

pub mod codec;
