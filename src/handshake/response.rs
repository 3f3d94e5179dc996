//! Server handshake response.
//!
//! From [RFC-6455 Section 4.2](https://datatracker.ietf.org/doc/html/rfc6455#section-4.2):
//!
//! If the server chooses to accept the incoming connection, it MUST
//! reply with a valid HTTP response.
//!
//! Example:
//!
//! ```text
//! HTTP/1.1 101 Switching Protocols
//! upgrade: websocket
//! connection: upgrade
//! sec-websocket-accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=
//! ```
//!

use super::derive_accept_key;
use super::{HTTP_HEADER_SP, HTTP_LINE_BREAK, SEC_WS_VERSION};

macro_rules! put_header {
    ($buf: expr, $name: expr, $value: expr) => {{
        $buf.extend_from_slice($name);
        $buf.extend_from_slice(HTTP_HEADER_SP);
        $buf.extend_from_slice($value);
        $buf.extend_from_slice(HTTP_LINE_BREAK);
    }};
}

/// Encode the 101 response accepting an upgrade. The trailing blank
/// line is included; the caller writes the buffer and flushes before
/// the first frame may travel.
pub fn encode_accept(sec_key: &[u8]) -> Vec<u8> {
    let sec_accept = derive_accept_key(sec_key);

    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols");
    buf.extend_from_slice(HTTP_LINE_BREAK);

    put_header!(buf, b"upgrade", b"websocket");
    put_header!(buf, b"connection", b"upgrade");
    put_header!(buf, b"sec-websocket-accept", &sec_accept);

    buf.extend_from_slice(HTTP_LINE_BREAK);
    buf
}

/// Encode the 400 response refusing an upgrade, advertising the
/// supported protocol version.
pub fn encode_rejection() -> Vec<u8> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(b"HTTP/1.1 400 Bad Request");
    buf.extend_from_slice(HTTP_LINE_BREAK);

    put_header!(buf, b"sec-websocket-version", SEC_WS_VERSION);

    buf.extend_from_slice(HTTP_LINE_BREAK);
    buf
}
