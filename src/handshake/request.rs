//! Client upgrade request.
//!
//! From [RFC-6455 Section 4.1](https://datatracker.ietf.org/doc/html/rfc6455#section-4.1):
//!
//! Once a connection to the server has been established (including a
//! connection via a proxy or over a TLS-encrypted tunnel), the client
//! MUST send an opening handshake to the server.  The handshake consists
//! of an HTTP Upgrade request, along with a list of required and
//! optional header fields.
//!
//! Example:
//!
//! ```text
//! GET /path HTTP/1.1
//! host: www.example.com
//! upgrade: websocket
//! connection: upgrade
//! sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==
//! sec-websocket-version: 13
//! ```
//!

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::{MAX_ALLOW_HEADERS, SEC_WS_KEY_LENGTH, SEC_WS_VERSION};
use crate::error::HandshakeError;

/// The validated parts of a client upgrade request.
#[derive(Debug)]
pub struct UpgradeRequest<'b> {
    pub path: &'b str,
    pub sec_key: &'b [u8],
}

impl<'b> UpgradeRequest<'b> {
    /// Parse and validate an upgrade request from a provided buffer,
    /// returning the request and the number of bytes it occupies.
    ///
    /// Checks, in order: method is GET, HTTP version is at least 1.1,
    /// `upgrade: websocket` and `connection: upgrade` are present
    /// (values case insensitive), `sec-websocket-version` is 13, and
    /// `sec-websocket-key` base64-decodes to exactly 16 bytes.
    ///
    /// If the buffer does not yet contain the complete head, a
    /// [`HandshakeError::NotEnoughData`] error will be returned and the
    /// caller should read more bytes.
    pub fn decode(buf: &'b [u8]) -> Result<(Self, usize), HandshakeError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_ALLOW_HEADERS];
        let mut request = httparse::Request::new(&mut headers);

        let decode_n = match request.parse(buf)? {
            httparse::Status::Complete(n) => n,
            httparse::Status::Partial => return Err(HandshakeError::NotEnoughData),
        };

        // check method
        if request.method != Some("GET") {
            return Err(HandshakeError::HttpMethod);
        }

        // check version, should be HTTP/1.1
        // ref: https://docs.rs/httparse/latest/src/httparse/lib.rs.html#581-596
        if request.version.unwrap() != 1_u8 {
            return Err(HandshakeError::HttpVersion);
        }

        let mut upgrade: Option<&[u8]> = None;
        let mut connection: Option<&[u8]> = None;
        let mut sec_key: Option<&[u8]> = None;
        let mut sec_version: Option<&[u8]> = None;

        for hdr in request.headers.iter() {
            let name = hdr.name.as_bytes();
            let slot = if name.eq_ignore_ascii_case(b"upgrade") {
                &mut upgrade
            } else if name.eq_ignore_ascii_case(b"connection") {
                &mut connection
            } else if name.eq_ignore_ascii_case(b"sec-websocket-key") {
                &mut sec_key
            } else if name.eq_ignore_ascii_case(b"sec-websocket-version") {
                &mut sec_version
            } else {
                continue;
            };
            // first value wins when a header repeats
            if slot.is_none() {
                *slot = Some(hdr.value);
            }
        }

        // check header value (case insensitive)
        // ref: https://datatracker.ietf.org/doc/html/rfc6455#section-4.1
        match upgrade {
            Some(v) if v.eq_ignore_ascii_case(b"websocket") => {}
            _ => return Err(HandshakeError::Upgrade),
        }

        match connection {
            Some(v) if v.eq_ignore_ascii_case(b"upgrade") => {}
            _ => return Err(HandshakeError::Connection),
        }

        match sec_version {
            Some(v) if v == SEC_WS_VERSION => {}
            _ => return Err(HandshakeError::SecWebSocketVersion),
        }

        let sec_key = match sec_key {
            Some(v) => trim_ascii(v),
            None => return Err(HandshakeError::SecWebSocketKey),
        };

        // the key must carry exactly 16 bytes of entropy
        match Engine::decode(&STANDARD, sec_key) {
            Ok(decoded) if decoded.len() == SEC_WS_KEY_LENGTH => {}
            _ => return Err(HandshakeError::SecWebSocketKey),
        }

        Ok((
            UpgradeRequest {
                path: request.path.unwrap(),
                sec_key,
            },
            decode_n,
        ))
    }
}

fn trim_ascii(mut v: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = v {
        v = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = v {
        v = rest;
    }
    v
}
