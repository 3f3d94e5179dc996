//! Close status codes and payload.
//!
//! [RFC-6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4)

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::FrameError;

/// 1000
pub const NORMAL_CLOSURE: u16 = 1000;

/// 1001
pub const GOING_AWAY: u16 = 1001;

/// 1002
pub const PROTOCOL_ERROR: u16 = 1002;

/// 1003, reserved; nothing emits it until text frames are validated
pub const UNSUPPORTED_DATA: u16 = 1003;

/// The status code takes 2 of the 125 control payload bytes.
pub const MAX_REASON_LENGTH: usize = 123;

/// Build a close frame payload: big-endian status code followed by a
/// UTF-8 reason. The reason is cut at [`MAX_REASON_LENGTH`] bytes so the
/// control frame size limit always holds.
pub fn close_payload(code: u16, reason: &str) -> Bytes {
    let mut reason = reason.as_bytes();
    if reason.len() > MAX_REASON_LENGTH {
        reason = &reason[..MAX_REASON_LENGTH];
    }

    let mut buf = BytesMut::with_capacity(2 + reason.len());
    buf.put_u16(code);
    buf.put_slice(reason);
    buf.freeze()
}

/// Split a close frame payload into status code and reason.
///
/// An empty payload is legal and carries no status. A single-byte
/// payload cannot hold a status code and is malformed; the router
/// answers it with status 1002.
pub fn parse_close_payload(payload: &[u8]) -> Result<Option<(u16, String)>, FrameError> {
    match payload.len() {
        0 => Ok(None),
        1 => Err(FrameError::IllegalClosePayload),
        _ => {
            let code = u16::from_be_bytes([payload[0], payload[1]]);
            let reason = String::from_utf8_lossy(&payload[2..]).into_owned();
            Ok(Some((code, reason)))
        }
    }
}
