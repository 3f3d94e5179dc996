use std::fmt::{Display, Formatter};

#[derive(Debug, PartialEq, Eq)]
pub enum FrameError {
    /// Peer closed the stream before the first byte of a frame.
    EndOfStream,

    /// Stream ended inside a frame header or payload.
    UnexpectedEndOfStream,

    /// RSV1/2/3 must be zero when no extension is negotiated.
    IllegalRsv,

    IllegalOpCode,

    /// Control frame fragmented or longer than 125 bytes.
    IllegalControlFrame,

    /// Close frame payload of one byte; a status code needs two.
    IllegalClosePayload,

    /// Extended payload length below the minimum for its encoding.
    NonMinimalLength,

    /// 64-bit payload length with the forbidden top bit set.
    PayloadTooLong,
}

impl FrameError {
    /// True for every header fault that is not an end-of-stream
    /// condition; these are answered with a 1002 close frame.
    pub fn is_malformed(&self) -> bool {
        use FrameError::*;
        !matches!(self, EndOfStream | UnexpectedEndOfStream)
    }
}

impl Display for FrameError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use FrameError::*;
        match self {
            EndOfStream => write!(f, "End of stream"),
            UnexpectedEndOfStream => write!(f, "Unexpected end of stream"),
            IllegalRsv => write!(f, "Reserved bits set without extension"),
            IllegalOpCode => write!(f, "Illegal opcode value"),
            IllegalControlFrame => {
                write!(f, "Control frame fragmented or longer than 125 bytes")
            }
            IllegalClosePayload => {
                write!(f, "Close frame payload too short for a status code")
            }
            NonMinimalLength => {
                write!(f, "Payload length not minimally encoded")
            }
            PayloadTooLong => write!(f, "Payload length above 2^63 - 1"),
        }
    }
}

// use default impl
impl std::error::Error for FrameError {}
