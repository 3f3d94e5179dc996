//! Websocket data frame.
//!
//! [RFC-6455 Section5](https://datatracker.ietf.org/doc/html/rfc6455#section-5)
//!
//! ```text
//! 0                   1                   2                   3
//! 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! :                     Payload Data continued ...                :
//! + - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - +
//! |                     Payload Data continued ...                |
//! +---------------------------------------------------------------+
//! ```
//!
//! The decoder consumes exactly the header bytes from an async stream
//! and validates before returning; the encoder is server-role only and
//! never emits a masking key.

pub mod close;
pub mod flag;
pub mod length;
pub mod mask;

pub use flag::{Fin, OpCode};
pub use length::PayloadLen;
pub use mask::Mask;

use std::fmt::{Display, Formatter};
use std::io::ErrorKind;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, FrameError};

/// Control frame payload limit.
pub const MAX_CONTROL_PAYLOAD: u64 = 125;

/// Longest head this server emits: 2 flag bytes + 64-bit length.
pub const MAX_SEND_HEAD_LENGTH: usize = 2 + 8;

/// Websocket frame head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHead {
    pub fin: Fin,
    pub opcode: OpCode,
    pub mask: Mask,
    pub length: PayloadLen,
}

impl FrameHead {
    /// Constructor, validating the control frame rules: a control frame
    /// must carry `fin` and at most 125 payload bytes.
    pub const fn new(
        fin: Fin,
        opcode: OpCode,
        mask: Mask,
        length: PayloadLen,
    ) -> Result<Self, FrameError> {
        if opcode.is_control()
            && (matches!(fin, Fin::N) || length.to_num() > MAX_CONTROL_PAYLOAD)
        {
            return Err(FrameError::IllegalControlFrame);
        }
        Ok(Self {
            fin,
            opcode,
            mask,
            length,
        })
    }

    /// Parse a frame head from the stream, consuming exactly the 2 to 14
    /// bytes it occupies.
    ///
    /// A stream that ends before the first byte yields
    /// [`FrameError::EndOfStream`]; one that ends inside the head yields
    /// [`FrameError::UnexpectedEndOfStream`]. All header invariants
    /// (RSV bits clear, known opcode, minimal length encoding, control
    /// frame rules) are checked before returning.
    pub async fn read_from<R>(io: &mut R) -> Result<Self, Error>
    where
        R: AsyncRead + Unpin,
    {
        let mut flags = [0u8; 2];

        // the first byte alone distinguishes a clean end of stream
        // from a truncated frame
        if io.read(&mut flags[..1]).await? == 0 {
            return Err(FrameError::EndOfStream.into());
        }
        read_exact(io, &mut flags[1..]).await?;

        if flags[0] & 0x70 != 0 {
            return Err(FrameError::IllegalRsv.into());
        }

        let fin = Fin::from_flag(flags[0]);
        let opcode = OpCode::from_flag(flags[0])?;

        let mut length = PayloadLen::from_flag(flags[1]);
        match length {
            PayloadLen::Standard(_) => {}
            PayloadLen::Extended1(_) => {
                let mut ext = [0u8; 2];
                read_exact(io, &mut ext).await?;
                length = PayloadLen::from_byte2(ext);
                if length.to_num() < 126 {
                    return Err(FrameError::NonMinimalLength.into());
                }
            }
            PayloadLen::Extended2(_) => {
                let mut ext = [0u8; 8];
                read_exact(io, &mut ext).await?;
                if ext[0] & 0x80 != 0 {
                    return Err(FrameError::PayloadTooLong.into());
                }
                length = PayloadLen::from_byte8(ext);
                if length.to_num() <= u16::MAX as u64 {
                    return Err(FrameError::NonMinimalLength.into());
                }
            }
        }

        let mask = if flags[1] & 0x80 != 0 {
            let mut key = [0u8; 4];
            read_exact(io, &mut key).await?;
            Mask::Key(key)
        } else {
            Mask::None
        };

        Ok(Self::new(fin, opcode, mask, length)?)
    }

    /// Encode to the provided buffer, returns the count of written bytes.
    ///
    /// Server role: RSV bits are forced to zero, the shortest length
    /// encoding is used, and no masking key is ever emitted.
    pub fn encode(&self, buf: &mut [u8; MAX_SEND_HEAD_LENGTH]) -> usize {
        buf[0] = self.fin as u8 | self.opcode as u8;
        buf[1] = self.length.to_flag();

        match self.length {
            PayloadLen::Standard(_) => 2,
            PayloadLen::Extended1(v) => {
                buf[2..4].copy_from_slice(&v.to_be_bytes());
                4
            }
            PayloadLen::Extended2(v) => {
                buf[2..10].copy_from_slice(&v.to_be_bytes());
                10
            }
        }
    }
}

impl Display for FrameHead {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Fin: {}, Op: {}, Mask: {:02x?}, PayloadLen: {}",
            matches!(self.fin, Fin::Y),
            self.opcode.describe(),
            self.mask.key(),
            self.length.to_num(),
        )
    }
}

/// An inbound frame: a parsed head bound to the stream positioned at the
/// start of its payload. The payload is consumed exactly once, unmasking
/// on the fly; nothing is buffered.
pub struct Frame<'a, R> {
    head: FrameHead,
    payload: &'a mut R,
    remaining: u64,
}

impl<'a, R> Frame<'a, R>
where
    R: AsyncRead + Unpin,
{
    /// Parse the next frame head off the stream and bind its payload.
    pub async fn next(io: &'a mut R) -> Result<Frame<'a, R>, Error> {
        let head = FrameHead::read_from(io).await?;
        Ok(Frame {
            remaining: head.length.to_num(),
            head,
            payload: io,
        })
    }

    #[inline]
    pub fn head(&self) -> &FrameHead { &self.head }

    #[inline]
    pub fn opcode(&self) -> OpCode { self.head.opcode }

    #[inline]
    pub fn len(&self) -> u64 { self.head.length.to_num() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.len() == 0 }

    #[inline]
    pub fn is_fin(&self) -> bool { matches!(self.head.fin, Fin::Y) }

    /// Read the next chunk of unmasked payload into `buf`.
    ///
    /// Returns 0 once the whole payload has been consumed. A stream that
    /// ends short of the declared length yields
    /// [`FrameError::UnexpectedEndOfStream`].
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let want = buf.len().min(self.remaining.min(usize::MAX as u64) as usize);
        let n = self.payload.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(FrameError::UnexpectedEndOfStream.into());
        }

        if let Mask::Key(key) = self.head.mask {
            let phase = (self.len() - self.remaining) as usize & 0x03;
            mask::apply_mask(key, &mut buf[..n], phase);
        }
        self.remaining -= n as u64;
        Ok(n)
    }

    /// Drain the payload into `sink`, unmasking on the fly. Returns the
    /// number of bytes copied, which equals the declared length on
    /// success. A zero-length payload is a legal no-op.
    pub async fn read_payload_to<W>(&mut self, sink: &mut W) -> Result<u64, Error>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = [0u8; 4096];
        let mut copied = 0u64;
        loop {
            let n = self.read_chunk(&mut buf).await?;
            if n == 0 {
                return Ok(copied);
            }
            sink.write_all(&buf[..n]).await?;
            copied += n as u64;
        }
    }

    /// Collect a control frame payload. The head validation already
    /// capped control payloads at 125 bytes.
    pub async fn read_payload_to_vec(&mut self) -> Result<Vec<u8>, Error> {
        let mut out = vec![0u8; self.remaining as usize];
        let mut at = 0;
        while at < out.len() {
            let n = self.read_chunk(&mut out[at..]).await?;
            at += n;
        }
        Ok(out)
    }

    /// Read and discard the rest of the payload.
    pub async fn drain(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; 4096];
        while self.read_chunk(&mut buf).await? > 0 {}
        Ok(())
    }
}

/// An outbound frame: a head and its already-buffered payload, queued
/// for the send serializer.
#[derive(Debug, Clone)]
pub struct SendFrame {
    pub head: FrameHead,
    pub payload: Bytes,
}

impl SendFrame {
    /// First frame of a message, or the whole message when `fin`.
    pub fn message(opcode: OpCode, fin: Fin, payload: Bytes) -> Self {
        debug_assert!(opcode.is_data());
        Self {
            head: FrameHead {
                fin,
                opcode,
                mask: Mask::None,
                length: PayloadLen::from_num(payload.len() as u64),
            },
            payload,
        }
    }

    /// A non-first fragment.
    pub fn continuation(fin: Fin, payload: Bytes) -> Self {
        Self {
            head: FrameHead {
                fin,
                opcode: OpCode::Continue,
                mask: Mask::None,
                length: PayloadLen::from_num(payload.len() as u64),
            },
            payload,
        }
    }

    /// A pong answering a ping, carrying the identical payload.
    pub fn pong(payload: Bytes) -> Self {
        debug_assert!(payload.len() as u64 <= MAX_CONTROL_PAYLOAD);
        Self {
            head: FrameHead {
                fin: Fin::Y,
                opcode: OpCode::Pong,
                mask: Mask::None,
                length: PayloadLen::from_num(payload.len() as u64),
            },
            payload,
        }
    }

    /// A close frame with status code and reason.
    pub fn close(code: u16, reason: &str) -> Self {
        let payload = close::close_payload(code, reason);
        Self {
            head: FrameHead {
                fin: Fin::Y,
                opcode: OpCode::Close,
                mask: Mask::None,
                length: PayloadLen::from_num(payload.len() as u64),
            },
            payload,
        }
    }

    #[inline]
    pub fn is_close(&self) -> bool { matches!(self.head.opcode, OpCode::Close) }

    /// Serialize head and payload to the stream. The caller flushes.
    pub async fn write_to<W>(&self, io: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut head = [0u8; MAX_SEND_HEAD_LENGTH];
        let n = self.head.encode(&mut head);
        io.write_all(&head[..n]).await?;
        io.write_all(&self.payload).await
    }
}

async fn read_exact<R>(io: &mut R, buf: &mut [u8]) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    io.read_exact(buf).await.map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Frame(FrameError::UnexpectedEndOfStream),
        _ => Error::Io(e),
    })?;
    Ok(())
}
