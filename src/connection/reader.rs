//! Receive router: the task owning the read half of the stream.
//!
//! Loops parsing frames and dispatching on opcode until the peer's
//! close frame (or a fault) ends it. Faults never escape to the
//! application directly; they drive the connection to CLOSED-unclean
//! and show up as closed queues.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::{Message, Role, Shared, CLOSE_LINGER};
use crate::error::{Error, FrameError, ProtocolError};
use crate::frame::{close, Frame, OpCode, SendFrame};
use crate::pipe;

pub(crate) async fn run<R>(
    mut io: R,
    role: Role,
    shared: Arc<Shared>,
    in_tx: mpsc::Sender<Message>,
    frame_tx: mpsc::Sender<SendFrame>,
    done: oneshot::Sender<()>,
) where
    R: AsyncRead + Send + Unpin + 'static,
{
    let mut current: Option<pipe::Writer> = None;

    let end = tokio::select! {
        r = route(&mut io, &shared, &in_tx, &frame_tx, &mut current) => r,
        _ = shared.wait_shutdown() => Ok(()),
    };

    // whatever remains of an in-progress message is now truncated
    if let Some(writer) = current.take() {
        writer.abort();
    }

    match end {
        Ok(()) => {
            if role == Role::Client && shared.close_received() {
                // TIME_WAIT analog: give the peer the chance to drop
                // the stream first
                let _ = timeout(CLOSE_LINGER, drain_stream(&mut io)).await;
            }
        }
        Err(e) => fail(e, &shared, &frame_tx).await,
    }

    drop(done);
}

/// Dispatch frames until the closing handshake takes over.
async fn route<R>(
    io: &mut R,
    shared: &Shared,
    in_tx: &mpsc::Sender<Message>,
    frame_tx: &mpsc::Sender<SendFrame>,
    current: &mut Option<pipe::Writer>,
) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    loop {
        let mut frame = Frame::next(io).await?;
        log::trace!("frame in: {}", frame.head());

        // after our close frame is queued, nothing but the peer's
        // close is accepted
        if shared.close_sent() && frame.opcode() != OpCode::Close {
            frame.drain().await?;
            continue;
        }

        match frame.opcode() {
            OpCode::Ping => {
                let payload = frame.read_payload_to_vec().await?;
                if frame_tx.send(SendFrame::pong(payload.into())).await.is_err() {
                    // the serializer died; its fault already tore us down
                    return Ok(());
                }
            }

            OpCode::Pong => frame.drain().await?,

            opcode @ (OpCode::Text | OpCode::Binary) => {
                if current.is_some() {
                    return Err(ProtocolError::UnexpectedDataFrame.into());
                }

                let (mut writer, reader) = pipe::pipe();
                if in_tx.send(Message { opcode, reader }).await.is_err() {
                    log::debug!("no message consumer, discarding inbound message");
                }

                feed(&mut frame, &mut writer).await?;
                if frame.is_fin() {
                    writer.close();
                } else {
                    *current = Some(writer);
                }
            }

            OpCode::Continue => {
                let mut writer = match current.take() {
                    Some(writer) => writer,
                    None => return Err(ProtocolError::UnexpectedContinuation.into()),
                };

                feed(&mut frame, &mut writer).await?;
                if frame.is_fin() {
                    writer.close();
                } else {
                    *current = Some(writer);
                }
            }

            OpCode::Close => {
                shared.mark_close_received();

                let payload = frame.read_payload_to_vec().await?;
                let reply_code = match close::parse_close_payload(&payload) {
                    Ok(Some((code, reason))) => {
                        log::debug!("peer close: status={} reason={:?}", code, reason);
                        close::NORMAL_CLOSURE
                    }
                    Ok(None) => close::NORMAL_CLOSURE,
                    Err(_) => close::PROTOCOL_ERROR,
                };

                if shared.mark_close_sent() {
                    let _ = frame_tx.send(SendFrame::close(reply_code, "")).await;
                } else {
                    // our close frame is already out or queued, the
                    // handshake is complete
                    shared.destroy(true);
                }
                return Ok(());
            }
        }
    }
}

/// Stream one frame's payload into the message pipe. The wire must
/// advance even when the consumer is gone.
async fn feed<R>(frame: &mut Frame<'_, R>, writer: &mut pipe::Writer) -> Result<(), Error>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 4096];
    loop {
        let n = frame.read_chunk(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        if writer.write(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
            return frame.drain().await;
        }
    }
}

/// Turn a router fault into the state transition the taxonomy asks
/// for: protocol-level faults answer with a 1002 close frame, every
/// fault forces CLOSED-unclean.
async fn fail(e: Error, shared: &Shared, frame_tx: &mpsc::Sender<SendFrame>) {
    let reason = match &e {
        Error::Frame(FrameError::EndOfStream) => {
            log::debug!("peer dropped the stream without a close frame");
            None
        }
        Error::Frame(f) if f.is_malformed() => Some(f.to_string()),
        Error::Protocol(p) => Some(p.to_string()),
        other => {
            log::warn!("router failed: {}", other);
            None
        }
    };

    if let Some(reason) = reason {
        log::warn!("closing websocket: {}", reason);
        if shared.mark_close_sent() {
            let _ = frame_tx
                .send(SendFrame::close(close::PROTOCOL_ERROR, &reason))
                .await;
        }
    }

    shared.destroy(false);
}

async fn drain_stream<R>(io: &mut R)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; 1024];
    while matches!(io.read(&mut buf).await, Ok(n) if n > 0) {}
}
