//! Send serializer: the task owning the write half of the stream.
//!
//! Consumes the frame queue in FIFO order and writes one frame at a
//! time, head then payload, so no two frames ever interleave on the
//! wire. A close frame is always the last frame written.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;

use super::{Role, Shared, State, CLOSE_LINGER};
use crate::frame::SendFrame;

pub(crate) async fn run<W>(
    mut io: W,
    mut frames: mpsc::Receiver<SendFrame>,
    shared: Arc<Shared>,
    role: Role,
    done: oneshot::Receiver<()>,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    match serialize(&mut io, &mut frames, &shared).await {
        Err(e) => {
            log::warn!("write failed: {}", e);
            shared.destroy(false);
            // dropping the half aborts the stream
            return;
        }
        Ok(true) => {
            // our close frame is on the wire; hold the stream open
            // until the handshake completes or a fault forces the end
            if shared.close_received() {
                shared.destroy(true);
            }
            shared.wait_shutdown().await;
        }
        Ok(false) => {
            // every producer left without a close frame
            shared.destroy(false);
        }
    }

    if shared.cleanly() {
        if role == Role::Client {
            // TIME_WAIT analog: the server side goes first
            let _ = timeout(CLOSE_LINGER, done).await;
        }
        let _ = io.shutdown().await;
    }
}

/// Write frames in order until a close frame went out (`Ok(true)`) or
/// the queue closed without one (`Ok(false)`).
async fn serialize<W>(
    io: &mut W,
    frames: &mut mpsc::Receiver<SendFrame>,
    shared: &Shared,
) -> std::io::Result<bool>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let frame = if shared.state() == State::Closed {
            if shared.cleanly() {
                // a clean end means a close frame is queued or moments
                // away; keep draining until it went out
                match frames.recv().await {
                    Some(frame) => frame,
                    None => return Ok(false),
                }
            } else {
                // forced teardown: flush an already-queued close frame
                // if there is one, drop everything else
                loop {
                    match frames.try_recv() {
                        Ok(frame) if frame.is_close() => break frame,
                        Ok(_) => continue,
                        Err(_) => return Ok(false),
                    }
                }
            }
        } else {
            tokio::select! {
                _ = shared.wait_shutdown() => continue,
                frame = frames.recv() => match frame {
                    Some(frame) => frame,
                    None => return Ok(false),
                },
            }
        };

        frame.write_to(io).await?;
        io.flush().await?;
        log::trace!("frame out: {}", frame.head);

        if frame.is_close() {
            return Ok(true);
        }
    }
}
