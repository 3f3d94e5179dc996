//! Outbound fragmenter: chops submitted messages into frames.
//!
//! One message at a time; the next submission only starts after the
//! current one carried its FIN fragment. Control frames queued by the
//! router or the controller interleave between fragments on the frame
//! queue, never inside one.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use super::{Outbound, Shared, FRAGMENT_SIZE};
use crate::frame::{Fin, SendFrame};

pub(crate) async fn run(
    mut out: mpsc::Receiver<Outbound>,
    frames: mpsc::Sender<SendFrame>,
    shared: Arc<Shared>,
) {
    loop {
        let message = tokio::select! {
            _ = shared.wait_shutdown() => return,
            m = out.recv() => match m {
                Some(m) => m,
                None => return,
            },
        };

        // nothing new starts once the connection left OPEN
        if !shared.is_open() {
            continue;
        }

        if fragment(message, &frames).await.is_err() {
            return;
        }
    }
}

/// Read the source in fragment-sized slices, emitting the first frame
/// with the message opcode and the rest as continuations; FIN rides on
/// the fragment that observed end-of-stream.
async fn fragment(message: Outbound, frames: &mpsc::Sender<SendFrame>) -> Result<(), ()> {
    let Outbound { opcode, mut source } = message;
    let mut buf = vec![0u8; FRAGMENT_SIZE];
    let mut first = true;

    loop {
        let mut filled = 0;
        let mut finished = false;
        while filled < buf.len() {
            match source.read(&mut buf[filled..]).await {
                Ok(0) => {
                    finished = true;
                    break;
                }
                Ok(n) => filled += n,
                Err(e) => {
                    // cut the message short, keeping the framing valid
                    log::warn!("outbound message source failed: {}", e);
                    finished = true;
                    break;
                }
            }
        }

        let fin = if finished { Fin::Y } else { Fin::N };
        let payload = Bytes::copy_from_slice(&buf[..filled]);
        let frame = if first {
            SendFrame::message(opcode, fin, payload)
        } else {
            SendFrame::continuation(fin, payload)
        };

        if frames.send(frame).await.is_err() {
            return Err(());
        }
        if finished {
            return Ok(());
        }
        first = false;
    }
}
