//! In-memory byte pipe.
//!
//! The frame router hands the application an incrementally-readable
//! view of a message whose bytes are still arriving. The producer side
//! pushes chunks, then either closes (reader sees end of stream) or
//! aborts (reader sees [`std::io::ErrorKind::UnexpectedEof`], meaning
//! the message was truncated on the wire). The channel is bounded, so a
//! slow consumer backpressures the router.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Chunks buffered per in-flight message.
pub const PIPE_DEPTH: usize = 16;

/// Error returned by [`Writer::write`] when the reading side is gone.
#[derive(Debug, PartialEq, Eq)]
pub struct Closed;

/// Create a connected pipe.
pub fn pipe() -> (Writer, Reader) {
    let (tx, rx) = mpsc::channel(PIPE_DEPTH);
    let aborted = Arc::new(AtomicBool::new(false));
    (
        Writer {
            tx,
            aborted: aborted.clone(),
            completed: false,
        },
        Reader {
            rx,
            chunk: Bytes::new(),
            aborted,
        },
    )
}

/// Producer half. Dropping it without [`close`](Self::close) counts as
/// an abort, so an interrupted producer can never fake a clean end of
/// message.
pub struct Writer {
    tx: mpsc::Sender<Bytes>,
    aborted: Arc<AtomicBool>,
    completed: bool,
}

impl Writer {
    /// Push one chunk, waiting for queue space.
    pub async fn write(&mut self, chunk: Bytes) -> Result<(), Closed> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(chunk).await.map_err(|_| Closed)
    }

    /// Finish the message; the reader observes end of stream.
    pub fn close(mut self) { self.completed = true; }

    /// Fail the message; the reader observes a truncation error.
    pub fn abort(self) {}
}

impl Drop for Writer {
    fn drop(&mut self) {
        if !self.completed {
            self.aborted.store(true, Ordering::Release);
        }
    }
}

/// Consumer half, a plain [`AsyncRead`] over the concatenated chunks.
pub struct Reader {
    rx: mpsc::Receiver<Bytes>,
    chunk: Bytes,
    aborted: Arc<AtomicBool>,
}

impl AsyncRead for Reader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if !self.chunk.is_empty() {
                let n = self.chunk.len().min(buf.remaining());
                buf.put_slice(&self.chunk[..n]);
                self.chunk.advance(n);
                return Poll::Ready(Ok(()));
            }

            match self.rx.poll_recv(cx) {
                Poll::Ready(Some(chunk)) => self.chunk = chunk,
                Poll::Ready(None) => {
                    return if self.aborted.load(Ordering::Acquire) {
                        Poll::Ready(Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "message truncated",
                        )))
                    } else {
                        Poll::Ready(Ok(()))
                    };
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
