//! Websocket connection.
//!
//! A [`Connection`] owns a duplex byte stream that already went through
//! the opening handshake. Three tasks cooperate over bounded queues:
//!
//! - the **router** owns the read half, parses frames, answers pings,
//!   assembles fragmented messages into pipes and drives the receiving
//!   side of the closing handshake;
//! - the **serializer** owns the write half and writes queued frames in
//!   FIFO order, one at a time;
//! - the **fragmenter** chops submitted outbound messages into frames.
//!
//! Control frames queued while a message is being fragmented interleave
//! between its fragments, which is what RFC 6455 Section 5.4 expects.

pub(crate) mod fragment;
pub(crate) mod reader;
pub(crate) mod writer;

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, Notify};

use crate::frame::{close, OpCode, SendFrame};
use crate::pipe;

/// Capacity of every bounded queue on a connection.
pub const QUEUE_DEPTH: usize = 16;

/// Outbound messages are chopped into frames of at most this size.
pub const FRAGMENT_SIZE: usize = 16 * 1024;

/// How long a client-role endpoint keeps the stream around after a
/// clean close, giving the peer the chance to drop it first.
pub(crate) const CLOSE_LINGER: Duration = Duration::from_secs(5);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    Closing,
    Closed,
}

/// Which side of the connection this endpoint is. The core runs the
/// server role; the role only changes who tears the stream down first
/// after a clean close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Server,
    Client,
}

/// One inbound message: its data opcode and a streaming reader over
/// the concatenated fragment payloads, ending with a clean end of
/// stream, or with [`std::io::ErrorKind::UnexpectedEof`] if the wire
/// was cut mid-message.
pub struct Message {
    pub opcode: OpCode,
    pub reader: pipe::Reader,
}

/// An outbound message waiting to be fragmented.
pub(crate) struct Outbound {
    pub(crate) opcode: OpCode,
    pub(crate) source: Box<dyn AsyncRead + Send + Unpin>,
}

/// Error returned when a message cannot be queued because the
/// connection is closing or closed.
#[derive(Debug, PartialEq, Eq)]
pub struct ConnectionClosed;

impl std::fmt::Display for ConnectionClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Connection is closing or closed")
    }
}

// use default impl
impl std::error::Error for ConnectionClosed {}

#[derive(Debug)]
struct Lifecycle {
    state: State,
    close_sent: bool,
    close_received: bool,
    cleanly: bool,
}

/// State shared by the three tasks and the application handle.
pub(crate) struct Shared {
    lifecycle: Mutex<Lifecycle>,
    shutdown: Notify,
}

impl Shared {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: State::Open,
                close_sent: false,
                close_received: false,
                cleanly: false,
            }),
            shutdown: Notify::new(),
        }
    }

    pub(crate) fn state(&self) -> State { self.lifecycle.lock().state }

    pub(crate) fn is_open(&self) -> bool { self.state() == State::Open }

    pub(crate) fn cleanly(&self) -> bool { self.lifecycle.lock().cleanly }

    pub(crate) fn close_sent(&self) -> bool { self.lifecycle.lock().close_sent }

    pub(crate) fn close_received(&self) -> bool {
        self.lifecycle.lock().close_received
    }

    /// Record that our close frame is queued. Returns false if it
    /// already was; exactly one caller ever queues a close frame.
    pub(crate) fn mark_close_sent(&self) -> bool {
        let mut lc = self.lifecycle.lock();
        if lc.close_sent {
            return false;
        }
        lc.close_sent = true;
        if lc.state == State::Open {
            lc.state = State::Closing;
        }
        true
    }

    /// Record the peer's close frame.
    pub(crate) fn mark_close_received(&self) {
        let mut lc = self.lifecycle.lock();
        lc.close_received = true;
        if lc.state == State::Open {
            lc.state = State::Closing;
        }
    }

    /// Idempotent teardown. Reaches CLOSED only when both close frames
    /// were exchanged, or unconditionally when forced
    /// (`clean == false`); later calls are no-ops.
    pub(crate) fn destroy(&self, clean: bool) {
        {
            let mut lc = self.lifecycle.lock();
            if lc.state == State::Closed {
                return;
            }
            if clean && !(lc.close_sent && lc.close_received) {
                return;
            }
            lc.state = State::Closed;
            lc.cleanly = clean;
        }
        self.shutdown.notify_waiters();
    }

    /// Wait until the connection reaches CLOSED.
    pub(crate) async fn wait_shutdown(&self) {
        loop {
            let notified = self.shutdown.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.state() == State::Closed {
                return;
            }
            notified.await;
        }
    }
}

/// Application handle of a live websocket connection.
pub struct Connection {
    shared: Arc<Shared>,
    incoming: mpsc::Receiver<Message>,
    outgoing: mpsc::Sender<Outbound>,
    frames: mpsc::Sender<SendFrame>,
}

impl Connection {
    /// Take over a duplex stream that completed the opening handshake
    /// and spawn the connection tasks.
    pub fn spawn<IO>(io: IO, role: Role) -> Connection
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let (read_half, write_half) = tokio::io::split(io);
        let shared = Arc::new(Shared::new());

        let (frame_tx, frame_rx) = mpsc::channel(QUEUE_DEPTH);
        let (in_tx, in_rx) = mpsc::channel(QUEUE_DEPTH);
        let (out_tx, out_rx) = mpsc::channel(QUEUE_DEPTH);
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(reader::run(
            read_half,
            role,
            shared.clone(),
            in_tx,
            frame_tx.clone(),
            done_tx,
        ));
        tokio::spawn(writer::run(
            write_half,
            frame_rx,
            shared.clone(),
            role,
            done_rx,
        ));
        tokio::spawn(fragment::run(out_rx, frame_tx.clone(), shared.clone()));

        Connection {
            shared,
            incoming: in_rx,
            outgoing: out_tx,
            frames: frame_tx,
        }
    }

    /// Receive the next inbound message. Returns `None` once the
    /// connection stops surfacing messages (closing handshake under
    /// way, or torn down).
    pub async fn recv(&mut self) -> Option<Message> { self.incoming.recv().await }

    /// Submit one outbound message from a streaming byte source.
    ///
    /// `opcode` must be [`OpCode::Text`] or [`OpCode::Binary`]. The
    /// source is read and fragmented in the background; messages are
    /// sent in submission order, one at a time.
    pub async fn send<S>(&self, opcode: OpCode, source: S) -> Result<(), ConnectionClosed>
    where
        S: AsyncRead + Send + Unpin + 'static,
    {
        debug_assert!(opcode.is_data());
        if !self.shared.is_open() {
            return Err(ConnectionClosed);
        }
        self.outgoing
            .send(Outbound {
                opcode,
                source: Box::new(source),
            })
            .await
            .map_err(|_| ConnectionClosed)
    }

    /// Submit one text message from a buffer.
    pub async fn send_text(&self, data: impl Into<Bytes>) -> Result<(), ConnectionClosed> {
        self.send(OpCode::Text, Cursor::new(data.into())).await
    }

    /// Submit one binary message from a buffer.
    pub async fn send_binary(&self, data: impl Into<Bytes>) -> Result<(), ConnectionClosed> {
        self.send(OpCode::Binary, Cursor::new(data.into())).await
    }

    /// Start a normal closure (status 1000). Queues our close frame
    /// and refuses new application data; the connection reaches
    /// [`State::Closed`] once the peer answers. Calling this more than
    /// once is a no-op.
    pub async fn close(&self) {
        // reserve the queue slot first so that marking and queueing
        // cannot be torn apart
        if let Ok(permit) = self.frames.reserve().await {
            if self.shared.mark_close_sent() {
                permit.send(SendFrame::close(close::NORMAL_CLOSURE, ""));
            }
        }
    }

    pub fn state(&self) -> State { self.shared.state() }

    /// True once both close frames were exchanged; stays false after a
    /// fault or a missing closing handshake.
    pub fn cleanly(&self) -> bool { self.shared.cleanly() }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("cleanly", &self.cleanly())
            .finish()
    }
}
