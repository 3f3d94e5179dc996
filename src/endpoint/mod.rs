//! Connection endpoint.
//!
//! The [`Handler`] is the seam between an HTTP front end and the
//! websocket core: hand it a raw duplex stream, it performs the
//! opening handshake and publishes the resulting [`Connection`] on a
//! bounded queue for the application to pick up.

use std::io::Cursor;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::connection::{Connection, Role, QUEUE_DEPTH};
use crate::error::{Error, HandshakeError};
use crate::handshake::{response, UpgradeRequest, MAX_REQUEST_LENGTH};

/// Accepts upgrade requests and publishes new connections.
#[derive(Clone)]
pub struct Handler {
    conns: mpsc::Sender<Connection>,
}

impl Handler {
    /// Create a handler and the queue its connections arrive on.
    pub fn new() -> (Self, mpsc::Receiver<Connection>) {
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        (Handler { conns: tx }, rx)
    }

    /// Perform the opening handshake on a raw duplex stream.
    ///
    /// On success the 101 response (trailing blank line included) is
    /// flushed before the connection tasks start, the [`Connection`]
    /// is published on the handler's queue, and any bytes the client
    /// sent after its request head are replayed to the frame router.
    /// On failure a 400 response advertising version 13 is written and
    /// the stream is dropped.
    pub async fn upgrade<IO>(&self, mut io: IO) -> Result<(), Error>
    where
        IO: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let mut buf = Vec::with_capacity(1024);
        let mut chunk = [0u8; 1024];

        let (sec_key, head_n) = loop {
            let n = io.read(&mut chunk).await?;
            if n == 0 {
                return Err(HandshakeError::NotEnoughData.into());
            }
            buf.extend_from_slice(&chunk[..n]);

            match UpgradeRequest::decode(&buf) {
                Ok((request, head_n)) => {
                    log::debug!("upgrade request for {}", request.path);
                    break (request.sec_key.to_vec(), head_n);
                }
                Err(HandshakeError::NotEnoughData) if buf.len() <= MAX_REQUEST_LENGTH => {}
                Err(HandshakeError::NotEnoughData) => {
                    return self.reject(io, HandshakeError::RequestTooLarge).await;
                }
                Err(e) => return self.reject(io, e).await,
            }
        };

        io.write_all(&response::encode_accept(&sec_key)).await?;
        io.flush().await?;

        // frames may have arrived on the heels of the request head
        let leftover = buf.split_off(head_n);
        let (read_half, write_half) = tokio::io::split(io);
        let io = tokio::io::join(Cursor::new(leftover).chain(read_half), write_half);

        let conn = Connection::spawn(io, Role::Server);
        if self.conns.send(conn).await.is_err() {
            log::warn!("no connection consumer, dropping accepted websocket");
        }
        Ok(())
    }

    /// Accept loop glue: upgrade every stream a TCP listener yields,
    /// each on its own task.
    pub async fn serve(&self, listener: TcpListener) {
        while let Ok((socket, addr)) = listener.accept().await {
            log::info!("tcp accepted: addr={}", addr);

            let handler = self.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.upgrade(socket).await {
                    log::warn!("handshake failed: addr={}, {}", addr, e);
                }
            });
        }
    }

    async fn reject<IO>(&self, mut io: IO, e: HandshakeError) -> Result<(), Error>
    where
        IO: AsyncWrite + Unpin,
    {
        log::warn!("refusing upgrade: {}", e);
        let _ = io.write_all(&response::encode_rejection()).await;
        let _ = io.flush().await;
        Err(e.into())
    }
}
