//! Server-side websocket endpoint.
//!
//! [RFC-6455](https://datatracker.ietf.org/doc/html/rfc6455)
//!
//! This crate sits behind an HTTP/1.1 front end that is willing to
//! upgrade a connection: hand [`Handler::upgrade`](endpoint::Handler::upgrade)
//! the raw duplex byte stream, and it performs the opening handshake,
//! then drives the connection with three cooperating tasks (frame
//! router, send serializer, outbound fragmenter). The application
//! consumes inbound messages as streaming readers and submits outbound
//! messages the same way; control frames and the closing handshake are
//! handled internally.
//!
//! ```no_run
//! use tokio::net::TcpListener;
//! use tokio::io::AsyncReadExt;
//! use streamws::endpoint::Handler;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (handler, mut conns) = Handler::new();
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     tokio::spawn(async move { handler.serve(listener).await });
//!
//!     while let Some(mut conn) = conns.recv().await {
//!         tokio::spawn(async move {
//!             while let Some(mut msg) = conn.recv().await {
//!                 let mut text = String::new();
//!                 if msg.reader.read_to_string(&mut text).await.is_ok() {
//!                     let _ = conn.send_text(text).await;
//!                 }
//!             }
//!         });
//!     }
//!     Ok(())
//! }
//! ```

pub mod connection;
pub mod endpoint;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod pipe;

pub use connection::{Connection, Message, Role, State};
pub use endpoint::Handler;
pub use error::Error;
