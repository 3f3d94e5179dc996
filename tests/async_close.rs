use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use streamws::endpoint::Handler;
use streamws::{Connection, State};

const UPGRADE_REQUEST: &str = "GET /ws HTTP/1.1\r\n\
    host: www.example.com\r\n\
    upgrade: websocket\r\n\
    connection: upgrade\r\n\
    sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    sec-websocket-version: 13\r\n\r\n";

async fn open_websocket() -> (DuplexStream, Connection, mpsc::Receiver<Connection>) {
    let (handler, mut conns) = Handler::new();
    let (server, mut client) = tokio::io::duplex(1 << 16);

    tokio::spawn(async move { handler.upgrade(server).await });

    client.write_all(UPGRADE_REQUEST.as_bytes()).await.unwrap();

    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = client.read(&mut chunk).await.unwrap();
        assert!(n > 0);
        buf.extend_from_slice(&chunk[..n]);
    }

    let conn = conns.recv().await.unwrap();
    (client, conn, conns)
}

async fn wait_closed(conn: &Connection) {
    timeout(Duration::from_secs(5), async {
        while conn.state() != State::Closed {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("connection never reached CLOSED");
}

// The wire bytes of the closing handshake, client side first: a masked
// close frame with an empty payload is answered with exactly
// `88 02 03 E8` (close, status 1000), then the stream ends.
#[tokio::test]
async fn client_initiated_close() {
    let _ = env_logger::try_init();

    let (mut client, conn, _conns) = open_websocket().await;

    client
        .write_all(&[0x88, 0x80, 0x05, 0x06, 0x07, 0x08])
        .await
        .unwrap();

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert_eq!(&rest, &[0x88, 0x02, 0x03, 0xe8]);

    wait_closed(&conn).await;
    assert!(conn.cleanly());
}

#[tokio::test]
async fn server_initiated_close() {
    let _ = env_logger::try_init();

    let (mut client, conn, _conns) = open_websocket().await;

    conn.close().await;
    assert_ne!(conn.state(), State::Open);

    // our close frame, status 1000
    let mut frame = [0u8; 4];
    client.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x88, 0x02, 0x03, 0xe8]);

    // echo it back, masked, completing the handshake
    client
        .write_all(&[0x88, 0x82, 0x00, 0x00, 0x00, 0x00, 0x03, 0xe8])
        .await
        .unwrap();

    wait_closed(&conn).await;
    assert!(conn.cleanly());

    // the server tears the stream down once the handshake is complete
    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());
}

#[tokio::test]
async fn close_is_idempotent() {
    let _ = env_logger::try_init();

    let (mut client, conn, _conns) = open_websocket().await;

    conn.close().await;
    conn.close().await;
    conn.close().await;

    // exactly one close frame reaches the peer
    let mut frame = [0u8; 4];
    client.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x88, 0x02, 0x03, 0xe8]);

    client
        .write_all(&[0x88, 0x80, 0x00, 0x00, 0x00, 0x00])
        .await
        .unwrap();

    let mut rest = Vec::new();
    client.read_to_end(&mut rest).await.unwrap();
    assert!(rest.is_empty());

    wait_closed(&conn).await;
    assert!(conn.cleanly());
}

#[tokio::test]
async fn no_new_messages_after_close() {
    let _ = env_logger::try_init();

    let (mut client, conn, _conns) = open_websocket().await;

    conn.close().await;
    assert!(conn.send_text("too late").await.is_err());

    let mut frame = [0u8; 4];
    client.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x88, 0x02, 0x03, 0xe8]);

    // data after our close frame is drained and discarded, the close
    // handshake still completes
    client
        .write_all(&[0x81, 0x83, 0x00, 0x00, 0x00, 0x00, b'a', b'b', b'c'])
        .await
        .unwrap();
    client
        .write_all(&[0x88, 0x80, 0x00, 0x00, 0x00, 0x00])
        .await
        .unwrap();

    wait_closed(&conn).await;
    assert!(conn.cleanly());
}

#[tokio::test]
async fn abrupt_disconnect_is_unclean() {
    let _ = env_logger::try_init();

    let (client, conn, _conns) = open_websocket().await;

    // peer vanishes without a close frame
    drop(client);

    wait_closed(&conn).await;
    assert!(!conn.cleanly());
}
