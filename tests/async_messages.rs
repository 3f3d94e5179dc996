use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

use streamws::connection::FRAGMENT_SIZE;
use streamws::endpoint::Handler;
use streamws::frame::OpCode;
use streamws::Connection;

const UPGRADE_REQUEST: &str = "GET /ws HTTP/1.1\r\n\
    host: www.example.com\r\n\
    upgrade: websocket\r\n\
    connection: upgrade\r\n\
    sec-websocket-key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
    sec-websocket-version: 13\r\n\r\n";

async fn open_websocket() -> (DuplexStream, Connection, mpsc::Receiver<Connection>) {
    let (handler, mut conns) = Handler::new();
    let (server, mut client) = tokio::io::duplex(1 << 20);

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

/// Build a masked client frame the way a browser would.
fn client_frame(opcode: u8, fin: bool, key: [u8; 4], payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 126);
    let mut frame = vec![
        if fin { 0x80 | opcode } else { opcode },
        0x80 | payload.len() as u8,
    ];
    frame.extend_from_slice(&key);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
    frame
}

async fn read_message(conn: &mut Connection) -> (OpCode, Vec<u8>) {
    let mut message = timeout(Duration::from_secs(5), conn.recv())
        .await
        .expect("no message surfaced")
        .expect("message queue closed");

    let mut payload = Vec::new();
    message.reader.read_to_end(&mut payload).await.unwrap();
    (message.opcode, payload)
}

#[tokio::test]
async fn unmasked_text_message() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    client
        .write_all(&[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f])
        .await
        .unwrap();

    let (opcode, payload) = read_message(&mut conn).await;
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(&payload, b"Hello");
}

#[tokio::test]
async fn masked_text_message() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    client
        .write_all(&[
            0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58,
        ])
        .await
        .unwrap();

    let (opcode, payload) = read_message(&mut conn).await;
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(&payload, b"Hello");
}

#[tokio::test]
async fn binary_opcode_is_observable() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    let frame = client_frame(0x02, true, [0xde, 0xad, 0xbe, 0xef], &[0, 159, 146, 150]);
    client.write_all(&frame).await.unwrap();

    let (opcode, payload) = read_message(&mut conn).await;
    assert_eq!(opcode, OpCode::Binary);
    assert_eq!(&payload, &[0, 159, 146, 150]);
}

// A fragmented message surfaces as one reader yielding the fragments
// in wire order.
#[tokio::test]
async fn fragmented_message_assembly() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    let key = [0x11, 0x22, 0x33, 0x44];
    client
        .write_all(&client_frame(0x01, false, key, b"Hel"))
        .await
        .unwrap();
    client
        .write_all(&client_frame(0x00, true, key, b"lo"))
        .await
        .unwrap();

    let (opcode, payload) = read_message(&mut conn).await;
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(&payload, b"Hello");

    // exactly one message came out of the two frames; closing now
    // proves nothing else was queued
    client
        .write_all(&[0x88, 0x80, 0, 0, 0, 0])
        .await
        .unwrap();
    assert!(conn.recv().await.is_none());
}

// A ping between two fragments is answered between them while the
// message still assembles into one piece.
#[tokio::test]
async fn ping_interleaved_with_fragments() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    let key = [0xaa, 0xbb, 0xcc, 0xdd];
    client
        .write_all(&client_frame(0x01, false, key, b"Hel"))
        .await
        .unwrap();
    client
        .write_all(&client_frame(0x09, true, key, b"PING"))
        .await
        .unwrap();

    // the pong comes back, payload identical, before the message ends
    let mut pong = [0u8; 6];
    client.read_exact(&mut pong).await.unwrap();
    assert_eq!(&pong, &[0x8a, 0x04, b'P', b'I', b'N', b'G']);

    client
        .write_all(&client_frame(0x00, true, key, b"lo"))
        .await
        .unwrap();

    let (opcode, payload) = read_message(&mut conn).await;
    assert_eq!(opcode, OpCode::Text);
    assert_eq!(&payload, b"Hello");
}

#[tokio::test]
async fn empty_message() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    client
        .write_all(&client_frame(0x01, true, [1, 2, 3, 4], b""))
        .await
        .unwrap();

    let (opcode, payload) = read_message(&mut conn).await;
    assert_eq!(opcode, OpCode::Text);
    assert!(payload.is_empty());
}

#[tokio::test]
async fn outbound_text_message() {
    let _ = env_logger::try_init();

    let (mut client, conn, _conns) = open_websocket().await;

    conn.send_text("Hello").await.unwrap();

    let mut frame = [0u8; 7];
    client.read_exact(&mut frame).await.unwrap();
    assert_eq!(&frame, &[0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
}

// Messages above the fragment size leave as a chain of frames: the
// first carries the opcode, the rest are continuations, FIN on the
// last; the concatenated payloads reproduce the message.
#[tokio::test]
async fn outbound_fragmentation() {
    let _ = env_logger::try_init();

    let (mut client, conn, _conns) = open_websocket().await;

    let data: Vec<u8> = (0..FRAGMENT_SIZE * 2 + 1234)
        .map(|i| (i % 251) as u8)
        .collect();
    conn.send_binary(data.clone()).await.unwrap();

    let mut opcodes = Vec::new();
    let mut payload = Vec::new();
    loop {
        let mut flags = [0u8; 2];
        client.read_exact(&mut flags).await.unwrap();

        let fin = flags[0] & 0x80 != 0;
        opcodes.push(flags[0] & 0x0f);
        assert_eq!(flags[1] & 0x80, 0, "server frames are never masked");

        let len = match flags[1] & 0x7f {
            126 => {
                let mut ext = [0u8; 2];
                client.read_exact(&mut ext).await.unwrap();
                u16::from_be_bytes(ext) as usize
            }
            127 => {
                let mut ext = [0u8; 8];
                client.read_exact(&mut ext).await.unwrap();
                u64::from_be_bytes(ext) as usize
            }
            n => n as usize,
        };

        let mut body = vec![0u8; len];
        client.read_exact(&mut body).await.unwrap();
        payload.extend_from_slice(&body);

        if fin {
            break;
        }
    }

    assert_eq!(opcodes, vec![0x02, 0x00, 0x00]);
    assert_eq!(payload, data);
}

// Bounded queues mean a burst of small messages still arrives intact
// and in order.
#[tokio::test]
async fn messages_stay_ordered() {
    let _ = env_logger::try_init();

    let (mut client, mut conn, _conns) = open_websocket().await;

    let key = [9, 8, 7, 6];
    for i in 0..32u8 {
        let body = format!("message {}", i);
        client
            .write_all(&client_frame(0x01, true, key, body.as_bytes()))
            .await
            .unwrap();
    }

    for i in 0..32u8 {
        let (_, payload) = read_message(&mut conn).await;
        assert_eq!(payload, format!("message {}", i).into_bytes());
    }
}
