//! Scripted WebSocket server for integration tests.
//!
//! Accepts a single connection, answers the upgrade request, plays a list of
//! steps and records every frame the client sends back.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use wsboot::Error;
use wsboot::protocol::Frame;
use wsboot::protocol::handshake::{compute_accept_key, find_header_end};

/// How the server answers the upgrade request.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub enum Reply {
    /// A correct `101 Switching Protocols`.
    Accept,
    /// A 101 whose Sec-WebSocket-Accept answers some other key.
    WrongAccept,
    /// A plain HTTP error status; the connection is closed right after.
    Status(u16),
}

/// One action after the handshake.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub enum Step {
    /// Send an unmasked frame. Consecutive sends go out in one write,
    /// together with the 101 response when they come first.
    Send(Frame),
    /// Wait before the next step.
    Pause(Duration),
    /// Drop the TCP connection without a close frame.
    Hangup,
}

/// The reference server's first message.
#[allow(dead_code)]
pub fn session_frame(id: &str) -> Frame {
    Frame::text(format!("{{\"session\" : \"{id}\"}}").into_bytes())
}

pub struct TestServer {
    task: JoinHandle<Vec<Frame>>,
}

impl TestServer {
    /// Bind a random loopback port and serve one connection.
    pub async fn spawn(reply: Reply, steps: Vec<Step>) -> (Self, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let task = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            serve(stream, reply, steps).await
        });

        (Self { task }, addr)
    }

    /// Wait for the connection to end and return what the client sent.
    pub async fn received(self) -> Vec<Frame> {
        self.task.await.unwrap()
    }
}

async fn serve(mut stream: TcpStream, reply: Reply, steps: Vec<Step>) -> Vec<Frame> {
    let request = read_request(&mut stream).await;
    let key = request
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("sec-websocket-key")
                .then(|| value.trim().to_string())
        })
        .unwrap();

    let accept = match reply {
        Reply::Accept => compute_accept_key(&key),
        Reply::WrongAccept => compute_accept_key("c29tZSBvdGhlciBub25jZQ=="),
        Reply::Status(code) => {
            let head = format!("HTTP/1.1 {code} Nope\r\nContent-Length: 0\r\n\r\n");
            stream.write_all(head.as_bytes()).await.unwrap();
            return Vec::new();
        }
    };

    let mut out = BytesMut::from(
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: upgrade\r\n\
             Sec-WebSocket-Accept: {accept}\r\n\r\n"
        )
        .as_bytes(),
    );

    for step in steps {
        match step {
            Step::Send(frame) => frame.write(&mut out, None),
            Step::Pause(delay) => {
                flush(&mut stream, &mut out).await;
                tokio::time::sleep(delay).await;
            }
            Step::Hangup => {
                flush(&mut stream, &mut out).await;
                return Vec::new();
            }
        }
    }
    flush(&mut stream, &mut out).await;

    read_client_frames(&mut stream).await
}

async fn flush(stream: &mut TcpStream, out: &mut BytesMut) {
    if !out.is_empty() {
        // The client may already be gone after a protocol error.
        let _ = stream.write_all(out).await;
        out.clear();
    }
}

async fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while find_header_end(&buf).is_none() {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client hung up during the handshake");
        buf.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(buf).unwrap()
}

async fn read_client_frames(stream: &mut TcpStream) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut buf = BytesMut::new();

    let read_all = async {
        loop {
            loop {
                match Frame::parse(&buf) {
                    Ok((frame, consumed)) => {
                        let _ = buf.split_to(consumed);
                        frames.push(frame);
                    }
                    Err(Error::IncompleteFrame { .. }) => break,
                    Err(e) => panic!("client sent a bad frame: {e}"),
                }
            }
            match stream.read_buf(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    let _ = tokio::time::timeout(Duration::from_secs(5), read_all).await;

    frames
}
