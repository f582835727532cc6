use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::config::{ClientConfig, Endpoint};
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::handshake::{ClientHandshake, HandshakeResponse, find_header_end};

/// Open a TCP connection to the configured endpoint and upgrade it.
///
/// TCP connect and the opening handshake together must finish within
/// `config.handshake_timeout`.
///
/// # Errors
///
/// - `Error::Io` if the TCP connection fails.
/// - `Error::InvalidHandshake` if the server does not upgrade the connection.
/// - `Error::Timeout` if the deadline passes first.
pub async fn connect(config: &ClientConfig) -> Result<Connection<TcpStream>> {
    let endpoint = &config.endpoint;
    let attempt = async {
        let stream = TcpStream::connect(endpoint.socket_addr()).await?;
        stream.set_nodelay(true)?;
        debug!(%endpoint, "tcp connected");
        handshake(stream, endpoint, config).await
    };

    tokio::time::timeout(config.handshake_timeout, attempt)
        .await
        .map_err(|_| {
            Error::Timeout(format!(
                "no handshake with {endpoint} within {:?}",
                config.handshake_timeout
            ))
        })?
}

/// Run the client opening handshake over an established stream.
///
/// Bytes the server sent right behind its 101 response are handed to the
/// returned connection, so a first message that shares a TCP segment with
/// the handshake is not lost.
///
/// # Errors
///
/// Returns `Error::HandshakeTooLarge` if the response head exceeds
/// `limits.max_handshake_size`, and `Error::InvalidHandshake` if the
/// response ends early or does not answer our key.
pub async fn handshake<T>(mut io: T, endpoint: &Endpoint, config: &ClientConfig) -> Result<Connection<T>>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    let request = ClientHandshake::new(endpoint)?;
    io.write_all(&request.request()).await?;
    io.flush().await?;

    let mut buf = BytesMut::with_capacity(1024);
    let header_end = loop {
        if let Some(end) = find_header_end(&buf) {
            break end;
        }
        config.limits.check_handshake_size(buf.len())?;

        let n = io.read_buf(&mut buf).await?;
        if n == 0 {
            return Err(Error::InvalidHandshake(
                "connection closed during handshake".into(),
            ));
        }
    };
    config.limits.check_handshake_size(header_end)?;

    let response = HandshakeResponse::parse(&buf[..header_end])?;
    request.verify(&response)?;
    debug!(resource = endpoint.resource(), "handshake complete");

    Ok(Connection::with_buffered(io, config, &buf[header_end..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionState;
    use crate::message::Message;
    use crate::protocol::handshake::compute_accept_key;
    use crate::config::Limits;
    use tokio::io::{DuplexStream, duplex};

    async fn read_request(server: &mut DuplexStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        while find_header_end(&buf).is_none() {
            let n = server.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client hung up mid-request");
            buf.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8(buf).unwrap()
    }

    fn key_of(request: &str) -> String {
        request
            .lines()
            .find_map(|l| l.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string()
    }

    fn accept_response(key: &str) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(key)
        )
    }

    #[tokio::test]
    async fn test_handshake_keeps_trailing_frame() {
        let (client, mut server) = duplex(4096);
        let config = ClientConfig::default();

        let server_task = tokio::spawn(async move {
            let request = read_request(&mut server).await;
            assert!(request.starts_with("GET /ws HTTP/1.1\r\n"));
            assert!(request.contains("Host: localhost:4242\r\n"));
            assert!(request.contains("Sec-WebSocket-Version: 13\r\n"));

            let mut reply = accept_response(&key_of(&request)).into_bytes();
            reply.extend_from_slice(&[0x81, 0x02, b'o', b'k']);
            server.write_all(&reply).await.unwrap();
            server
        });

        let mut conn = handshake(client, &config.endpoint, &config).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Open);
        assert_eq!(conn.recv().await.unwrap(), Some(Message::Text("ok".into())));
        drop(server_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_handshake_rejects_wrong_accept() {
        let (client, mut server) = duplex(4096);
        let config = ClientConfig::default();

        tokio::spawn(async move {
            read_request(&mut server).await;
            let reply = accept_response("not-the-key");
            server.write_all(reply.as_bytes()).await.unwrap();
            server
        });

        let result = handshake(client, &config.endpoint, &config).await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
    }

    #[tokio::test]
    async fn test_handshake_rejects_http_error() {
        let (client, mut server) = duplex(4096);
        let config = ClientConfig::default();

        tokio::spawn(async move {
            read_request(&mut server).await;
            server
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
                .await
                .unwrap();
            server
        });

        let result = handshake(client, &config.endpoint, &config).await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
    }

    #[tokio::test]
    async fn test_handshake_eof_before_response() {
        let (client, mut server) = duplex(4096);
        let config = ClientConfig::default();

        tokio::spawn(async move {
            read_request(&mut server).await;
        });

        let result = handshake(client, &config.endpoint, &config).await;
        assert!(matches!(result, Err(Error::InvalidHandshake(_))));
    }

    #[tokio::test]
    async fn test_handshake_response_too_large() {
        let (client, mut server) = duplex(1 << 16);
        let config = ClientConfig::default().with_limits(Limits::new(1024, 1024, 4, 256));

        tokio::spawn(async move {
            read_request(&mut server).await;
            let mut reply = b"HTTP/1.1 101 Switching Protocols\r\n".to_vec();
            reply.extend(std::iter::repeat_n(b'x', 1024));
            let _ = server.write_all(&reply).await;
            server
        });

        let result = handshake(client, &config.endpoint, &config).await;
        assert!(matches!(result, Err(Error::HandshakeTooLarge { .. })));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let endpoint = Endpoint::parse(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
        let config = ClientConfig::default().with_endpoint(endpoint);
        assert!(matches!(connect(&config).await, Err(Error::Io(_))));
    }

    #[tokio::test]
    async fn test_connect_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _hold = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            drop(stream);
        });

        let endpoint = Endpoint::parse(&format!("ws://127.0.0.1:{port}/ws")).unwrap();
        let config = ClientConfig::default()
            .with_endpoint(endpoint)
            .with_handshake_timeout(std::time::Duration::from_millis(100));
        assert!(matches!(connect(&config).await, Err(Error::Timeout(_))));
    }
}
