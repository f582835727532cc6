use tokio::io::{AsyncRead, AsyncWrite};

use crate::codec::WebSocketCodec;
use crate::config::ClientConfig;
use crate::connection::ConnectionState;
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::assembler::{AssembledMessage, MessageAssembler};
use crate::protocol::{Frame, OpCode};

/// An open client connection over an async I/O stream.
///
/// `Connection` turns frames into messages: it reassembles fragments,
/// answers pings and completes the closing handshake. It never sends data
/// messages of its own.
///
/// ## Type Parameters
///
/// - `T`: The underlying async I/O stream (e.g., `TcpStream`)
pub struct Connection<T> {
    codec: WebSocketCodec<T>,
    state: ConnectionState,
    assembler: MessageAssembler,
    pending_pong: Option<Vec<u8>>,
}

impl<T> Connection<T> {
    /// Wrap a stream on which the opening handshake has already completed.
    pub fn new(io: T, config: &ClientConfig) -> Self {
        Self::with_buffered(io, config, &[])
    }

    /// Like [`Connection::new`], with bytes already read past the handshake
    /// response.
    pub fn with_buffered(io: T, config: &ClientConfig, buffered: &[u8]) -> Self {
        let codec = WebSocketCodec::new(io, config.limits.clone(), config.read_buffer_size)
            .with_buffered(buffered);
        Self {
            codec,
            state: ConnectionState::Open,
            assembler: MessageAssembler::new(config.limits.clone()),
            pending_pong: None,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is in an open state.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Connection<T> {
    /// Receive the next message.
    ///
    /// Pings are answered before the next read. A close frame from the server
    /// is echoed and returned as `Message::Close`; after that, and after the
    /// stream ends without a close frame, this returns `Ok(None)`.
    ///
    /// ## Errors
    ///
    /// Protocol violations fail the connection: a close frame with the
    /// matching status code is sent on a best-effort basis, the state becomes
    /// `Closed`, and the error is returned.
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }

        match self.next_message().await {
            Ok(msg) => Ok(msg),
            Err(err) => {
                if self.state == ConnectionState::Open && !matches!(err, Error::Io(_)) {
                    self.state = ConnectionState::Closing;
                    let frame = Frame::close(Some(err.close_code()), "");
                    let _ = self.codec.write_frame(&frame).await;
                    let _ = self.codec.flush().await;
                }
                self.state = ConnectionState::Closed;
                Err(err)
            }
        }
    }

    async fn next_message(&mut self) -> Result<Option<Message>> {
        loop {
            self.flush_pending().await?;

            let frame = match self.codec.read_frame().await {
                Ok(f) => f,
                Err(Error::ConnectionClosed(_)) => {
                    self.state = ConnectionState::Closed;
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };
            frame.validate()?;

            match frame.opcode {
                OpCode::Ping => {
                    self.pending_pong = Some(frame.payload().to_vec());
                    return Ok(Some(Message::Ping(frame.into_payload())));
                }
                OpCode::Pong => return Ok(Some(Message::Pong(frame.into_payload()))),
                OpCode::Close => {
                    let close_frame = parse_close_payload(frame.payload())?;

                    if self.state == ConnectionState::Open {
                        self.state = ConnectionState::Closing;
                        let code = close_frame.as_ref().map(|cf| cf.code.as_u16());
                        let _ = self.codec.write_frame(&Frame::close(code, "")).await;
                        let _ = self.codec.flush().await;
                    }

                    self.state = ConnectionState::Closed;
                    return Ok(Some(Message::Close(close_frame)));
                }
                OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                    if let Some(assembled) = self.assembler.push(frame)? {
                        return into_message(assembled).map(Some);
                    }
                }
            }
        }
    }

    /// Send the pong owed for the last ping, if any.
    ///
    /// [`recv`](Self::recv) does this itself before reading. Calling it first
    /// leaves `recv` with no pending write until the next frame arrives, so a
    /// `recv` dropped while waiting for data loses nothing.
    pub async fn flush_pending(&mut self) -> Result<()> {
        if let Some(data) = self.pending_pong.take() {
            if self.state == ConnectionState::Open {
                self.codec.write_frame(&Frame::pong(data)).await?;
                self.codec.flush().await?;
            }
        }
        Ok(())
    }

    /// Start the closing handshake.
    ///
    /// Only sends the close frame; keep calling [`recv`](Self::recv) to
    /// collect the server's reply.
    pub async fn close(&mut self, code: CloseCode, reason: &str) -> Result<()> {
        if self.state != ConnectionState::Open {
            return Ok(());
        }
        if !code.is_valid() {
            return Err(Error::ProtocolViolation(format!(
                "close code {} may not be sent",
                code.as_u16()
            )));
        }

        self.state = ConnectionState::Closing;
        self.codec
            .write_frame(&Frame::close(Some(code.as_u16()), reason))
            .await?;
        self.codec.flush().await
    }
}

fn parse_close_payload(payload: &[u8]) -> Result<Option<CloseFrame>> {
    match payload {
        [] => Ok(None),
        [_] => Err(Error::ProtocolViolation(
            "Close frame payload of one byte".into(),
        )),
        [hi, lo, reason @ ..] => {
            let code = CloseCode::from_u16(u16::from_be_bytes([*hi, *lo]));
            if !code.is_valid() {
                return Err(Error::ProtocolViolation(format!(
                    "Invalid close code on the wire: {}",
                    code.as_u16()
                )));
            }
            let reason = std::str::from_utf8(reason)?;
            Ok(Some(CloseFrame::new(code, reason)))
        }
    }
}

fn into_message(assembled: AssembledMessage) -> Result<Message> {
    match assembled.opcode {
        OpCode::Text => String::from_utf8(assembled.payload)
            .map(Message::Text)
            .map_err(|_| Error::InvalidUtf8),
        OpCode::Binary => Ok(Message::Binary(assembled.payload)),
        _ => Err(Error::ProtocolViolation("Unexpected opcode".into())),
    }
}
