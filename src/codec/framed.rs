use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::mask::random_mask;
use crate::protocol::validation::FrameValidator;
use crate::protocol::{Frame, FrameHeader};

/// Reads server frames from and writes masked client frames to `T`.
pub struct WebSocketCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    validator: FrameValidator,
}

impl<T> WebSocketCodec<T> {
    #[must_use]
    pub fn new(io: T, limits: Limits, read_buffer_size: usize) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(read_buffer_size),
            write_buf: BytesMut::new(),
            validator: FrameValidator::new(limits),
        }
    }

    /// Seed the read buffer with bytes that arrived behind the handshake
    /// response.
    #[must_use]
    pub fn with_buffered(mut self, bytes: &[u8]) -> Self {
        self.read_buf.extend_from_slice(bytes);
        self
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> WebSocketCodec<T> {
    /// Read the next complete frame.
    ///
    /// Returns `Error::ConnectionClosed(None)` on EOF at a frame boundary and
    /// `Error::Io` on EOF inside a frame.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            match FrameHeader::parse(&self.read_buf) {
                Ok(header) => {
                    self.validator.validate(&header)?;
                    match Frame::from_header(&header, &self.read_buf) {
                        Ok((frame, consumed)) => {
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                        Err(Error::IncompleteFrame { needed }) => {
                            self.read_buf.reserve(needed);
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(Error::IncompleteFrame { .. }) => {}
                Err(e) => return Err(e),
            }

            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(if self.read_buf.is_empty() {
                    Error::ConnectionClosed(None)
                } else {
                    Error::Io("connection reset in the middle of a frame".into())
                });
            }
        }
    }

    /// Write `frame` with a fresh masking key.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.write_buf.clear();
        frame.write(&mut self.write_buf, Some(random_mask()));
        self.io.write_all(&self.write_buf).await?;
        Ok(())
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.io.flush().await?;
        Ok(())
    }
}
