//! WebSocket frame parsing and serialization (RFC 6455 Section 5.2).

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::apply_mask;

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

/// Decoded frame header.
///
/// Parsed separately from the payload so the codec can reject a frame
/// before buffering it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Masking key, if the MASK bit was set.
    pub mask: Option<[u8; 4]>,
    /// Declared payload length.
    pub payload_len: usize,
    /// Bytes taken by the header, masking key included.
    pub header_len: usize,
}

impl FrameHeader {
    /// Parse a frame header from the start of `buf`.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::InvalidOpcode` / `Error::ReservedOpcode` for bad opcodes
    /// - `Error::PayloadTooLargeForPlatform` if the 64-bit length does not fit
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let byte0 = buf[0];
        let byte1 = buf[1];
        let opcode = OpCode::from_u8(byte0 & 0x0F)?;
        let masked = byte1 & 0x80 != 0;

        let (payload_len, len_end) = match byte1 & 0x7F {
            126 => {
                let bytes: [u8; 2] = take(buf, 2)?;
                (usize::from(u16::from_be_bytes(bytes)), 4)
            }
            127 => {
                let bytes: [u8; 8] = take(buf, 2)?;
                let len = u64::from_be_bytes(bytes);
                let len = usize::try_from(len).map_err(|_| Error::PayloadTooLargeForPlatform {
                    size: len,
                    max: usize::MAX as u64,
                })?;
                (len, 10)
            }
            short => (usize::from(short), 2),
        };

        let (mask, header_len) = if masked {
            (Some(take::<4>(buf, len_end)?), len_end + 4)
        } else {
            (None, len_end)
        };

        Ok(Self {
            fin: byte0 & 0x80 != 0,
            rsv1: byte0 & 0x40 != 0,
            rsv2: byte0 & 0x20 != 0,
            rsv3: byte0 & 0x10 != 0,
            opcode,
            mask,
            payload_len,
            header_len,
        })
    }

    /// Total bytes occupied by this frame on the wire.
    ///
    /// # Errors
    ///
    /// Returns `Error::PayloadTooLargeForPlatform` on overflow.
    pub fn frame_len(&self) -> Result<usize> {
        self.header_len
            .checked_add(self.payload_len)
            .ok_or(Error::PayloadTooLargeForPlatform {
                size: self.payload_len as u64,
                max: usize::MAX as u64,
            })
    }
}

fn take<const N: usize>(buf: &[u8], at: usize) -> Result<[u8; N]> {
    buf.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(Error::IncompleteFrame {
            needed: at + N - buf.len(),
        })
}

/// A WebSocket frame.
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                Masking key (client frames only)               |
/// +---------------------------------------------------------------+
/// |                         Payload data                          |
/// +---------------------------------------------------------------+
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag.
    pub fin: bool,
    /// Reserved bit 1. Must be 0 without a negotiated extension.
    pub rsv1: bool,
    /// Reserved bit 2.
    pub rsv2: bool,
    /// Reserved bit 3.
    pub rsv3: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with clear reserved bits.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            rsv1: false,
            rsv2: false,
            rsv3: false,
            opcode,
            payload,
        }
    }

    /// Create a final text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a close frame. With no code the payload is empty.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = match code {
            Some(code) => {
                let mut data = code.to_be_bytes().to_vec();
                data.extend_from_slice(reason.as_bytes());
                data
            }
            None => Vec::new(),
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Payload bytes, already unmasked.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse one frame from `buf`, unmasking the payload if needed.
    ///
    /// Returns the frame and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if `buf` does not hold the whole frame
    /// - header errors from [`FrameHeader::parse`]
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::parse(buf)?;
        Self::from_header(&header, buf)
    }

    /// Build the frame for an already parsed header.
    ///
    /// # Errors
    ///
    /// Returns `Error::IncompleteFrame` if the payload is not fully buffered.
    pub fn from_header(header: &FrameHeader, buf: &[u8]) -> Result<(Self, usize)> {
        let total = header.frame_len()?;
        if buf.len() < total {
            return Err(Error::IncompleteFrame {
                needed: total - buf.len(),
            });
        }

        let mut payload = buf[header.header_len..total].to_vec();
        if let Some(mask) = header.mask {
            apply_mask(&mut payload, mask);
        }

        let frame = Frame {
            fin: header.fin,
            rsv1: header.rsv1,
            rsv2: header.rsv2,
            rsv3: header.rsv3,
            opcode: header.opcode,
            payload,
        };
        Ok((frame, total))
    }

    /// Check the frame-level rules of RFC 6455.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if RSV bits are set
    /// - `Error::FragmentedControlFrame` if a control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if a control payload exceeds 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.rsv1 || self.rsv2 || self.rsv3 {
            return Err(Error::ReservedBitsSet);
        }

        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }

        Ok(())
    }

    /// Append the wire encoding of this frame to `buf`.
    ///
    /// Client frames must pass a masking key; server frames pass `None`.
    pub fn write(&self, buf: &mut BytesMut, mask: Option<[u8; 4]>) {
        buf.reserve(self.wire_size(mask.is_some()));

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= 0x80;
        }
        if self.rsv1 {
            byte0 |= 0x40;
        }
        if self.rsv2 {
            byte0 |= 0x20;
        }
        if self.rsv3 {
            byte0 |= 0x10;
        }
        buf.put_u8(byte0);

        let mask_bit = if mask.is_some() { 0x80 } else { 0 };
        let len = self.payload.len();
        if len <= 125 {
            buf.put_u8(mask_bit | len as u8);
        } else if let Ok(len) = u16::try_from(len) {
            buf.put_u8(mask_bit | 126);
            buf.put_u16(len);
        } else {
            buf.put_u8(mask_bit | 127);
            buf.put_u64(len as u64);
        }

        let start = match mask {
            Some(key) => {
                buf.put_slice(&key);
                buf.len()
            }
            None => buf.len(),
        };
        buf.put_slice(&self.payload);
        if let Some(key) = mask {
            apply_mask(&mut buf[start..], key);
        }
    }

    /// Bytes needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let len = self.payload.len();
        let extended = match len {
            0..=125 => 0,
            126..=65535 => 2,
            _ => 8,
        };
        let mask = if masked { 4 } else { 0 };
        2 + extended + mask + len
    }
}
