//! Reassembly of fragmented data messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::utf8::Utf8Validator;
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
///
/// Control frames may arrive between fragments; they are not part of the
/// message and are ignored here.
pub struct MessageAssembler {
    buffer: BytesMut,
    fragment_count: usize,
    opcode: Option<OpCode>,
    utf8: Option<Utf8Validator>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            fragment_count: 0,
            opcode: None,
            utf8: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns the complete message once a frame with FIN=1 arrives.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        let opcode = match (self.opcode, frame.opcode) {
            (None, OpCode::Continuation) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (Some(_), OpCode::Continuation) => None,
            (Some(_), _) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (None, started) => Some(started),
        };

        self.limits.check_fragment_count(self.fragment_count + 1)?;
        self.limits
            .check_message_size(self.buffer.len() + frame.payload().len())?;

        if let Some(started) = opcode {
            self.opcode = Some(started);
            if started == OpCode::Text {
                self.utf8 = Some(Utf8Validator::new());
            }
        }

        if let Some(validator) = self.utf8.as_mut() {
            validator.validate(frame.payload(), frame.fin)?;
        }

        self.buffer.extend_from_slice(frame.payload());
        self.fragment_count += 1;

        if !frame.fin {
            return Ok(None);
        }

        let message = self.opcode.take().map(|opcode| AssembledMessage {
            opcode,
            payload: self.buffer.split().to_vec(),
        });
        self.reset();
        Ok(message)
    }

    /// Whether a fragmented message is in progress.
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.fragment_count = 0;
        self.opcode = None;
        self.utf8 = None;
    }
}

/// A fully assembled data message.
#[derive(Debug)]
pub struct AssembledMessage {
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}
