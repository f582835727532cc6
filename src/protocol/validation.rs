//! Header checks applied to every frame received from the server.
//!
//! These run before the payload is buffered, so an oversized or malformed
//! frame is rejected from its first bytes.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::FrameHeader;

/// Frame validator for incoming server frames.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    limits: Limits,
}

impl FrameValidator {
    /// Create a validator enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate a server frame header.
    ///
    /// # Errors
    ///
    /// - `Error::MaskedServerFrame` - servers must not mask (RFC 6455 Section 5.1)
    /// - `Error::ReservedBitsSet` - no extension is ever negotiated
    /// - `Error::FrameTooLarge` - payload exceeds `max_frame_size`
    pub fn validate(&self, header: &FrameHeader) -> Result<()> {
        if header.mask.is_some() {
            return Err(Error::MaskedServerFrame);
        }
        if header.rsv1 || header.rsv2 || header.rsv3 {
            return Err(Error::ReservedBitsSet);
        }
        self.limits.check_frame_size(header.payload_len)
    }
}
