//! Incremental UTF-8 validation for fragmented text messages.

use crate::error::{Error, Result};

/// Validates UTF-8 across fragment boundaries.
///
/// A multi-byte sequence cut by a fragment boundary is carried over to the
/// next call; it must be completed by the final fragment.
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    carry: [u8; 3],
    carry_len: usize,
}

impl Utf8Validator {
    /// Create a validator with no pending bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the next fragment.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` on any invalid sequence, or when the final
    /// fragment ends inside a multi-byte sequence.
    pub fn validate(&mut self, data: &[u8], is_final: bool) -> Result<()> {
        let mut joined;
        let bytes = if self.carry_len > 0 {
            joined = Vec::with_capacity(self.carry_len + data.len());
            joined.extend_from_slice(&self.carry[..self.carry_len]);
            joined.extend_from_slice(data);
            joined.as_slice()
        } else {
            data
        };
        self.carry_len = 0;

        match std::str::from_utf8(bytes) {
            Ok(_) => Ok(()),
            // error_len() is None when the input merely stops mid-sequence
            Err(e) if !is_final && e.error_len().is_none() => {
                let tail = &bytes[e.valid_up_to()..];
                self.carry[..tail.len()].copy_from_slice(tail);
                self.carry_len = tail.len();
                Ok(())
            }
            Err(_) => Err(Error::InvalidUtf8),
        }
    }

    /// Discard any pending bytes.
    pub fn reset(&mut self) {
        self.carry_len = 0;
    }

    /// Whether a sequence is waiting for its continuation bytes.
    #[must_use]
    pub fn has_incomplete(&self) -> bool {
        self.carry_len > 0
    }
}
