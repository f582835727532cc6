//! Payload masking (RFC 6455 Section 5.3).

/// XOR `data` in place with the four-byte masking key.
///
/// Masking is an involution: applying the same key twice restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let key = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= k;
    }
}

/// Draw a fresh masking key from the OS entropy source.
///
/// Falls back to the system clock if the entropy source is unavailable.
#[must_use]
pub fn random_mask() -> [u8; 4] {
    let mut key = [0u8; 4];
    if getrandom::getrandom(&mut key).is_err() {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0x9E37_79B9);
        key = nanos.to_le_bytes();
    }
    key
}
