//! # Big-endian register helpers
//!
//! Every multi-byte quantity on this protocol (device id, register address,
//! register count, register value) travels high byte first.
//!
//! For 16-bit value `0x0FA4`:
//! - `split_u16_be`: 0x0FA4 → (0x0F, 0xA4)
//! - `join_u16_be`: (0x0F, 0xA4) → 0x0FA4

use crate::error::{CodecError, CodecResult};

/// Split a value into `(high, low)` bytes.
///
/// Rejects anything outside `[0, 65535]`.
///
/// # Example
///
/// ```rust
/// use ble_modbus::bytes::split_u16_be;
///
/// assert_eq!(split_u16_be(4004).unwrap(), (0x0F, 0xA4));
/// assert!(split_u16_be(65536).is_err());
/// assert!(split_u16_be(-1).is_err());
/// ```
#[inline]
pub fn split_u16_be(n: i64) -> CodecResult<(u8, u8)> {
    let value = checked_u16(n)?;
    let [high, low] = value.to_be_bytes();
    Ok((high, low))
}

/// Join `(high, low)` bytes into a value.
#[inline]
pub fn join_u16_be(high: u8, low: u8) -> u16 {
    u16::from_be_bytes([high, low])
}

/// Narrow a wide integer to `u16`, reporting the valid range on failure.
#[inline]
pub fn checked_u16(n: i64) -> CodecResult<u16> {
    u16::try_from(n).map_err(|_| CodecError::out_of_range(n, 0, u16::MAX as i64))
}

/// Join a big-endian byte slice into registers.
///
/// Odd trailing bytes are rejected rather than padded.
pub fn bytes_to_registers(bytes: &[u8]) -> CodecResult<Vec<u16>> {
    if bytes.len() % 2 != 0 {
        return Err(CodecError::invalid_payload(format!(
            "Odd byte count {} for 16-bit registers",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| join_u16_be(pair[0], pair[1]))
        .collect())
}
