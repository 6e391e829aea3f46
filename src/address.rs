//! Device addressing derived from the advertised device name.
//!
//! A sensor advertising as `EyesOnPT-42` is addressed on the wire as
//! `FF 18 00 2A`: the fixed prefix followed by the numeric suffix, big-endian.

use std::fmt;

use crate::bytes::{checked_u16, join_u16_be};
use crate::constants::{DEVICE_ADDRESS_LEN, DEVICE_ADDRESS_PREFIX};
use crate::error::{CodecError, CodecResult};

/// Separator between the model name and the numeric id
pub const NAME_SEPARATOR: char = '-';

/// 4-byte device address: `{0xFF, 0x18, hi, lo}`
///
/// # Example
///
/// ```rust
/// use ble_modbus::DeviceAddress;
///
/// let addr = DeviceAddress::from_name("EyesOnPT-42").unwrap();
/// assert_eq!(addr.id(), 42);
/// assert_eq!(addr.to_bytes(), [0xFF, 0x18, 0x00, 0x2A]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress {
    id: u16,
}

impl DeviceAddress {
    /// Address a device by its numeric id
    pub const fn new(id: u16) -> Self {
        Self { id }
    }

    /// Parse the numeric suffix following the first `-` in `name`.
    pub fn from_name(name: &str) -> CodecResult<Self> {
        let suffix = name
            .split(NAME_SEPARATOR)
            .nth(1)
            .map(str::trim)
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| CodecError::invalid_device_name(name))?;

        // All-digit suffixes can still overflow i64; report them as out of range.
        let value: i64 = suffix
            .parse()
            .map_err(|_| CodecError::out_of_range(i64::MAX, 0, u16::MAX as i64))?;
        Ok(Self::new(checked_u16(value)?))
    }

    /// Parse the address prefix of a received frame
    pub fn from_frame(bytes: &[u8]) -> CodecResult<Self> {
        if bytes.len() < DEVICE_ADDRESS_LEN {
            return Err(CodecError::FrameTooShort {
                len: bytes.len(),
                min: DEVICE_ADDRESS_LEN,
            });
        }
        if bytes[..2] != DEVICE_ADDRESS_PREFIX {
            return Err(CodecError::invalid_payload(format!(
                "Bad address prefix {:02X} {:02X}",
                bytes[0], bytes[1]
            )));
        }
        Ok(Self::new(join_u16_be(bytes[2], bytes[3])))
    }

    /// Numeric device id
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Wire encoding
    #[inline]
    pub fn to_bytes(&self) -> [u8; DEVICE_ADDRESS_LEN] {
        let [high, low] = self.id.to_be_bytes();
        [DEVICE_ADDRESS_PREFIX[0], DEVICE_ADDRESS_PREFIX[1], high, low]
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.to_bytes();
        write!(f, "{:02X}{:02X}:{}", b[0], b[1], self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        let addr = DeviceAddress::from_name("EyesOnPT-42").unwrap();
        assert_eq!(addr.to_bytes(), [0xFF, 0x18, 0x00, 0x2A]);

        let addr = DeviceAddress::from_name("EyesOnPT-4004").unwrap();
        assert_eq!(addr.to_bytes(), [0xFF, 0x18, 0x0F, 0xA4]);

        let addr = DeviceAddress::from_name("EyesOnPT-65535").unwrap();
        assert_eq!(addr.id(), 65535);
    }

    #[test]
    fn test_from_name_rejects_missing_suffix() {
        for name in ["EyesOnPT", "EyesOnPT-", "EyesOnPT-abc", "EyesOnPT-4x2", ""] {
            assert_eq!(
                DeviceAddress::from_name(name),
                Err(CodecError::invalid_device_name(name)),
                "name {:?}",
                name
            );
        }
    }

    #[test]
    fn test_from_name_rejects_out_of_range() {
        assert!(matches!(
            DeviceAddress::from_name("EyesOnPT-65536"),
            Err(CodecError::ValueOutOfRange { value: 65536, .. })
        ));
        assert!(matches!(
            DeviceAddress::from_name("EyesOnPT-99999999999999999999999"),
            Err(CodecError::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn test_from_frame() {
        let addr = DeviceAddress::from_frame(&[0xFF, 0x18, 0x00, 0x2A, 0x03]).unwrap();
        assert_eq!(addr.id(), 42);

        assert!(DeviceAddress::from_frame(&[0xFF, 0x18]).is_err());
        assert!(DeviceAddress::from_frame(&[0x01, 0x18, 0x00, 0x2A]).is_err());
    }
}
