//! Addressed, checksummed frame with a fixed stack buffer
//!
//! A [`Frame`] is only produced by [`FrameBuilder::build`] (which appends the
//! CRC) or by [`Frame::from_slice`] for bytes received from the device.

use std::fmt;

use tracing::debug;

use crate::address::DeviceAddress;
use crate::codec::compute_crc16;
use crate::constants::{
    CRC_LEN, DEVICE_ADDRESS_LEN, FC_PRESET_REGISTERS, FC_READ_HOLDING_REGISTERS, MAX_FRAME_SIZE,
};
use crate::error::{CodecError, CodecResult};

/// Function codes spoken by the sensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionCode {
    /// Read Holding Registers (0x03)
    ReadHolding,
    /// Preset Registers (0x06)
    PresetRegisters,
}

impl FunctionCode {
    /// Wire value
    #[inline]
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadHolding => FC_READ_HOLDING_REGISTERS,
            Self::PresetRegisters => FC_PRESET_REGISTERS,
        }
    }

    /// Parse a wire value
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            FC_READ_HOLDING_REGISTERS => Some(Self::ReadHolding),
            FC_PRESET_REGISTERS => Some(Self::PresetRegisters),
            _ => None,
        }
    }

    /// Human-readable name
    pub fn description(self) -> &'static str {
        match self {
            Self::ReadHolding => "Read Holding Registers",
            Self::PresetRegisters => "Preset Registers",
        }
    }
}

/// A value written by a preset request.
///
/// The sensor packs some settings as two 8-bit sub-fields in one register
/// (e.g. the LoRaWAN channel pair), so a register can be supplied either as
/// a 16-bit value or as its two bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetValue {
    /// One 16-bit register, sent big-endian
    Register(u16),
    /// One register made of a high and a low byte
    BytePair { high: u8, low: u8 },
    /// Pre-encoded register bytes; must be a non-empty, even-length sequence
    Raw(Vec<u8>),
}

impl PresetValue {
    /// Shorthand for [`PresetValue::BytePair`]
    pub fn byte_pair(high: u8, low: u8) -> Self {
        Self::BytePair { high, low }
    }

    /// Number of payload bytes this value contributes
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Register(_) | Self::BytePair { .. } => 2,
            Self::Raw(bytes) => bytes.len(),
        }
    }

    fn write_to(&self, frame: &mut Frame) -> CodecResult<()> {
        match self {
            Self::Register(value) => frame.push_u16(*value),
            Self::BytePair { high, low } => frame.extend(&[*high, *low]),
            Self::Raw(bytes) => {
                if bytes.is_empty() || bytes.len() % 2 != 0 {
                    return Err(CodecError::invalid_payload(format!(
                        "Raw preset value must be whole registers, got {} bytes",
                        bytes.len()
                    )));
                }
                frame.extend(bytes)
            }
        }
    }
}

impl From<u16> for PresetValue {
    fn from(value: u16) -> Self {
        Self::Register(value)
    }
}

impl From<[u8; 2]> for PresetValue {
    fn from(bytes: [u8; 2]) -> Self {
        Self::BytePair {
            high: bytes[0],
            low: bytes[1],
        }
    }
}

/// Complete frame including trailing CRC
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    data: [u8; MAX_FRAME_SIZE],
    len: usize,
}

impl Frame {
    #[inline]
    fn empty() -> Self {
        Self {
            data: [0; MAX_FRAME_SIZE],
            len: 0,
        }
    }

    /// Copy received bytes into a frame without interpreting them
    pub fn from_slice(data: &[u8]) -> CodecResult<Self> {
        if data.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                len: data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let mut frame = Self::empty();
        frame.data[..data.len()].copy_from_slice(data);
        frame.len = data.len();
        Ok(frame)
    }

    #[inline]
    fn push(&mut self, byte: u8) -> CodecResult<()> {
        if self.len >= MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                len: self.len + 1,
                max: MAX_FRAME_SIZE,
            });
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    #[inline]
    fn push_u16(&mut self, value: u16) -> CodecResult<()> {
        self.extend(&value.to_be_bytes())
    }

    #[inline]
    fn extend(&mut self, data: &[u8]) -> CodecResult<()> {
        if self.len + data.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                len: self.len + data.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    /// All bytes, CRC included
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Total length, CRC included
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes preceding the CRC
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.data[..self.len.saturating_sub(CRC_LEN)]
    }

    /// Device address prefix, if the frame is long enough
    pub fn device_address(&self) -> Option<DeviceAddress> {
        DeviceAddress::from_frame(self.as_slice()).ok()
    }

    /// Raw function code byte
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        if self.len > DEVICE_ADDRESS_LEN {
            Some(self.data[DEVICE_ADDRESS_LEN])
        } else {
            None
        }
    }

    /// Trailing CRC as sent (`[low, high]` on the wire)
    pub fn crc(&self) -> Option<u16> {
        if self.len < CRC_LEN {
            return None;
        }
        Some(u16::from_le_bytes([
            self.data[self.len - 2],
            self.data[self.len - 1],
        ]))
    }

    /// Owned copy of the bytes, for handing to a transport
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &crate::logging::format_hex_frame(self.as_slice()))
            .finish()
    }
}

/// Frame builder - fluent API
///
/// ```rust
/// use ble_modbus::{DeviceAddress, FrameBuilder, FunctionCode};
///
/// let frame = FrameBuilder::new(DeviceAddress::new(42))
///     .function(FunctionCode::ReadHolding)
///     .register(4004)
///     .u16(3)
///     .build()
///     .unwrap();
/// assert_eq!(&frame.as_slice()[..9], &[0xFF, 0x18, 0x00, 0x2A, 0x03, 0x0F, 0xA4, 0x00, 0x03]);
/// ```
pub struct FrameBuilder {
    frame: Frame,
    error: Option<CodecError>,
}

impl FrameBuilder {
    /// Start a frame addressed to `address`
    pub fn new(address: DeviceAddress) -> Self {
        let mut builder = Self {
            frame: Frame::empty(),
            error: None,
        };
        let bytes = address.to_bytes();
        builder.apply(|f| f.extend(&bytes));
        builder
    }

    fn apply(&mut self, op: impl FnOnce(&mut Frame) -> CodecResult<()>) {
        if self.error.is_none() {
            if let Err(e) = op(&mut self.frame) {
                self.error = Some(e);
            }
        }
    }

    /// Set function code
    pub fn function(mut self, function: FunctionCode) -> Self {
        self.apply(|f| f.push(function.to_u8()));
        self
    }

    /// Add the starting register address
    pub fn register(mut self, address: u16) -> Self {
        self.apply(|f| f.push_u16(address));
        self
    }

    /// Add a big-endian 16-bit quantity
    pub fn u16(mut self, value: u16) -> Self {
        self.apply(|f| f.push_u16(value));
        self
    }

    /// Add a single byte
    pub fn byte(mut self, b: u8) -> Self {
        self.apply(|f| f.push(b));
        self
    }

    /// Add a preset value
    pub fn value(mut self, value: &PresetValue) -> Self {
        self.apply(|f| value.write_to(f));
        self
    }

    /// Append the CRC and finish
    pub fn build(mut self) -> CodecResult<Frame> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        let [low, high] = compute_crc16(self.frame.as_slice());
        self.frame.extend(&[low, high])?;

        match self.frame.function_code().and_then(FunctionCode::from_u8) {
            Some(fc) => debug!(
                "Frame built: FC={:02X} ({}), total_len={}",
                fc.to_u8(),
                fc.description(),
                self.frame.len()
            ),
            None => debug!("Frame built: total_len={}", self.frame.len()),
        }

        Ok(self.frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_code_roundtrip() {
        assert_eq!(FunctionCode::ReadHolding.to_u8(), 0x03);
        assert_eq!(FunctionCode::PresetRegisters.to_u8(), 0x06);
        assert_eq!(FunctionCode::from_u8(0x03), Some(FunctionCode::ReadHolding));
        assert_eq!(FunctionCode::from_u8(0x10), None);
    }

    #[test]
    fn test_builder_layout() {
        let frame = FrameBuilder::new(DeviceAddress::new(42))
            .function(FunctionCode::PresetRegisters)
            .register(4005)
            .value(&PresetValue::byte_pair(8, 9))
            .build()
            .unwrap();

        assert_eq!(frame.len(), 11);
        assert_eq!(
            frame.body(),
            &[0xFF, 0x18, 0x00, 0x2A, 0x06, 0x0F, 0xA5, 0x08, 0x09]
        );
        assert_eq!(frame.function_code(), Some(0x06));
        assert_eq!(frame.device_address(), Some(DeviceAddress::new(42)));

        let [low, high] = compute_crc16(frame.body());
        assert_eq!(&frame.as_slice()[9..], &[low, high]);
        assert_eq!(frame.crc(), Some(u16::from_le_bytes([low, high])));
    }

    #[test]
    fn test_register_and_byte_pair_encode_alike() {
        let a = FrameBuilder::new(DeviceAddress::new(1))
            .function(FunctionCode::PresetRegisters)
            .register(4005)
            .value(&PresetValue::Register(0x0809))
            .build()
            .unwrap();
        let b = FrameBuilder::new(DeviceAddress::new(1))
            .function(FunctionCode::PresetRegisters)
            .register(4005)
            .value(&[0x08, 0x09].into())
            .build()
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_raw_value_must_be_whole_registers() {
        let result = FrameBuilder::new(DeviceAddress::new(1))
            .function(FunctionCode::PresetRegisters)
            .register(4005)
            .value(&PresetValue::Raw(vec![0x01, 0x02, 0x03]))
            .build();
        assert!(matches!(result, Err(CodecError::InvalidPayload { .. })));

        let result = FrameBuilder::new(DeviceAddress::new(1))
            .function(FunctionCode::PresetRegisters)
            .register(4005)
            .value(&PresetValue::Raw(Vec::new()))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_rejects_oversized_frame() {
        let result = FrameBuilder::new(DeviceAddress::new(1))
            .function(FunctionCode::PresetRegisters)
            .register(0)
            .value(&PresetValue::Raw(vec![0; MAX_FRAME_SIZE]))
            .build();
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_from_slice() {
        let frame = Frame::from_slice(&[0xFF, 0x18, 0x00, 0x01, 0x03]).unwrap();
        assert_eq!(frame.len(), 5);
        assert_eq!(frame.function_code(), Some(0x03));

        assert!(Frame::from_slice(&[0u8; MAX_FRAME_SIZE + 1]).is_err());
        assert_eq!(Frame::from_slice(&[0xFF]).unwrap().function_code(), None);
    }
}
