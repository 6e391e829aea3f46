//! # Frame Codec
//!
//! Pure, stateless translation between register operations and wire bytes.
//!
//! ## Frames
//!
//! | Operation | Layout |
//! |-----------|--------|
//! | Read holding (0x03) | addr(4) FC addrH addrL countH countL crcL crcH |
//! | Preset (0x06) | addr(4) FC addrH addrL value... crcL crcH |
//!
//! ## Responses
//!
//! | Response | Header | Payload |
//! |----------|--------|---------|
//! | Read holding | addr(4) FC byteCount | 2 × registers |
//! | Preset echo | addr(4) FC addrH addrL | 2 × registers |

use crc::{Crc, CRC_16_MODBUS};
use tracing::{debug, warn};

use crate::address::DeviceAddress;
use crate::bytes::bytes_to_registers;
use crate::constants::{
    CRC_LEN, DEVICE_ADDRESS_LEN, MAX_READ_REGISTERS, MIN_FRAME_LEN, PRESET_ECHO_DATA_OFFSET,
    READ_RESPONSE_DATA_OFFSET,
};
use crate::error::{CodecError, CodecResult};
use crate::frame::{Frame, FrameBuilder, FunctionCode, PresetValue};

/// Reflected polynomial 0xA001, initial value 0xFFFF, LSB first
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the frame checksum as `[low, high]`, the order it is sent in.
///
/// # Example
///
/// ```rust
/// use ble_modbus::codec::compute_crc16;
///
/// // Standard Modbus check vector
/// assert_eq!(compute_crc16(b"123456789"), [0x37, 0x4B]);
/// ```
#[inline]
pub fn compute_crc16(bytes: &[u8]) -> [u8; 2] {
    CRC_MODBUS.checksum(bytes).to_le_bytes()
}

/// Where the payload sits inside a response, and how long it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLayout {
    /// Reply to a read-holding request for `registers` registers
    ReadHolding { registers: u16 },
    /// Echo of a preset request writing `registers` registers
    PresetEcho { registers: u16 },
    /// Arbitrary `header_len` + `payload_len`
    Custom { header_len: usize, payload_len: usize },
}

impl ResponseLayout {
    /// Bytes preceding the payload
    pub fn header_len(&self) -> usize {
        match self {
            Self::ReadHolding { .. } => READ_RESPONSE_DATA_OFFSET,
            Self::PresetEcho { .. } => PRESET_ECHO_DATA_OFFSET,
            Self::Custom { header_len, .. } => *header_len,
        }
    }

    /// Expected payload bytes
    pub fn payload_len(&self) -> usize {
        match self {
            Self::ReadHolding { registers } | Self::PresetEcho { registers } => {
                *registers as usize * 2
            }
            Self::Custom { payload_len, .. } => *payload_len,
        }
    }

    /// Function code the response is expected to echo
    pub fn function(&self) -> Option<FunctionCode> {
        match self {
            Self::ReadHolding { .. } => Some(FunctionCode::ReadHolding),
            Self::PresetEcho { .. } => Some(FunctionCode::PresetRegisters),
            Self::Custom { .. } => None,
        }
    }
}

/// Frame codec.
pub struct FrameCodec;

impl FrameCodec {
    /// Build a read-holding request for `register_count` registers from `start_address`.
    ///
    /// ```rust
    /// use ble_modbus::FrameCodec;
    ///
    /// let frame = FrameCodec::build_read_holding_frame("EyesOnPT-42", 4004, 3).unwrap();
    /// assert_eq!(
    ///     &frame.as_slice()[..9],
    ///     &[0xFF, 0x18, 0x00, 0x2A, 0x03, 0x0F, 0xA4, 0x00, 0x03]
    /// );
    /// ```
    pub fn build_read_holding_frame(
        device_name: &str,
        start_address: u16,
        register_count: u16,
    ) -> CodecResult<Frame> {
        if register_count == 0 || register_count > MAX_READ_REGISTERS {
            return Err(CodecError::out_of_range(
                register_count as i64,
                1,
                MAX_READ_REGISTERS as i64,
            ));
        }
        let address = DeviceAddress::from_name(device_name)?;
        FrameBuilder::new(address)
            .function(FunctionCode::ReadHolding)
            .register(start_address)
            .u16(register_count)
            .build()
    }

    /// Build a preset request writing `values` from `start_address`.
    pub fn build_preset_frame(
        device_name: &str,
        start_address: u16,
        values: &[PresetValue],
    ) -> CodecResult<Frame> {
        if values.is_empty() {
            return Err(CodecError::invalid_payload("Preset requires at least one value"));
        }
        let address = DeviceAddress::from_name(device_name)?;
        values
            .iter()
            .fold(
                FrameBuilder::new(address)
                    .function(FunctionCode::PresetRegisters)
                    .register(start_address),
                |builder, value| builder.value(value),
            )
            .build()
    }

    /// Check length and CRC, returning the bytes that precede the CRC.
    pub fn verify_frame(received: &[u8]) -> CodecResult<&[u8]> {
        if received.len() < MIN_FRAME_LEN {
            return Err(CodecError::FrameTooShort {
                len: received.len(),
                min: MIN_FRAME_LEN,
            });
        }

        let body_len = received.len() - CRC_LEN;
        let (body, crc) = received.split_at(body_len);
        let expected = u16::from_le_bytes(compute_crc16(body));
        let actual = u16::from_le_bytes([crc[0], crc[1]]);
        if expected != actual {
            warn!(
                "CRC mismatch on {} byte frame: expected {:04X}, got {:04X}",
                received.len(),
                expected,
                actual
            );
            return Err(CodecError::ChecksumMismatch { expected, actual });
        }

        debug!(
            "Frame verified: FC={:02X}, body_len={}",
            body[DEVICE_ADDRESS_LEN], body_len
        );
        Ok(body)
    }

    /// Verify `received` and slice out the payload described by `layout`.
    pub fn extract_payload(received: &[u8], layout: ResponseLayout) -> CodecResult<&[u8]> {
        let body = Self::verify_frame(received)?;

        if let Some(expected) = layout.function() {
            let actual = body[DEVICE_ADDRESS_LEN];
            if actual != expected.to_u8() {
                return Err(CodecError::UnexpectedFunction {
                    expected: expected.to_u8(),
                    actual,
                });
            }
        }

        let offset = layout.header_len();
        let len = layout.payload_len();
        let out_of_bounds = CodecError::PayloadOutOfBounds {
            offset,
            len,
            frame_len: body.len(),
        };
        match offset.checked_add(len) {
            Some(end) => body.get(offset..end).ok_or(out_of_bounds),
            None => Err(out_of_bounds),
        }
    }

    /// Like [`FrameCodec::extract_payload`], additionally requiring the
    /// response to come from the device `request` was addressed to.
    pub fn extract_response<'a>(
        request: &Frame,
        received: &'a [u8],
        layout: ResponseLayout,
    ) -> CodecResult<&'a [u8]> {
        let payload = Self::extract_payload(received, layout)?;
        let expected = request.device_address();
        let actual = DeviceAddress::from_frame(received)?;
        if expected != Some(actual) {
            return Err(CodecError::invalid_payload(format!(
                "Response from device {} does not match request",
                actual
            )));
        }
        Ok(payload)
    }

    /// Decode a payload into big-endian registers.
    pub fn parse_registers(payload: &[u8]) -> CodecResult<Vec<u16>> {
        bytes_to_registers(payload)
    }
}

// ============================================================================
// Tests
// ============================================================================
