//! Error types for the frame codec, the transport seam and the transaction bridge.
//!
//! ```text
//! CodecError      - malformed names, out-of-range values, short/corrupt frames
//! TransportError  - failures reported by the BLE collaborator
//! BridgeError     - failed transactions (timeout, disconnect, busy, cancelled)
//! ```
//!
//! None of these are fatal to the bridge; every failure is returned to the caller.

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised while building or parsing frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The device name has no numeric suffix after the `-` separator
    #[error("Invalid device name '{name}': expected a numeric suffix after '-'")]
    InvalidDeviceName { name: String },

    /// Numeric value does not fit the allowed range
    #[error("Value {value} out of range [{min}, {max}]")]
    ValueOutOfRange { value: i64, min: i64, max: i64 },

    /// Frame is shorter than address + function + CRC
    #[error("Frame too short: {len} bytes (min {min})")]
    FrameTooShort { len: usize, min: usize },

    /// Frame would exceed the fixed frame buffer
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    /// Trailing CRC does not match the one computed over the frame body
    #[error("CRC mismatch: expected 0x{expected:04X}, got 0x{actual:04X}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    /// Requested payload slice lies outside the frame body
    #[error("Payload [{offset}..{offset}+{len}] outside frame body of {frame_len} bytes")]
    PayloadOutOfBounds {
        offset: usize,
        len: usize,
        frame_len: usize,
    },

    /// Response echoed a different function code than the request used
    #[error("Unexpected function code: expected 0x{expected:02X}, got 0x{actual:02X}")]
    UnexpectedFunction { expected: u8, actual: u8 },

    /// Payload could not be interpreted
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },
}

impl CodecError {
    /// Create an invalid device name error
    pub fn invalid_device_name<S: Into<String>>(name: S) -> Self {
        Self::InvalidDeviceName { name: name.into() }
    }

    /// Create an out-of-range error
    pub fn out_of_range(value: i64, min: i64, max: i64) -> Self {
        Self::ValueOutOfRange { value, min, max }
    }

    /// Create an invalid payload error
    pub fn invalid_payload<S: Into<String>>(message: S) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }
}

/// Failure reported by the BLE transport collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("BLE {operation} failed: {message}")]
pub struct TransportError {
    /// Operation that failed (`write`, `subscribe`, `unsubscribe`)
    pub operation: &'static str,
    /// Transport-supplied description
    pub message: String,
}

impl TransportError {
    /// Create a new transport error
    pub fn new<S: Into<String>>(operation: &'static str, message: S) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Errors surfaced as the result of a failed transaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// No notification arrived before the deadline
    #[error("Timeout after {timeout_ms}ms waiting for response")]
    Timeout { timeout_ms: u64 },

    /// The link to the device was lost before the response arrived
    #[error("Connection lost to device {device_id}")]
    Disconnected { device_id: String },

    /// The transport rejected a write or subscription
    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    /// Another transaction is already in flight for this device
    #[error("Device {device_id} already has a transaction in flight")]
    Busy { device_id: String },

    /// The caller cancelled the transaction
    #[error("Transaction cancelled")]
    Cancelled,

    /// The response arrived but could not be decoded
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl BridgeError {
    /// Create a timeout error
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    /// Create a disconnected error
    pub fn disconnected<S: Into<String>>(device_id: S) -> Self {
        Self::Disconnected {
            device_id: device_id.into(),
        }
    }

    /// Create a busy error
    pub fn busy<S: Into<String>>(device_id: S) -> Self {
        Self::Busy {
            device_id: device_id.into(),
        }
    }

    /// Whether retrying the same request on the same link may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Busy { .. })
    }

    /// Whether the device link is known to be gone
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Disconnected { .. } | Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CodecError::ChecksumMismatch {
            expected: 0x1234,
            actual: 0xABCD,
        };
        assert_eq!(
            err.to_string(),
            "CRC mismatch: expected 0x1234, got 0xABCD"
        );

        let err = BridgeError::timeout(5000);
        assert_eq!(err.to_string(), "Timeout after 5000ms waiting for response");
    }

    #[test]
    fn test_error_classification() {
        assert!(BridgeError::timeout(100).is_retryable());
        assert!(BridgeError::busy("dev").is_retryable());
        assert!(!BridgeError::Cancelled.is_retryable());

        assert!(BridgeError::disconnected("dev").is_connection_lost());
        let transport: BridgeError = TransportError::new("write", "gatt error").into();
        assert!(transport.is_connection_lost());
        assert!(!BridgeError::timeout(100).is_connection_lost());
    }

    #[test]
    fn test_codec_error_converts_into_bridge_error() {
        let err: BridgeError = CodecError::out_of_range(70000, 0, 65535).into();
        assert!(matches!(
            err,
            BridgeError::Codec(CodecError::ValueOutOfRange { value: 70000, .. })
        ));
    }
}
