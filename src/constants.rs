//! Wire constants for the sensor's register protocol
//!
//! Frame layout:
//!
//! ```text
//! +------------------+----+-----------+-----------+-------+
//! | FF 18 idH idL    | FC | addrH addrL | payload | crcL crcH |
//! +------------------+----+-----------+-----------+-------+
//!   device address(4)  1     2 (BE)       N        2 (LE)
//! ```

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Fixed prefix of every device address
pub const DEVICE_ADDRESS_PREFIX: [u8; 2] = [0xFF, 0x18];

/// Device address length: prefix(2) + id(2)
pub const DEVICE_ADDRESS_LEN: usize = 4;

/// Function code length
pub const FUNCTION_CODE_LEN: usize = 1;

/// Register address length (big-endian)
pub const REGISTER_ADDRESS_LEN: usize = 2;

/// CRC length (little-endian)
pub const CRC_LEN: usize = 2;

/// Smallest frame the codec accepts: address + function + CRC
pub const MIN_FRAME_LEN: usize = DEVICE_ADDRESS_LEN + FUNCTION_CODE_LEN + CRC_LEN;

/// Maximum frame size, matching the RTU ADU ceiling of 256 bytes
pub const MAX_FRAME_SIZE: usize = 256;

/// Offset of the register data in a read-holding response:
/// device address(4) + function(1) + byte count(1)
pub const READ_RESPONSE_DATA_OFFSET: usize = DEVICE_ADDRESS_LEN + FUNCTION_CODE_LEN + 1;

/// Offset of the echoed value in a preset response:
/// device address(4) + function(1) + register address(2)
pub const PRESET_ECHO_DATA_OFFSET: usize =
    DEVICE_ADDRESS_LEN + FUNCTION_CODE_LEN + REGISTER_ADDRESS_LEN;

/// Maximum registers per read request
///
/// Response: header(6) + N × 2 + CRC(2) ≤ 256 → N ≤ 124
pub const MAX_READ_REGISTERS: u16 = 124;

// ============================================================================
// Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Preset Registers (FC06)
pub const FC_PRESET_REGISTERS: u8 = 0x06;

// ============================================================================
// BLE Characteristics (16-bit short UUIDs)
// ============================================================================

/// UART-style TX/RX service
pub const SERVICE_UUID_SHORT: u16 = 0xFFE0;

/// Characteristic the request frames are written to
pub const WRITE_CHARACTERISTIC_UUID_SHORT: u16 = 0xFFE9;

/// Characteristic the device notifies responses on
pub const NOTIFY_CHARACTERISTIC_UUID_SHORT: u16 = 0xFFE4;

// ============================================================================
// Sensor Register Map
// ============================================================================

/// First of the 8 registers holding the device EUI
pub const DEV_EUI_ADDRESS: u16 = 3010;

/// Registers holding the device EUI (16 ASCII bytes)
pub const DEV_EUI_REGISTER_COUNT: u16 = 8;

/// Report interval, in seconds
pub const REPORT_INTERVAL_ADDRESS: u16 = 4004;

/// LoRaWAN channel pair: high byte / low byte
pub const LORAWAN_CHANNEL_ADDRESS: u16 = 4005;

/// LoRaWAN data rate
pub const LORAWAN_DATA_RATE_ADDRESS: u16 = 4006;

/// Registers covered by one settings read (interval, channel pair, data rate)
pub const SETTINGS_REGISTER_COUNT: u16 = 3;

/// Upper bound of a LoRaWAN channel index
pub const LORAWAN_CHANNEL_LIMIT: u8 = 63;

/// Upper bound of a fixed LoRaWAN data rate
pub const DATA_RATE_LIMIT: u8 = 5;

/// Data rate value selecting adaptive (automatic) data rate
pub const DATA_RATE_AUTOMATIC: u16 = 255;

/// Factory LoRaWAN application EUI
pub const DEFAULT_APP_EUI: &str = "753778214125442A";

/// Factory LoRaWAN application key
pub const DEFAULT_APP_KEY: &str = "ACB46E292A52432381A8AF5B14E5E3AE";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        assert_eq!(MIN_FRAME_LEN, 7);
        assert_eq!(READ_RESPONSE_DATA_OFFSET, 6);
        assert_eq!(PRESET_ECHO_DATA_OFFSET, 7);
    }

    #[test]
    fn test_read_limit_fits_frame() {
        let response_len = READ_RESPONSE_DATA_OFFSET + MAX_READ_REGISTERS as usize * 2 + CRC_LEN;
        assert!(response_len <= MAX_FRAME_SIZE);
    }

    #[test]
    fn test_settings_registers_are_contiguous() {
        assert_eq!(LORAWAN_CHANNEL_ADDRESS, REPORT_INTERVAL_ADDRESS + 1);
        assert_eq!(LORAWAN_DATA_RATE_ADDRESS, REPORT_INTERVAL_ADDRESS + 2);
        assert_eq!(
            REPORT_INTERVAL_ADDRESS + SETTINGS_REGISTER_COUNT - 1,
            LORAWAN_DATA_RATE_ADDRESS
        );
    }
}
