//! # Sensor Register Map
//!
//! The configurable registers of the sensor, one variant per kind.
//!
//! | Register | Address | Encoding | Range |
//! |----------|---------|----------|-------|
//! | ReportInterval | 4004 | u16 | 0-65535 s |
//! | ChannelHigh | 4005 | high byte | 0-63 |
//! | ChannelLow | 4005 | low byte | 0-63 |
//! | DataRate | 4006 | u16 | 0-5, 255 = automatic |
//! | DeviceEui | 3010 | 8 registers, ASCII | read-only |

use std::fmt;
use std::ops::RangeInclusive;

use crate::bytes::join_u16_be;
use crate::constants::{
    DATA_RATE_AUTOMATIC, DATA_RATE_LIMIT, DEV_EUI_ADDRESS, DEV_EUI_REGISTER_COUNT,
    LORAWAN_CHANNEL_ADDRESS, LORAWAN_CHANNEL_LIMIT, LORAWAN_DATA_RATE_ADDRESS,
    REPORT_INTERVAL_ADDRESS,
};
use crate::error::{CodecError, CodecResult};
use crate::frame::PresetValue;

/// A configurable (or readable) sensor register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorRegister {
    /// Seconds between uplink reports
    ReportInterval,
    /// High byte of the LoRaWAN channel pair
    ChannelHigh,
    /// Low byte of the LoRaWAN channel pair
    ChannelLow,
    /// LoRaWAN data rate
    DataRate,
    /// LoRaWAN device EUI (read-only)
    DeviceEui,
}

impl SensorRegister {
    /// Registers that can be preset
    pub const WRITABLE: [SensorRegister; 4] = [
        Self::ReportInterval,
        Self::ChannelHigh,
        Self::ChannelLow,
        Self::DataRate,
    ];

    /// Register address on the device
    pub fn address(self) -> u16 {
        match self {
            Self::ReportInterval => REPORT_INTERVAL_ADDRESS,
            Self::ChannelHigh | Self::ChannelLow => LORAWAN_CHANNEL_ADDRESS,
            Self::DataRate => LORAWAN_DATA_RATE_ADDRESS,
            Self::DeviceEui => DEV_EUI_ADDRESS,
        }
    }

    /// Registers occupied
    pub fn register_count(self) -> u16 {
        match self {
            Self::DeviceEui => DEV_EUI_REGISTER_COUNT,
            _ => 1,
        }
    }

    /// Name used in logs and by the application layer
    pub fn name(self) -> &'static str {
        match self {
            Self::ReportInterval => "REPORT_INTERVAL",
            Self::ChannelHigh => "LORAWAN_CHANNEL_HIGH",
            Self::ChannelLow => "LORAWAN_CHANNEL_LOW",
            Self::DataRate => "LORAWAN_DATA_RATE",
            Self::DeviceEui => "DEV_EUI",
        }
    }

    pub fn is_writable(self) -> bool {
        !matches!(self, Self::DeviceEui)
    }

    /// Accepted values for a preset, `None` for read-only registers.
    ///
    /// The data rate additionally accepts [`DATA_RATE_AUTOMATIC`].
    pub fn valid_range(self) -> Option<RangeInclusive<u16>> {
        match self {
            Self::ReportInterval => Some(0..=u16::MAX),
            Self::ChannelHigh | Self::ChannelLow => Some(0..=LORAWAN_CHANNEL_LIMIT as u16),
            Self::DataRate => Some(0..=DATA_RATE_LIMIT as u16),
            Self::DeviceEui => None,
        }
    }

    /// Check a candidate value against the register's range.
    pub fn validate(self, value: i64) -> CodecResult<u16> {
        let range = self.valid_range().ok_or_else(|| {
            CodecError::invalid_payload(format!("{} is read-only", self.name()))
        })?;

        if self == Self::DataRate && value == DATA_RATE_AUTOMATIC as i64 {
            return Ok(DATA_RATE_AUTOMATIC);
        }

        let (min, max) = (*range.start() as i64, *range.end() as i64);
        if value < min || value > max {
            return Err(CodecError::out_of_range(value, min, max));
        }
        Ok(value as u16)
    }

    /// Parse a user-entered decimal value and validate it.
    ///
    /// The data rate also accepts `auto` / `automatic`.
    ///
    /// ```rust
    /// use ble_modbus::SensorRegister;
    ///
    /// assert_eq!(SensorRegister::ChannelLow.parse_input(" 12 ").unwrap(), 12);
    /// assert!(SensorRegister::ChannelLow.parse_input("64").is_err());
    /// assert_eq!(SensorRegister::DataRate.parse_input("auto").unwrap(), 255);
    /// ```
    pub fn parse_input(self, input: &str) -> CodecResult<u16> {
        let input = input.trim();
        if self == Self::DataRate
            && (input.eq_ignore_ascii_case("auto") || input.eq_ignore_ascii_case("automatic"))
        {
            return Ok(DATA_RATE_AUTOMATIC);
        }
        let value: i64 = input.parse().map_err(|_| {
            CodecError::invalid_payload(format!("'{}' is not a number for {}", input, self.name()))
        })?;
        self.validate(value)
    }

    /// Encode a validated value for a preset request.
    ///
    /// The channel bytes share one register, so the other half is taken
    /// from `current` and re-sent unchanged.
    pub fn encode(self, value: u16, current: &SensorSettings) -> CodecResult<PresetValue> {
        let value = self.validate(value as i64)?;
        Ok(match self {
            Self::ReportInterval | Self::DataRate => PresetValue::Register(value),
            Self::ChannelHigh => PresetValue::byte_pair(value as u8, current.channel_low),
            Self::ChannelLow => PresetValue::byte_pair(current.channel_high, value as u8),
            Self::DeviceEui => {
                return Err(CodecError::invalid_payload("DEV_EUI is read-only"))
            }
        })
    }
}

impl fmt::Display for SensorRegister {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// LoRaWAN data rate setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataRate {
    /// DR0-DR5
    Fixed(u8),
    /// Adaptive data rate
    Automatic,
    /// Value the sensor reported that is outside the writable range
    Other(u16),
}

impl DataRate {
    /// Decode the register value.
    ///
    /// Values outside 0-5 and 255 are kept as [`DataRate::Other`]; only
    /// writes are range checked.
    pub fn from_register(value: u16) -> Self {
        match value {
            DATA_RATE_AUTOMATIC => Self::Automatic,
            v if v <= DATA_RATE_LIMIT as u16 => Self::Fixed(v as u8),
            v => Self::Other(v),
        }
    }

    /// Register value
    pub fn to_register(self) -> u16 {
        match self {
            Self::Fixed(dr) => dr as u16,
            Self::Automatic => DATA_RATE_AUTOMATIC,
            Self::Other(v) => v,
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(dr) => write!(f, "DR{}", dr),
            Self::Automatic => f.write_str("ADR"),
            Self::Other(v) => write!(f, "DR{}", v),
        }
    }
}

/// Editable settings, as read in one 3-register block starting at 4004.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSettings {
    pub report_interval: u16,
    pub channel_high: u8,
    pub channel_low: u8,
    pub data_rate: DataRate,
}

impl SensorSettings {
    /// Payload bytes of the settings block
    pub const PAYLOAD_LEN: usize = 6;

    /// Decode the 6-byte payload of a settings read.
    pub fn from_payload(payload: &[u8]) -> CodecResult<Self> {
        if payload.len() != Self::PAYLOAD_LEN {
            return Err(CodecError::invalid_payload(format!(
                "Settings block must be {} bytes, got {}",
                Self::PAYLOAD_LEN,
                payload.len()
            )));
        }
        Ok(Self {
            report_interval: join_u16_be(payload[0], payload[1]),
            channel_high: payload[2],
            channel_low: payload[3],
            data_rate: DataRate::from_register(join_u16_be(payload[4], payload[5])),
        })
    }

    /// Current value of a writable register
    pub fn value(&self, register: SensorRegister) -> Option<u16> {
        match register {
            SensorRegister::ReportInterval => Some(self.report_interval),
            SensorRegister::ChannelHigh => Some(self.channel_high as u16),
            SensorRegister::ChannelLow => Some(self.channel_low as u16),
            SensorRegister::DataRate => Some(self.data_rate.to_register()),
            SensorRegister::DeviceEui => None,
        }
    }

    /// Update from the 2-byte echo of a preset on `register`.
    ///
    /// A channel echo carries both halves and refreshes both.
    pub fn apply_echo(&mut self, register: SensorRegister, echo: &[u8]) -> CodecResult<()> {
        let [high, low] = <[u8; 2]>::try_from(echo).map_err(|_| {
            CodecError::invalid_payload(format!("Echo must be 2 bytes, got {}", echo.len()))
        })?;
        match register {
            SensorRegister::ReportInterval => self.report_interval = join_u16_be(high, low),
            SensorRegister::ChannelHigh | SensorRegister::ChannelLow => {
                self.channel_high = high;
                self.channel_low = low;
            }
            SensorRegister::DataRate => {
                self.data_rate = DataRate::from_register(join_u16_be(high, low))
            }
            SensorRegister::DeviceEui => {
                return Err(CodecError::invalid_payload("DEV_EUI is read-only"))
            }
        }
        Ok(())
    }
}

/// Decode the 16-byte EUI payload as text, dropping trailing NULs.
pub fn decode_device_eui(payload: &[u8]) -> CodecResult<String> {
    let expected = DEV_EUI_REGISTER_COUNT as usize * 2;
    if payload.len() != expected {
        return Err(CodecError::invalid_payload(format!(
            "DEV_EUI must be {} bytes, got {}",
            expected,
            payload.len()
        )));
    }
    let end = payload
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |i| i + 1);
    String::from_utf8(payload[..end].to_vec())
        .map_err(|_| CodecError::invalid_payload("DEV_EUI is not valid UTF-8"))
}
