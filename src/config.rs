//! # Bridge Configuration
//!
//! Per-bridge settings: response deadline, the GATT service and the
//! write/notify characteristic pair, and packet logging.
//!
//! The deadline defaults to 5 seconds; slow or congested links may need more.

use std::time::Duration;

use uuid::Uuid;

use crate::constants::{
    NOTIFY_CHARACTERISTIC_UUID_SHORT, SERVICE_UUID_SHORT, WRITE_CHARACTERISTIC_UUID_SHORT,
};
use crate::transport::ble_uuid;
use crate::DEFAULT_TIMEOUT_MS;

/// Transaction bridge configuration.
///
/// # Example
///
/// ```rust
/// use ble_modbus::BridgeConfig;
/// use std::time::Duration;
///
/// let config = BridgeConfig::new()
///     .with_timeout(Duration::from_secs(10))
///     .with_packet_logging(true);
///
/// assert_eq!(config.timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Deadline for the response notification, measured from the write.
    pub timeout: Duration,
    /// GATT service carrying both characteristics.
    pub service: Uuid,
    /// Characteristic request frames are written to.
    pub write_characteristic: Uuid,
    /// Characteristic responses are notified on.
    pub notify_characteristic: Uuid,
    /// Log every frame sent and received at `info` level.
    pub packet_logging: bool,
}

impl BridgeConfig {
    /// Create a configuration with the sensor's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the response deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the response deadline in milliseconds.
    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(timeout_ms))
    }

    /// Set the GATT service.
    pub fn with_service(mut self, service: Uuid) -> Self {
        self.service = service;
        self
    }

    /// Set the write/notify characteristic pair.
    pub fn with_characteristics(mut self, write: Uuid, notify: Uuid) -> Self {
        self.write_characteristic = write;
        self.notify_characteristic = notify;
        self
    }

    /// Enable or disable hex packet logging.
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Deadline in whole milliseconds, as reported in timeout errors.
    pub fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            service: ble_uuid(SERVICE_UUID_SHORT),
            write_characteristic: ble_uuid(WRITE_CHARACTERISTIC_UUID_SHORT),
            notify_characteristic: ble_uuid(NOTIFY_CHARACTERISTIC_UUID_SHORT),
            packet_logging: false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.timeout, Duration::from_millis(5000));
        assert_eq!(config.timeout_ms(), 5000);
        assert_eq!(config.service, ble_uuid(0xFFE0));
        assert_eq!(config.write_characteristic, ble_uuid(0xFFE9));
        assert_eq!(config.notify_characteristic, ble_uuid(0xFFE4));
        assert!(!config.packet_logging);
    }

    #[test]
    fn test_builder_pattern() {
        let config = BridgeConfig::new()
            .with_timeout_ms(250)
            .with_service(ble_uuid(0x1234))
            .with_characteristics(ble_uuid(0x1235), ble_uuid(0x1236))
            .with_packet_logging(true);

        assert_eq!(config.timeout_ms(), 250);
        assert_eq!(config.service, ble_uuid(0x1234));
        assert_eq!(config.write_characteristic, ble_uuid(0x1235));
        assert_eq!(config.notify_characteristic, ble_uuid(0x1236));
        assert!(config.packet_logging);
    }
}
