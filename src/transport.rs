//! # BLE Transport Seam
//!
//! The bridge only needs five primitives from the BLE stack. Scanning,
//! connecting and service discovery stay with the implementor.
//!
//! ```rust,no_run
//! # use ble_modbus::transport::{BleTransport, NotifyCallback, DisconnectCallback};
//! # use ble_modbus::TransportError;
//! # use uuid::Uuid;
//! struct MyStack;
//!
//! impl BleTransport for MyStack {
//!     async fn write(&self, _device: &str, _svc: Uuid, _chr: Uuid, _bytes: &[u8]) -> Result<(), TransportError> { Ok(()) }
//!     async fn subscribe(&self, _device: &str, _svc: Uuid, _chr: Uuid, _on_data: NotifyCallback) -> Result<(), TransportError> { Ok(()) }
//!     async fn unsubscribe(&self, _device: &str, _svc: Uuid, _chr: Uuid) -> Result<(), TransportError> { Ok(()) }
//!     async fn is_connected(&self, _device: &str) -> bool { true }
//!     fn on_disconnect(&self, _device: &str, _callback: DisconnectCallback) {}
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::TransportError;

/// Receives the raw bytes of one notification
pub type NotifyCallback = Box<dyn Fn(Vec<u8>) + Send + Sync + 'static>;

/// Invoked when the transport observes the link dropping
pub type DisconnectCallback = Box<dyn Fn() + Send + Sync + 'static>;

/// Bluetooth base UUID `00000000-0000-1000-8000-00805F9B34FB`
const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_0080_5F9B_34FB;

/// Expand a 16-bit short UUID onto the Bluetooth base UUID.
///
/// ```rust
/// use ble_modbus::transport::ble_uuid;
///
/// assert_eq!(
///     ble_uuid(0xFFE0).to_string(),
///     "0000ffe0-0000-1000-8000-00805f9b34fb"
/// );
/// ```
pub const fn ble_uuid(short: u16) -> Uuid {
    Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96))
}

/// Primitives consumed from the BLE stack.
///
/// All methods take `&self`: the bridge shares one transport between
/// concurrent transactions on different devices.
pub trait BleTransport: Send + Sync {
    /// Write `bytes` to a characteristic.
    fn write(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Start notifications on a characteristic, delivering each payload to `on_data`.
    fn subscribe(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
        on_data: NotifyCallback,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Stop notifications on a characteristic.
    fn unsubscribe(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Whether the device is currently in the stack's connected set.
    fn is_connected(&self, device_id: &str) -> impl Future<Output = bool> + Send;

    /// Register `callback` to run when the link to `device_id` drops.
    fn on_disconnect(&self, device_id: &str, callback: DisconnectCallback);
}

impl<T: BleTransport> BleTransport for Arc<T> {
    fn write(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).write(device_id, service, characteristic, bytes)
    }

    fn subscribe(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
        on_data: NotifyCallback,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).subscribe(device_id, service, characteristic, on_data)
    }

    fn unsubscribe(
        &self,
        device_id: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> impl Future<Output = Result<(), TransportError>> + Send {
        (**self).unsubscribe(device_id, service, characteristic)
    }

    fn is_connected(&self, device_id: &str) -> impl Future<Output = bool> + Send {
        (**self).is_connected(device_id)
    }

    fn on_disconnect(&self, device_id: &str, callback: DisconnectCallback) {
        (**self).on_disconnect(device_id, callback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{
        NOTIFY_CHARACTERISTIC_UUID_SHORT, SERVICE_UUID_SHORT, WRITE_CHARACTERISTIC_UUID_SHORT,
    };

    #[test]
    fn test_ble_uuid_expansion() {
        assert_eq!(
            ble_uuid(SERVICE_UUID_SHORT),
            Uuid::parse_str("0000ffe0-0000-1000-8000-00805f9b34fb").unwrap()
        );
        assert_eq!(
            ble_uuid(WRITE_CHARACTERISTIC_UUID_SHORT),
            Uuid::parse_str("0000ffe9-0000-1000-8000-00805f9b34fb").unwrap()
        );
        assert_eq!(
            ble_uuid(NOTIFY_CHARACTERISTIC_UUID_SHORT),
            Uuid::parse_str("0000ffe4-0000-1000-8000-00805f9b34fb").unwrap()
        );
    }
}
