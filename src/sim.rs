//! # Simulated Sensor
//!
//! An in-memory [`BleTransport`] that answers read-holding and preset frames
//! the way the sensor firmware does, with knobs for the failure modes seen
//! in the field.
//!
//! ```rust
//! use ble_modbus::{SensorClient, SimulatedSensor, TransactionBridge};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let sensor = SimulatedSensor::new("AA:BB:CC:DD:EE:01", "EyesOnPT-42")?;
//! let bridge = TransactionBridge::new(sensor.clone());
//! bridge.mark_connected(sensor.device_id());
//!
//! let mut client = SensorClient::new(bridge, sensor.device_id(), sensor.device_name())?;
//! let settings = client.read_settings().await?;
//! assert_eq!(settings.report_interval, 600);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::address::DeviceAddress;
use crate::bytes::join_u16_be;
use crate::codec::FrameCodec;
use crate::constants::{
    DEVICE_ADDRESS_LEN, DEV_EUI_ADDRESS, LORAWAN_CHANNEL_ADDRESS, LORAWAN_DATA_RATE_ADDRESS,
    MAX_READ_REGISTERS, REPORT_INTERVAL_ADDRESS,
};
use crate::error::{CodecResult, TransportError};
use crate::frame::{FrameBuilder, FunctionCode, PresetValue};
use crate::transport::{BleTransport, DisconnectCallback, NotifyCallback};

/// How the simulated sensor reacts to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimBehavior {
    /// Answer every valid request once
    #[default]
    Respond,
    /// Accept writes, never answer
    Silent,
    /// Answer every request twice
    RespondTwice,
    /// Answer with a damaged CRC
    CorruptCrc,
    /// Drop the link right after accepting a write
    DisconnectOnWrite,
}

/// Factory EUI programmed into a fresh simulated sensor
pub const SIM_DEVICE_EUI: &str = "70B3D57ED0051234";

struct SimState {
    address: DeviceAddress,
    registers: HashMap<u16, u16>,
    connected: bool,
    behavior: SimBehavior,
    latency: Duration,
    subscriptions: HashMap<Uuid, Arc<NotifyCallback>>,
    disconnect_callbacks: Vec<Arc<DisconnectCallback>>,
    writes: Vec<Vec<u8>>,
    unsubscribes: usize,
}

/// Simulated sensor reachable as one BLE device.
///
/// Clones share the same device.
#[derive(Clone)]
pub struct SimulatedSensor {
    device_id: Arc<str>,
    device_name: Arc<str>,
    state: Arc<Mutex<SimState>>,
}

impl SimulatedSensor {
    /// Create a connected sensor advertising as `device_name`.
    pub fn new(device_id: &str, device_name: &str) -> CodecResult<Self> {
        let address = DeviceAddress::from_name(device_name)?;

        let mut registers = HashMap::new();
        registers.insert(REPORT_INTERVAL_ADDRESS, 600);
        registers.insert(LORAWAN_CHANNEL_ADDRESS, join_u16_be(8, 15));
        registers.insert(LORAWAN_DATA_RATE_ADDRESS, 3);
        for (i, pair) in SIM_DEVICE_EUI.as_bytes().chunks(2).enumerate() {
            registers.insert(DEV_EUI_ADDRESS + i as u16, join_u16_be(pair[0], pair[1]));
        }

        Ok(Self {
            device_id: Arc::from(device_id),
            device_name: Arc::from(device_name),
            state: Arc::new(Mutex::new(SimState {
                address,
                registers,
                connected: true,
                behavior: SimBehavior::Respond,
                latency: Duration::from_millis(20),
                subscriptions: HashMap::new(),
                disconnect_callbacks: Vec::new(),
                writes: Vec::new(),
                unsubscribes: 0,
            })),
        })
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Delay between a write and its notification
    pub fn with_latency(self, latency: Duration) -> Self {
        self.lock().latency = latency;
        self
    }

    pub fn set_behavior(&self, behavior: SimBehavior) {
        self.lock().behavior = behavior;
    }

    pub fn set_register(&self, address: u16, value: u16) {
        self.lock().registers.insert(address, value);
    }

    /// Current register value (0 when never written)
    pub fn register(&self, address: u16) -> u16 {
        self.lock().registers.get(&address).copied().unwrap_or(0)
    }

    /// Frames written so far
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Subscriptions currently armed
    pub fn active_subscriptions(&self) -> usize {
        self.lock().subscriptions.len()
    }

    /// Unsubscribe calls received
    pub fn unsubscribe_count(&self) -> usize {
        self.lock().unsubscribes
    }

    /// Drop the link, clearing subscriptions and firing disconnect callbacks.
    pub fn disconnect(&self) {
        let callbacks = {
            let mut state = self.lock();
            if !state.connected {
                return;
            }
            state.connected = false;
            state.subscriptions.clear();
            state.disconnect_callbacks.clone()
        };
        debug!("Simulated sensor {} disconnected", self.device_id);
        for callback in callbacks {
            callback();
        }
    }

    pub fn reconnect(&self) {
        self.lock().connected = true;
    }

    /// Push unsolicited bytes through every armed subscription.
    pub fn push_notification(&self, bytes: &[u8]) {
        let callbacks: Vec<_> = self.lock().subscriptions.values().cloned().collect();
        for callback in callbacks {
            callback(bytes.to_vec());
        }
    }

    fn check_device(&self, operation: &'static str, device_id: &str) -> Result<(), TransportError> {
        if device_id != &*self.device_id {
            return Err(TransportError::new(
                operation,
                format!("unknown device {}", device_id),
            ));
        }
        if !self.lock().connected {
            return Err(TransportError::new(operation, "device not connected"));
        }
        Ok(())
    }

    /// Build the firmware's answer to `request`, or `None` if it would stay silent.
    fn answer(&self, request: &[u8]) -> Option<Vec<u8>> {
        let body = match FrameCodec::verify_frame(request) {
            Ok(body) => body,
            Err(e) => {
                warn!("Simulated sensor ignoring request: {}", e);
                return None;
            }
        };

        let mut state = self.lock();
        if DeviceAddress::from_frame(request).ok() != Some(state.address) {
            trace!("Request addressed to another device");
            return None;
        }

        let pdu = &body[DEVICE_ADDRESS_LEN..];
        let response = match FunctionCode::from_u8(pdu[0]) {
            Some(FunctionCode::ReadHolding) if pdu.len() == 5 => {
                let start = join_u16_be(pdu[1], pdu[2]);
                let count = join_u16_be(pdu[3], pdu[4]);
                if count == 0 || count > MAX_READ_REGISTERS {
                    return None;
                }
                (0..count)
                    .fold(
                        FrameBuilder::new(state.address)
                            .function(FunctionCode::ReadHolding)
                            .byte((count * 2) as u8),
                        |builder, i| {
                            let value = state
                                .registers
                                .get(&start.wrapping_add(i))
                                .copied()
                                .unwrap_or(0);
                            builder.u16(value)
                        },
                    )
                    .build()
            }
            Some(FunctionCode::PresetRegisters) if pdu.len() >= 5 && pdu.len() % 2 == 1 => {
                let start = join_u16_be(pdu[1], pdu[2]);
                let values = &pdu[3..];
                for (i, pair) in values.chunks(2).enumerate() {
                    state
                        .registers
                        .insert(start.wrapping_add(i as u16), join_u16_be(pair[0], pair[1]));
                }
                FrameBuilder::new(state.address)
                    .function(FunctionCode::PresetRegisters)
                    .register(start)
                    .value(&PresetValue::Raw(values.to_vec()))
                    .build()
            }
            _ => {
                warn!("Simulated sensor got unsupported request FC={:02X}", pdu[0]);
                return None;
            }
        };

        let mut bytes = response.ok()?.to_vec();
        if state.behavior == SimBehavior::CorruptCrc {
            if let Some(last) = bytes.last_mut() {
                *last ^= 0xFF;
            }
        }
        Some(bytes)
    }
}

impl BleTransport for SimulatedSensor {
    async fn write(
        &self,
        device_id: &str,
        _service: Uuid,
        characteristic: Uuid,
        bytes: &[u8],
    ) -> Result<(), TransportError> {
        self.check_device("write", device_id)?;
        trace!("Simulated write to {} on {}", device_id, characteristic);

        let (behavior, latency) = {
            let mut state = self.lock();
            state.writes.push(bytes.to_vec());
            (state.behavior, state.latency)
        };

        if behavior == SimBehavior::DisconnectOnWrite {
            let sensor = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                sensor.disconnect();
            });
            return Ok(());
        }

        let Some(response) = self.answer(bytes) else {
            return Ok(());
        };
        if behavior == SimBehavior::Silent {
            return Ok(());
        }

        let repeats = if behavior == SimBehavior::RespondTwice { 2 } else { 1 };
        let sensor = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(latency).await;
            for _ in 0..repeats {
                sensor.push_notification(&response);
            }
        });
        Ok(())
    }

    async fn subscribe(
        &self,
        device_id: &str,
        _service: Uuid,
        characteristic: Uuid,
        on_data: NotifyCallback,
    ) -> Result<(), TransportError> {
        self.check_device("subscribe", device_id)?;
        self.lock()
            .subscriptions
            .insert(characteristic, Arc::new(on_data));
        Ok(())
    }

    async fn unsubscribe(
        &self,
        device_id: &str,
        _service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        state.unsubscribes += 1;
        state.subscriptions.remove(&characteristic);
        if device_id != &*self.device_id || !state.connected {
            return Err(TransportError::new("unsubscribe", "device not connected"));
        }
        Ok(())
    }

    async fn is_connected(&self, device_id: &str) -> bool {
        device_id == &*self.device_id && self.lock().connected
    }

    fn on_disconnect(&self, device_id: &str, callback: DisconnectCallback) {
        if device_id == &*self.device_id {
            self.lock().disconnect_callbacks.push(Arc::new(callback));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{compute_crc16, ResponseLayout};
    use crate::config::BridgeConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sensor() -> SimulatedSensor {
        SimulatedSensor::new("sim-1", "EyesOnPT-42").unwrap()
    }

    #[test]
    fn test_rejects_bad_name() {
        assert!(SimulatedSensor::new("sim-1", "EyesOnPT").is_err());
    }

    #[test]
    fn test_answers_read_holding() {
        let sensor = sensor();
        let request = FrameCodec::build_read_holding_frame("EyesOnPT-42", 4004, 3).unwrap();
        let response = sensor.answer(request.as_slice()).unwrap();

        let layout = ResponseLayout::ReadHolding { registers: 3 };
        let payload = FrameCodec::extract_response(&request, &response, layout).unwrap();
        assert_eq!(payload, &[0x02, 0x58, 0x08, 0x0F, 0x00, 0x03]);
        assert_eq!(response[5], 6);
    }

    #[test]
    fn test_answers_preset_with_echo() {
        let sensor = sensor();
        let request =
            FrameCodec::build_preset_frame("EyesOnPT-42", 4004, &[PresetValue::Register(3600)])
                .unwrap();
        let response = sensor.answer(request.as_slice()).unwrap();

        let layout = ResponseLayout::PresetEcho { registers: 1 };
        let echo = FrameCodec::extract_response(&request, &response, layout).unwrap();
        assert_eq!(echo, &[0x0E, 0x10]);
        assert_eq!(sensor.register(4004), 3600);
    }

    #[test]
    fn test_ignores_foreign_and_corrupt_frames() {
        let sensor = sensor();
        let other = FrameCodec::build_read_holding_frame("EyesOnPT-7", 4004, 3).unwrap();
        assert!(sensor.answer(other.as_slice()).is_none());

        let mut corrupt = FrameCodec::build_read_holding_frame("EyesOnPT-42", 4004, 3)
            .unwrap()
            .to_vec();
        corrupt[6] ^= 0x01;
        assert!(sensor.answer(&corrupt).is_none());
    }

    #[test]
    fn test_corrupt_crc_behavior() {
        let sensor = sensor();
        sensor.set_behavior(SimBehavior::CorruptCrc);
        let request = FrameCodec::build_read_holding_frame("EyesOnPT-42", 4004, 1).unwrap();
        let response = sensor.answer(request.as_slice()).unwrap();

        let body = &response[..response.len() - 2];
        assert_ne!(&response[response.len() - 2..], &compute_crc16(body));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifies_subscriber_after_write() {
        let sensor = sensor();
        let config = BridgeConfig::default();
        let received = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&received);
        sensor
            .subscribe(
                "sim-1",
                config.service,
                config.notify_characteristic,
                Box::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await
            .unwrap();

        sensor.set_behavior(SimBehavior::RespondTwice);
        let request = FrameCodec::build_read_holding_frame("EyesOnPT-42", 4004, 3).unwrap();
        sensor
            .write("sim-1", config.service, config.write_characteristic, request.as_slice())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(received.load(Ordering::SeqCst), 2);
        assert_eq!(sensor.writes().len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_fires_callbacks() {
        let sensor = sensor();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        sensor.on_disconnect(
            "sim-1",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        sensor.disconnect();
        sensor.disconnect();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!sensor.is_connected("sim-1").await);

        let config = BridgeConfig::default();
        let err = sensor
            .write("sim-1", config.service, config.write_characteristic, &[0x00])
            .await
            .unwrap_err();
        assert_eq!(err.operation, "write");

        sensor.reconnect();
        assert!(sensor.is_connected("sim-1").await);
        assert!(!sensor.is_connected("sim-2").await);
    }
}
