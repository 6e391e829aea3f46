//! # Sensor Client
//!
//! Register-level operations on one sensor, built on the frame codec and
//! the transaction bridge.
//!
//! | Operation | Request | Response payload |
//! |-----------|---------|------------------|
//! | `read_settings()` | FC 0x03, 4004, 3 registers | 6 bytes at offset 6 |
//! | `read_device_eui()` | FC 0x03, 3010, 8 registers | 16 bytes at offset 6 |
//! | `write_register()` | FC 0x06, register, 1 value | 2-byte echo at offset 7 |
//!
//! The channel high/low bytes share register 4005, so writing one re-sends
//! the cached other half. The client reads the settings block first if it
//! has no cached copy.
//!
//! ```rust,no_run
//! use ble_modbus::{SensorClient, SensorRegister, SimulatedSensor, TransactionBridge};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let sensor = SimulatedSensor::new("AA:BB:CC:DD:EE:01", "EyesOnPT-42")?;
//! let bridge = TransactionBridge::new(sensor);
//! let mut client = SensorClient::new(bridge, "AA:BB:CC:DD:EE:01", "EyesOnPT-42")?;
//!
//! let settings = client.read_settings().await?;
//! println!("Reporting every {}s", settings.report_interval);
//!
//! client.write_register(SensorRegister::ChannelLow, 12).await?;
//! # Ok(())
//! # }
//! ```

use tracing::{debug, info};

use crate::address::DeviceAddress;
use crate::bridge::TransactionBridge;
use crate::codec::{FrameCodec, ResponseLayout};
use crate::constants::{
    DEV_EUI_ADDRESS, DEV_EUI_REGISTER_COUNT, REPORT_INTERVAL_ADDRESS, SETTINGS_REGISTER_COUNT,
};
use crate::error::{BridgeResult, CodecResult};
use crate::frame::{Frame, PresetValue};
use crate::register::{decode_device_eui, DataRate, SensorRegister, SensorSettings};
use crate::transport::BleTransport;

/// Client for one sensor.
pub struct SensorClient<T: BleTransport> {
    bridge: TransactionBridge<T>,
    device_id: String,
    device_name: String,
    address: DeviceAddress,
    settings: Option<SensorSettings>,
}

impl<T: BleTransport + 'static> SensorClient<T> {
    /// Create a client for the device known to the transport as `device_id`
    /// and advertising as `device_name`.
    pub fn new(
        bridge: TransactionBridge<T>,
        device_id: impl Into<String>,
        device_name: impl Into<String>,
    ) -> CodecResult<Self> {
        let device_name = device_name.into();
        let address = DeviceAddress::from_name(&device_name)?;
        Ok(Self {
            bridge,
            device_id: device_id.into(),
            device_name,
            address,
            settings: None,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn bridge(&self) -> &TransactionBridge<T> {
        &self.bridge
    }

    /// Settings from the last read or write, if any
    pub fn cached_settings(&self) -> Option<&SensorSettings> {
        self.settings.as_ref()
    }

    pub async fn is_reachable(&self) -> bool {
        self.bridge.is_reachable(&self.device_id).await
    }

    /// Send `request` and slice the payload described by `layout` out of the reply.
    async fn exchange(&self, request: &Frame, layout: ResponseLayout) -> BridgeResult<Vec<u8>> {
        let response = self
            .bridge
            .send_and_await(&self.device_id, request.as_slice())
            .await?;
        let payload = FrameCodec::extract_response(request, &response, layout)?;
        Ok(payload.to_vec())
    }

    /// Read `count` holding registers from `start`.
    pub async fn read_registers(&self, start: u16, count: u16) -> BridgeResult<Vec<u16>> {
        let request = FrameCodec::build_read_holding_frame(&self.device_name, start, count)?;
        let payload = self
            .exchange(&request, ResponseLayout::ReadHolding { registers: count })
            .await?;
        Ok(FrameCodec::parse_registers(&payload)?)
    }

    /// Preset registers from `start`, returning the echoed value bytes.
    pub async fn preset_registers(
        &self,
        start: u16,
        values: &[PresetValue],
    ) -> BridgeResult<Vec<u8>> {
        let request = FrameCodec::build_preset_frame(&self.device_name, start, values)?;
        let registers = values.iter().map(|v| v.encoded_len() / 2).sum::<usize>() as u16;
        self.exchange(&request, ResponseLayout::PresetEcho { registers })
            .await
    }

    /// Read the report interval, channel pair and data rate.
    pub async fn read_settings(&mut self) -> BridgeResult<SensorSettings> {
        let request = FrameCodec::build_read_holding_frame(
            &self.device_name,
            REPORT_INTERVAL_ADDRESS,
            SETTINGS_REGISTER_COUNT,
        )?;
        let payload = self
            .exchange(
                &request,
                ResponseLayout::ReadHolding {
                    registers: SETTINGS_REGISTER_COUNT,
                },
            )
            .await?;
        let settings = SensorSettings::from_payload(&payload)?;
        debug!("Settings of {}: {:?}", self.device_name, settings);
        self.settings = Some(settings);
        Ok(settings)
    }

    /// Read the LoRaWAN device EUI.
    pub async fn read_device_eui(&self) -> BridgeResult<String> {
        let request = FrameCodec::build_read_holding_frame(
            &self.device_name,
            DEV_EUI_ADDRESS,
            DEV_EUI_REGISTER_COUNT,
        )?;
        let payload = self
            .exchange(
                &request,
                ResponseLayout::ReadHolding {
                    registers: DEV_EUI_REGISTER_COUNT,
                },
            )
            .await?;
        Ok(decode_device_eui(&payload)?)
    }

    /// Write one register and return the settings updated from the echo.
    ///
    /// Out-of-range values are rejected before anything is sent.
    pub async fn write_register(
        &mut self,
        register: SensorRegister,
        value: u16,
    ) -> BridgeResult<SensorSettings> {
        register.validate(value as i64)?;
        let current = match self.settings {
            Some(settings) => settings,
            None => self.read_settings().await?,
        };

        let preset = register.encode(value, &current)?;
        let echo = self
            .preset_registers(register.address(), std::slice::from_ref(&preset))
            .await?;

        let mut updated = current;
        updated.apply_echo(register, &echo)?;
        info!(
            "{} on {} set to {} (echo {:02X?})",
            register, self.device_name, value, echo
        );
        self.settings = Some(updated);
        Ok(updated)
    }

    /// Parse user input for `register` and write it.
    pub async fn write_input(
        &mut self,
        register: SensorRegister,
        input: &str,
    ) -> BridgeResult<SensorSettings> {
        let value = register.parse_input(input)?;
        self.write_register(register, value).await
    }

    pub async fn write_report_interval(&mut self, seconds: u16) -> BridgeResult<SensorSettings> {
        self.write_register(SensorRegister::ReportInterval, seconds)
            .await
    }

    pub async fn write_channel_high(&mut self, channel: u8) -> BridgeResult<SensorSettings> {
        self.write_register(SensorRegister::ChannelHigh, channel as u16)
            .await
    }

    pub async fn write_channel_low(&mut self, channel: u8) -> BridgeResult<SensorSettings> {
        self.write_register(SensorRegister::ChannelLow, channel as u16)
            .await
    }

    pub async fn write_data_rate(&mut self, rate: DataRate) -> BridgeResult<SensorSettings> {
        self.write_register(SensorRegister::DataRate, rate.to_register())
            .await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, CodecError};
    use crate::sim::{SimBehavior, SimulatedSensor};
    use tokio_test::{assert_err, assert_ok};

    const DEVICE_ID: &str = "AA:BB:CC:DD:EE:01";
    const DEVICE_NAME: &str = "EyesOnPT-42";

    fn client() -> (SimulatedSensor, SensorClient<SimulatedSensor>) {
        let sensor = SimulatedSensor::new(DEVICE_ID, DEVICE_NAME).unwrap();
        let bridge = TransactionBridge::new(sensor.clone());
        bridge.mark_connected(DEVICE_ID);
        let client = SensorClient::new(bridge, DEVICE_ID, DEVICE_NAME).unwrap();
        (sensor, client)
    }

    #[test]
    fn test_new_rejects_bad_name() {
        let sensor = SimulatedSensor::new(DEVICE_ID, DEVICE_NAME).unwrap();
        let result = SensorClient::new(TransactionBridge::new(sensor), DEVICE_ID, "EyesOnPT");
        assert!(matches!(result, Err(CodecError::InvalidDeviceName { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_settings() {
        let (_sensor, mut client) = client();
        let settings = client.read_settings().await.unwrap();

        assert_eq!(settings.report_interval, 600);
        assert_eq!((settings.channel_high, settings.channel_low), (8, 15));
        assert_eq!(settings.data_rate, DataRate::Fixed(3));
        assert_eq!(client.cached_settings(), Some(&settings));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_device_eui() {
        let (_sensor, client) = client();
        assert_eq!(client.read_device_eui().await.unwrap(), "70B3D57ED0051234");
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_channel_keeps_other_half() {
        let (sensor, mut client) = client();

        let settings = client.write_channel_low(12).await.unwrap();
        assert_eq!((settings.channel_high, settings.channel_low), (8, 12));
        assert_eq!(sensor.register(4005), 0x080C);

        let settings = client.write_channel_high(1).await.unwrap();
        assert_eq!((settings.channel_high, settings.channel_low), (1, 12));
        assert_eq!(sensor.register(4005), 0x010C);

        // One settings read, then two presets.
        assert_eq!(sensor.writes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_data_rate_does_not_block_writes() {
        let (sensor, mut client) = client();
        sensor.set_register(4006, 7);

        let settings = assert_ok!(client.read_settings().await);
        assert_eq!(settings.data_rate, DataRate::Other(7));

        let settings = assert_ok!(client.write_channel_low(12).await);
        assert_eq!((settings.channel_high, settings.channel_low), (8, 12));
        assert_eq!(settings.data_rate, DataRate::Other(7));

        assert_err!(client.write_data_rate(DataRate::Other(7)).await);
        assert_eq!(sensor.register(4006), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_data_rate_and_interval() {
        let (sensor, mut client) = client();

        let settings = client.write_data_rate(DataRate::Automatic).await.unwrap();
        assert_eq!(settings.data_rate, DataRate::Automatic);
        assert_eq!(sensor.register(4006), 255);

        let settings = client.write_input(SensorRegister::ReportInterval, "3600").await.unwrap();
        assert_eq!(settings.report_interval, 3600);
        assert_eq!(sensor.register(4004), 3600);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_not_sent() {
        let (sensor, mut client) = client();

        let err = client.write_register(SensorRegister::ChannelHigh, 64).await.unwrap_err();
        assert_eq!(err, BridgeError::Codec(CodecError::out_of_range(64, 0, 63)));
        assert!(client.write_input(SensorRegister::DataRate, "6").await.is_err());
        assert!(sensor.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_corrupt_response_rejected() {
        let (sensor, mut client) = client();
        sensor.set_behavior(SimBehavior::CorruptCrc);

        let err = client.read_settings().await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Codec(CodecError::ChecksumMismatch { .. })
        ));
        assert!(client.cached_settings().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_sensor_times_out() {
        let (sensor, client) = client();
        sensor.set_behavior(SimBehavior::Silent);

        let err = client.read_registers(4004, 1).await.unwrap_err();
        assert_eq!(err, BridgeError::timeout(5000));
        assert_eq!(sensor.active_subscriptions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_during_read() {
        let (sensor, mut client) = client();
        sensor.set_behavior(SimBehavior::DisconnectOnWrite);

        let err = client.read_settings().await.unwrap_err();
        assert_eq!(err, BridgeError::disconnected(DEVICE_ID));
        assert!(!client.is_reachable().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_registers_raw() {
        let (_sensor, client) = client();
        let registers = client.read_registers(4004, 3).await.unwrap();
        assert_eq!(registers, vec![600, 0x080F, 3]);
    }
}
