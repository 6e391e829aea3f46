//! # BLE Modbus - Register Frames over BLE Characteristics
//!
//! Modbus-style register frames for LoRaWAN sensors configured over
//! Bluetooth Low Energy: requests are written to one GATT characteristic and
//! the response arrives as a notification on another.
//!
//! ## Layers
//!
//! - **Frame codec**: device address from the advertised name, CRC-16/MODBUS,
//!   read-holding (0x03) and preset (0x06) frames, response verification
//! - **Transaction bridge**: subscribe-before-write, one outstanding request
//!   per device, deadline and disconnect handling, exactly-once resolution
//! - **Sensor client**: register map (report interval, channel pair, data
//!   rate, device EUI) on top of both
//!
//! ## Frame Layout
//!
//! ```text
//! FF 18 | idH idL | FC | addrH addrL | payload ... | crcL crcH
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ble_modbus::{SensorClient, SimulatedSensor, TransactionBridge};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Any BleTransport works; the simulator stands in for a real stack.
//!     let sensor = SimulatedSensor::new("AA:BB:CC:DD:EE:01", "EyesOnPT-42")?;
//!     let bridge = TransactionBridge::new(sensor);
//!     bridge.mark_connected("AA:BB:CC:DD:EE:01");
//!
//!     let mut client = SensorClient::new(bridge, "AA:BB:CC:DD:EE:01", "EyesOnPT-42")?;
//!     let settings = client.read_settings().await?;
//!     println!("Settings: {:?}", settings);
//!
//!     client.write_report_interval(3600).await?;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Frame codec
// ============================================================================

/// Error types for codec, transport and bridge
pub mod error;

/// Frame layout, register addresses and BLE identifiers
pub mod constants;

/// Big-endian byte/register helpers
pub mod bytes;

/// Device address derived from the advertised name
pub mod address;

/// Fixed-buffer frames and the frame builder
pub mod frame;

/// CRC, request building and response extraction
pub mod codec;

/// Sensor register map and settings snapshot
pub mod register;

// ============================================================================
// Transaction bridge
// ============================================================================

/// BLE transport seam
pub mod transport;

/// Bridge configuration
pub mod config;

/// Hex packet logging
pub mod logging;

/// Request/response correlation over notifications
pub mod bridge;

/// Register-level client for one sensor
pub mod client;

/// In-memory sensor implementing the transport
pub mod sim;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime ===
pub use tokio;
pub use tokio_util::sync::CancellationToken;

// === Error handling ===
pub use error::{BridgeError, BridgeResult, CodecError, CodecResult, TransportError};

// === Codec ===
pub use address::DeviceAddress;
pub use codec::{compute_crc16, FrameCodec, ResponseLayout};
pub use frame::{Frame, FrameBuilder, FunctionCode, PresetValue};
pub use register::{DataRate, SensorRegister, SensorSettings};

// === Bridge ===
pub use bridge::{
    BridgeStats, CharacteristicRoute, ConnectionState, TransactionBridge, TransactionState,
};
pub use config::BridgeConfig;
pub use transport::{BleTransport, DisconnectCallback, NotifyCallback};

// === Client ===
pub use client::SensorClient;
pub use sim::{SimBehavior, SimulatedSensor};

// === Provisioning defaults ===
pub use constants::{DEFAULT_APP_EUI, DEFAULT_APP_KEY};

/// Default response deadline (5 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "BLE Modbus v{} - register frames over BLE write/notify characteristics",
        VERSION
    )
}
