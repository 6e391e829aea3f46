//! BLE Modbus Demo
//!
//! Walks through the frame codec and the transaction bridge against a
//! simulated sensor:
//! - Building read-holding and preset frames from a device name
//! - Reading and writing the sensor settings
//! - Timeout, corrupt reply and disconnect handling
//!
//! Usage: cargo run --bin demo [device_name]
//! Example: RUST_LOG=ble_modbus=debug cargo run --bin demo EyesOnPT-42

use std::time::Duration;

use ble_modbus::{
    BridgeConfig, DataRate, FrameCodec, PresetValue, SensorClient, SensorRegister, SimBehavior,
    SimulatedSensor, TransactionBridge,
};
use tracing_subscriber::EnvFilter;

const DEVICE_ID: &str = "AA:BB:CC:DD:EE:01";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("🚀 {}", ble_modbus::info());
    println!("=============================");

    let device_name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "EyesOnPT-42".to_string());

    // =========================================================================
    // Part 1: Frame codec (no device required)
    // =========================================================================
    println!("\n📦 Part 1: Frame Codec");
    println!("----------------------");

    let read = FrameCodec::build_read_holding_frame(&device_name, 4004, 3)?;
    println!("  Read 4004 x3:     {:?}", read);

    let preset =
        FrameCodec::build_preset_frame(&device_name, 4005, &[PresetValue::byte_pair(8, 12)])?;
    println!("  Preset 4005=08 0C: {:?}", preset);

    match FrameCodec::build_read_holding_frame("NoSuffix", 4004, 3) {
        Ok(_) => println!("  Unexpected: name without suffix accepted"),
        Err(e) => println!("  Rejected name:    {}", e),
    }

    // =========================================================================
    // Part 2: Settings round trip against the simulator
    // =========================================================================
    println!("\n🔌 Part 2: Sensor Settings");
    println!("--------------------------");

    let sensor = SimulatedSensor::new(DEVICE_ID, &device_name)?;
    let config = BridgeConfig::new()
        .with_timeout(Duration::from_secs(2))
        .with_packet_logging(true);
    let bridge = TransactionBridge::with_config(sensor.clone(), config);
    bridge.mark_connecting(DEVICE_ID);
    bridge.mark_connected(DEVICE_ID);

    let mut client = SensorClient::new(bridge.clone(), DEVICE_ID, &device_name)?;

    let settings = client.read_settings().await?;
    println!("  Report interval: {}s", settings.report_interval);
    println!(
        "  Channel:         {} / {}",
        settings.channel_high, settings.channel_low
    );
    println!("  Data rate:       {}", settings.data_rate);
    println!("  DEV_EUI:         {}", client.read_device_eui().await?);

    println!("\n  ✏️  Writes:");
    let settings = client.write_report_interval(3600).await?;
    println!("    REPORT_INTERVAL -> {}s", settings.report_interval);
    let settings = client.write_channel_low(12).await?;
    println!(
        "    LORAWAN_CHANNEL_LOW -> {} (high kept at {})",
        settings.channel_low, settings.channel_high
    );
    let settings = client.write_data_rate(DataRate::Automatic).await?;
    println!("    LORAWAN_DATA_RATE -> {}", settings.data_rate);

    match client.write_input(SensorRegister::ChannelHigh, "64").await {
        Ok(_) => println!("    Unexpected: channel 64 accepted"),
        Err(e) => println!("    Rejected before sending: {}", e),
    }

    // =========================================================================
    // Part 3: Failure modes
    // =========================================================================
    println!("\n⚠️  Part 3: Failure Modes");
    println!("------------------------");

    sensor.set_behavior(SimBehavior::Silent);
    match client.read_settings().await {
        Ok(_) => println!("  Silent sensor: unexpected reply"),
        Err(e) => println!("  Silent sensor:  {}", e),
    }

    sensor.set_behavior(SimBehavior::CorruptCrc);
    match client.read_settings().await {
        Ok(_) => println!("  Corrupt reply: unexpectedly accepted"),
        Err(e) => println!("  Corrupt reply:  {}", e),
    }

    sensor.set_behavior(SimBehavior::DisconnectOnWrite);
    match client.read_settings().await {
        Ok(_) => println!("  Link drop: unexpected reply"),
        Err(e) => println!("  Link drop:      {}", e),
    }
    println!(
        "  Reachable: {}, state: {:?}",
        client.is_reachable().await,
        bridge.connection_state(DEVICE_ID)
    );

    // Statistics
    let stats = bridge.stats();
    println!("\n  📊 Statistics:");
    println!(
        "    Requests: {}, Responses: {}",
        stats.requests_sent, stats.responses_received
    );
    println!(
        "    Timeouts: {}, Disconnects: {}, Dropped notifications: {}",
        stats.timeouts, stats.disconnects, stats.dropped_notifications
    );
    println!(
        "    Bytes sent: {}, received: {}",
        stats.bytes_sent, stats.bytes_received
    );

    println!("\n🎉 Demo completed!");
    Ok(())
}
