//! End-to-end exchanges between the bridge, the client and the simulated sensor.

use std::time::Duration;

use ble_modbus::{
    BridgeConfig, BridgeError, CancellationToken, ConnectionState, DataRate, FrameCodec,
    ResponseLayout, SensorClient, SimBehavior, SimulatedSensor, TransactionBridge,
    TransactionState,
};
use tokio_test::{assert_err, assert_ok};

const DEVICE_ID: &str = "C4:7F:51:00:12:34";
const DEVICE_NAME: &str = "EyesOnPT-4660";

fn setup(config: BridgeConfig) -> (SimulatedSensor, TransactionBridge<SimulatedSensor>) {
    let sensor = SimulatedSensor::new(DEVICE_ID, DEVICE_NAME).unwrap();
    let bridge = TransactionBridge::with_config(sensor.clone(), config);
    bridge.mark_connected(DEVICE_ID);
    (sensor, bridge)
}

#[tokio::test(start_paused = true)]
async fn test_configure_sensor_end_to_end() {
    let (sensor, bridge) = setup(BridgeConfig::default().with_packet_logging(true));
    let mut client = SensorClient::new(bridge.clone(), DEVICE_ID, DEVICE_NAME).unwrap();
    assert_eq!(client.address().id(), 0x1234);

    let before = assert_ok!(client.read_settings().await);
    assert_eq!(before.report_interval, 600);

    assert_ok!(client.write_report_interval(900).await);
    assert_ok!(client.write_channel_high(2).await);
    assert_ok!(client.write_data_rate(DataRate::Fixed(5)).await);

    // A fresh read agrees with the cached echoes.
    let cached = *client.cached_settings().unwrap();
    let after = client.read_settings().await.unwrap();
    assert_eq!(after, cached);
    assert_eq!(after.report_interval, 900);
    assert_eq!((after.channel_high, after.channel_low), (2, 15));
    assert_eq!(after.data_rate, DataRate::Fixed(5));

    // Every request is addressed to the device and carries a valid CRC.
    for frame in sensor.writes() {
        assert_eq!(&frame[..4], &[0xFF, 0x18, 0x12, 0x34]);
        assert!(FrameCodec::verify_frame(&frame).is_ok());
    }

    let stats = bridge.stats();
    assert_eq!(stats.requests_sent, 5);
    assert_eq!(stats.responses_received, 5);
    assert_eq!(sensor.active_subscriptions(), 0);
    assert_eq!(sensor.unsubscribe_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_reply_resolves_once() {
    let (sensor, bridge) = setup(BridgeConfig::default());
    sensor.set_behavior(SimBehavior::RespondTwice);

    let request = FrameCodec::build_read_holding_frame(DEVICE_NAME, 4004, 1).unwrap();
    let response = bridge
        .send_and_await(DEVICE_ID, request.as_slice())
        .await
        .unwrap();
    let layout = ResponseLayout::ReadHolding { registers: 1 };
    let payload = FrameCodec::extract_response(&request, &response, layout).unwrap();
    assert_eq!(payload, &[0x02, 0x58]);

    let stats = bridge.stats();
    assert_eq!(stats.responses_received, 1);
    assert_eq!(stats.dropped_notifications, 1);
    assert_eq!(bridge.transaction_state(DEVICE_ID), TransactionState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_unsolicited_notification_ignored() {
    let (sensor, bridge) = setup(BridgeConfig::default());

    sensor.push_notification(&[0xFF, 0x18, 0x12, 0x34, 0x03, 0x02, 0x00, 0x00]);
    assert!(!bridge.deliver_notification(DEVICE_ID, vec![0x01]));
    assert_eq!(bridge.connection_state(DEVICE_ID), ConnectionState::Connected);

    let mut client = SensorClient::new(bridge, DEVICE_ID, DEVICE_NAME).unwrap();
    assert_ok!(client.read_settings().await);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_respects_config() {
    let (sensor, bridge) = setup(BridgeConfig::default().with_timeout_ms(1500));
    sensor.set_behavior(SimBehavior::Silent);

    let started = tokio::time::Instant::now();
    let request = FrameCodec::build_read_holding_frame(DEVICE_NAME, 4004, 3).unwrap();
    let err = bridge
        .send_and_await(DEVICE_ID, request.as_slice())
        .await
        .unwrap_err();

    assert_eq!(err, BridgeError::timeout(1500));
    assert!(err.is_retryable());
    assert!(started.elapsed() >= Duration::from_millis(1500));
    assert_eq!(sensor.active_subscriptions(), 0);

    // The sensor recovers; the next request succeeds.
    sensor.set_behavior(SimBehavior::Respond);
    assert!(bridge.send_and_await(DEVICE_ID, request.as_slice()).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_then_reconnect() {
    let (sensor, bridge) = setup(BridgeConfig::default());
    let mut client = SensorClient::new(bridge.clone(), DEVICE_ID, DEVICE_NAME).unwrap();

    sensor.set_behavior(SimBehavior::DisconnectOnWrite);
    let started = tokio::time::Instant::now();
    let err = assert_err!(client.read_settings().await);
    assert!(err.is_connection_lost());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(bridge.connection_state(DEVICE_ID), ConnectionState::Disconnected);

    // While the link is down the bridge fails fast without writing.
    let writes = sensor.writes().len();
    assert_eq!(
        client.read_settings().await.unwrap_err(),
        BridgeError::disconnected(DEVICE_ID)
    );
    assert_eq!(sensor.writes().len(), writes);

    sensor.set_behavior(SimBehavior::Respond);
    sensor.reconnect();
    bridge.mark_connected(DEVICE_ID);
    assert!(client.is_reachable().await);
    assert_eq!(client.read_settings().await.unwrap().report_interval, 600);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_slow_sensor() {
    let sensor = SimulatedSensor::new(DEVICE_ID, DEVICE_NAME)
        .unwrap()
        .with_latency(Duration::from_secs(3));
    let bridge = TransactionBridge::new(sensor.clone());
    bridge.mark_connected(DEVICE_ID);

    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(500)).await;
        canceller.cancel();
    });

    let request = FrameCodec::build_read_holding_frame(DEVICE_NAME, 4004, 3).unwrap();
    let err = bridge
        .send_and_await_with_cancel(DEVICE_ID, request.as_slice(), &token)
        .await
        .unwrap_err();
    assert_eq!(err, BridgeError::Cancelled);

    // The late reply lands after the subscription is gone.
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(bridge.stats().cancellations, 1);
    assert_eq!(bridge.stats().responses_received, 0);
}
