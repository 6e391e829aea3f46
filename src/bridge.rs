//! # Transaction Bridge
//!
//! Turns "write bytes, later receive a notification" into one request/response
//! call with a deadline.
//!
//! ## Per-device state
//!
//! ```text
//!            send_and_await
//!   Idle ───────────────────────► AwaitingResponse
//!    ▲                                 │
//!    │  notification / timeout /       │ disconnect
//!    │  cancel (slot resolved)         ▼
//!    └──────────────────────────── Disconnected
//! ```
//!
//! Each device has at most one pending transaction. Its completion slot is
//! a oneshot sender stored in the device's entry; whichever of notification,
//! deadline, disconnect or cancellation takes the sender first decides the
//! result, and every later event finds the slot empty.
//!
//! The response subscription is armed before the frame is written and is
//! released on every exit path.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::logging::{log_packet, Direction};
use crate::transport::{BleTransport, NotifyCallback};

/// Link state of a device as last reported by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Transaction state of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    AwaitingResponse,
    Disconnected,
}

/// Service plus the write/notify characteristic pair used for one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CharacteristicRoute {
    pub service: Uuid,
    pub write: Uuid,
    pub notify: Uuid,
}

impl From<&BridgeConfig> for CharacteristicRoute {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            service: config.service,
            write: config.write_characteristic,
            notify: config.notify_characteristic,
        }
    }
}

/// Bridge counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Transactions that got past the busy/connection checks
    pub requests_sent: u64,
    /// Transactions resolved by a notification
    pub responses_received: u64,
    pub timeouts: u64,
    /// Transactions failed by a disconnect
    pub disconnects: u64,
    pub cancellations: u64,
    /// Write or subscribe failures
    pub transport_errors: u64,
    /// Requests refused because another was in flight
    pub rejected_busy: u64,
    /// Notifications with no matching transaction
    pub dropped_notifications: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

type Completion = oneshot::Sender<BridgeResult<Vec<u8>>>;

struct PendingTransaction {
    id: u64,
    notify: Uuid,
    started: Instant,
    completion: Completion,
}

#[derive(Default)]
struct DeviceSlot {
    connection: ConnectionState,
    pending: Option<PendingTransaction>,
    watched: bool,
}

#[derive(Default)]
struct BridgeState {
    devices: HashMap<String, DeviceSlot>,
    stats: BridgeStats,
}

struct Shared {
    state: Mutex<BridgeState>,
    next_id: AtomicU64,
    packet_logging: bool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the pending transaction `id` on `device_id` if it is still live.
    ///
    /// Returns `false` when something else resolved it first.
    fn resolve(&self, device_id: &str, id: u64, result: BridgeResult<Vec<u8>>) -> bool {
        let pending = {
            let mut state = self.lock();
            match state.devices.get_mut(device_id) {
                Some(slot) if slot.pending.as_ref().is_some_and(|p| p.id == id) => {
                    slot.pending.take()
                }
                _ => None,
            }
        };
        match pending {
            Some(p) => {
                // The receiver is only gone if the caller's future was dropped.
                let _ = p.completion.send(result);
                true
            }
            None => false,
        }
    }

    /// Route notification bytes to the live transaction on `device_id`.
    ///
    /// With `id` set, only that transaction may be resolved; a stale
    /// subscription from an earlier transaction cannot complete a newer one.
    fn resolve_notification(&self, device_id: &str, id: Option<u64>, bytes: Vec<u8>) -> bool {
        if self.packet_logging {
            log_packet(Direction::Recv, device_id, &bytes);
        }

        let pending = {
            let mut state = self.lock();
            state.stats.bytes_received += bytes.len() as u64;
            let taken = state.devices.get_mut(device_id).and_then(|slot| {
                let live = match (&slot.pending, id) {
                    (Some(p), Some(id)) => p.id == id,
                    (Some(_), None) => true,
                    (None, _) => false,
                };
                if live {
                    slot.pending.take()
                } else {
                    None
                }
            });
            if taken.is_none() {
                state.stats.dropped_notifications += 1;
            }
            taken
        };

        match pending {
            Some(p) => {
                debug!(
                    "Notification resolved transaction {} on {} after {:?} ({} bytes)",
                    p.id,
                    device_id,
                    p.started.elapsed(),
                    bytes.len()
                );
                let _ = p.completion.send(Ok(bytes));
                true
            }
            None => {
                debug!(
                    "Dropping {} byte notification from {}: no transaction in flight",
                    bytes.len(),
                    device_id
                );
                false
            }
        }
    }

    fn handle_disconnect(&self, device_id: &str) {
        let pending = {
            let mut state = self.lock();
            let slot = state.devices.entry(device_id.to_string()).or_default();
            slot.connection = ConnectionState::Disconnected;
            slot.pending.take()
        };

        match pending {
            Some(p) => {
                warn!(
                    "Device {} disconnected with transaction {} in flight (notify {})",
                    device_id, p.id, p.notify
                );
                let _ = p.completion.send(Err(BridgeError::disconnected(device_id)));
            }
            None => info!("Device {} disconnected", device_id),
        }
    }

    fn set_connection(&self, device_id: &str, connection: ConnectionState) {
        let mut state = self.lock();
        state
            .devices
            .entry(device_id.to_string())
            .or_default()
            .connection = connection;
    }
}

/// Request/response correlation over a [`BleTransport`].
///
/// Cloning is cheap; clones share device state and statistics.
pub struct TransactionBridge<T: BleTransport> {
    transport: Arc<T>,
    config: BridgeConfig,
    shared: Arc<Shared>,
}

impl<T: BleTransport> Clone for TransactionBridge<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: BleTransport + 'static> fmt::Debug for TransactionBridge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionBridge")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<T: BleTransport + 'static> TransactionBridge<T> {
    /// Create a bridge with the default configuration
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, BridgeConfig::default())
    }

    /// Create a bridge with a custom configuration
    pub fn with_config(transport: T, config: BridgeConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(BridgeState::default()),
                next_id: AtomicU64::new(1),
                packet_logging: config.packet_logging,
            }),
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> BridgeStats {
        self.shared.lock().stats.clone()
    }

    // ===== Connection tracking =====

    /// Whether the transport lists the device as connected.
    ///
    /// Only a hint: the link can drop between this check and a write, and
    /// [`TransactionBridge::send_and_await`] handles that on its own.
    pub async fn is_reachable(&self, device_id: &str) -> bool {
        self.transport.is_connected(device_id).await
    }

    /// Last known link state
    pub fn connection_state(&self, device_id: &str) -> ConnectionState {
        self.shared
            .lock()
            .devices
            .get(device_id)
            .map(|slot| slot.connection)
            .unwrap_or_default()
    }

    /// Current transaction state
    pub fn transaction_state(&self, device_id: &str) -> TransactionState {
        let state = self.shared.lock();
        match state.devices.get(device_id) {
            Some(slot) if slot.pending.is_some() => TransactionState::AwaitingResponse,
            Some(slot) if slot.connection != ConnectionState::Disconnected => {
                TransactionState::Idle
            }
            _ => TransactionState::Disconnected,
        }
    }

    /// A connection attempt has started.
    pub fn mark_connecting(&self, device_id: &str) {
        debug!("Connecting to {}", device_id);
        self.shared
            .set_connection(device_id, ConnectionState::Connecting);
    }

    /// The transport reported a successful connection.
    pub fn mark_connected(&self, device_id: &str) {
        info!("Connected to {}", device_id);
        self.shared.set_connection(device_id, ConnectionState::Connected);
        self.watch_device(device_id);
    }

    /// The connection attempt failed.
    pub fn mark_connect_failed(&self, device_id: &str) {
        warn!("Connection to {} failed", device_id);
        self.shared
            .set_connection(device_id, ConnectionState::Disconnected);
    }

    /// Register the disconnect handler with the transport (once per device).
    pub fn watch_device(&self, device_id: &str) {
        {
            let mut state = self.shared.lock();
            let slot = state.devices.entry(device_id.to_string()).or_default();
            if slot.watched {
                return;
            }
            slot.watched = true;
        }

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let device = device_id.to_string();
        self.transport.on_disconnect(
            device_id,
            Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.handle_disconnect(&device);
                }
            }),
        );
    }

    /// Mark the device disconnected and fail its pending transaction immediately.
    pub fn handle_disconnect(&self, device_id: &str) {
        self.shared.handle_disconnect(device_id);
    }

    /// Hand notification bytes to the device's pending transaction.
    ///
    /// For transports that route notifications themselves. Returns `false`
    /// (and changes nothing) when no transaction is in flight.
    pub fn deliver_notification(&self, device_id: &str, bytes: Vec<u8>) -> bool {
        self.shared.resolve_notification(device_id, None, bytes)
    }

    // ===== Transactions =====

    /// Write `frame` and wait for the response notification, using the
    /// configured characteristics and deadline.
    pub async fn send_and_await(&self, device_id: &str, frame: &[u8]) -> BridgeResult<Vec<u8>> {
        let route = CharacteristicRoute::from(&self.config);
        self.transact(device_id, &route, frame, self.config.timeout, None)
            .await
    }

    /// Like [`TransactionBridge::send_and_await`], abandoning the exchange
    /// with [`BridgeError::Cancelled`] when `cancel` fires.
    pub async fn send_and_await_with_cancel(
        &self,
        device_id: &str,
        frame: &[u8],
        cancel: &CancellationToken,
    ) -> BridgeResult<Vec<u8>> {
        let route = CharacteristicRoute::from(&self.config);
        self.transact(device_id, &route, frame, self.config.timeout, Some(cancel))
            .await
    }

    /// Full request/response exchange.
    ///
    /// Rejects with [`BridgeError::Busy`] while another transaction is in
    /// flight for the same device. Transactions on different devices are
    /// independent.
    pub async fn transact(
        &self,
        device_id: &str,
        route: &CharacteristicRoute,
        frame: &[u8],
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<Vec<u8>> {
        if !self.transport.is_connected(device_id).await {
            return Err(BridgeError::disconnected(device_id));
        }

        let (id, rx) = self.begin(device_id, route)?;
        let mut slot = SlotGuard {
            bridge: self,
            device_id,
            route: *route,
            id,
            armed: true,
        };
        debug!(
            "Transaction {} on {}: {} byte frame, timeout {:?}",
            id,
            device_id,
            frame.len(),
            timeout
        );

        let result = self
            .drive(device_id, route, frame, id, rx, timeout, cancel)
            .await;

        // Release the subscription on every exit path.
        if let Err(e) = self
            .transport
            .unsubscribe(device_id, route.service, route.notify)
            .await
        {
            match result {
                Err(BridgeError::Disconnected { .. }) | Err(BridgeError::Transport(_)) => {
                    debug!("Unsubscribe after failed transaction {}: {}", id, e)
                }
                _ => warn!("Failed to unsubscribe {} after transaction {}: {}", device_id, id, e),
            }
        }
        slot.armed = false;

        self.finish(device_id, id, &result);
        result
    }

    /// Claim the device's slot, rejecting if it is taken.
    fn begin(
        &self,
        device_id: &str,
        route: &CharacteristicRoute,
    ) -> BridgeResult<(u64, oneshot::Receiver<BridgeResult<Vec<u8>>>)> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let slot = state.devices.entry(device_id.to_string()).or_default();
        if slot.pending.is_some() {
            state.stats.rejected_busy += 1;
            warn!("Rejecting request to {}: transaction in flight", device_id);
            return Err(BridgeError::busy(device_id));
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        slot.pending = Some(PendingTransaction {
            id,
            notify: route.notify,
            started: Instant::now(),
            completion: tx,
        });
        state.stats.requests_sent += 1;
        Ok((id, rx))
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        device_id: &str,
        route: &CharacteristicRoute,
        frame: &[u8],
        id: u64,
        mut rx: oneshot::Receiver<BridgeResult<Vec<u8>>>,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> BridgeResult<Vec<u8>> {
        let exchange = self.arm_and_write(device_id, route, frame, id);
        tokio::pin!(exchange);
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let cancelled = wait_cancelled(cancel);
        tokio::pin!(cancelled);
        let mut written = false;
        let mut timed_out = false;
        let mut cancel_fired = false;

        // Every other branch resolves through the slot, so the receiver
        // always holds the authoritative result afterwards.
        loop {
            tokio::select! {
                biased;
                received = &mut rx => {
                    return received.unwrap_or_else(|_| Err(BridgeError::disconnected(device_id)));
                }
                outcome = &mut exchange, if !written => {
                    written = true;
                    if let Err(e) = outcome {
                        self.shared.resolve(device_id, id, Err(e));
                    }
                }
                _ = &mut deadline, if !timed_out => {
                    timed_out = true;
                    if self.shared.resolve(device_id, id, Err(BridgeError::timeout(timeout.as_millis() as u64))) {
                        warn!("Transaction {} on {} timed out after {:?}", id, device_id, timeout);
                    }
                }
                _ = &mut cancelled, if !cancel_fired => {
                    cancel_fired = true;
                    if self.shared.resolve(device_id, id, Err(BridgeError::Cancelled)) {
                        info!("Transaction {} on {} cancelled by caller", id, device_id);
                    }
                }
            }
        }
    }

    async fn arm_and_write(
        &self,
        device_id: &str,
        route: &CharacteristicRoute,
        frame: &[u8],
        id: u64,
    ) -> BridgeResult<()> {
        let weak = Arc::downgrade(&self.shared);
        let device = device_id.to_string();
        let on_data: NotifyCallback = Box::new(move |bytes| {
            if let Some(shared) = weak.upgrade() {
                shared.resolve_notification(&device, Some(id), bytes);
            }
        });

        self.transport
            .subscribe(device_id, route.service, route.notify, on_data)
            .await?;

        if self.shared.packet_logging {
            log_packet(Direction::Send, device_id, frame);
        }
        self.transport
            .write(device_id, route.service, route.write, frame)
            .await?;

        self.shared.lock().stats.bytes_sent += frame.len() as u64;
        Ok(())
    }

    fn finish(&self, device_id: &str, id: u64, result: &BridgeResult<Vec<u8>>) {
        let mut state = self.shared.lock();
        match result {
            Ok(_) => state.stats.responses_received += 1,
            Err(BridgeError::Timeout { .. }) => state.stats.timeouts += 1,
            Err(BridgeError::Cancelled) => state.stats.cancellations += 1,
            Err(BridgeError::Disconnected { .. }) => state.stats.disconnects += 1,
            Err(BridgeError::Transport(e)) => {
                warn!("Transaction {} on {} failed: {}", id, device_id, e);
                state.stats.transport_errors += 1;
                if let Some(slot) = state.devices.get_mut(device_id) {
                    slot.connection = ConnectionState::Disconnected;
                }
            }
            Err(_) => {}
        }
    }
}

/// Frees the device slot and releases the subscription if the transaction
/// future is dropped before its own cleanup ran.
struct SlotGuard<'a, T: BleTransport + 'static> {
    bridge: &'a TransactionBridge<T>,
    device_id: &'a str,
    route: CharacteristicRoute,
    id: u64,
    armed: bool,
}

impl<T: BleTransport + 'static> Drop for SlotGuard<'_, T> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.bridge
            .shared
            .resolve(self.device_id, self.id, Err(BridgeError::Cancelled));
        debug!(
            "Transaction {} on {} dropped before completion",
            self.id, self.device_id
        );

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "No runtime to release subscription on {} after transaction {}",
                self.device_id, self.id
            );
            return;
        };
        let transport = Arc::clone(&self.bridge.transport);
        let device_id = self.device_id.to_string();
        let route = self.route;
        let id = self.id;
        handle.spawn(async move {
            if let Err(e) = transport
                .unsubscribe(&device_id, route.service, route.notify)
                .await
            {
                debug!("Unsubscribe after dropped transaction {}: {}", id, e);
            }
        });
    }
}

fn wait_cancelled(cancel: Option<&CancellationToken>) -> impl Future<Output = ()> + Send + '_ {
    async move {
        match cancel {
            Some(token) => token.cancelled().await,
            None => std::future::pending::<()>().await,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
