//! Bluetooth manager for the monitor link
//! This module provides the main interface for bluetooth operations and
//! funnels platform radio callbacks into one serialized consumer.

use std::sync::Arc;

use anyhow::Result;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::connection::ConnectionStateMachine;
use crate::core::bluetooth::constants::{CONNECT_TIMEOUT, RADIO_EVENT_CAPACITY};
use crate::core::bluetooth::radio::{
    Capability, PermissionGate, RadioEvent, RadioHandle, SerialSocket, StatusSink,
};
use crate::core::bluetooth::scanner::DiscoveryCoordinator;
use crate::core::bluetooth::types::{AttemptId, ConnectionState, DeviceRef};
use crate::error::BluetoothError;

/// Manages Bluetooth operations: discovery, the connection lifecycle, and
/// the radio event pump.
pub struct BluetoothManager {
    gate: Arc<dyn PermissionGate>,
    radio: Arc<dyn RadioHandle>,
    machine: ConnectionStateMachine,
    scanner: DiscoveryCoordinator,
    event_tx: mpsc::Sender<RadioEvent>,
    pump_cancel: CancellationToken,
    pump_handle: Option<JoinHandle<Result<()>>>,
}

impl BluetoothManager {
    /// Creates a new BluetoothManager with the default connect timeout.
    pub fn new(
        gate: Arc<dyn PermissionGate>,
        radio: Arc<dyn RadioHandle>,
        sink: Arc<dyn StatusSink>,
    ) -> Self {
        Self::with_connect_timeout(gate, radio, sink, CONNECT_TIMEOUT)
    }

    /// Creates a new BluetoothManager with an explicit per-attempt timeout.
    pub fn with_connect_timeout(
        gate: Arc<dyn PermissionGate>,
        radio: Arc<dyn RadioHandle>,
        sink: Arc<dyn StatusSink>,
        connect_timeout: Duration,
    ) -> Self {
        let machine =
            ConnectionStateMachine::new(gate.clone(), radio.clone(), sink.clone(), connect_timeout);
        let scanner =
            DiscoveryCoordinator::new(gate.clone(), radio.clone(), sink, machine.clone());

        let (event_tx, event_rx) = mpsc::channel(RADIO_EVENT_CAPACITY);
        let pump_cancel = CancellationToken::new();
        let pump_handle = tokio::spawn(Self::pump_events(
            event_rx,
            scanner.clone(),
            machine.clone(),
            pump_cancel.clone(),
        ));

        Self {
            gate,
            radio,
            machine,
            scanner,
            event_tx,
            pump_cancel,
            pump_handle: Some(pump_handle),
        }
    }

    /// Drains platform radio callbacks one at a time, so every event touches
    /// shared state from a single consumer.
    async fn pump_events(
        mut event_rx: mpsc::Receiver<RadioEvent>,
        scanner: DiscoveryCoordinator,
        machine: ConnectionStateMachine,
        cancel: CancellationToken,
    ) -> Result<()> {
        info!("Radio event pump started");
        loop {
            tokio::select! {
                event = event_rx.recv() => match event {
                    Some(RadioEvent::DeviceFound(device)) => {
                        scanner.on_device_observed(device).await;
                    }
                    Some(RadioEvent::DiscoveryFinished) => {
                        scanner.on_scan_finished().await;
                    }
                    Some(RadioEvent::LinkConnected(address)) => {
                        machine.on_link_connected(&address).await;
                    }
                    Some(RadioEvent::LinkDisconnected(address)) => {
                        machine.on_link_disconnected(&address).await;
                    }
                    Some(RadioEvent::RadioStateChanged(enabled)) => {
                        info!("Radio state changed: enabled={}", enabled);
                        if !enabled {
                            // With the radio off no further sightings arrive,
                            // so the scan session is over.
                            scanner.on_scan_finished().await;
                        }
                    }
                    None => {
                        debug!("Radio event channel closed");
                        break;
                    }
                },
                _ = cancel.cancelled() => break,
            }
        }
        info!("Radio event pump stopped");
        Ok(())
    }

    /// Sender handed to platform glue; radio callbacks go through here.
    pub fn event_sender(&self) -> mpsc::Sender<RadioEvent> {
        self.event_tx.clone()
    }

    /// Starts a scan session. See [`DiscoveryCoordinator::start_scan`].
    pub async fn start_scan(&self) -> Result<(), BluetoothError> {
        self.scanner.start_scan().await
    }

    /// Stops discovery without touching any connection state.
    pub fn stop_scan(&self) {
        self.scanner.stop_scan();
    }

    /// Connects to `target`, superseding any attempt already in flight.
    pub async fn begin_connect(&self, target: DeviceRef) -> Result<AttemptId, BluetoothError> {
        self.machine.begin_connect(target).await
    }

    /// Cancels the current attempt or connection and returns to idle.
    pub async fn cancel_current(&self) {
        self.machine.cancel_current().await;
    }

    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.machine.state().await
    }

    /// Returns the currently connected device, if any.
    pub async fn connected_device(&self) -> Option<DeviceRef> {
        self.machine.connected_device().await
    }

    /// Narrow accessor for the live socket; see
    /// [`ConnectionStateMachine::with_socket`].
    pub async fn with_socket<R>(&self, f: impl FnOnce(&dyn SerialSocket) -> R) -> Option<R> {
        self.machine.with_socket(f).await
    }

    /// Devices seen in the current scan session, in first-seen order.
    pub fn discovered_devices(&self) -> Vec<DeviceRef> {
        self.scanner.devices()
    }

    /// Checks the radio and asks the platform to enable it when it is off.
    /// The enable flow completes out-of-band; until then operations fail
    /// with `RadioUnavailable`.
    pub fn ensure_radio_ready(&self) -> Result<(), BluetoothError> {
        if self.radio.is_enabled() {
            return Ok(());
        }
        warn!("Bluetooth radio is disabled; requesting enable");
        self.radio.request_enable();
        Err(BluetoothError::RadioUnavailable)
    }

    /// Asks the gate to prompt for capabilities. The grant surfaces through
    /// later capability checks; callers that want retry-on-grant re-issue
    /// their operation afterwards.
    pub async fn request_capabilities(&self, kinds: &[Capability]) {
        self.gate.request_capabilities(kinds).await;
    }

    /// Shuts the manager down: cancels discovery, releases the connection,
    /// and stops the event pump.
    pub async fn shutdown(&mut self) {
        info!("Shutting down bluetooth manager");
        self.radio.cancel_discovery();
        self.machine.cancel_current().await;

        self.pump_cancel.cancel();
        if let Some(handle) = self.pump_handle.take() {
            match handle.await {
                Ok(task_result) => match task_result {
                    Ok(_) => info!("Event pump finished after cancellation"),
                    Err(e) => error!("Event pump finished with an error: {:?}", e),
                },
                Err(e) => {
                    if e.is_cancelled() {
                        info!("Event pump task was cancelled");
                    } else {
                        error!("Event pump task failed to join: {:?}", e);
                    }
                }
            }
        }
    }
}
