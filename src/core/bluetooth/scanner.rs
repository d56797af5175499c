//! Device discovery for the monitor link
//! Owns the set of devices seen during the current scan session and
//! deduplicates sightings by address, preserving first-seen order.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use log::{debug, error, info, warn};

use crate::core::bluetooth::connection::ConnectionStateMachine;
use crate::core::bluetooth::radio::{PermissionGate, RadioHandle, StatusSink};
use crate::core::bluetooth::types::DeviceRef;
use crate::error::BluetoothError;

/// Insertion-ordered set of devices seen during one scan session.
/// Re-insertion of an already-seen address is a no-op; devices are only ever
/// replaced wholesale by the next scan.
#[derive(Default)]
struct DiscoverySession {
    order: Vec<DeviceRef>,
    seen: HashSet<String>,
}

impl DiscoverySession {
    fn clear(&mut self) {
        self.order.clear();
        self.seen.clear();
    }

    /// Returns false when the address was already in the session.
    fn insert(&mut self, device: DeviceRef) -> bool {
        if !self.seen.insert(device.address.clone()) {
            return false;
        }
        self.order.push(device);
        true
    }

    fn devices(&self) -> Vec<DeviceRef> {
        self.order.clone()
    }
}

/// Coordinates device discovery against the permission gate and the radio.
#[derive(Clone)]
pub struct DiscoveryCoordinator {
    gate: Arc<dyn PermissionGate>,
    radio: Arc<dyn RadioHandle>,
    sink: Arc<dyn StatusSink>,
    machine: ConnectionStateMachine,
    session: Arc<Mutex<DiscoverySession>>,
}

impl DiscoveryCoordinator {
    pub fn new(
        gate: Arc<dyn PermissionGate>,
        radio: Arc<dyn RadioHandle>,
        sink: Arc<dyn StatusSink>,
        machine: ConnectionStateMachine,
    ) -> Self {
        Self {
            gate,
            radio,
            sink,
            machine,
            session: Arc::new(Mutex::new(DiscoverySession::default())),
        }
    }

    /// Starts a scan session, cancelling any scan already running first.
    /// Fails synchronously when the scan capability is missing or the radio
    /// is disabled, without touching the session or the state machine.
    pub async fn start_scan(&self) -> Result<(), BluetoothError> {
        if !self.gate.has_scan_capability() {
            warn!("Scan capability not granted; refusing to start discovery");
            return Err(BluetoothError::PermissionDenied);
        }
        if !self.radio.is_enabled() {
            warn!("Bluetooth radio is disabled; cannot start discovery");
            return Err(BluetoothError::RadioUnavailable);
        }

        // Idempotent restart: a running discovery is cancelled first.
        self.radio.cancel_discovery();

        // Clear before starting so no sighting from the new scan races the
        // reset. The sink is notified while the session lock is held, which
        // serializes list updates against sightings on the event pump.
        {
            let mut session = self.session.lock().unwrap();
            session.clear();
            self.sink.on_device_list_updated(&session.order);
        }

        if !self.radio.start_discovery() {
            error!("Radio rejected the discovery request");
            return Err(BluetoothError::DiscoveryStartFailed);
        }

        self.machine.set_scanning().await;
        info!("Device discovery started");
        Ok(())
    }

    /// Radio discovery callback. Appends newly-seen devices to the session
    /// and notifies the sink; repeated sightings of an address are dropped.
    pub async fn on_device_observed(&self, device: DeviceRef) {
        let mut session = self.session.lock().unwrap();
        if !session.insert(device.clone()) {
            debug!("Ignoring repeated sighting of {}", device.address);
            return;
        }
        info!(
            "Discovered {} ({})",
            device.display_label(),
            device.address
        );
        // Notified under the session lock; snapshots reach the sink in the
        // order the list changed.
        self.sink.on_device_list_updated(&session.order);
    }

    /// Requests discovery cancellation; safe to call when not scanning and
    /// never touches `Connecting`/`Connected` states.
    pub fn stop_scan(&self) {
        self.radio.cancel_discovery();
    }

    /// Radio-driven notification that discovery ended naturally.
    pub async fn on_scan_finished(&self) {
        info!("Device discovery finished");
        self.machine.on_scan_finished().await;
    }

    /// Devices seen in the current session, in first-seen order.
    pub fn devices(&self) -> Vec<DeviceRef> {
        self.session.lock().unwrap().devices()
    }
}
