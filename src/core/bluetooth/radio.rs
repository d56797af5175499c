//! External collaborator seams for the connection core
//! The platform supplies implementations of these traits; the core never
//! bypasses the permission gate and never assumes an unchecked capability.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::bluetooth::types::{ConnectionState, DeviceRef};
use crate::error::BluetoothError;

/// Capabilities the platform may grant or withhold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Scan,
    Connect,
}

/// Answers whether the caller currently holds the capabilities required
/// for scanning and connecting.
#[async_trait]
pub trait PermissionGate: Send + Sync + 'static {
    fn has_scan_capability(&self) -> bool;
    fn has_connect_capability(&self) -> bool;

    /// Asks the platform to prompt for the given capabilities. The outcome
    /// surfaces through a later `has_*_capability` check, not a return value.
    async fn request_capabilities(&self, kinds: &[Capability]);
}

/// Handle to the platform Bluetooth radio.
pub trait RadioHandle: Send + Sync + 'static {
    fn is_enabled(&self) -> bool;

    /// Asks the platform to enable the radio; completion is out-of-band.
    fn request_enable(&self);

    /// Starts device discovery. Returns false if the radio rejected it.
    fn start_discovery(&self) -> bool;

    /// Cancels discovery; safe to call when no scan is running.
    fn cancel_discovery(&self);

    /// Creates a serial-profile socket for the given address. The blocking
    /// connect happens later on the returned handle; creation failures are
    /// reported as [`BluetoothError::SocketCreateFailed`].
    fn create_serial_socket(
        &self,
        address: &str,
        service_uuid: Uuid,
    ) -> Result<Arc<dyn SerialSocket>, BluetoothError>;
}

/// A serial-profile socket to one peripheral.
pub trait SerialSocket: Send + Sync + 'static {
    /// Blocks until the link is established or fails. A concurrent `close`
    /// from another thread unblocks the call with an error.
    fn connect(&self) -> Result<(), BluetoothError>;

    /// Closes the socket. Idempotent.
    fn close(&self);
}

/// Receives ordered, de-duplicated state notifications for display.
/// Invoked only from the core's serialization points, so implementations
/// need no locking of their own.
pub trait StatusSink: Send + Sync + 'static {
    fn on_state_changed(&self, state: &ConnectionState);
    fn on_device_list_updated(&self, devices: &[DeviceRef]);
}

/// Platform radio callbacks, funnelled into the manager's event pump.
/// The platform delivers these on arbitrary contexts; the pump is the single
/// consumer that applies them.
#[derive(Debug, Clone)]
pub enum RadioEvent {
    /// Discovery reported a sighting.
    DeviceFound(DeviceRef),
    /// Discovery ended naturally.
    DiscoveryFinished,
    /// Link-level connect notification, keyed by address.
    LinkConnected(String),
    /// Link-level disconnect notification, keyed by address.
    LinkDisconnected(String),
    /// The radio was switched on or off.
    RadioStateChanged(bool),
}
