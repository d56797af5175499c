//! Monitor link library
//! Discovery and connection lifecycle core for a Bluetooth Classic (SPP)
//! blood-oxygen monitor. The platform radio, permission gate, and status
//! display plug in through the trait seams in [`core::bluetooth`].

// Module declarations
pub mod core;
pub mod error;

pub use crate::core::bluetooth::{
    AttemptId, BluetoothManager, Capability, ConnectionState, ConnectionStateMachine, DeviceRef,
    DiscoveryCoordinator, FailureReason, PermissionGate, RadioEvent, RadioHandle, SerialSocket,
    StatusSink, WorkerOutcome,
};
pub use crate::error::BluetoothError;
